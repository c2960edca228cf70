//! Dense integer identifiers and the entity-reference tagged variant.
//!
//! Actors and modules are referenced by small, stable integers rather than
//! UUIDs: the scheduler and module manager are fixed-capacity tables
//! indexed directly by id (§3, §4.A, §4.C). `EntityRef` is the tagged
//! variant the behavioral supervisor uses to name a pattern or anomaly
//! target without losing the (kind, id) distinction the source expresses
//! as magic integers (§9 "Polymorphism over entity").

pub mod entity;
pub mod types;

pub use entity::EntityRef;
pub use types::{ActorId, MessageId, ModuleId, SandboxId};
