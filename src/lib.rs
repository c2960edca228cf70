//! # kernel-core - Hybrid-Kernel Control Plane
//!
//! A cooperative, single-threaded actor scheduler, hot-swappable module
//! manager, per-module capability sandbox, and rule-based behavioral
//! supervisor, designed as one composition root rather than a set of
//! process-wide singletons (§9 "Global kernel state").
//!
//! # Quick Start
//!
//! ```rust
//! use kernel_core::{Kernel, KernelConfig};
//! use kernel_core::actor::Priority;
//! use kernel_core::ids::ActorId;
//!
//! let mut kernel = Kernel::builder()
//!     .with_config(KernelConfig::default())
//!     .build()
//!     .expect("valid configuration");
//!
//! let actor = kernel
//!     .spawn_actor(ActorId::KERNEL, Priority::Normal, None, None)
//!     .expect("table has room");
//!
//! kernel.tick().expect("tick never fails on a live kernel");
//! assert!(kernel.actors().contains(actor));
//! ```
//!
//! # Core Components
//!
//! - **Scheduler** (§4.B) — single logical CPU, priority-aware
//!   cooperative dispatch, tick-driven time-slice accounting. No
//!   preemption across a true context switch (§1 Non-goals).
//! - **Module manager** (§4.C) — bit-exact binary image format,
//!   dependency resolution with rollback, hot-swap in place.
//! - **Sandbox** (§4.D) — per-module capability bitmask and resource
//!   quotas, with auto-quarantine on repeated strict-mode violations.
//! - **Supervisor** (§4.D) — sliding-window behavior patterns, four
//!   rule-based anomaly predicates, and a severity-to-intervention
//!   mapping. No machine learning: "the four anomaly predicates plus
//!   the intervention mapping are the whole contract" (§9).
//!
//! # Module Organization
//!
//! - [`ids`] - Dense integer identifiers and the `EntityRef` tagged variant
//! - [`message`] - The message record and its fixed-size pool
//! - [`actor`] - Actor table, mailboxes, and lifecycle transitions
//! - [`scheduler`] - Cooperative, priority-aware dispatch
//! - [`module`] - Image header, loaded-module record, and the module table
//! - [`sandbox`] - Capability bitmask, resource limits, violation log
//! - [`supervisor`] - Behavior patterns, anomaly predicates, interventions
//! - [`collaborators`] - External contracts (heap, log, interrupts, runtime)
//! - [`config`] - Kernel-wide configuration
//! - [`error`] - The crate-wide error taxonomy
//! - [`kernel`] - The composition root tying every subsystem together
//!
//! # Design Principles
//!
//! - **One composition root.** Every subsystem is owned by [`Kernel`]
//!   and threaded through by explicit reference; there is no
//!   process-wide singleton (§9).
//! - **Collaborators over concrete hardware glue.** The heap,
//!   diagnostic sink, interrupt dispatcher, and module runtime are
//!   traits (§6); this crate ships an in-memory stub of each so the
//!   control plane is fully testable without hardware.
//! - **State machines as data.** Actor and module lifecycles are small
//!   enumerations driven through one transition function per entity,
//!   so the §8 invariants are structurally enforced rather than merely
//!   documented.
//!
//! # Standards
//!
//! - 3-layer import organization (standard library, then third-party,
//!   then internal modules).
//! - `chrono::{DateTime, Utc}` for every timestamp.
//! - `mod.rs` files contain only declarations and re-exports; the
//!   module's actual content lives in its siblings.
//! - Every public error surfaces through [`error::KernelError`]; no
//!   panics on a recoverable kind.

pub mod actor;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod ids;
pub mod kernel;
pub mod message;
pub mod module;
pub mod ring_buffer;
pub mod sandbox;
pub mod scheduler;
pub mod supervisor;

pub use config::KernelConfig;
pub use error::{KernelError, KernelResult};
pub use ids::{ActorId, EntityRef, MessageId, ModuleId, SandboxId};
pub use kernel::{Kernel, KernelBuilder};
