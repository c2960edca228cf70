//! Message system: the immutable-after-send record (§3 Message) and its
//! fixed-size pool (§4.A, §6).

pub mod pool;
pub mod types;

pub use pool::MessagePool;
pub use types::{Message, MessageFlags, MessageKind};
