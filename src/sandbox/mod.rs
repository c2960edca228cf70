//! Capability sandbox: bit masks, security levels, resource quotas, and
//! the violation log (§4.D, §6).

pub mod capability;
pub mod manager;
pub mod types;

pub use capability::Capability;
pub use manager::SandboxManager;
pub use types::{ResourceLimit, ResourceType, SandboxContext, SecurityLevel, Violation, ViolationKind};
