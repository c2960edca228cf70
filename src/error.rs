//! Crate-wide error taxonomy (§7).
//!
//! Every public operation in `kernel-core` returns either a success
//! payload or one of these kinds. Callers inside the core never panic on
//! a recoverable kind; they propagate it. Follows the canonical
//! struct/enum error shape used throughout `airssys-rt`
//! (`supervisor::SupervisorError`, `system::SystemError`): `thiserror`
//! derives, `#[source]` chaining, and `is_*` predicate helpers instead of
//! matching on variants at call sites.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use thiserror::Error;

// Layer 3: Internal module imports
use crate::ids::{ActorId, ModuleId};

/// Crate-wide error kind (§7).
///
/// `Corruption` is the one fatal kind: it is produced only by validation
/// routines and is fatal to the affected module (forced to `Error`
/// state). Every other kind is recoverable; the caller decides what to
/// do next.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KernelError {
    /// No free slot in a fixed-capacity table (actor or module).
    #[error("no free slot available")]
    NoFreeSlot,

    /// Heap allocation failed (stack, module region, or pool growth).
    #[error("out of memory")]
    OutOfMemory,

    /// A mailbox has reached its declared capacity.
    #[error("mailbox full for {0}")]
    MailboxFull(ActorId),

    /// The message pool has no free slots.
    #[error("message pool exhausted")]
    MessagePoolExhausted,

    /// An id was used that does not name a live actor or module.
    #[error("unknown id")]
    UnknownId,

    /// The operation is not permitted from the entity's current
    /// lifecycle state.
    #[error("operation not permitted from current state")]
    InvalidState,

    /// A module image failed validation.
    #[error("invalid module image: {0}")]
    InvalidImage(String),

    /// A module of this name already exists in a non-Unloaded state.
    #[error("module already loaded")]
    AlreadyLoaded,

    /// Unload refused: dependents exist or the module is flagged core.
    #[error("module in use")]
    InUse,

    /// A non-optional module dependency could not be resolved.
    #[error("dependency unsatisfied: {0}")]
    DependencyUnsatisfied(String),

    /// A sandboxed operation attempted a capability not granted (or
    /// explicitly denied).
    #[error("capability denied")]
    CapabilityDenied,

    /// A sandboxed operation exceeded an enforced resource limit.
    #[error("resource limit exceeded")]
    ResourceExceeded,

    /// A memory access was rejected by the sandbox.
    #[error("memory access denied")]
    MemoryAccessDenied,

    /// A function call was rejected by the sandbox's deny list.
    #[error("execution denied")]
    ExecutionDenied,

    /// Fatal: validation detected corruption in a core module.
    #[error("corruption detected in {0}")]
    Corruption(ModuleId),
}

impl KernelError {
    /// `true` for the one fatal kind (§7): corruption of a loaded
    /// module. Core callers should halt with the logged cause rather
    /// than attempt to continue.
    pub fn is_fatal(&self) -> bool {
        matches!(self, KernelError::Corruption(_))
    }

    /// `true` for kinds that indicate the caller supplied a stale or
    /// unknown identifier rather than a policy violation.
    pub fn is_not_found(&self) -> bool {
        matches!(self, KernelError::UnknownId)
    }

    /// `true` for kinds raised by the sandbox rather than the scheduler
    /// or module manager.
    pub fn is_security(&self) -> bool {
        matches!(
            self,
            KernelError::CapabilityDenied
                | KernelError::ResourceExceeded
                | KernelError::MemoryAccessDenied
                | KernelError::ExecutionDenied
        )
    }
}

/// Convenience alias for fallible core operations.
pub type KernelResult<T> = Result<T, KernelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corruption_is_the_only_fatal_kind() {
        assert!(KernelError::Corruption(ModuleId::from_index(1)).is_fatal());
        assert!(!KernelError::InvalidState.is_fatal());
        assert!(!KernelError::NoFreeSlot.is_fatal());
    }

    #[test]
    fn unknown_id_is_not_found() {
        assert!(KernelError::UnknownId.is_not_found());
        assert!(!KernelError::InvalidState.is_not_found());
    }

    #[test]
    fn security_kinds_are_classified() {
        assert!(KernelError::CapabilityDenied.is_security());
        assert!(KernelError::ResourceExceeded.is_security());
        assert!(KernelError::MemoryAccessDenied.is_security());
        assert!(KernelError::ExecutionDenied.is_security());
        assert!(!KernelError::MailboxFull(ActorId::from_index(1)).is_security());
    }

    #[test]
    fn display_includes_context() {
        let err = KernelError::MailboxFull(ActorId::from_index(2));
        assert!(err.to_string().contains("actor#2"));
    }
}
