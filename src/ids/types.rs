//! Dense integer id newtypes for actors, modules, sandboxes, and messages.

// Layer 1: Standard library imports
use std::fmt::{self, Display};

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
// (none)

/// Identifier for an actor slot in the actor table.
///
/// Actor ids are small, dense integers stable for the lifetime of the
/// slot (§3). Id 0 is reserved for the kernel actor and is never handed
/// out by [`crate::actor::ActorTable::create`].
///
/// # Example
///
/// ```rust
/// use kernel_core::ids::ActorId;
///
/// let kernel = ActorId::KERNEL;
/// assert_eq!(kernel.as_index(), 0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActorId(u32);

impl ActorId {
    /// The reserved id for the kernel actor (§3).
    pub const KERNEL: Self = Self(0);

    /// Wrap a raw table index as an [`ActorId`].
    pub const fn from_index(index: u32) -> Self {
        Self(index)
    }

    /// The raw table index backing this id.
    pub const fn as_index(self) -> u32 {
        self.0
    }

    /// `true` for the reserved kernel actor id.
    pub const fn is_kernel(self) -> bool {
        self.0 == 0
    }
}

impl Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor#{}", self.0)
    }
}

/// Identifier for a module slot in the module table (§3, §4.C).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModuleId(u32);

impl ModuleId {
    /// Wrap a raw table index as a [`ModuleId`].
    pub const fn from_index(index: u32) -> Self {
        Self(index)
    }

    /// The raw table index backing this id.
    pub const fn as_index(self) -> u32 {
        self.0
    }
}

impl Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module#{}", self.0)
    }
}

/// Identifier for a module's sandbox context (§3 Sandbox context).
///
/// A module has exactly one sandbox for its lifetime, so in practice
/// `SandboxId(n) == ModuleId(n)`'s numeric value, but the two are kept as
/// distinct types so a sandbox can never be accidentally indexed as a
/// module or vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SandboxId(u32);

impl SandboxId {
    /// Wrap a raw table index as a [`SandboxId`].
    pub const fn from_index(index: u32) -> Self {
        Self(index)
    }

    /// The raw table index backing this id.
    pub const fn as_index(self) -> u32 {
        self.0
    }
}

impl Display for SandboxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sandbox#{}", self.0)
    }
}

/// Identifier for a pooled message (§3 Message, §4.A).
///
/// Monotonically assigned by the [`crate::message::MessagePool`]; never
/// reused while the message is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(u64);

impl MessageId {
    /// Wrap a raw monotonic counter value as a [`MessageId`].
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// The raw monotonic counter value backing this id.
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg#{}", self.0)
    }
}
