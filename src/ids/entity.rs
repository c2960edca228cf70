//! Tagged entity reference shared by behavior patterns and anomaly records.

// Layer 1: Standard library imports
use std::fmt::{self, Display};

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use super::types::{ActorId, ModuleId};

/// A type-checked target for a behavior pattern or anomaly (§3, §9).
///
/// The source identifies targets with magic integers (`0` = actor, `1` =
/// module, `255` = system-wide); this crate keeps those values only at
/// the external boundary (see [`EntityRef::as_boundary_kind`]) and uses a
/// tagged enum everywhere else so a pattern can never be confused for the
/// wrong kind of entity.
///
/// # Example
///
/// ```rust
/// use kernel_core::ids::{ActorId, EntityRef};
///
/// let target = EntityRef::Actor(ActorId::from_index(3));
/// assert_eq!(target.as_boundary_kind(), 0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityRef {
    /// A live actor, referenced by its table id.
    Actor(ActorId),
    /// A loaded module, referenced by its table id.
    Module(ModuleId),
    /// The system as a whole (heap, scheduler totals).
    System,
}

impl EntityRef {
    /// The magic-integer kind the original source used (0/1/255), kept
    /// only as an external-boundary value per §9.
    pub const fn as_boundary_kind(self) -> u8 {
        match self {
            EntityRef::Actor(_) => 0,
            EntityRef::Module(_) => 1,
            EntityRef::System => 255,
        }
    }
}

impl Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Actor(id) => write!(f, "{id}"),
            EntityRef::Module(id) => write!(f, "{id}"),
            EntityRef::System => write!(f, "system"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_kind_matches_source_magic_integers() {
        assert_eq!(EntityRef::Actor(ActorId::from_index(0)).as_boundary_kind(), 0);
        assert_eq!(EntityRef::Module(ModuleId::from_index(0)).as_boundary_kind(), 1);
        assert_eq!(EntityRef::System.as_boundary_kind(), 255);
    }

    #[test]
    fn entity_refs_distinguish_kind_at_equal_index() {
        let actor = EntityRef::Actor(ActorId::from_index(5));
        let module = EntityRef::Module(ModuleId::from_index(5));
        assert_ne!(actor, module);
    }

    #[test]
    fn display_renders_underlying_id() {
        let target = EntityRef::Actor(ActorId::from_index(2));
        assert_eq!(target.to_string(), "actor#2");
        assert_eq!(EntityRef::System.to_string(), "system");
    }
}
