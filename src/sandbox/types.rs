//! Security levels, resource limits, and violation records (§4.D, §6).

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use crate::ids::ModuleId;
use crate::sandbox::capability::Capability;

/// A module's trust tier (§6 GLOSSARY "Security level").
///
/// Ordered loosest-to-tightest; [`SecurityLevel::Quarantine`] is reached
/// only via auto-quarantine (§4.D), never assigned at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityLevel {
    /// Every capability, no resource limits. Reserved for core modules.
    Unrestricted,
    /// Broad capability set with generous resource limits.
    Trusted,
    /// The default tier for ordinary loaded modules.
    User,
    /// A narrow capability set with tight resource limits.
    Untrusted,
    /// Capability mask reduced to `ModuleQuery`; memory limit collapsed
    /// to 256 KiB. Entered only through auto-quarantine.
    Quarantine,
}

impl SecurityLevel {
    /// The capability mask granted by default at this level (§6).
    pub fn default_capabilities(self) -> Capability {
        match self {
            SecurityLevel::Unrestricted => Capability::unrestricted(),
            SecurityLevel::Trusted => Capability::trusted(),
            SecurityLevel::User => Capability::user(),
            SecurityLevel::Untrusted => Capability::untrusted(),
            SecurityLevel::Quarantine => Capability::quarantine(),
        }
    }

    /// The resource limit table enforced by default at this level (§6).
    ///
    /// `Unrestricted` carries no limits at all (an empty table; every
    /// [`crate::sandbox::manager::SandboxManager::check_resource`] call
    /// for an unrestricted module finds nothing to enforce).
    pub fn default_resource_limits(self) -> Vec<ResourceLimit> {
        match self {
            SecurityLevel::Unrestricted => Vec::new(),
            SecurityLevel::Trusted => vec![
                ResourceLimit::new(ResourceType::Memory, 4 * 1024 * 1024),
                ResourceLimit::new(ResourceType::ChildActors, 10),
                ResourceLimit::new(ResourceType::HeapAllocs, 1000),
            ],
            SecurityLevel::User => vec![
                ResourceLimit::new(ResourceType::Memory, 2 * 1024 * 1024),
                ResourceLimit::new(ResourceType::ChildActors, 5),
                ResourceLimit::new(ResourceType::HeapAllocs, 500),
                ResourceLimit::new(ResourceType::ModuleCalls, 1000),
            ],
            SecurityLevel::Untrusted => vec![
                ResourceLimit::new(ResourceType::Memory, 1024 * 1024),
                ResourceLimit::new(ResourceType::ChildActors, 2),
                ResourceLimit::new(ResourceType::HeapAllocs, 100),
                ResourceLimit::new(ResourceType::ModuleCalls, 500),
                ResourceLimit::new(ResourceType::SupervisorQueries, 10),
            ],
            SecurityLevel::Quarantine => vec![
                ResourceLimit::new(ResourceType::Memory, 512 * 1024),
                ResourceLimit::new(ResourceType::ChildActors, 0),
                ResourceLimit::new(ResourceType::HeapAllocs, 10),
                ResourceLimit::new(ResourceType::ModuleCalls, 100),
            ],
        }
    }

    /// The resource limit table applied when a module collapses into
    /// quarantine from a tighter, already-exhausted state (§8 scenario
    /// 6: "its memory limit becomes 256 KiB"), stricter than entering
    /// `Quarantine` fresh at load time.
    pub fn post_quarantine_override() -> Vec<ResourceLimit> {
        vec![
            ResourceLimit::new(ResourceType::Memory, 256 * 1024),
            ResourceLimit::new(ResourceType::ChildActors, 0),
            ResourceLimit::new(ResourceType::HeapAllocs, 1),
            ResourceLimit::new(ResourceType::ModuleCalls, 10),
        ]
    }
}

/// A countable resource a sandboxed module may be limited on (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    /// Heap bytes attributed to the module.
    Memory,
    /// Actors the module has created and not yet had terminated.
    ChildActors,
    /// Outstanding `kmalloc` calls attributed to the module.
    HeapAllocs,
    /// Guarded inter-module function calls made.
    ModuleCalls,
    /// Queries issued to the behavioral supervisor.
    SupervisorQueries,
}

/// One tracked resource quota (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimit {
    /// Which resource this entry tracks.
    pub resource_type: ResourceType,
    /// The configured ceiling.
    pub limit: u64,
    /// Current outstanding usage.
    pub current: u64,
    /// High-water mark ever observed.
    pub peak: u64,
    /// `false` disables enforcement while still tracking usage.
    pub enforce: bool,
}

impl ResourceLimit {
    /// Build an enforced limit starting at zero usage.
    pub fn new(resource_type: ResourceType, limit: u64) -> Self {
        Self {
            resource_type,
            limit,
            current: 0,
            peak: 0,
            enforce: true,
        }
    }

    /// `true` if `requested` additional usage would exceed `limit` while
    /// enforcement is on. Unenforced limits always admit.
    pub fn would_exceed(&self, requested: u64) -> bool {
        self.enforce && self.current.saturating_add(requested) > self.limit
    }

    /// Apply a usage delta, saturating at zero, and track the peak.
    pub fn apply_delta(&mut self, delta: i64) {
        self.current = if delta >= 0 {
            self.current.saturating_add(delta as u64)
        } else {
            self.current.saturating_sub((-delta) as u64)
        };
        self.peak = self.peak.max(self.current);
    }
}

/// The kind of policy a [`Violation`] broke (§4.D, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationKind {
    /// A capability not granted (or explicitly denied) was attempted.
    Capability,
    /// An enforced resource limit was exceeded.
    Resource,
    /// A direct memory access outside the module's region was rejected.
    Memory,
    /// A deny-listed function call was attempted.
    Execution,
    /// A miscellaneous sandbox policy violation.
    Policy,
}

/// One recorded sandbox violation (§3 GLOSSARY "Violation").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Monotonic id, unique within the owning [`crate::sandbox::manager::SandboxManager`].
    pub id: u64,
    /// When the violation was recorded.
    pub timestamp: DateTime<Utc>,
    /// The module that committed the violation.
    pub module: ModuleId,
    /// What kind of policy it broke.
    pub kind: ViolationKind,
    /// Free-form description of what was attempted.
    pub description: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "violation#{} {:?} by {} ({}): {}",
            self.id, self.kind, self.module, self.timestamp, self.description
        )
    }
}

/// Per-module sandbox state (§3 GLOSSARY "Sandbox context").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxContext {
    /// Current trust tier.
    pub security_level: SecurityLevel,
    /// Capabilities explicitly granted beyond the level default.
    pub granted: Capability,
    /// Capabilities explicitly denied; always wins over `granted` (§4.D).
    pub denied: Capability,
    /// Tracked resource quotas.
    pub resource_limits: Vec<ResourceLimit>,
    /// Whether a single violation should escalate enforcement (§4.D).
    pub strict: bool,
    /// Total violations recorded against this module.
    pub violation_count: u32,
}

impl SandboxContext {
    /// Build a fresh context at `level`'s default capability set and
    /// resource limits.
    pub fn new(level: SecurityLevel, strict: bool) -> Self {
        Self {
            security_level: level,
            granted: Capability::empty(),
            denied: Capability::empty(),
            resource_limits: level.default_resource_limits(),
            strict,
            violation_count: 0,
        }
    }

    /// The effective capability mask: level default plus explicit
    /// grants, minus explicit denials (§4.D "denied dominates granted").
    pub fn effective_capabilities(&self) -> Capability {
        (self.security_level.default_capabilities() | self.granted) - self.denied
    }

    /// The tracked limit entry for `resource_type`, if this level tracks it.
    pub fn limit(&self, resource_type: ResourceType) -> Option<&ResourceLimit> {
        self.resource_limits
            .iter()
            .find(|entry| entry.resource_type == resource_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denied_wins_over_granted() {
        let mut ctx = SandboxContext::new(SecurityLevel::User, false);
        ctx.granted = Capability::FS_WRITE;
        ctx.denied = Capability::FS_WRITE;
        assert!(!ctx.effective_capabilities().contains(Capability::FS_WRITE));
    }

    #[test]
    fn trusted_default_limits_match_spec_table() {
        let limits = SecurityLevel::Trusted.default_resource_limits();
        let memory = limits
            .iter()
            .find(|l| l.resource_type == ResourceType::Memory)
            .unwrap();
        assert_eq!(memory.limit, 4 * 1024 * 1024);
    }

    #[test]
    fn unrestricted_has_no_tracked_limits() {
        assert!(SecurityLevel::Unrestricted.default_resource_limits().is_empty());
    }

    #[test]
    fn would_exceed_respects_enforce_flag() {
        let mut limit = ResourceLimit::new(ResourceType::ModuleCalls, 3);
        limit.current = 3;
        assert!(limit.would_exceed(1));
        limit.enforce = false;
        assert!(!limit.would_exceed(1));
    }

    #[test]
    fn apply_delta_saturates_at_zero_and_tracks_peak() {
        let mut limit = ResourceLimit::new(ResourceType::ChildActors, 5);
        limit.apply_delta(3);
        limit.apply_delta(-10);
        assert_eq!(limit.current, 0);
        assert_eq!(limit.peak, 3);
    }
}
