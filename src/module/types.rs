//! The loaded-module record and its lifecycle state (§3).

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc}; // §3.2 convention
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use super::header::{ModuleFlags, ModuleType};
use crate::ids::{ModuleId, SandboxId};

/// Module lifecycle state (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleState {
    /// No image attached; the name is free to load again.
    Unloaded,
    /// Validation and region allocation in progress.
    Loading,
    /// Image attached, not yet started.
    Loaded,
    /// Entry function invoked successfully; module is active.
    Running,
    /// Exit function invoked; region about to be released.
    Unloading,
    /// `start` returned non-zero, or validation detected corruption.
    Error,
    /// Suspended by explicit request or anomaly intervention.
    Suspended,
}

/// One (name, version-bound, optionality) dependency declaration (§3, §4.C).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// The depended-on module's name.
    pub name: String,
    /// Minimum acceptable provider version, inclusive.
    pub min_version: u32,
    /// Maximum acceptable provider version, inclusive.
    pub max_version: u32,
    /// If `true`, an unresolved dependency does not fail the load.
    pub optional: bool,
}

impl Dependency {
    /// `true` if `version` falls within `[min_version, max_version]`.
    pub fn satisfied_by(&self, version: u32) -> bool {
        version >= self.min_version && version <= self.max_version
    }
}

/// The contiguous code+data+bss region backing a loaded module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleRegion {
    /// Opaque base handle returned by the heap collaborator.
    pub base: u64,
    /// Code section size in bytes.
    pub code_size: u32,
    /// Data section size in bytes.
    pub data_size: u32,
    /// BSS section size in bytes.
    pub bss_size: u32,
}

impl ModuleRegion {
    /// Total bytes allocated for the region.
    pub fn total_size(&self) -> usize {
        self.code_size as usize + self.data_size as usize + self.bss_size as usize
    }
}

/// A loaded module record (§3).
#[derive(Debug, Clone)]
pub struct Module {
    /// Stable id for the lifetime of the slot.
    pub id: ModuleId,
    /// Unique name, ≤64 bytes.
    pub name: String,
    /// Declared semantic version.
    pub version: u32,
    /// Lifecycle state.
    pub state: ModuleState,
    /// Category tag.
    pub module_type: ModuleType,
    /// Module flags (core, auto-start, hot-swap, monitored, privileged).
    pub flags: ModuleFlags,
    /// Allocated code+data+bss region.
    pub region: ModuleRegion,
    /// Entry-point offset, relative to the region's code base.
    pub entry_point_offset: u32,
    /// Exit-point offset, relative to the region's code base.
    pub exit_point_offset: u32,
    /// Declared dependencies.
    pub dependencies: Vec<Dependency>,
    /// Ids of modules whose dependency on this one is currently satisfied.
    pub dependents: Vec<ModuleId>,
    /// Reference count (distinct from `dependents.len()` when external
    /// callers, e.g. the CLI, hold a handle).
    pub reference_count: u32,
    /// Exported symbol table: (name, offset relative to code base).
    pub symbols: Vec<(String, u32)>,
    /// Accumulated CPU time in ticks.
    pub cpu_ticks: u64,
    /// Bytes allocated by this module via `kmalloc` on its behalf.
    pub memory_allocated: usize,
    /// Guarded-call count.
    pub call_count: u64,
    /// Failed-validation / non-zero-start / exit-error count.
    pub error_count: u32,
    /// Behavior score in `0..=100`.
    pub behavior_score: u8,
    /// This module's sandbox context id.
    pub sandbox_id: SandboxId,
    /// Load timestamp.
    pub loaded_at: DateTime<Utc>,
    /// Number of successful hot-swaps applied to this module identity.
    pub swap_count: u32,
}

impl Module {
    /// `true` if `module_load` may create another module with this
    /// name — i.e. this slot is not occupying the name (§3 invariant:
    /// "A module named N exists at most once in any state other than
    /// Unloaded").
    pub fn blocks_name_reuse(&self) -> bool {
        self.state != ModuleState::Unloaded
    }

    /// `dependent_count` as the invariant in §8.5 defines it.
    pub fn dependent_count(&self) -> usize {
        self.dependents.len()
    }
}
