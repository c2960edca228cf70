//! Module entry/exit invocation collaborator contract (§4.C).
//!
//! The core never executes machine code: a loaded module's entry and
//! exit functions are native addresses relative to its code region, and
//! actually calling them is hardware/loader glue out of scope (§1). This
//! trait is the seam `module_start`/`module_stop`/`module_hot_swap` call
//! through, analogous to the optional per-sandbox VM state mentioned in
//! §3.

// Layer 1: Standard library imports
use std::collections::HashMap;

// Layer 3: Internal module imports
use crate::ids::ModuleId;

/// Invokes a loaded module's entry and exit functions.
pub trait ModuleRuntime {
    /// Call the module's entry function. Returns the function's result
    /// code; `module_start` treats non-zero as failure (§4.C).
    fn invoke_entry(&mut self, module: ModuleId, entry_offset: u32) -> i32;

    /// Call the module's exit function.
    fn invoke_exit(&mut self, module: ModuleId, exit_offset: u32);
}

/// In-memory runtime stub: entry calls succeed (return `0`) by default;
/// tests can configure a specific module to fail via
/// [`StubModuleRuntime::fail_entry`].
#[derive(Debug, Default)]
pub struct StubModuleRuntime {
    entry_results: HashMap<ModuleId, i32>,
    exit_calls: Vec<ModuleId>,
}

impl StubModuleRuntime {
    /// A runtime where every entry call succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure `module`'s next entry invocation to return `code`.
    pub fn fail_entry(&mut self, module: ModuleId, code: i32) {
        self.entry_results.insert(module, code);
    }

    /// Modules whose exit function has been invoked, in call order.
    pub fn exit_calls(&self) -> &[ModuleId] {
        &self.exit_calls
    }
}

impl ModuleRuntime for StubModuleRuntime {
    fn invoke_entry(&mut self, module: ModuleId, _entry_offset: u32) -> i32 {
        self.entry_results.get(&module).copied().unwrap_or(0)
    }

    fn invoke_exit(&mut self, module: ModuleId, _exit_offset: u32) {
        self.exit_calls.push(module);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_entry_call_succeeds() {
        let mut runtime = StubModuleRuntime::new();
        assert_eq!(runtime.invoke_entry(ModuleId::from_index(1), 0), 0);
    }

    #[test]
    fn configured_entry_failure_is_reported() {
        let mut runtime = StubModuleRuntime::new();
        runtime.fail_entry(ModuleId::from_index(1), -1);
        assert_eq!(runtime.invoke_entry(ModuleId::from_index(1), 0), -1);
    }

    #[test]
    fn exit_calls_are_recorded_in_order() {
        let mut runtime = StubModuleRuntime::new();
        runtime.invoke_exit(ModuleId::from_index(2), 4);
        assert_eq!(runtime.exit_calls(), [ModuleId::from_index(2)]);
    }
}
