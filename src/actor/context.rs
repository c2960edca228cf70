//! Saved execution context for a suspended actor (§3).

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
// (none)

/// Saved CPU state for an actor that is not currently running.
///
/// This crate does not perform a real hardware context switch (§1 Scope:
/// "preemption across a true context switch" is a Non-goal); the
/// [`crate::scheduler::Scheduler`] stores and restores this record purely
/// as bookkeeping so a conforming implementation has somewhere to keep
/// the values the source saves/restores on each switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Instruction pointer.
    pub instruction_pointer: u64,
    /// Stack pointer.
    pub stack_pointer: u64,
    /// Frame pointer.
    pub frame_pointer: u64,
    /// Saved processor flags.
    pub flags: u64,
    /// General-purpose registers.
    pub registers: [u64; 8],
}

impl ExecutionContext {
    /// A zeroed context, as saved for a freshly created actor before its
    /// first dispatch.
    pub fn zeroed() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeroed_context_has_no_registers_set() {
        let ctx = ExecutionContext::zeroed();
        assert_eq!(ctx.registers, [0; 8]);
        assert_eq!(ctx.instruction_pointer, 0);
    }
}
