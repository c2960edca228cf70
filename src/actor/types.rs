//! Actor record, lifecycle state, priority, and stack region (§3).

// Layer 1: Standard library imports
use std::collections::VecDeque;

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc}; // §3.2 convention
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use super::context::ExecutionContext;
use crate::ids::ActorId;
use crate::message::Message;

/// Actor lifecycle state (§3).
///
/// # State Transitions
///
/// ```text
/// Created -> Ready -> Running -> Blocked -> Ready -> ... -> Finished
///    |         |         |                               ^
///    |         +---------+--------> Suspended ------------+
///    +-----------------------------> Error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActorState {
    /// Slot allocated, stack reserved, not yet started.
    Created,
    /// In the scheduler's ready queue, awaiting dispatch.
    Ready,
    /// Currently the scheduler's `current` actor.
    Running,
    /// Waiting on an empty mailbox (`message_wait`).
    Blocked,
    /// Stopped by `terminate`; stack and mailbox have been released.
    Finished,
    /// A fault occurred; the actor requires supervisor intervention.
    Error,
    /// Suspended by explicit request or anomaly intervention.
    Suspended,
}

/// Scheduling priority level (§3).
///
/// Ordering is significant: `Critical` is the highest, `Idle` the
/// lowest. The scheduler's ready queue dequeues from the highest
/// non-empty level first (§4.B).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    /// Lowest: runs only when nothing else is ready.
    Idle = 0,
    /// Below-normal background work.
    Low = 1,
    /// Default priority.
    Normal = 2,
    /// Above-normal, time-sensitive work.
    High = 3,
    /// Highest: kernel-critical work.
    Critical = 4,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

/// An actor's owned stack region (§3 "self-ownership of the stack
/// region: no other actor's stack overlaps").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackRegion {
    /// Base address (or, in this design-level model, a synthetic handle
    /// returned by the heap collaborator).
    pub base: u64,
    /// Size in bytes.
    pub size: usize,
}

/// An actor record (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    /// Stable id for the lifetime of the slot.
    pub id: ActorId,
    /// The actor that created this one (`ActorId::KERNEL` for
    /// kernel-spawned actors).
    pub parent: ActorId,
    /// Lifecycle state.
    pub state: ActorState,
    /// Scheduling priority.
    pub priority: Priority,
    /// Saved execution context, valid while not `Running`.
    pub context: ExecutionContext,
    /// Owned stack region.
    pub stack: StackRegion,
    /// Declared mailbox capacity.
    pub mailbox_capacity: usize,
    /// Pending inbound messages, in delivery order.
    #[serde(skip)]
    pub mailbox: VecDeque<Message>,
    /// Accumulated CPU time, in ticks.
    pub cpu_ticks: u64,
    /// Messages sent by this actor.
    pub messages_sent: u64,
    /// Messages received by this actor.
    pub messages_received: u64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the last time this actor was dispatched.
    pub last_scheduled_at: Option<DateTime<Utc>>,
    /// Memory budget: `(limit, current_usage)`.
    pub memory_limit: usize,
    /// Current memory usage against `memory_limit`.
    pub memory_usage: usize,
    /// Behavior score in `0..=100`, starts at 100 (§3).
    pub behavior_score: u8,
    /// `false` for the kernel actor; `true` for actors the supervisor
    /// samples (§3).
    pub monitored: bool,
    /// Ticks remaining in the actor's current time slice.
    pub slice_remaining: u32,
}

impl Actor {
    /// `true` when the mailbox has room for one more message.
    pub fn mailbox_has_capacity(&self) -> bool {
        self.mailbox.len() < self.mailbox_capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering_is_critical_highest() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
        assert!(Priority::Low > Priority::Idle);
    }

    #[test]
    fn default_priority_is_normal() {
        assert_eq!(Priority::default(), Priority::Normal);
    }
}
