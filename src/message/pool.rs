//! Fixed-size message pool accounting (§3, §6).
//!
//! Messages themselves are owned directly by the mailbox they are
//! delivered into (`VecDeque<Message>` on the [`crate::actor::Actor`]
//! record); what this pool tracks is the *occupancy* invariant the
//! source enforces with a real slab allocator — at most
//! [`MessagePool::capacity`] messages may exist across all mailboxes at
//! once (§8.4) — plus the monotonic id sequence.

// Layer 3: Internal module imports
use crate::error::{KernelError, KernelResult};
use crate::ids::MessageId;

/// Tracks message-pool occupancy and assigns [`MessageId`]s.
#[derive(Debug)]
pub struct MessagePool {
    capacity: usize,
    occupancy: usize,
    next_id: u64,
}

impl MessagePool {
    /// Build a pool with the given fixed capacity (default 1024, §6).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            occupancy: 0,
            next_id: 1,
        }
    }

    /// Total slot capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Messages currently occupying a slot.
    pub fn occupancy(&self) -> usize {
        self.occupancy
    }

    /// Reserve one slot and mint the next id, or fail with
    /// [`KernelError::MessagePoolExhausted`] if the pool is full.
    pub fn alloc(&mut self) -> KernelResult<MessageId> {
        if self.occupancy >= self.capacity {
            return Err(KernelError::MessagePoolExhausted);
        }
        let id = MessageId::from_raw(self.next_id);
        self.next_id += 1;
        self.occupancy += 1;
        Ok(id)
    }

    /// Release one slot, e.g. when a message is received and consumed or
    /// a mailbox is drained on actor termination.
    pub fn free(&mut self) {
        self.occupancy = self.occupancy.saturating_sub(1);
    }

    /// Release `count` slots at once (mailbox drain on termination).
    pub fn free_many(&mut self, count: usize) {
        self.occupancy = self.occupancy.saturating_sub(count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_fails_once_capacity_reached() {
        let mut pool = MessagePool::new(2);
        pool.alloc().expect("first slot");
        pool.alloc().expect("second slot");
        assert_eq!(pool.alloc(), Err(KernelError::MessagePoolExhausted));
    }

    #[test]
    fn free_reclaims_a_slot() {
        let mut pool = MessagePool::new(1);
        pool.alloc().expect("only slot");
        pool.free();
        assert!(pool.alloc().is_ok());
    }

    #[test]
    fn ids_are_monotonically_increasing() {
        let mut pool = MessagePool::new(4);
        let a = pool.alloc().expect("a");
        let b = pool.alloc().expect("b");
        assert!(b.as_raw() > a.as_raw());
    }
}
