//! Fixed-capacity actor table and mailbox store (§4.A).
//!
//! The table is a fixed-capacity array indexed by id (default 256,
//! including the reserved kernel actor at index 0). Allocation
//! linear-scans for a free slot; creation fails with `NoFreeSlot` if none
//! is available. Mailboxes are owned directly on the [`super::Actor`]
//! record as a bounded `VecDeque`, which gives FIFO-within-(sender,
//! recipient) ordering (§4.A "Ordering") at the cost of one allocation
//! per actor rather than per message — acceptable at this design level
//! since messages are already owned, boxed payloads.

// Layer 1: Standard library imports
use std::collections::VecDeque;

// Layer 2: Third-party crate imports
use chrono::Utc; // §3.2 convention

// Layer 3: Internal module imports
use super::context::ExecutionContext;
use super::types::{Actor, ActorState, Priority, StackRegion};
use crate::collaborators::{Heap, LogLevel, LogSink};
use crate::error::{KernelError, KernelResult};
use crate::ids::ActorId;
use crate::message::{Message, MessageFlags, MessageKind, MessagePool};

/// Fixed-capacity actor table and mailbox store (§4.A).
#[derive(Debug)]
pub struct ActorTable {
    slots: Vec<Option<Actor>>,
    default_mailbox_capacity: usize,
    kernel_mailbox_capacity: usize,
    default_stack_size: usize,
    max_payload: usize,
    pool: MessagePool,
}

impl ActorTable {
    /// Build a table with `capacity` slots (including the reserved
    /// kernel actor) and seed the kernel actor at index 0 (§3).
    pub fn new(
        capacity: usize,
        default_mailbox_capacity: usize,
        kernel_mailbox_capacity: usize,
        default_stack_size: usize,
        max_payload: usize,
        pool_capacity: usize,
    ) -> Self {
        let mut slots = vec![None; capacity];
        slots[0] = Some(Actor {
            id: ActorId::KERNEL,
            parent: ActorId::KERNEL,
            state: ActorState::Running,
            priority: Priority::Critical,
            context: ExecutionContext::zeroed(),
            stack: StackRegion { base: 0, size: 0 },
            mailbox_capacity: kernel_mailbox_capacity,
            mailbox: VecDeque::new(),
            cpu_ticks: 0,
            messages_sent: 0,
            messages_received: 0,
            created_at: Utc::now(),
            last_scheduled_at: Some(Utc::now()),
            memory_limit: usize::MAX,
            memory_usage: 0,
            behavior_score: 100,
            monitored: false,
            slice_remaining: 0,
        });
        Self {
            slots,
            default_mailbox_capacity,
            kernel_mailbox_capacity,
            default_stack_size,
            max_payload,
            pool: MessagePool::new(pool_capacity),
        }
    }

    /// Total slot count, including the reserved kernel actor.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Read access to an actor's record.
    pub fn get(&self, id: ActorId) -> KernelResult<&Actor> {
        self.slots
            .get(id.as_index() as usize)
            .and_then(Option::as_ref)
            .ok_or(KernelError::UnknownId)
    }

    fn get_mut(&mut self, id: ActorId) -> KernelResult<&mut Actor> {
        self.slots
            .get_mut(id.as_index() as usize)
            .and_then(Option::as_mut)
            .ok_or(KernelError::UnknownId)
    }

    /// Apply `f` to `id`'s actor record and return its result, without
    /// exposing the record's lifetime to the caller (used by the
    /// scheduler, which needs to mutate fields the table does not
    /// otherwise expose setters for).
    pub fn with_actor_mut<R>(
        &mut self,
        id: ActorId,
        f: impl FnOnce(&mut Actor) -> R,
    ) -> KernelResult<R> {
        Ok(f(self.get_mut(id)?))
    }

    /// Create a new actor, allocating its stack from `heap` (§4.A).
    ///
    /// Fails with [`KernelError::NoFreeSlot`] if the table is full, or
    /// [`KernelError::OutOfMemory`] if the stack allocation fails (the
    /// slot is released in that case).
    pub fn actor_create(
        &mut self,
        parent: ActorId,
        priority: Priority,
        stack_size: Option<usize>,
        mailbox_capacity: Option<usize>,
        heap: &mut dyn Heap,
    ) -> KernelResult<ActorId> {
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(KernelError::NoFreeSlot)?;

        let stack_size = stack_size.unwrap_or(self.default_stack_size);
        let handle = match heap.kmalloc(stack_size) {
            Some(handle) => handle,
            None => return Err(KernelError::OutOfMemory),
        };

        let id = ActorId::from_index(index as u32);
        self.slots[index] = Some(Actor {
            id,
            parent,
            state: ActorState::Created,
            priority,
            context: ExecutionContext::zeroed(),
            stack: StackRegion {
                base: handle,
                size: stack_size,
            },
            mailbox_capacity: mailbox_capacity.unwrap_or(self.default_mailbox_capacity),
            mailbox: VecDeque::new(),
            cpu_ticks: 0,
            messages_sent: 0,
            messages_received: 0,
            created_at: Utc::now(),
            last_scheduled_at: None,
            memory_limit: usize::MAX,
            memory_usage: 0,
            behavior_score: 100,
            monitored: true,
            slice_remaining: 0,
        });
        Ok(id)
    }

    /// Move a `Created` actor to `Ready`, returning [`KernelError::InvalidState`]
    /// if it is not in `Created`.
    ///
    /// The caller (the scheduler) is responsible for actually enqueuing
    /// the id on the ready queue; this method only performs the state
    /// transition the table owns.
    pub fn actor_start(&mut self, id: ActorId) -> KernelResult<()> {
        let actor = self.get_mut(id)?;
        if actor.state != ActorState::Created {
            return Err(KernelError::InvalidState);
        }
        actor.state = ActorState::Ready;
        Ok(())
    }

    /// Suspend an actor from `Ready`, `Running`, or `Blocked`.
    pub fn actor_suspend(&mut self, id: ActorId) -> KernelResult<()> {
        let actor = self.get_mut(id)?;
        if !matches!(
            actor.state,
            ActorState::Ready | ActorState::Running | ActorState::Blocked
        ) {
            return Err(KernelError::InvalidState);
        }
        actor.state = ActorState::Suspended;
        Ok(())
    }

    /// Resume a `Suspended` actor back to `Ready`.
    pub fn actor_resume(&mut self, id: ActorId) -> KernelResult<()> {
        let actor = self.get_mut(id)?;
        if actor.state != ActorState::Suspended {
            return Err(KernelError::InvalidState);
        }
        actor.state = ActorState::Ready;
        Ok(())
    }

    /// Terminate an actor: free its stack, drain and free its mailbox,
    /// and release the slot (§3 Lifecycle). A no-op on an unknown id
    /// (§4.A Failure model).
    pub fn actor_terminate(&mut self, id: ActorId, heap: &mut dyn Heap, log: &dyn LogSink) {
        if id.is_kernel() {
            return;
        }
        let index = id.as_index() as usize;
        if let Some(Some(actor)) = self.slots.get_mut(index) {
            self.pool.free_many(actor.mailbox.len());
            heap.kfree(actor.stack.base);
            log.log(LogLevel::Info, &format!("{id} terminated"));
        }
        if index < self.slots.len() {
            self.slots[index] = None;
        }
    }

    /// `true` if `id` names a live (non-`None`) slot.
    pub fn contains(&self, id: ActorId) -> bool {
        self.slots
            .get(id.as_index() as usize)
            .is_some_and(Option::is_some)
    }

    /// Every live actor record, in slot order (used by the supervisor's
    /// sampler, §4.D step 1).
    pub fn iter(&self) -> impl Iterator<Item = &Actor> {
        self.slots.iter().flatten()
    }

    /// Enqueue `message` into `recipient`'s mailbox, allocating a pool
    /// slot for it (§4.A).
    ///
    /// Delivery to a `Blocked` actor transitions it back to `Ready`; the
    /// caller (scheduler) still owns requeuing it onto the ready queue.
    pub fn message_send(
        &mut self,
        sender: ActorId,
        recipient: ActorId,
        kind: MessageKind,
        priority: Priority,
        payload: Vec<u8>,
        reply_to: Option<ActorId>,
        requires_reply: bool,
    ) -> KernelResult<crate::ids::MessageId> {
        if payload.len() > self.max_payload {
            return Err(KernelError::InvalidState);
        }
        if !self.contains(recipient) {
            return Err(KernelError::UnknownId);
        }
        if !self.get(recipient)?.mailbox_has_capacity() {
            return Err(KernelError::MailboxFull(recipient));
        }

        let id = self.pool.alloc()?;

        let message = Message {
            id,
            sender,
            recipient,
            kind,
            priority,
            flags: MessageFlags::NONE,
            payload,
            timestamp: Utc::now(),
            deadline: None,
            reply_to,
            requires_reply,
        };

        let actor = self.get_mut(recipient)?;
        actor.mailbox.push_back(message);
        if actor.state == ActorState::Blocked {
            actor.state = ActorState::Ready;
        }
        if let Some(sender_actor) = self.slots[sender.as_index() as usize].as_mut() {
            sender_actor.messages_sent += 1;
        }

        Ok(id)
    }

    /// Broadcast `payload` to every id in `recipients`, each receiving an
    /// independent copy (§4.A "Broadcast").
    ///
    /// Returns the ids that actually received a copy; unknown or full
    /// recipients are skipped rather than failing the whole broadcast.
    pub fn message_broadcast(
        &mut self,
        sender: ActorId,
        recipients: &[ActorId],
        priority: Priority,
        payload: &[u8],
    ) -> Vec<ActorId> {
        let mut delivered = Vec::new();
        for &recipient in recipients {
            let result = self.message_send(
                sender,
                recipient,
                MessageKind::Broadcast,
                priority,
                payload.to_vec(),
                None,
                false,
            );
            if result.is_ok() {
                delivered.push(recipient);
            }
        }
        delivered
    }

    /// Pop the next message for the running actor, if any.
    pub fn message_receive(&mut self, actor_id: ActorId) -> KernelResult<Option<Message>> {
        let actor = self.get_mut(actor_id)?;
        let message = actor.mailbox.pop_front();
        if message.is_some() {
            actor.messages_received += 1;
            self.pool.free();
        }
        Ok(message)
    }

    /// `true` if `actor_id`'s mailbox is currently empty.
    pub fn mailbox_is_empty(&self, actor_id: ActorId) -> KernelResult<bool> {
        Ok(self.get(actor_id)?.mailbox.is_empty())
    }

    /// Total messages occupying mailboxes across the whole table
    /// (invariant: never exceeds the message-pool capacity, §8.4).
    pub fn pool_occupancy(&self) -> usize {
        self.pool.occupancy()
    }

    /// Mark `id` as blocked (used by `message_wait` when the mailbox is
    /// empty).
    pub fn actor_block(&mut self, id: ActorId) -> KernelResult<()> {
        let actor = self.get_mut(id)?;
        if actor.state != ActorState::Running {
            return Err(KernelError::InvalidState);
        }
        actor.state = ActorState::Blocked;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{CapturingLogSink, InMemoryHeap};

    fn table() -> ActorTable {
        ActorTable::new(4, 2, 8, 1024, 4096, 16)
    }

    #[test]
    fn kernel_actor_seeded_at_index_zero() {
        let table = table();
        let kernel = table.get(ActorId::KERNEL).expect("kernel actor exists");
        assert_eq!(kernel.state, ActorState::Running);
        assert_eq!(kernel.mailbox_capacity, 8);
    }

    #[test]
    fn create_fails_when_table_full() {
        let mut table = table();
        let mut heap = InMemoryHeap::new(1 << 20);
        // capacity 4, slot 0 is the kernel actor, so 3 creations succeed.
        for _ in 0..3 {
            table
                .actor_create(ActorId::KERNEL, Priority::Normal, None, None, &mut heap)
                .expect("room for actor");
        }
        let result = table.actor_create(ActorId::KERNEL, Priority::Normal, None, None, &mut heap);
        assert_eq!(result, Err(KernelError::NoFreeSlot));
    }

    #[test]
    fn create_fails_on_heap_exhaustion_and_releases_slot() {
        let mut table = table();
        let mut heap = InMemoryHeap::new(512);
        let result =
            table.actor_create(ActorId::KERNEL, Priority::Normal, Some(1024), None, &mut heap);
        assert_eq!(result, Err(KernelError::OutOfMemory));
        // Slot was released: a subsequent create with a smaller stack succeeds.
        let ok = table.actor_create(ActorId::KERNEL, Priority::Normal, Some(64), None, &mut heap);
        assert!(ok.is_ok());
    }

    #[test]
    fn start_requires_created_state() {
        let mut table = table();
        let mut heap = InMemoryHeap::new(1 << 20);
        let id = table
            .actor_create(ActorId::KERNEL, Priority::Normal, None, None, &mut heap)
            .expect("created");
        table.actor_start(id).expect("valid transition");
        assert_eq!(table.actor_start(id), Err(KernelError::InvalidState));
    }

    #[test]
    fn mailbox_full_returns_error_and_keeps_pool_accounting_exact() {
        let mut table = table();
        let mut heap = InMemoryHeap::new(1 << 20);
        let b = table
            .actor_create(ActorId::KERNEL, Priority::Normal, None, Some(2), &mut heap)
            .expect("created");

        table
            .message_send(
                ActorId::KERNEL,
                b,
                MessageKind::Async,
                Priority::Normal,
                b"m1".to_vec(),
                None,
                false,
            )
            .expect("first send fits");
        table
            .message_send(
                ActorId::KERNEL,
                b,
                MessageKind::Async,
                Priority::Normal,
                b"m2".to_vec(),
                None,
                false,
            )
            .expect("second send fits");
        let third = table.message_send(
            ActorId::KERNEL,
            b,
            MessageKind::Async,
            Priority::Normal,
            b"m3".to_vec(),
            None,
            false,
        );
        assert_eq!(third, Err(KernelError::MailboxFull(b)));
        assert_eq!(table.pool_occupancy(), 2);
    }

    #[test]
    fn fifo_within_sender_recipient_pair() {
        let mut table = table();
        let mut heap = InMemoryHeap::new(1 << 20);
        let a = table
            .actor_create(ActorId::KERNEL, Priority::Normal, None, None, &mut heap)
            .expect("created a");
        let b = table
            .actor_create(ActorId::KERNEL, Priority::Normal, None, None, &mut heap)
            .expect("created b");

        for payload in [b"x".to_vec(), b"y".to_vec(), b"z".to_vec()] {
            table
                .message_send(a, b, MessageKind::Async, Priority::Normal, payload, None, false)
                .expect("mailbox has room");
        }

        let first = table.message_receive(b).expect("recv ok").expect("present");
        let second = table.message_receive(b).expect("recv ok").expect("present");
        let third = table.message_receive(b).expect("recv ok").expect("present");
        assert_eq!(first.payload, b"x");
        assert_eq!(second.payload, b"y");
        assert_eq!(third.payload, b"z");
    }

    #[test]
    fn delivery_wakes_a_blocked_actor() {
        let mut table = table();
        let mut heap = InMemoryHeap::new(1 << 20);
        let b = table
            .actor_create(ActorId::KERNEL, Priority::Normal, None, None, &mut heap)
            .expect("created");
        table.actor_start(b).expect("start");
        table.get_mut(b).expect("exists").state = ActorState::Running;
        table.actor_block(b).expect("block while running");
        assert_eq!(table.get(b).expect("exists").state, ActorState::Blocked);

        table
            .message_send(
                ActorId::KERNEL,
                b,
                MessageKind::Async,
                Priority::Normal,
                b"ping".to_vec(),
                None,
                false,
            )
            .expect("delivered");
        assert_eq!(table.get(b).expect("exists").state, ActorState::Ready);
    }

    #[test]
    fn terminate_is_a_no_op_for_unknown_id() {
        let mut table = table();
        let mut heap = InMemoryHeap::new(1 << 20);
        let log = CapturingLogSink::new();
        table.actor_terminate(ActorId::from_index(99), &mut heap, &log);
        assert!(log.lines().is_empty());
    }

    #[test]
    fn terminate_frees_stack_and_releases_slot() {
        let mut table = table();
        let mut heap = InMemoryHeap::new(1 << 20);
        let log = CapturingLogSink::new();
        let id = table
            .actor_create(ActorId::KERNEL, Priority::Normal, None, None, &mut heap)
            .expect("created");
        table.actor_terminate(id, &mut heap, &log);
        assert!(!table.contains(id));
        // The slot is reusable.
        let reused = table.actor_create(ActorId::KERNEL, Priority::Normal, None, None, &mut heap);
        assert!(reused.is_ok());
    }
}
