//! Cooperative scheduler (§4.B).
//!
//! A single logical CPU, one `current` actor at a time, priority-aware
//! round-robin dispatch, and tick-driven time-slice accounting. There is
//! no real preemption: [`Scheduler::timer_tick`] only updates bookkeeping
//! and signals that the current actor's slice has expired — the actor
//! itself (or the kernel on its behalf, cooperatively) must still yield
//! for another to run (§1 Non-goals: "preemption across a true context
//! switch").

mod ready_queue;

use ready_queue::ReadyQueue;

// Layer 3: Internal module imports
use crate::actor::{ActorState, ActorTable, Priority};
use crate::collaborators::InterruptDispatcher;
use crate::error::{KernelError, KernelResult};
use crate::ids::ActorId;

/// The cooperative, single-CPU scheduler.
#[derive(Debug)]
pub struct Scheduler {
    ready: ReadyQueue,
    current: Option<ActorId>,
    time_slice_ticks: u32,
    ticks: u64,
}

impl Scheduler {
    /// Build a scheduler with the configured default time slice (§6).
    pub fn new(time_slice_ticks: u32) -> Self {
        Self {
            ready: ReadyQueue::new(),
            current: None,
            time_slice_ticks,
            ticks: 0,
        }
    }

    /// The actor currently dispatched, if any.
    pub fn current(&self) -> Option<ActorId> {
        self.current
    }

    /// Total ticks observed since construction.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Enqueue a `Ready` actor onto its priority level (§4.B). The
    /// caller is responsible for having already set the actor's state to
    /// `Ready` in the table.
    pub fn enqueue(&mut self, id: ActorId, priority: Priority) {
        self.ready.push(id, priority);
    }

    /// Dequeue the highest-priority ready actor and make it `current`
    /// (§4.B). Returns `None` if the ready queue is empty; the caller
    /// dispatches the idle actor in that case.
    pub fn schedule(&mut self, table: &mut ActorTable) -> KernelResult<Option<ActorId>> {
        let Some(id) = self.ready.pop() else {
            return Ok(None);
        };

        {
            let actor = table.get(id)?;
            if actor.state != ActorState::Ready {
                // Stale entry (e.g. the actor was suspended without a
                // matching `ready.remove`); skip it by recursing once.
                return self.schedule(table);
            }
        }

        self.set_running(id, table)?;
        Ok(Some(id))
    }

    fn set_running(&mut self, id: ActorId, table: &mut ActorTable) -> KernelResult<()> {
        self.current = Some(id);
        self.ticks_remaining_reset(id, table)
    }

    fn ticks_remaining_reset(&mut self, id: ActorId, table: &mut ActorTable) -> KernelResult<()> {
        let time_slice_ticks = self.time_slice_ticks;
        table.with_actor_mut(id, |actor| {
            actor.state = ActorState::Running;
            actor.slice_remaining = time_slice_ticks;
            actor.last_scheduled_at = Some(chrono::Utc::now());
        })
    }

    /// Voluntary yield: move `current` back to `Ready` at the tail of its
    /// priority level and clear `current` (§4.B).
    ///
    /// No-op (returns `Ok(())`) if there is no current actor, matching
    /// the "idle CPU yields to itself" boundary condition.
    pub fn yield_now(&mut self, table: &mut ActorTable) -> KernelResult<()> {
        let Some(id) = self.current.take() else {
            return Ok(());
        };
        let priority = table.get(id)?.priority;
        table.with_actor_mut(id, |actor| {
            if actor.state == ActorState::Running {
                actor.state = ActorState::Ready;
            }
        })?;
        if table.get(id)?.state == ActorState::Ready {
            self.ready.push(id, priority);
        }
        Ok(())
    }

    /// Block `current` on an empty mailbox (§4.A `message_wait`,
    /// §4.B) — removed from the ready queue until a delivery wakes it.
    pub fn block_current(&mut self, table: &mut ActorTable) -> KernelResult<Option<ActorId>> {
        let Some(id) = self.current.take() else {
            return Ok(None);
        };
        table.actor_block(id)?;
        Ok(Some(id))
    }

    /// Advance the tick counter and decrement the current actor's time
    /// slice. Returns `true` if the slice just expired (§4.B, §6 default
    /// 10 ticks), in which case the caller should yield on the actor's
    /// behalf.
    pub fn timer_tick(&mut self, table: &mut ActorTable) -> KernelResult<bool> {
        self.ticks += 1;
        let Some(id) = self.current else {
            return Ok(false);
        };
        let mut expired = false;
        table.with_actor_mut(id, |actor| {
            actor.cpu_ticks += 1;
            if actor.slice_remaining > 0 {
                actor.slice_remaining -= 1;
            }
            expired = actor.slice_remaining == 0;
        })?;
        Ok(expired)
    }

    /// Wake the actor registered for `irq`, if any, moving it from
    /// `Blocked`/`Suspended` to `Ready` and enqueuing it (§4.B, §6
    /// `InterruptDispatcher`).
    pub fn handle_interrupt(
        &mut self,
        irq: u32,
        dispatcher: &dyn InterruptDispatcher,
        table: &mut ActorTable,
    ) -> KernelResult<Option<ActorId>> {
        let Some(id) = dispatcher.registered_actor(irq) else {
            return Ok(None);
        };
        if !table.contains(id) {
            return Err(KernelError::UnknownId);
        }
        let priority = table.get(id)?.priority;
        let became_ready = table.with_actor_mut(id, |actor| {
            if matches!(actor.state, ActorState::Blocked | ActorState::Suspended) {
                actor.state = ActorState::Ready;
                true
            } else {
                false
            }
        })?;
        if became_ready {
            self.ready.push(id, priority);
        }
        Ok(Some(id))
    }

    /// Drop `id` from the ready queue without touching its table state,
    /// used when an actor is terminated while still queued.
    pub fn forget(&mut self, id: ActorId) {
        self.ready.remove(id);
        if self.current == Some(id) {
            self.current = None;
        }
    }

    /// Number of actors currently queued (not counting `current`).
    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }
}
