//! Composition root bundling every subsystem behind one owned value
//! (§9 "Global kernel state": "owned by one composition root passed by
//! explicit reference into every public operation").

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use crate::actor::{ActorState, ActorTable, Priority};
use crate::collaborators::{Heap, InMemoryHeap, InterruptDispatcher, LogSink, ModuleRuntime, NoopInterruptDispatcher, StubModuleRuntime, TracingLogSink};
use crate::config::KernelConfig;
use crate::error::{KernelError, KernelResult};
use crate::ids::{ActorId, MessageId};
use crate::message::{Message, MessageKind};
use crate::module::ModuleManager;
use crate::sandbox::SandboxManager;
use crate::scheduler::Scheduler;
use crate::supervisor::Supervisor;

/// Every subsystem the kernel owns, plus the collaborators hardware glue
/// would otherwise provide (§6 "Collaborator contracts").
pub struct Kernel {
    config: KernelConfig,
    actors: ActorTable,
    scheduler: Scheduler,
    modules: ModuleManager,
    sandboxes: SandboxManager,
    supervisor: Supervisor,
    heap: Box<dyn Heap>,
    log: Box<dyn LogSink>,
    interrupts: Box<dyn InterruptDispatcher>,
    runtime: Box<dyn ModuleRuntime>,
}

/// Builds a [`Kernel`] from a [`KernelConfig`] plus optional collaborator
/// overrides, defaulting every collaborator to its in-memory stub
/// (SPEC_FULL §C.1).
pub struct KernelBuilder {
    config: KernelConfig,
    heap: Option<Box<dyn Heap>>,
    log: Option<Box<dyn LogSink>>,
    interrupts: Option<Box<dyn InterruptDispatcher>>,
    runtime: Option<Box<dyn ModuleRuntime>>,
}

impl Default for KernelBuilder {
    fn default() -> Self {
        Self {
            config: KernelConfig::default(),
            heap: None,
            log: None,
            interrupts: None,
            runtime: None,
        }
    }
}

impl KernelBuilder {
    /// Start building with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the kernel-wide configuration.
    pub fn with_config(mut self, config: KernelConfig) -> Self {
        self.config = config;
        self
    }

    /// Supply a heap collaborator other than [`InMemoryHeap`].
    pub fn with_heap(mut self, heap: Box<dyn Heap>) -> Self {
        self.heap = Some(heap);
        self
    }

    /// Supply a log sink other than [`TracingLogSink`].
    pub fn with_log_sink(mut self, log: Box<dyn LogSink>) -> Self {
        self.log = Some(log);
        self
    }

    /// Supply an interrupt dispatcher other than [`NoopInterruptDispatcher`].
    pub fn with_interrupt_dispatcher(mut self, interrupts: Box<dyn InterruptDispatcher>) -> Self {
        self.interrupts = Some(interrupts);
        self
    }

    /// Supply a module runtime other than [`StubModuleRuntime`].
    pub fn with_module_runtime(mut self, runtime: Box<dyn ModuleRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Validate the configuration and assemble the kernel, seeding the
    /// reserved kernel actor at id 0 with mailbox capacity 256
    /// (SPEC_FULL §C.1).
    pub fn build(self) -> KernelResult<Kernel> {
        self.config.validate().map_err(|_| KernelError::InvalidState)?;

        let actors = ActorTable::new(
            self.config.max_actors,
            self.config.default_mailbox_capacity,
            self.config.kernel_mailbox_capacity,
            self.config.default_stack_size,
            self.config.max_payload,
            self.config.max_messages,
        );
        let scheduler = Scheduler::new(self.config.time_slice_ticks);
        let modules = ModuleManager::new(self.config.max_actors);
        let sandboxes = SandboxManager::new(
            self.config.max_actors,
            self.config.ring_buffer_capacity,
            self.config.quarantine_violation_threshold,
        );
        let supervisor = Supervisor::new(&self.config);

        Ok(Kernel {
            config: self.config,
            actors,
            scheduler,
            modules,
            sandboxes,
            supervisor,
            heap: self.heap.unwrap_or_else(|| Box::new(InMemoryHeap::new(16 * 1024 * 1024))),
            log: self.log.unwrap_or_else(|| Box::new(TracingLogSink)),
            interrupts: self.interrupts.unwrap_or_else(|| Box::new(NoopInterruptDispatcher)),
            runtime: self.runtime.unwrap_or_else(|| Box::new(StubModuleRuntime::new())),
        })
    }
}

impl Kernel {
    /// Start building a kernel with defaulted collaborators.
    pub fn builder() -> KernelBuilder {
        KernelBuilder::new()
    }

    /// The configuration this kernel was built from.
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Read access to the actor table.
    pub fn actors(&self) -> &ActorTable {
        &self.actors
    }

    /// Read access to the scheduler.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Read access to the module manager.
    pub fn modules(&self) -> &ModuleManager {
        &self.modules
    }

    /// Read access to the sandbox manager.
    pub fn sandboxes(&self) -> &SandboxManager {
        &self.sandboxes
    }

    /// Mutable access to the sandbox manager, for callers that need
    /// something beyond the delegating wrappers below.
    pub fn sandboxes_mut(&mut self) -> &mut SandboxManager {
        &mut self.sandboxes
    }

    /// Grant a capability to a module's sandbox (§4.D).
    pub fn grant_capability(&mut self, id: crate::ids::SandboxId, capability: crate::sandbox::Capability) -> KernelResult<()> {
        self.sandboxes.grant(id, capability)
    }

    /// Explicitly deny a capability on a module's sandbox (§4.D).
    pub fn revoke_capability(&mut self, id: crate::ids::SandboxId, capability: crate::sandbox::Capability) -> KernelResult<()> {
        self.sandboxes.revoke(id, capability)
    }

    /// Check a capability against a module's effective mask, recording a
    /// violation on denial (§4.D `has_capability`).
    pub fn require_capability(&mut self, id: crate::ids::SandboxId, capability: crate::sandbox::Capability) -> KernelResult<()> {
        self.sandboxes.require_capability(id, capability, self.log.as_ref())
    }

    /// Check and reserve resource usage against a module's limit table,
    /// recording a violation on denial (§4.D `check_resource`).
    pub fn check_resource(
        &mut self,
        id: crate::ids::SandboxId,
        resource_type: crate::sandbox::ResourceType,
        requested: u64,
    ) -> KernelResult<()> {
        self.sandboxes.check_resource(id, resource_type, requested, self.log.as_ref())
    }

    /// Release previously reserved resource usage (§4.D `update_resource`).
    pub fn release_resource(
        &mut self,
        id: crate::ids::SandboxId,
        resource_type: crate::sandbox::ResourceType,
        amount: u64,
    ) -> KernelResult<()> {
        self.sandboxes.release_resource(id, resource_type, amount)
    }

    /// Reject a memory access outside a module's region (§4.D).
    pub fn check_memory_access(&mut self, id: crate::ids::SandboxId, in_bounds: bool, description: &str) -> KernelResult<()> {
        self.sandboxes.check_memory_access(id, in_bounds, description, self.log.as_ref())
    }

    /// Reject a deny-listed function call (§4.D).
    pub fn check_execution(&mut self, id: crate::ids::SandboxId, denied: bool, description: &str) -> KernelResult<()> {
        self.sandboxes.check_execution(id, denied, description, self.log.as_ref())
    }

    /// Force a module's sandbox straight into quarantine (§4.D).
    pub fn force_quarantine(&mut self, id: crate::ids::SandboxId) -> KernelResult<()> {
        self.sandboxes.force_quarantine(id, self.log.as_ref())
    }

    /// Read access to the behavioral supervisor.
    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Create and start a new actor in one step: `actor_create` followed
    /// by `actor_start` and enqueuing it onto the scheduler's ready queue.
    pub fn spawn_actor(
        &mut self,
        parent: ActorId,
        priority: Priority,
        stack_size: Option<usize>,
        mailbox_capacity: Option<usize>,
    ) -> KernelResult<ActorId> {
        let id = self
            .actors
            .actor_create(parent, priority, stack_size, mailbox_capacity, self.heap.as_mut())?;
        self.actors.actor_start(id)?;
        self.scheduler.enqueue(id, priority);
        Ok(id)
    }

    /// Terminate an actor and forget it from the scheduler.
    pub fn terminate_actor(&mut self, id: ActorId) {
        self.scheduler.forget(id);
        self.actors.actor_terminate(id, self.heap.as_mut(), self.log.as_ref());
    }

    /// Load a module image and create its matching sandbox context in
    /// one step (§4.C, §4.D: "the caller is responsible for creating the
    /// matching sandbox entry").
    pub fn load_module(
        &mut self,
        image: &[u8],
        level: crate::sandbox::SecurityLevel,
        strict: bool,
    ) -> KernelResult<crate::ids::ModuleId> {
        let id = self
            .modules
            .module_load(image, self.heap.as_mut(), self.runtime.as_mut(), self.log.as_ref())?;
        let module = self.modules.get(id)?;
        self.sandboxes.create(module.sandbox_id, level, strict)?;
        Ok(id)
    }

    /// Unload a module and drop its sandbox context.
    pub fn unload_module(&mut self, id: crate::ids::ModuleId) -> KernelResult<()> {
        let sandbox_id = self.modules.get(id)?.sandbox_id;
        self.modules.module_unload(id, self.heap.as_mut(), self.runtime.as_mut())?;
        self.sandboxes.destroy(sandbox_id)?;
        Ok(())
    }

    /// Replace a loaded module's image in place (§4.C "Hot-swap"). The
    /// sandbox context is untouched: the module id, and so its sandbox,
    /// does not change across a swap.
    pub fn hot_swap_module(&mut self, id: crate::ids::ModuleId, new_image: &[u8]) -> KernelResult<()> {
        self.modules
            .module_hot_swap(id, new_image, self.heap.as_mut(), self.runtime.as_mut(), self.log.as_ref())
    }

    /// Dequeue the highest-priority ready actor and make it `current`
    /// (§4.B). Returns `None` with the logical CPU left idle if nothing
    /// is ready.
    pub fn dispatch(&mut self) -> KernelResult<Option<ActorId>> {
        self.scheduler.schedule(&mut self.actors)
    }

    /// The actor the scheduler currently has dispatched, if any.
    pub fn current_actor(&self) -> Option<ActorId> {
        self.scheduler.current()
    }

    /// Voluntarily yield `current` back to `Ready` at the tail of its
    /// priority level (§4.B).
    pub fn yield_current(&mut self) -> KernelResult<()> {
        self.scheduler.yield_now(&mut self.actors)
    }

    /// Suspend an actor and forget it from the ready queue, mirroring
    /// the behavioral supervisor's own suspend intervention (§4.D).
    pub fn suspend_actor(&mut self, id: ActorId) -> KernelResult<()> {
        self.actors.actor_suspend(id)?;
        self.scheduler.forget(id);
        Ok(())
    }

    /// Resume a suspended actor back to `Ready` and re-enqueue it.
    pub fn resume_actor(&mut self, id: ActorId) -> KernelResult<()> {
        self.actors.actor_resume(id)?;
        let priority = self.actors.get(id)?.priority;
        self.scheduler.enqueue(id, priority);
        Ok(())
    }

    /// Deliver `payload` from `sender` to `recipient` (§4.A). A delivery
    /// that wakes a `Blocked` recipient re-enqueues it onto the
    /// scheduler, mirroring the wake-on-interrupt path in
    /// [`crate::scheduler::Scheduler::handle_interrupt`].
    #[allow(clippy::too_many_arguments)]
    pub fn send_message(
        &mut self,
        sender: ActorId,
        recipient: ActorId,
        kind: MessageKind,
        priority: Priority,
        payload: Vec<u8>,
        reply_to: Option<ActorId>,
        requires_reply: bool,
    ) -> KernelResult<MessageId> {
        let was_blocked = self
            .actors
            .get(recipient)
            .map(|actor| actor.state == ActorState::Blocked)
            .unwrap_or(false);
        let id = self
            .actors
            .message_send(sender, recipient, kind, priority, payload, reply_to, requires_reply)?;
        if was_blocked {
            let recipient_priority = self.actors.get(recipient)?.priority;
            self.scheduler.enqueue(recipient, recipient_priority);
        }
        Ok(id)
    }

    /// Broadcast `payload` to every id in `recipients`, each receiving
    /// an independent copy (§4.A "Broadcast"). Unknown or full
    /// recipients are skipped; returns the ids that actually received a
    /// copy.
    pub fn broadcast_message(
        &mut self,
        sender: ActorId,
        recipients: &[ActorId],
        priority: Priority,
        payload: &[u8],
    ) -> Vec<ActorId> {
        recipients
            .iter()
            .copied()
            .filter(|&recipient| {
                self.send_message(
                    sender,
                    recipient,
                    MessageKind::Broadcast,
                    priority,
                    payload.to_vec(),
                    None,
                    false,
                )
                .is_ok()
            })
            .collect()
    }

    /// Pop the next message for `actor_id`, if any.
    pub fn receive_message(&mut self, actor_id: ActorId) -> KernelResult<Option<Message>> {
        self.actors.message_receive(actor_id)
    }

    /// Block `current` on its empty mailbox (§4.A `message_wait`). A
    /// no-op returning `Ok(None)` if nothing is currently dispatched.
    pub fn block_current_for_message(&mut self) -> KernelResult<Option<ActorId>> {
        self.scheduler.block_current(&mut self.actors)
    }

    /// Deliver one hardware tick: advance the scheduler's time-slice
    /// accounting, force a cooperative yield on slice expiry, and drive
    /// the supervisor's tick-counted sampler (§4.B, §4.D, §9 "Control
    /// flow").
    pub fn tick(&mut self) -> KernelResult<()> {
        if self.scheduler.timer_tick(&mut self.actors)? {
            self.scheduler.yield_now(&mut self.actors)?;
        }

        if self.supervisor.observe_tick() {
            self.supervisor
                .sample(&self.actors, &self.modules, self.heap.as_ref(), self.log.as_ref());
            self.supervisor.process_anomalies(
                &mut self.actors,
                &mut self.scheduler,
                &mut self.modules,
                &mut self.sandboxes,
                self.heap.as_mut(),
                self.runtime.as_mut(),
                self.log.as_ref(),
            );
        }
        Ok(())
    }

    /// Deliver a hardware interrupt through the configured dispatcher.
    /// Returns the actor woken, if any.
    pub fn handle_interrupt(&mut self, interrupt_number: u32) -> KernelResult<Option<ActorId>> {
        self.scheduler
            .handle_interrupt(interrupt_number, self.interrupts.as_ref(), &mut self.actors)
    }
}
