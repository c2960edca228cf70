//! Per-module sandbox table: capability checks, resource quotas, the
//! violation log, and auto-quarantine (§4.D, §8 scenario 6).

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use chrono::Utc;

// Layer 3: Internal module imports
use crate::collaborators::{LogLevel, LogSink};
use crate::error::{KernelError, KernelResult};
use crate::ids::SandboxId;
use crate::ring_buffer::RingBuffer;
use crate::sandbox::capability::Capability;
use crate::sandbox::types::{ResourceType, SandboxContext, SecurityLevel, Violation, ViolationKind};

/// Owns one [`SandboxContext`] per loaded module and the system-wide
/// violation log.
#[derive(Debug)]
pub struct SandboxManager {
    slots: Vec<Option<SandboxContext>>,
    violations: RingBuffer<Violation>,
    next_violation_id: u64,
    system_violation_count: u64,
    quarantine_violation_threshold: u32,
}

impl SandboxManager {
    /// Build a manager with `capacity` sandbox slots (mirroring the
    /// module table's capacity) and a violation log of `ring_capacity`.
    pub fn new(capacity: usize, ring_capacity: usize, quarantine_violation_threshold: u32) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            violations: RingBuffer::new(ring_capacity),
            next_violation_id: 1,
            system_violation_count: 0,
            quarantine_violation_threshold,
        }
    }

    fn slot_index(&self, id: SandboxId) -> KernelResult<usize> {
        let index = id.as_index() as usize;
        if index >= self.slots.len() {
            return Err(KernelError::UnknownId);
        }
        Ok(index)
    }

    /// A live sandbox context, or `UnknownId`.
    pub fn get(&self, id: SandboxId) -> KernelResult<&SandboxContext> {
        let index = self.slot_index(id)?;
        self.slots[index].as_ref().ok_or(KernelError::UnknownId)
    }

    fn get_mut(&mut self, id: SandboxId) -> KernelResult<&mut SandboxContext> {
        let index = self.slot_index(id)?;
        self.slots[index].as_mut().ok_or(KernelError::UnknownId)
    }

    /// `true` if a sandbox context exists at `id`.
    pub fn contains(&self, id: SandboxId) -> bool {
        self.get(id).is_ok()
    }

    /// Create a sandbox context for a newly loaded module (§4.C, §4.D).
    pub fn create(&mut self, id: SandboxId, level: SecurityLevel, strict: bool) -> KernelResult<()> {
        let index = self.slot_index(id)?;
        self.slots[index] = Some(SandboxContext::new(level, strict));
        Ok(())
    }

    /// Drop a module's sandbox context on unload.
    pub fn destroy(&mut self, id: SandboxId) -> KernelResult<()> {
        let index = self.slot_index(id)?;
        self.slots[index] = None;
        Ok(())
    }

    /// Grant `capability`, clearing it from the denied mask so the
    /// invariant `granted ∩ denied = ∅` (§8) always holds.
    pub fn grant(&mut self, id: SandboxId, capability: Capability) -> KernelResult<()> {
        let ctx = self.get_mut(id)?;
        ctx.granted |= capability;
        ctx.denied -= capability;
        Ok(())
    }

    /// Explicitly deny `capability`, clearing it from the granted mask.
    pub fn revoke(&mut self, id: SandboxId, capability: Capability) -> KernelResult<()> {
        let ctx = self.get_mut(id)?;
        ctx.denied |= capability;
        ctx.granted -= capability;
        Ok(())
    }

    fn record_violation(
        &mut self,
        id: SandboxId,
        kind: ViolationKind,
        description: String,
        log: &dyn LogSink,
    ) {
        let violation_id = self.next_violation_id;
        self.next_violation_id += 1;
        self.system_violation_count += 1;

        log.log(
            LogLevel::Warn,
            &format!("sandbox violation #{violation_id} ({id}): {description}"),
        );

        self.violations.push(Violation {
            id: violation_id,
            timestamp: Utc::now(),
            module: crate::ids::ModuleId::from_index(id.as_index()),
            kind,
            description,
        });

        if let Ok(ctx) = self.get_mut(id) {
            ctx.violation_count += 1;
            if ctx.strict && ctx.violation_count > self.quarantine_violation_threshold {
                Self::quarantine_locked(ctx, log, id);
            }
        }
    }

    fn quarantine_locked(ctx: &mut SandboxContext, log: &dyn LogSink, id: SandboxId) {
        ctx.security_level = SecurityLevel::Quarantine;
        ctx.granted = Capability::empty();
        ctx.denied = Capability::empty();
        ctx.resource_limits = SecurityLevel::post_quarantine_override();
        log.log(
            LogLevel::Error,
            &format!("{id} auto-quarantined after {} violations", ctx.violation_count),
        );
    }

    /// Force a module straight into quarantine regardless of its
    /// violation count (used by the supervisor on a severe anomaly).
    pub fn force_quarantine(&mut self, id: SandboxId, log: &dyn LogSink) -> KernelResult<()> {
        let ctx = self.get_mut(id)?;
        Self::quarantine_locked(ctx, log, id);
        Ok(())
    }

    /// Check `capability` against the effective mask; record and return
    /// `CapabilityDenied` on failure (§4.D).
    pub fn require_capability(
        &mut self,
        id: SandboxId,
        capability: Capability,
        log: &dyn LogSink,
    ) -> KernelResult<()> {
        let allowed = self.get(id)?.effective_capabilities().contains(capability);
        if allowed {
            return Ok(());
        }
        self.record_violation(
            id,
            ViolationKind::Capability,
            format!("capability {capability:?} not granted"),
            log,
        );
        Err(KernelError::CapabilityDenied)
    }

    /// Check and reserve `requested` units of `resource_type`; record
    /// and return `ResourceExceeded` if the reservation would exceed the
    /// enforced limit (§4.D "guarded function call").
    pub fn check_resource(
        &mut self,
        id: SandboxId,
        resource_type: ResourceType,
        requested: u64,
        log: &dyn LogSink,
    ) -> KernelResult<()> {
        let ctx = self.get_mut(id)?;
        let Some(limit) = ctx.resource_limits.iter_mut().find(|l| l.resource_type == resource_type) else {
            return Ok(());
        };
        if limit.would_exceed(requested) {
            drop(limit);
            self.record_violation(
                id,
                ViolationKind::Resource,
                format!("{resource_type:?} limit exceeded (requested {requested})"),
                log,
            );
            return Err(KernelError::ResourceExceeded);
        }
        limit.apply_delta(requested as i64);
        Ok(())
    }

    /// Release `amount` units of `resource_type` previously reserved by
    /// [`Self::check_resource`] (e.g. a child actor terminated).
    pub fn release_resource(&mut self, id: SandboxId, resource_type: ResourceType, amount: u64) -> KernelResult<()> {
        let ctx = self.get_mut(id)?;
        if let Some(limit) = ctx.resource_limits.iter_mut().find(|l| l.resource_type == resource_type) {
            limit.apply_delta(-(amount as i64));
        }
        Ok(())
    }

    /// Reject a memory access outside the module's region (§4.D).
    pub fn check_memory_access(
        &mut self,
        id: SandboxId,
        in_bounds: bool,
        description: &str,
        log: &dyn LogSink,
    ) -> KernelResult<()> {
        if in_bounds {
            return Ok(());
        }
        self.record_violation(id, ViolationKind::Memory, description.to_string(), log);
        Err(KernelError::MemoryAccessDenied)
    }

    /// Reject a deny-listed function call (§4.D).
    pub fn check_execution(
        &mut self,
        id: SandboxId,
        denied: bool,
        description: &str,
        log: &dyn LogSink,
    ) -> KernelResult<()> {
        if !denied {
            return Ok(());
        }
        self.record_violation(id, ViolationKind::Execution, description.to_string(), log);
        Err(KernelError::ExecutionDenied)
    }

    /// Every violation recorded so far, oldest first, up to the ring
    /// buffer's capacity.
    pub fn violations(&self) -> Vec<&Violation> {
        self.violations.iter().collect()
    }

    /// Total violations recorded system-wide (not capped by the ring
    /// buffer's retention).
    pub fn system_violation_count(&self) -> u64 {
        self.system_violation_count
    }
}
