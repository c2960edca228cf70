//! Tick-driven sampler, anomaly predicates, and intervention execution
//! (§4.D Supervisor).

// Layer 1: Standard library imports
use std::collections::HashMap;

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};

// Layer 3: Internal module imports
use crate::actor::{ActorState, ActorTable};
use crate::collaborators::{Heap, LogLevel, LogSink, ModuleRuntime};
use crate::config::KernelConfig;
use crate::ids::EntityRef;
use crate::module::{ModuleManager, ModuleState};
use crate::ring_buffer::RingBuffer;
use crate::sandbox::SandboxManager;
use crate::scheduler::Scheduler;
use crate::supervisor::types::{
    recommended_actions, AnomalyKind, AnomalyRecord, BehaviorPattern, InterventionAction, Sample,
};

const MIB: u64 = 1024 * 1024;
const RESOURCE_ABUSE_MEMORY_THRESHOLD: u64 = 50 * MIB;

/// A point-in-time view of the supervisor's state (§9 "composition
/// root" / SPEC_FULL §C.2, mirroring the teacher's monitoring snapshot).
#[derive(Debug, Clone)]
pub struct SupervisorSnapshot {
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
    /// Patterns currently tracked.
    pub tracked_entities: usize,
    /// Anomalies with no intervention attempted yet.
    pub new_count: usize,
    /// Anomalies with at least one intervention taken, not yet resolved.
    pub handled_count: usize,
    /// Anomalies a later pass found no longer firing.
    pub resolved_count: usize,
    /// The most recent anomalies, oldest first.
    pub recent_anomalies: Vec<AnomalyRecord>,
}

/// Owns the behavior-pattern table, the anomaly log, and the
/// tick-driven sampler (§3 GLOSSARY "Supervisor").
#[derive(Debug)]
pub struct Supervisor {
    window_length: usize,
    anomaly_threshold: u8,
    intervention_threshold: u8,
    analysis_interval_ticks: u32,
    patterns: HashMap<EntityRef, BehaviorPattern>,
    anomalies: RingBuffer<AnomalyRecord>,
    open: HashMap<(EntityRef, AnomalyKind), u64>,
    next_anomaly_id: u64,
    tick_counter: u64,
}

impl Supervisor {
    /// Build a supervisor from the kernel-wide configuration (§6
    /// "Supervisor parameters").
    pub fn new(config: &KernelConfig) -> Self {
        Self {
            window_length: config.window_length,
            anomaly_threshold: config.anomaly_threshold,
            intervention_threshold: config.intervention_threshold,
            analysis_interval_ticks: config.analysis_interval_ticks,
            patterns: HashMap::new(),
            anomalies: RingBuffer::new(config.ring_buffer_capacity),
            open: HashMap::new(),
            next_anomaly_id: 1,
            tick_counter: 0,
        }
    }

    /// Advance the tick counter by one; returns `true` when the analysis
    /// interval has elapsed and [`Self::sample`] should be run.
    pub fn observe_tick(&mut self) -> bool {
        self.tick_counter += 1;
        self.analysis_interval_ticks != 0 && self.tick_counter % u64::from(self.analysis_interval_ticks) == 0
    }

    /// Pattern tracked for `entity`, if any samples have been recorded.
    pub fn pattern(&self, entity: EntityRef) -> Option<&BehaviorPattern> {
        self.patterns.get(&entity)
    }

    /// Every anomaly recorded so far, oldest first, up to the ring
    /// buffer's retention.
    pub fn anomalies(&self) -> Vec<&AnomalyRecord> {
        self.anomalies.iter().collect()
    }

    /// A specific anomaly by id.
    pub fn anomaly(&self, id: u64) -> Option<&AnomalyRecord> {
        self.anomalies.iter().find(|a| a.id == id)
    }

    fn anomaly_mut(&mut self, id: u64) -> Option<&mut AnomalyRecord> {
        self.anomalies.iter_mut().find(|a| a.id == id)
    }

    /// A read-only view of the supervisor's state (SPEC_FULL §C.2).
    pub fn snapshot(&self) -> SupervisorSnapshot {
        let mut new_count = 0;
        let mut handled_count = 0;
        let mut resolved_count = 0;
        for anomaly in self.anomalies.iter() {
            if anomaly.is_resolved() {
                resolved_count += 1;
            } else if anomaly.is_handled() {
                handled_count += 1;
            } else {
                new_count += 1;
            }
        }
        SupervisorSnapshot {
            timestamp: Utc::now(),
            tracked_entities: self.patterns.len(),
            new_count,
            handled_count,
            resolved_count,
            recent_anomalies: self.anomalies.iter().cloned().collect(),
        }
    }

    fn ticks_to_percent(delta_ticks: u64, interval: u32) -> u8 {
        if interval == 0 {
            return 0;
        }
        ((delta_ticks.saturating_mul(100)) / u64::from(interval)).min(100) as u8
    }

    /// Raise an anomaly for `target`/`kind` unless one is already open
    /// (§4.D "fires at most once per entity per pass" combined with
    /// "never re-processed once `actions_taken` is non-zero": this
    /// crate extends that to "never duplicated while still open").
    fn raise(
        &mut self,
        target: EntityRef,
        kind: AnomalyKind,
        severity: u8,
        description: String,
        now: DateTime<Utc>,
    ) -> Option<u64> {
        let key = (target, kind);
        if self.open.contains_key(&key) {
            return None;
        }
        let id = self.next_anomaly_id;
        self.next_anomaly_id += 1;
        let recommended = recommended_actions(severity, self.anomaly_threshold, self.intervention_threshold);
        self.anomalies.push(AnomalyRecord {
            id,
            kind,
            severity,
            confidence: severity,
            target,
            description,
            recommended_actions: recommended,
            actions_taken: InterventionAction::empty(),
            detected_at: now,
            resolved_at: None,
        });
        self.open.insert(key, id);
        Some(id)
    }

    /// Manually report an anomaly from outside the sampler (e.g. the
    /// sandbox reporting a capability-violation pattern as a
    /// [`AnomalyKind::SecurityBreach`]).
    pub fn force_anomaly(
        &mut self,
        target: EntityRef,
        kind: AnomalyKind,
        severity: u8,
        description: impl Into<String>,
    ) -> Option<u64> {
        self.raise(target, kind, severity, description.into(), Utc::now())
    }

    /// Run one supervisor pass: update every tracked entity's behavior
    /// pattern from fresh counters, and scan for the four built-in
    /// anomaly predicates (§4.D steps 1-4). Returns the ids of any newly
    /// raised anomalies.
    pub fn sample(
        &mut self,
        actor_table: &ActorTable,
        module_manager: &ModuleManager,
        heap: &dyn Heap,
        log: &dyn LogSink,
    ) -> Vec<u64> {
        let now = Utc::now();
        let mut raised = Vec::new();

        // Step 1: every Running, monitored actor.
        for actor in actor_table
            .iter()
            .filter(|a| a.state == ActorState::Running && a.monitored)
        {
            let entity = EntityRef::Actor(actor.id);
            let pattern = self
                .patterns
                .entry(entity)
                .or_insert_with(|| BehaviorPattern::new(entity, now));
            let cpu_delta = actor.cpu_ticks.saturating_sub(pattern.last_cpu_ticks);
            let messages_delta = actor.messages_received.saturating_sub(pattern.last_activity_count);
            pattern.last_cpu_ticks = actor.cpu_ticks;
            pattern.last_activity_count = actor.messages_received;
            pattern.record(
                Sample {
                    memory: actor.memory_usage as u64,
                    cpu: Self::ticks_to_percent(cpu_delta, self.analysis_interval_ticks),
                    io_ops: 0,
                    messages: messages_delta as u32,
                },
                self.window_length,
                now,
            );
        }

        // Step 2: system-wide heap check.
        let stats = heap.stats();
        if stats.fragmentation_level > 0.8 {
            if let Some(id) = self.raise(
                EntityRef::System,
                AnomalyKind::MemoryLeak,
                60,
                format!("heap fragmentation at {:.0}%", stats.fragmentation_level * 100.0),
                now,
            ) {
                log.log(LogLevel::Warn, &format!("anomaly #{id}: heap fragmentation exceeds 80%"));
                raised.push(id);
            }
        }
        if stats.total_allocations > 0 {
            let ratio = stats.current_allocations as f64 / stats.total_allocations as f64;
            if ratio > 0.9 {
                if let Some(id) = self.raise(
                    EntityRef::System,
                    AnomalyKind::ResourceAbuse,
                    70,
                    format!("current/total allocation ratio {ratio:.2} exceeds 0.9"),
                    now,
                ) {
                    log.log(LogLevel::Warn, &format!("anomaly #{id}: allocation ratio exceeds 0.9"));
                    raised.push(id);
                }
            }
        }

        // Step 3: every loaded module.
        for module in module_manager.module_list() {
            let entity = EntityRef::Module(module.id);
            let pattern = self
                .patterns
                .entry(entity)
                .or_insert_with(|| BehaviorPattern::new(entity, now));
            let cpu_delta = module.cpu_ticks.saturating_sub(pattern.last_cpu_ticks);
            let call_delta = module.call_count.saturating_sub(pattern.last_activity_count);
            pattern.last_cpu_ticks = module.cpu_ticks;
            pattern.last_activity_count = module.call_count;
            pattern.record(
                Sample {
                    memory: module.memory_allocated as u64,
                    cpu: Self::ticks_to_percent(cpu_delta, self.analysis_interval_ticks),
                    io_ops: call_delta as u32,
                    messages: 0,
                },
                self.window_length,
                now,
            );
        }
        if module_manager.load_error_count() > 5 {
            if let Some(id) = self.raise(
                EntityRef::System,
                AnomalyKind::Corruption,
                75,
                format!("module load-error count {} exceeds 5", module_manager.load_error_count()),
                now,
            ) {
                log.log(LogLevel::Error, &format!("anomaly #{id}: module load-error count exceeds 5"));
                raised.push(id);
            }
        }

        // Step 4: scan every active pattern for the four built-in predicates.
        let entities: Vec<EntityRef> = self.patterns.keys().copied().collect();
        for entity in entities {
            let pattern = &self.patterns[&entity];
            for (kind, severity, description) in Self::evaluate_predicates(pattern) {
                if let Some(id) = self.raise(entity, kind, severity, description, now) {
                    log.log(LogLevel::Warn, &format!("anomaly #{id}: {kind:?} on {entity}"));
                    raised.push(id);
                }
            }
        }

        // Resolution sweep: an open, handled anomaly whose predicate no
        // longer fires is resolved and its slot freed (§4.D state machine).
        self.resolve_stale(now);

        raised
    }

    fn resolve_stale(&mut self, now: DateTime<Utc>) {
        let mut resolved_keys = Vec::new();
        for (&key, &id) in self.open.iter() {
            let (entity, kind) = key;
            let still_firing = self
                .patterns
                .get(&entity)
                .is_some_and(|pattern| Self::evaluate_predicates(pattern).iter().any(|(k, ..)| *k == kind));
            if still_firing {
                continue;
            }
            let handled = self.anomalies.iter().any(|a| a.id == id && a.is_handled());
            if !handled {
                continue;
            }
            resolved_keys.push((key, id));
        }
        for (key, id) in resolved_keys {
            if let Some(record) = self.anomaly_mut(id) {
                record.resolved_at = Some(now);
            }
            self.open.remove(&key);
        }
    }

    /// Evaluate the four built-in anomaly predicates against `pattern`
    /// (§4.D "Anomaly predicates"). A pattern may match more than one.
    fn evaluate_predicates(pattern: &BehaviorPattern) -> Vec<(AnomalyKind, u8, String)> {
        let mut matches = Vec::new();
        let samples: Vec<_> = pattern.samples().copied().collect();
        let n = samples.len();

        if pattern.observation_count >= 10 && n >= 2 {
            let rising = (1..n).filter(|&i| samples[i - 1].memory > samples[i].memory).count();
            if rising as f64 > 0.7 * n as f64 {
                matches.push((
                    AnomalyKind::MemoryLeak,
                    80,
                    format!("{rising}/{n} samples show memory rising older-to-newer"),
                ));
            }
        }

        if pattern.observation_count >= 5 && n >= 4 {
            let recent: Vec<u8> = samples.iter().take(3).map(|s| s.cpu).collect();
            let rest: Vec<u8> = samples.iter().skip(3).map(|s| s.cpu).collect();
            let recent_avg = recent.iter().map(|&c| c as f64).sum::<f64>() / recent.len() as f64;
            let rest_avg = rest.iter().map(|&c| c as f64).sum::<f64>() / rest.len() as f64;
            if recent_avg >= 50.0 && (rest_avg == 0.0 || recent_avg >= 3.0 * rest_avg) {
                matches.push((
                    AnomalyKind::CpuSpike,
                    70,
                    format!("recent CPU average {recent_avg:.0} vs baseline {rest_avg:.0}"),
                ));
            }
        }

        if pattern.observation_count >= 10 && n >= 10 {
            let recent10 = &samples[..10];
            let high_cpu = recent10.iter().filter(|s| s.cpu > 80).count();
            let no_messages = recent10.iter().filter(|s| s.messages == 0).count();
            if high_cpu >= 7 && no_messages >= 7 {
                matches.push((
                    AnomalyKind::InfiniteLoop,
                    90,
                    format!("{high_cpu}/10 samples >80% CPU, {no_messages}/10 idle mailboxes"),
                ));
            }
        }

        if pattern.observation_count >= 10
            && (pattern.mean_memory > RESOURCE_ABUSE_MEMORY_THRESHOLD as f64 || pattern.anomaly_score > 80)
        {
            matches.push((
                AnomalyKind::ResourceAbuse,
                85,
                format!(
                    "mean memory {:.0} bytes or anomaly score {} over threshold",
                    pattern.mean_memory, pattern.anomaly_score
                ),
            ));
        }

        matches
    }

    /// Execute the recommended actions of every `New` anomaly (§4.D
    /// "Intervention execution"). Returns the ids acted upon.
    #[allow(clippy::too_many_arguments)]
    pub fn process_anomalies(
        &mut self,
        actor_table: &mut ActorTable,
        scheduler: &mut Scheduler,
        module_manager: &mut ModuleManager,
        sandbox_manager: &mut SandboxManager,
        heap: &mut dyn Heap,
        runtime: &mut dyn ModuleRuntime,
        log: &dyn LogSink,
    ) -> Vec<u64> {
        let pending: Vec<u64> = self
            .anomalies
            .iter()
            .filter(|a| a.is_new())
            .map(|a| a.id)
            .collect();

        let mut acted = Vec::new();
        for id in pending {
            let Some((target, recommended)) = self
                .anomaly(id)
                .map(|record| (record.target, record.recommended_actions))
            else {
                continue;
            };

            let mut taken = InterventionAction::empty();

            if recommended.contains(InterventionAction::LOG) {
                log.log(LogLevel::Info, &format!("anomaly #{id} on {target}: recorded"));
                taken |= InterventionAction::LOG;
            }
            if recommended.contains(InterventionAction::WARN) {
                log.log(LogLevel::Warn, &format!("anomaly #{id} on {target}: behavior warning"));
                taken |= InterventionAction::WARN;
            }
            if recommended.contains(InterventionAction::THROTTLE)
                && Self::throttle(target, actor_table)
            {
                taken |= InterventionAction::THROTTLE;
            }
            if recommended.contains(InterventionAction::SUSPEND)
                && Self::suspend(target, actor_table, scheduler, module_manager)
            {
                taken |= InterventionAction::SUSPEND;
            }
            if recommended.contains(InterventionAction::TERMINATE)
                && Self::terminate(target, actor_table, module_manager, heap, runtime, log)
            {
                taken |= InterventionAction::TERMINATE;
            }
            if recommended.contains(InterventionAction::QUARANTINE)
                && Self::quarantine(target, module_manager, sandbox_manager, log)
            {
                taken |= InterventionAction::QUARANTINE;
            }
            if recommended.contains(InterventionAction::RECOVER) {
                log.log(LogLevel::Info, &format!("anomaly #{id} on {target}: recovery attempted"));
                taken |= InterventionAction::RECOVER;
            }

            if let Some(record) = self.anomaly_mut(id) {
                record.actions_taken = taken;
            }
            acted.push(id);
        }
        acted
    }

    /// Demote an actor's priority by one level (§4.D "reduce the
    /// entity's effective share to 50%, realized as a priority
    /// demotion"). A no-op (returns `false`) for modules and the system.
    fn throttle(target: EntityRef, actor_table: &mut ActorTable) -> bool {
        let EntityRef::Actor(id) = target else { return false };
        actor_table
            .with_actor_mut(id, |actor| {
                let demoted = match actor.priority {
                    crate::actor::Priority::Critical => crate::actor::Priority::High,
                    crate::actor::Priority::High => crate::actor::Priority::Normal,
                    crate::actor::Priority::Normal => crate::actor::Priority::Low,
                    crate::actor::Priority::Low | crate::actor::Priority::Idle => crate::actor::Priority::Idle,
                };
                actor.priority = demoted;
            })
            .is_ok()
    }

    /// Suspend an actor (and forget it from the ready queue) or a
    /// module. A no-op for the system.
    fn suspend(
        target: EntityRef,
        actor_table: &mut ActorTable,
        scheduler: &mut Scheduler,
        module_manager: &mut ModuleManager,
    ) -> bool {
        match target {
            EntityRef::Actor(id) => {
                if actor_table.actor_suspend(id).is_ok() {
                    scheduler.forget(id);
                    true
                } else {
                    false
                }
            }
            EntityRef::Module(id) => module_manager.module_suspend(id).is_ok(),
            EntityRef::System => false,
        }
    }

    /// Tear the entity down entirely: `terminate` for an actor,
    /// `unload` (only if dependency-free and non-core) for a module.
    fn terminate(
        target: EntityRef,
        actor_table: &mut ActorTable,
        module_manager: &mut ModuleManager,
        heap: &mut dyn Heap,
        runtime: &mut dyn ModuleRuntime,
        log: &dyn LogSink,
    ) -> bool {
        match target {
            EntityRef::Actor(id) => {
                actor_table.actor_terminate(id, heap, log);
                true
            }
            EntityRef::Module(id) => module_manager.module_unload(id, heap, runtime).is_ok(),
            EntityRef::System => false,
        }
    }

    /// Force a module's sandbox into `Quarantine`. A no-op for actors
    /// and the system.
    fn quarantine(
        target: EntityRef,
        module_manager: &ModuleManager,
        sandbox_manager: &mut SandboxManager,
        log: &dyn LogSink,
    ) -> bool {
        let EntityRef::Module(id) = target else { return false };
        let Ok(module) = module_manager.get(id) else { return false };
        sandbox_manager.force_quarantine(module.sandbox_id, log).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{CapturingLogSink, InMemoryHeap, StubModuleRuntime};
    use crate::ids::ActorId;

    fn config() -> KernelConfig {
        KernelConfig::default()
    }

    #[test]
    fn observe_tick_fires_on_the_configured_interval() {
        let mut supervisor = Supervisor::new(&KernelConfig::builder().with_analysis_interval_ticks(3).build().unwrap());
        assert!(!supervisor.observe_tick());
        assert!(!supervisor.observe_tick());
        assert!(supervisor.observe_tick());
    }

    #[test]
    fn cpu_spike_raises_throttle_after_process_anomalies() {
        let cfg = config();
        let mut supervisor = Supervisor::new(&cfg);
        let now = Utc::now();
        let entity = EntityRef::Actor(ActorId::from_index(1));
        let pattern = supervisor
            .patterns
            .entry(entity)
            .or_insert_with(|| BehaviorPattern::new(entity, now));

        let cpu_values: Vec<u8> = std::iter::repeat(20).take(57).chain([95, 95, 95]).collect();
        for cpu in cpu_values {
            pattern.record(Sample { memory: 1024, cpu, io_ops: 0, messages: 1 }, 60, now);
        }

        let mut actor_table = ActorTable::new(cfg.max_actors, cfg.default_mailbox_capacity, cfg.kernel_mailbox_capacity, cfg.default_stack_size, cfg.max_payload, cfg.max_messages);
        let mut heap = InMemoryHeap::new(1024 * 1024);
        let id = actor_table
            .actor_create(ActorId::KERNEL, crate::actor::Priority::Normal, None, None, &mut heap)
            .unwrap();
        assert_eq!(id, entity_actor_id(entity));

        let log = CapturingLogSink::new();
        let module_manager_stub = ModuleManager::new(4);
        let raised = supervisor.sample(&actor_table, &module_manager_stub, &heap, &log);
        assert!(raised.iter().any(|&raised_id| {
            supervisor.anomaly(raised_id).unwrap().kind == AnomalyKind::CpuSpike
        }));

        let anomaly = supervisor
            .anomalies()
            .into_iter()
            .find(|a| a.kind == AnomalyKind::CpuSpike)
            .unwrap();
        assert_eq!(anomaly.severity, 70);
        assert_eq!(
            anomaly.recommended_actions,
            InterventionAction::THROTTLE | InterventionAction::WARN
        );

        let mut module_manager = ModuleManager::new(4);
        let mut sandbox_manager = SandboxManager::new(4, 16, 5);
        let mut scheduler = Scheduler::new(cfg.time_slice_ticks);
        let mut runtime = StubModuleRuntime::default();
        let acted = supervisor.process_anomalies(
            &mut actor_table,
            &mut scheduler,
            &mut module_manager,
            &mut sandbox_manager,
            &mut heap,
            &mut runtime,
            &log,
        );
        assert!(!acted.is_empty());
        let anomaly = supervisor.anomaly(anomaly.id).unwrap();
        assert!(anomaly.actions_taken.contains(InterventionAction::THROTTLE));
        assert!(anomaly.is_handled());
    }

    fn entity_actor_id(entity: EntityRef) -> ActorId {
        match entity {
            EntityRef::Actor(id) => id,
            _ => panic!("expected actor entity"),
        }
    }

    #[test]
    fn resource_abuse_fires_on_heap_fragmentation() {
        let cfg = config();
        let mut supervisor = Supervisor::new(&cfg);
        let actor_table = ActorTable::new(cfg.max_actors, cfg.default_mailbox_capacity, cfg.kernel_mailbox_capacity, cfg.default_stack_size, cfg.max_payload, cfg.max_messages);
        let module_manager = ModuleManager::new(4);
        let log = CapturingLogSink::new();

        struct FragmentedHeap;
        impl Heap for FragmentedHeap {
            fn kmalloc(&mut self, _size: usize) -> Option<u64> {
                None
            }
            fn kfree(&mut self, _handle: u64) {}
            fn stats(&self) -> crate::collaborators::HeapStats {
                crate::collaborators::HeapStats {
                    current_allocations: 95,
                    total_allocations: 100,
                    fragmentation_level: 0.85,
                }
            }
        }

        let raised = supervisor.sample(&actor_table, &module_manager, &FragmentedHeap, &log);
        assert_eq!(raised.len(), 2);
        let kinds: Vec<_> = raised.iter().map(|&id| supervisor.anomaly(id).unwrap().kind).collect();
        assert!(kinds.contains(&AnomalyKind::MemoryLeak));
        assert!(kinds.contains(&AnomalyKind::ResourceAbuse));
    }

    #[test]
    fn anomaly_is_not_raised_twice_while_open() {
        let cfg = config();
        let mut supervisor = Supervisor::new(&cfg);
        let actor_table = ActorTable::new(cfg.max_actors, cfg.default_mailbox_capacity, cfg.kernel_mailbox_capacity, cfg.default_stack_size, cfg.max_payload, cfg.max_messages);
        let module_manager = ModuleManager::new(4);
        let log = CapturingLogSink::new();

        struct FragmentedHeap;
        impl Heap for FragmentedHeap {
            fn kmalloc(&mut self, _size: usize) -> Option<u64> {
                None
            }
            fn kfree(&mut self, _handle: u64) {}
            fn stats(&self) -> crate::collaborators::HeapStats {
                crate::collaborators::HeapStats {
                    current_allocations: 1,
                    total_allocations: 1,
                    fragmentation_level: 0.9,
                }
            }
        }

        let first = supervisor.sample(&actor_table, &module_manager, &FragmentedHeap, &log);
        let second = supervisor.sample(&actor_table, &module_manager, &FragmentedHeap, &log);
        assert!(!first.is_empty());
        assert!(second.is_empty());
    }
}
