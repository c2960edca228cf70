//! Behavior patterns, anomaly predicates, and intervention actions (§4.D).

// Layer 1: Standard library imports
use std::collections::VecDeque;

// Layer 2: Third-party crate imports
use bitflags::bitflags;
use chrono::{DateTime, Utc}; // §3.2 convention
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use crate::ids::EntityRef;

/// One (memory, CPU, I/O-ops, messages) observation fed into a
/// [`BehaviorPattern`] (§4.D step 1 / step 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// Bytes of memory attributed to the entity at sample time.
    pub memory: u64,
    /// CPU usage over the interval since the last sample, as a percent
    /// in `0..=100`.
    pub cpu: u8,
    /// I/O-like operations observed over the interval (guarded calls
    /// for modules; always `0` for actors per §4.D step 1).
    pub io_ops: u32,
    /// Messages observed over the interval (messages received for
    /// actors; always `0` for modules, which have no mailbox).
    pub messages: u32,
}

/// Three-valued trend over a pattern's memory samples (§4.D "trend").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    /// The recent half of the window averages higher than the older half.
    Increasing,
    /// The recent half of the window averages lower than the older half.
    Decreasing,
    /// No significant movement between halves.
    Stable,
}

/// A kind of anomalous behavior the supervisor can recognize (§4.D,
/// §3 GLOSSARY "Anomaly"). Only the first four are ever raised by the
/// built-in predicates; the rest round out the taxonomy for
/// [`Supervisor::force_anomaly`](super::manager::Supervisor) callers
/// (e.g. a module's own guarded-call path reporting a corruption or a
/// security breach it detected directly).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnomalyKind {
    /// Memory climbing steadily across most of the window.
    MemoryLeak,
    /// A short, sharp burst of CPU usage well above baseline.
    CpuSpike,
    /// Sustained high CPU with no message traffic.
    InfiniteLoop,
    /// Resource consumption persistently near or over quota.
    ResourceAbuse,
    /// A capability or memory-access violation pattern, reported
    /// out-of-band by the sandbox rather than derived from samples.
    SecurityBreach,
    /// Two or more entities mutually blocked awaiting each other.
    Deadlock,
    /// A module's validation or exit path reported structural corruption.
    Corruption,
    /// A flood of outbound network activity.
    NetworkFlood,
}

bitflags! {
    /// The set of response actions the supervisor may recommend or take
    /// (§4.D "intervention execution").
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct InterventionAction: u8 {
        /// Record a diagnostic log line. Always succeeds.
        const LOG = 0x01;
        /// Record a warning log line. Always succeeds.
        const WARN = 0x02;
        /// Reduce the entity's effective scheduling share (priority demotion).
        const THROTTLE = 0x04;
        /// Transition an actor to `Suspended` or stop a module.
        const SUSPEND = 0x08;
        /// Tear the entity down entirely.
        const TERMINATE = 0x10;
        /// Force a module's sandbox into `Quarantine`.
        const QUARANTINE = 0x20;
        /// A best-effort recovery attempt (restart, checkpoint restore).
        const RECOVER = 0x40;
    }
}

/// A behavior pattern tracked for one [`EntityRef`] (§3 GLOSSARY
/// "Behavior pattern").
///
/// The sliding window holds raw [`Sample`]s, newest first, so the
/// `window[i-1] > window[i]` comparisons in §4.D's anomaly predicates
/// read directly as "the newer sample exceeds the older one".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorPattern {
    /// The actor, module, or system this pattern tracks.
    pub entity: EntityRef,
    /// Samples, newest at index 0, bounded to the configured window length.
    window: VecDeque<Sample>,
    /// Mean memory usage across the current window.
    pub mean_memory: f64,
    /// Population variance of memory usage across the current window.
    pub variance_memory: f64,
    /// Direction of memory usage across the window's two halves.
    pub trend: Trend,
    /// Derived anomaly score in `0..=100`, recomputed on every update.
    pub anomaly_score: u8,
    /// Total samples ever recorded, unbounded by the window length.
    pub observation_count: u64,
    /// When this pattern was first created.
    pub first_seen: DateTime<Utc>,
    /// When this pattern was last updated.
    pub last_updated: DateTime<Utc>,
    /// The raw CPU-tick counter observed last update, used to derive the
    /// next sample's CPU percentage from a tick delta.
    #[serde(skip)]
    pub(super) last_cpu_ticks: u64,
    /// The raw call/message counter observed last update, used to
    /// derive the next sample's `io_ops`/`messages` delta.
    #[serde(skip)]
    pub(super) last_activity_count: u64,
}

const ONE_MIB: f64 = 1024.0 * 1024.0;
const TEN_MIB: f64 = 10.0 * ONE_MIB;

impl BehaviorPattern {
    /// Start a fresh, empty pattern for `entity`.
    pub fn new(entity: EntityRef, now: DateTime<Utc>) -> Self {
        Self {
            entity,
            window: VecDeque::new(),
            mean_memory: 0.0,
            variance_memory: 0.0,
            trend: Trend::Stable,
            anomaly_score: 0,
            observation_count: 0,
            first_seen: now,
            last_updated: now,
            last_cpu_ticks: 0,
            last_activity_count: 0,
        }
    }

    /// Samples currently held, newest first.
    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.window.iter()
    }

    /// Samples held in the window (≤ configured window length).
    pub fn len(&self) -> usize {
        self.window.len()
    }

    /// `true` if no sample has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Push a new sample to the front, drop the oldest past
    /// `window_length`, and recompute derived statistics and the
    /// anomaly score (§4.D "Anomaly-score update on each pattern update").
    pub fn record(&mut self, sample: Sample, window_length: usize, now: DateTime<Utc>) {
        self.window.push_front(sample);
        while self.window.len() > window_length.max(1) {
            self.window.pop_back();
        }
        self.observation_count += 1;
        self.last_updated = now;
        self.recompute_statistics();
    }

    fn recompute_statistics(&mut self) {
        let n = self.window.len();
        if n == 0 {
            self.mean_memory = 0.0;
            self.variance_memory = 0.0;
            self.trend = Trend::Stable;
            self.anomaly_score = 0;
            return;
        }

        let sum: f64 = self.window.iter().map(|s| s.memory as f64).sum();
        let mean = sum / n as f64;
        let variance = self
            .window
            .iter()
            .map(|s| {
                let delta = s.memory as f64 - mean;
                delta * delta
            })
            .sum::<f64>()
            / n as f64;

        self.mean_memory = mean;
        self.variance_memory = variance;
        self.trend = Self::compute_trend(&self.window);

        let mut score: u16 = 0;
        if variance > mean / 2.0 {
            score += 30;
        }
        if matches!(self.trend, Trend::Increasing) && mean > ONE_MIB {
            score += 40;
        }
        if mean > TEN_MIB {
            score += 30;
        }
        self.anomaly_score = score.min(100) as u8;
    }

    /// Split the window (newest-first) into a recent half and an older
    /// half and compare their memory averages.
    fn compute_trend(window: &VecDeque<Sample>) -> Trend {
        let n = window.len();
        if n < 2 {
            return Trend::Stable;
        }
        let mid = n / 2;
        let recent_avg = window.iter().take(mid).map(|s| s.memory as f64).sum::<f64>() / mid as f64;
        let older_avg =
            window.iter().skip(mid).map(|s| s.memory as f64).sum::<f64>() / (n - mid) as f64;
        if older_avg == 0.0 {
            return if recent_avg > 0.0 { Trend::Increasing } else { Trend::Stable };
        }
        let ratio = recent_avg / older_avg;
        if ratio > 1.05 {
            Trend::Increasing
        } else if ratio < 0.95 {
            Trend::Decreasing
        } else {
            Trend::Stable
        }
    }
}

/// Map an anomaly severity to the recommended response actions (§4.D
/// "Intervention mapping").
pub fn recommended_actions(
    severity: u8,
    anomaly_threshold: u8,
    intervention_threshold: u8,
) -> InterventionAction {
    if severity >= intervention_threshold {
        InterventionAction::SUSPEND | InterventionAction::LOG
    } else if severity >= anomaly_threshold {
        InterventionAction::THROTTLE | InterventionAction::WARN
    } else {
        InterventionAction::LOG | InterventionAction::WARN
    }
}

/// A recorded anomaly (§3 GLOSSARY "Anomaly").
///
/// State is derived rather than stored explicitly (§9 "state machines
/// as data"): New is `actions_taken.is_empty() && resolved_at.is_none()`,
/// Handled is `!actions_taken.is_empty() && resolved_at.is_none()`,
/// Resolved is `resolved_at.is_some()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyRecord {
    /// Monotonic id, unique within the owning supervisor.
    pub id: u64,
    /// Which predicate (or external caller) raised this anomaly.
    pub kind: AnomalyKind,
    /// Severity in `0..=100`.
    pub severity: u8,
    /// Confidence in `0..=100` that the anomaly is real (§4.D leaves the
    /// exact derivation unspecified beyond the predicates themselves;
    /// this crate reports the triggering severity as its confidence).
    pub confidence: u8,
    /// The actor, module, or system this anomaly was raised against.
    pub target: EntityRef,
    /// Free-form human-readable description.
    pub description: String,
    /// Actions the intervention mapping recommended.
    pub recommended_actions: InterventionAction,
    /// Actions actually taken so far (always a subset of `recommended_actions`).
    pub actions_taken: InterventionAction,
    /// When the anomaly was first raised.
    pub detected_at: DateTime<Utc>,
    /// When a later pass found the predicate no longer firing.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl AnomalyRecord {
    /// `true` if no intervention has been attempted yet.
    pub fn is_new(&self) -> bool {
        self.actions_taken.is_empty() && self.resolved_at.is_none()
    }

    /// `true` if at least one intervention has been taken and the
    /// anomaly has not since resolved.
    pub fn is_handled(&self) -> bool {
        !self.actions_taken.is_empty() && self.resolved_at.is_none()
    }

    /// `true` if a later pass found the predicate no longer firing.
    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }
}

impl std::fmt::Display for AnomalyRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "anomaly#{} {:?} on {} (severity {}): {}",
            self.id, self.kind, self.target, self.severity, self.description
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(memory: u64, cpu: u8) -> Sample {
        Sample { memory, cpu, io_ops: 0, messages: 0 }
    }

    #[test]
    fn trend_is_stable_with_fewer_than_two_samples() {
        let mut pattern = BehaviorPattern::new(EntityRef::System, Utc::now());
        pattern.record(sample(100, 10), 60, Utc::now());
        assert!(matches!(pattern.trend, Trend::Stable));
    }

    #[test]
    fn trend_detects_increasing_memory() {
        let mut pattern = BehaviorPattern::new(EntityRef::System, Utc::now());
        for memory in [1_000, 1_000, 1_000, 5_000, 5_000, 5_000] {
            pattern.record(sample(memory, 10), 60, Utc::now());
        }
        assert!(matches!(pattern.trend, Trend::Increasing));
    }

    #[test]
    fn anomaly_score_adds_components_and_clamps_to_100() {
        let mut pattern = BehaviorPattern::new(EntityRef::System, Utc::now());
        let mib = 1024 * 1024;
        for mebibytes in [1u64, 2, 4, 8, 16, 32] {
            pattern.record(sample(mebibytes * mib, 5), 60, Utc::now());
        }
        assert!(matches!(pattern.trend, Trend::Increasing));
        assert_eq!(pattern.anomaly_score, 100);
    }

    #[test]
    fn recommended_actions_follow_severity_bands() {
        assert_eq!(
            recommended_actions(95, 75, 90),
            InterventionAction::SUSPEND | InterventionAction::LOG
        );
        assert_eq!(
            recommended_actions(80, 75, 90),
            InterventionAction::THROTTLE | InterventionAction::WARN
        );
        assert_eq!(
            recommended_actions(50, 75, 90),
            InterventionAction::LOG | InterventionAction::WARN
        );
    }

    #[test]
    fn actions_taken_subset_invariant_is_representable() {
        let recommended = InterventionAction::THROTTLE | InterventionAction::WARN;
        let taken = InterventionAction::WARN;
        assert!(recommended.contains(taken));
    }
}
