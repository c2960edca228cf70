//! Kernel-wide configuration (§6 parameters), following the
//! `system::config::SystemConfig` builder shape.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
// (none)

/// Maximum actors, including the reserved kernel actor at index 0 (§6).
pub const DEFAULT_MAX_ACTORS: usize = 256;

/// Maximum pooled messages in flight (§6).
pub const DEFAULT_MAX_MESSAGES: usize = 1024;

/// Maximum message payload size in bytes (§6).
pub const DEFAULT_MAX_PAYLOAD: usize = 4 * 1024;

/// Default per-actor mailbox capacity (§6).
pub const DEFAULT_MAILBOX_CAPACITY: usize = 64;

/// Mailbox capacity for the reserved kernel actor (§3, §6).
pub const KERNEL_MAILBOX_CAPACITY: usize = 256;

/// Default actor stack size in bytes (§6).
pub const DEFAULT_STACK_SIZE: usize = 8 * 1024;

/// Scheduler time slice in ticks (§4.B, §6).
pub const DEFAULT_TIME_SLICE: u32 = 10;

/// Behavior pattern sliding-window length in samples (§4.D, §6).
pub const DEFAULT_WINDOW_LENGTH: usize = 60;

/// Anomaly score at or above which a pattern is considered anomalous
/// (§6). Distinct from the higher intervention threshold.
pub const DEFAULT_ANOMALY_THRESHOLD: u8 = 75;

/// Anomaly severity at or above which `Suspend` is recommended (§4.D).
pub const DEFAULT_INTERVENTION_THRESHOLD: u8 = 90;

/// Supervisor sampling cadence in ticks (§4.D, §6).
pub const DEFAULT_ANALYSIS_INTERVAL: u32 = 100;

/// Violation count after which a strict-mode module is auto-quarantined
/// (§4.D Sandbox).
pub const DEFAULT_QUARANTINE_VIOLATION_THRESHOLD: u32 = 5;

/// Ring buffer capacity for violation and anomaly records (§3).
pub const DEFAULT_RING_BUFFER_CAPACITY: usize = 128;

/// Kernel-wide configuration bundling every §6 parameter.
///
/// # Example
///
/// ```rust
/// use kernel_core::config::KernelConfig;
///
/// let config = KernelConfig::builder()
///     .with_max_actors(64)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_actors, 64);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Maximum actor table slots (including the kernel actor).
    pub max_actors: usize,
    /// Maximum pooled message slots.
    pub max_messages: usize,
    /// Maximum message payload size in bytes.
    pub max_payload: usize,
    /// Default per-actor mailbox capacity.
    pub default_mailbox_capacity: usize,
    /// Mailbox capacity reserved for the kernel actor.
    pub kernel_mailbox_capacity: usize,
    /// Default actor stack size in bytes.
    pub default_stack_size: usize,
    /// Scheduler time slice in ticks.
    pub time_slice_ticks: u32,
    /// Behavior pattern sliding-window length.
    pub window_length: usize,
    /// Anomaly-threshold score.
    pub anomaly_threshold: u8,
    /// Intervention-threshold severity.
    pub intervention_threshold: u8,
    /// Supervisor sampling cadence in ticks.
    pub analysis_interval_ticks: u32,
    /// Violations before strict-mode auto-quarantine.
    pub quarantine_violation_threshold: u32,
    /// Ring buffer capacity for violations and anomalies.
    pub ring_buffer_capacity: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            max_actors: DEFAULT_MAX_ACTORS,
            max_messages: DEFAULT_MAX_MESSAGES,
            max_payload: DEFAULT_MAX_PAYLOAD,
            default_mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            kernel_mailbox_capacity: KERNEL_MAILBOX_CAPACITY,
            default_stack_size: DEFAULT_STACK_SIZE,
            time_slice_ticks: DEFAULT_TIME_SLICE,
            window_length: DEFAULT_WINDOW_LENGTH,
            anomaly_threshold: DEFAULT_ANOMALY_THRESHOLD,
            intervention_threshold: DEFAULT_INTERVENTION_THRESHOLD,
            analysis_interval_ticks: DEFAULT_ANALYSIS_INTERVAL,
            quarantine_violation_threshold: DEFAULT_QUARANTINE_VIOLATION_THRESHOLD,
            ring_buffer_capacity: DEFAULT_RING_BUFFER_CAPACITY,
        }
    }
}

impl KernelConfig {
    /// Start building a non-default configuration.
    pub fn builder() -> KernelConfigBuilder {
        KernelConfigBuilder::default()
    }

    /// Reject configurations with a zeroed capacity that would make the
    /// kernel unable to host even the reserved kernel actor.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_actors == 0 {
            return Err("max_actors must be > 0".to_string());
        }
        if self.max_messages == 0 {
            return Err("max_messages must be > 0".to_string());
        }
        if self.max_payload == 0 {
            return Err("max_payload must be > 0".to_string());
        }
        if self.default_mailbox_capacity == 0 {
            return Err("default_mailbox_capacity must be > 0".to_string());
        }
        if self.window_length == 0 {
            return Err("window_length must be > 0".to_string());
        }
        if self.intervention_threshold < self.anomaly_threshold {
            return Err("intervention_threshold must be >= anomaly_threshold".to_string());
        }
        Ok(())
    }
}

/// Builder for [`KernelConfig`].
#[derive(Debug, Clone, Default)]
pub struct KernelConfigBuilder {
    config: KernelConfigOverrides,
}

#[derive(Debug, Clone, Default)]
struct KernelConfigOverrides {
    max_actors: Option<usize>,
    max_messages: Option<usize>,
    default_mailbox_capacity: Option<usize>,
    time_slice_ticks: Option<u32>,
    analysis_interval_ticks: Option<u32>,
}

impl KernelConfigBuilder {
    /// Override the maximum actor table size.
    pub fn with_max_actors(mut self, max_actors: usize) -> Self {
        self.config.max_actors = Some(max_actors);
        self
    }

    /// Override the maximum message pool size.
    pub fn with_max_messages(mut self, max_messages: usize) -> Self {
        self.config.max_messages = Some(max_messages);
        self
    }

    /// Override the default per-actor mailbox capacity.
    pub fn with_default_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.config.default_mailbox_capacity = Some(capacity);
        self
    }

    /// Override the scheduler time slice, in ticks.
    pub fn with_time_slice_ticks(mut self, ticks: u32) -> Self {
        self.config.time_slice_ticks = Some(ticks);
        self
    }

    /// Override the supervisor analysis interval, in ticks.
    pub fn with_analysis_interval_ticks(mut self, ticks: u32) -> Self {
        self.config.analysis_interval_ticks = Some(ticks);
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<KernelConfig, String> {
        let mut config = KernelConfig::default();
        if let Some(v) = self.config.max_actors {
            config.max_actors = v;
        }
        if let Some(v) = self.config.max_messages {
            config.max_messages = v;
        }
        if let Some(v) = self.config.default_mailbox_capacity {
            config.default_mailbox_capacity = v;
        }
        if let Some(v) = self.config.time_slice_ticks {
            config.time_slice_ticks = v;
        }
        if let Some(v) = self.config.analysis_interval_ticks {
            config.analysis_interval_ticks = v;
        }
        config.validate()?;
        Ok(config)
    }
}
