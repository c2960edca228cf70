//! Display collaborator contract: a single `log(level, text)` sink (§6).
//!
//! Grounded in `airssys-osl::middleware::logger::loggers::tracing`: the
//! production sink emits `tracing` events, while tests substitute
//! [`CapturingLogSink`] to assert on exact diagnostic text without a
//! subscriber.

// Layer 1: Standard library imports
use std::sync::Mutex;

// Layer 2: Third-party crate imports
// (tracing macros used directly, no extra import needed)

// Layer 3: Internal module imports
// (none)

/// Diagnostic severity for a logged line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Routine diagnostic information.
    Info,
    /// A recorded violation or anomaly that does not halt anything.
    Warn,
    /// A fatal condition (e.g. core module corruption).
    Error,
}

/// The §6 `Display::log(level, text)` collaborator contract.
///
/// The core produces human-readable diagnostic strings but depends on no
/// formatting details from the sink.
pub trait LogSink {
    /// Emit one diagnostic line at the given severity.
    fn log(&self, level: LogLevel, text: &str);
}

/// Production sink: forwards to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn log(&self, level: LogLevel, text: &str) {
        match level {
            LogLevel::Info => tracing::info!("{text}"),
            LogLevel::Warn => tracing::warn!("{text}"),
            LogLevel::Error => tracing::error!("{text}"),
        }
    }
}

/// Test sink: records every line for later assertion.
#[derive(Debug, Default)]
pub struct CapturingLogSink {
    lines: Mutex<Vec<(LogLevel, String)>>,
}

impl CapturingLogSink {
    /// Create an empty capturing sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot every line logged so far.
    pub fn lines(&self) -> Vec<(LogLevel, String)> {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl LogSink for CapturingLogSink {
    fn log(&self, level: LogLevel, text: &str) {
        let mut lines = self
            .lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        lines.push((level, text.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capturing_sink_records_lines_in_order() {
        let sink = CapturingLogSink::new();
        sink.log(LogLevel::Info, "first");
        sink.log(LogLevel::Warn, "second");

        let lines = sink.lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], (LogLevel::Info, "first".to_string()));
        assert_eq!(lines[1], (LogLevel::Warn, "second".to_string()));
    }

    #[test]
    fn tracing_sink_does_not_panic_without_subscriber() {
        let sink = TracingLogSink;
        sink.log(LogLevel::Error, "no subscriber installed");
    }
}
