//! Leveled logger handle injected into engines and probes.

use super::LogLevel;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Destination for log messages that passed the logger's level filter.
pub trait LogSink: Send + Sync {
    /// Records one message.
    fn log(&self, level: LogLevel, component: &str, message: &str);
}

/// Forwards messages to the `tracing` dispatcher.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: LogLevel, component: &str, message: &str) {
        match level {
            LogLevel::Trace => tracing::trace!(component, "{message}"),
            LogLevel::Debug => tracing::debug!(component, "{message}"),
            LogLevel::Info => tracing::info!(component, "{message}"),
            LogLevel::Warn => tracing::warn!(component, "{message}"),
            LogLevel::Error => tracing::error!(component, "{message}"),
        }
    }
}

/// A message captured by [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Severity.
    pub level: LogLevel,
    /// Component of the emitting logger.
    pub component: String,
    /// Rendered message.
    pub message: String,
}

/// Keeps every message in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Snapshot of the captured records.
    #[must_use]
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    /// True when any captured message contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.records.lock().iter().any(|r| r.message.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn log(&self, level: LogLevel, component: &str, message: &str) {
        self.records.lock().push(LogRecord {
            level,
            component: component.to_owned(),
            message: message.to_owned(),
        });
    }
}

/// Cloneable handle over a [`LogSink`] with a level threshold and a
/// component name attached to each message.
#[derive(Clone)]
pub struct Logger {
    sink: Arc<dyn LogSink>,
    component: Arc<str>,
    level: LogLevel,
}

impl Logger {
    /// Creates a logger writing to `sink` at the default `Info` threshold.
    #[must_use]
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
            component: Arc::from("probekit"),
            level: LogLevel::Info,
        }
    }

    /// Returns a logger sharing this sink under another component name.
    #[must_use]
    pub fn with_component(&self, component: &str) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
            component: Arc::from(component),
            level: self.level,
        }
    }

    /// Sets the threshold below which messages are dropped.
    #[must_use]
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Current threshold.
    #[must_use]
    pub const fn level(&self) -> LogLevel {
        self.level
    }

    /// Component name.
    #[must_use]
    pub fn component(&self) -> &str {
        &self.component
    }

    /// True when a message at `level` would reach the sink.
    #[must_use]
    pub const fn enabled(&self, level: LogLevel) -> bool {
        level.is_at_least(self.level)
    }

    /// Logs `message` at `level`.
    pub fn log(&self, level: LogLevel, message: impl fmt::Display) {
        if self.enabled(level) {
            self.sink.log(level, &self.component, &message.to_string());
        }
    }

    /// Logs at trace level.
    pub fn trace(&self, message: impl fmt::Display) {
        self.log(LogLevel::Trace, message);
    }

    /// Logs at debug level.
    pub fn debug(&self, message: impl fmt::Display) {
        self.log(LogLevel::Debug, message);
    }

    /// Logs at info level.
    pub fn info(&self, message: impl fmt::Display) {
        self.log(LogLevel::Info, message);
    }

    /// Logs at warn level.
    pub fn warn(&self, message: impl fmt::Display) {
        self.log(LogLevel::Warn, message);
    }

    /// Logs at error level.
    pub fn error(&self, message: impl fmt::Display) {
        self.log(LogLevel::Error, message);
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink))
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("component", &self.component)
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_below_threshold_are_dropped() {
        let sink = MemorySink::new();
        let logger = Logger::new(sink.clone()).with_level(LogLevel::Warn);
        logger.info("hidden");
        logger.warn("shown");
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "shown");
        assert_eq!(records[0].level, LogLevel::Warn);
    }

    #[test]
    fn component_is_attached() {
        let sink = MemorySink::new();
        let logger = Logger::new(sink.clone()).with_component("dns");
        logger.error(format_args!("lookup {} failed", "example.com"));
        assert_eq!(sink.records()[0].component, "dns");
        assert!(sink.contains("example.com"));
    }

    #[test]
    fn tracing_sink_accepts_every_level() {
        let logger = Logger::default().with_level(LogLevel::Trace);
        logger.trace("t");
        logger.debug("d");
        logger.info("i");
        logger.warn("w");
        logger.error("e");
        assert_eq!(logger.component(), "probekit");
    }
}
