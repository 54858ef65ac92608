//! Logging for engines and probes.
//!
//! Probes and engines log through a [`Logger`] handle; where messages end up
//! is decided by the [`LogSink`] behind it. The default sink forwards to
//! `tracing`, so applications choose formatting by installing a subscriber.

pub mod level;
pub mod logger;

pub use level::{LogLevel, ParseLevelError};
pub use logger::{LogRecord, LogSink, Logger, MemorySink, TracingSink};
