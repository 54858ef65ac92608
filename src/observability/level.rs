//! Log severity levels.

use core::fmt;
use core::str::FromStr;

/// Severity of a log message.
///
/// Levels are ordered from least to most severe, so a logger configured at
/// `Info` drops `Trace` and `Debug` messages with a plain comparison.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LogLevel {
    /// Per-callback scheduling noise.
    Trace = 0,
    /// Probe progress useful while developing a probe.
    Debug = 1,
    /// Lifecycle milestones.
    #[default]
    Info = 2,
    /// Recoverable problems, such as a tolerated report write failure.
    Warn = 3,
    /// Failures surfaced to the caller.
    Error = 4,
}

impl LogLevel {
    /// Returns the lowercase level name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Returns true if this level is at least as severe as `other`.
    #[must_use]
    pub const fn is_at_least(self, other: Self) -> bool {
        self as u8 >= other as u8
    }

    /// Maps a `-v` style verbosity count onto a threshold: zero keeps the
    /// default `Warn`, each step lowers it by one level.
    #[must_use]
    pub const fn from_verbosity(verbosity: u32) -> Self {
        match verbosity {
            0 => Self::Warn,
            1 => Self::Info,
            2 => Self::Debug,
            _ => Self::Trace,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown level name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log level: {0}")]
pub struct ParseLevelError(String);

impl FromStr for LogLevel {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" | "err" => Ok(Self::Error),
            _ => Err(ParseLevelError(s.to_owned())),
        }
    }
}
