//! Engine configuration.
//!
//! # Precedence
//!
//! Values are resolved in this order (highest priority first):
//!
//! 1. **Programmatic**: builder methods such as
//!    [`EngineConfig::with_thread_name`]
//! 2. **Environment variables**: `PROBEKIT_*`
//! 3. **Config file**: a TOML file (requires the `config-file` feature)
//! 4. **Defaults**: [`EngineConfig::default`]
//!
//! # Environment variables
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `PROBEKIT_THREAD_NAME` | `String` | `thread_name` |
//! | `PROBEKIT_WORKER_PARALLELISM` | `usize` | `worker_parallelism` |
//! | `PROBEKIT_RUN_POLICY` | `sequential` \| `concurrent` | `run_policy` |

use crate::worker::DEFAULT_PARALLELISM;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Environment variable overriding the loop thread name.
pub const ENV_THREAD_NAME: &str = "PROBEKIT_THREAD_NAME";
/// Environment variable overriding the worker thread bound.
pub const ENV_WORKER_PARALLELISM: &str = "PROBEKIT_WORKER_PARALLELISM";
/// Environment variable overriding the runner policy.
pub const ENV_RUN_POLICY: &str = "PROBEKIT_RUN_POLICY";

const DEFAULT_THREAD_NAME: &str = "probekit-reactor";

/// Errors raised while assembling an [`EngineConfig`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable holds a value of the wrong shape.
    #[error("invalid value for {var}: {message}")]
    InvalidEnv {
        /// Variable name.
        var: &'static str,
        /// What was expected and what was found.
        message: String,
    },
    /// A configured value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// The config file could not be read.
    #[error("failed to read config file {path}: {message}")]
    Io {
        /// File path.
        path: String,
        /// Underlying error text.
        message: String,
    },
    /// The config file is not valid TOML for this schema.
    #[error("failed to parse TOML config: {0}")]
    Parse(String),
}

/// Whether a [`Runner`](super::Runner) overlaps the runnables it is given.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunPolicy {
    /// One runnable at a time, in submission order.
    #[default]
    Sequential,
    /// Every submitted runnable starts immediately.
    Concurrent,
}

impl RunPolicy {
    /// Lowercase name, as accepted by [`FromStr`].
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Concurrent => "concurrent",
        }
    }
}

impl fmt::Display for RunPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "concurrent" => Ok(Self::Concurrent),
            other => Err(ConfigError::InvalidEnv {
                var: ENV_RUN_POLICY,
                message: format!("expected sequential or concurrent, got {other:?}"),
            }),
        }
    }
}

/// Settings of an [`Async`](super::Async) engine and its runners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Name of the thread running the loop.
    pub thread_name: String,
    /// Upper bound on worker threads for blocking calls.
    pub worker_parallelism: usize,
    /// Policy of runners created from the engine.
    pub run_policy: RunPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thread_name: DEFAULT_THREAD_NAME.to_owned(),
            worker_parallelism: DEFAULT_PARALLELISM,
            run_policy: RunPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Sets the loop thread name.
    #[must_use]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Sets the worker thread bound.
    #[must_use]
    pub const fn with_worker_parallelism(mut self, parallelism: usize) -> Self {
        self.worker_parallelism = parallelism;
        self
    }

    /// Sets the runner policy.
    #[must_use]
    pub const fn with_run_policy(mut self, policy: RunPolicy) -> Self {
        self.run_policy = policy;
        self
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        apply_env_overrides(&mut config)?;
        Ok(config)
    }

    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_parallelism == 0 {
            return Err(ConfigError::Invalid(
                "worker_parallelism must be at least 1".to_owned(),
            ));
        }
        if self.thread_name.is_empty() || self.thread_name.contains('\0') {
            return Err(ConfigError::Invalid(format!(
                "unusable thread name {:?}",
                self.thread_name
            )));
        }
        Ok(())
    }

    /// Parses a TOML document, then applies environment overrides.
    #[cfg(feature = "config-file")]
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let mut config: Self =
            toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        apply_env_overrides(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML file, then applies environment overrides.
    #[cfg(feature = "config-file")]
    pub fn from_toml_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&source)
    }
}

/// Applies the `PROBEKIT_*` variables that are set.
pub fn apply_env_overrides(config: &mut EngineConfig) -> Result<(), ConfigError> {
    apply_overrides(config, |name| std::env::var(name).ok())
}

fn apply_overrides<F>(config: &mut EngineConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup(ENV_THREAD_NAME) {
        config.thread_name = val;
    }
    if let Some(val) = lookup(ENV_WORKER_PARALLELISM) {
        config.worker_parallelism =
            val.trim()
                .parse()
                .map_err(|e| ConfigError::InvalidEnv {
                    var: ENV_WORKER_PARALLELISM,
                    message: format!("expected unsigned integer, got {val:?} ({e})"),
                })?;
    }
    if let Some(val) = lookup(ENV_RUN_POLICY) {
        config.run_policy = val.parse()?;
    }
    Ok(())
}
