//! Read-only string settings supplied at probe construction.

use crate::error::{Error, ErrorKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

/// Well-known setting keys.
pub mod keys {
    /// Resolver override: route DNS queries to this `ip[:port]`.
    pub const NAMESERVER: &str = "nameserver";
    /// Per-attempt DNS timeout in seconds.
    pub const DNS_TIMEOUT: &str = "dns/timeout";
    /// DNS attempts per query.
    pub const DNS_ATTEMPTS: &str = "dns/attempts";
    /// TCP connect timeout in seconds.
    pub const NET_TIMEOUT: &str = "net/timeout";
    /// Inputs of one runnable measured concurrently.
    pub const PARALLELISM: &str = "parallelism";
    /// Stop starting new inputs after this many seconds.
    pub const MAX_RUNTIME: &str = "max_runtime";
    /// Keep going when the reporter fails to write an entry.
    pub const IGNORE_WRITE_ENTRY_ERROR: &str = "ignore_write_entry_error";
    /// Phase bitmask of throughput probes; opaque to the engine.
    pub const TEST_SUITE: &str = "test_suite";
}

/// Default for [`keys::DNS_TIMEOUT`].
pub const DEFAULT_DNS_TIMEOUT: f64 = 5.0;
/// Default for [`keys::DNS_ATTEMPTS`].
pub const DEFAULT_DNS_ATTEMPTS: u32 = 2;
/// Default for [`keys::NET_TIMEOUT`].
pub const DEFAULT_NET_TIMEOUT: f64 = 10.0;

/// String-keyed probe configuration. Keys are unique; the map is read-only
/// once handed to a probe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings(BTreeMap<String, String>);

impl Settings {
    /// Empty settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy with `key` set to `value`.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.0.insert(key.into(), value.to_string());
        self
    }

    /// True when `key` is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Raw value of `key`.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Parses `key`, returning `Ok(None)` when absent and a
    /// `configuration_error` when malformed.
    pub fn get<T: FromStr>(&self, key: &str) -> Result<Option<T>, Error> {
        self.get_str(key)
            .map(|raw| {
                raw.trim()
                    .parse()
                    .map_err(|_| malformed(key, raw))
            })
            .transpose()
    }

    /// Parses `key`, falling back to `default` when absent.
    pub fn get_or<T: FromStr>(&self, key: &str, default: T) -> Result<T, Error> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// Parses a timeout in seconds, falling back to `default_secs` when
    /// absent. The value must be positive and representable as a
    /// [`Duration`].
    pub fn get_timeout_or(&self, key: &str, default_secs: f64) -> Result<Duration, Error> {
        let secs: f64 = self.get_or(key, default_secs)?;
        if secs <= 0.0 {
            return Err(malformed(key, &secs.to_string()));
        }
        Duration::try_from_secs_f64(secs).map_err(|_| malformed(key, &secs.to_string()))
    }

    /// Parses a boolean accepting `1/0`, `true/false` and `yes/no`.
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, Error> {
        self.get_str(key)
            .map(|raw| match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => Ok(true),
                "0" | "false" | "no" => Ok(false),
                _ => Err(malformed(key, raw)),
            })
            .transpose()
    }

    /// [`Settings::get_bool`] with a fallback.
    pub fn get_bool_or(&self, key: &str, default: bool) -> Result<bool, Error> {
        Ok(self.get_bool(key)?.unwrap_or(default))
    }

    /// Value of a mandatory key.
    pub fn require(&self, key: &str) -> Result<&str, Error> {
        self.get_str(key).ok_or_else(|| {
            Error::with_detail(ErrorKind::Configuration, format!("missing setting {key}"))
        })
    }

    /// Iterates in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no key is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn malformed(key: &str, raw: &str) -> Error {
    Error::with_detail(
        ErrorKind::Configuration,
        format!("malformed setting {key}={raw}"),
    )
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Settings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
