//! Measurement result record.

use crate::error::{Error, ErrorKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use time::OffsetDateTime;
use time::macros::format_description;

/// One measurement: metadata filled by the runnable plus the probe-specific
/// `test_keys`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Measured input; `null` for probes without input.
    pub input: Option<String>,
    /// Probe name.
    pub test_name: String,
    /// Probe version.
    pub test_version: String,
    /// UTC start time, `YYYY-MM-DD HH:MM:SS`.
    pub measurement_start_time: String,
    /// Seconds spent in the probe body.
    pub test_runtime: f64,
    /// Probe-specific results.
    pub test_keys: Value,
    /// Failure string when the probe body failed.
    pub failure: Option<String>,
    /// Free-form annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl Entry {
    /// An entry with empty metadata and an empty `test_keys` object.
    #[must_use]
    pub fn new() -> Self {
        Self {
            input: None,
            test_name: String::new(),
            test_version: String::new(),
            measurement_start_time: String::new(),
            test_runtime: 0.0,
            test_keys: Value::Object(Map::new()),
            failure: None,
            annotations: BTreeMap::new(),
        }
    }

    /// Sets one test key, turning `test_keys` into an object if needed.
    pub fn set_key(&mut self, key: &str, value: impl Into<Value>) {
        if !self.test_keys.is_object() {
            self.test_keys = Value::Object(Map::new());
        }
        if let Value::Object(map) = &mut self.test_keys {
            map.insert(key.to_owned(), value.into());
        }
    }

    /// Records `err` as the entry failure; success leaves it untouched.
    pub fn set_failure(&mut self, err: &Error) {
        if let Some(failure) = err.failure_string() {
            self.failure = Some(failure);
        }
    }

    /// One-line JSON rendering.
    pub fn to_json_line(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(|e| Error::with_detail(ErrorKind::JsonDomain, e.to_string()))
    }
}

impl Default for Entry {
    fn default() -> Self {
        Self::new()
    }
}

/// Formats `at` as `YYYY-MM-DD HH:MM:SS` in UTC.
#[must_use]
pub fn format_timestamp(at: OffsetDateTime) -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    at.to_offset(time::UtcOffset::UTC)
        .format(format)
        .unwrap_or_default()
}

/// Current UTC time in entry format.
#[must_use]
pub fn now_timestamp() -> String {
    format_timestamp(OffsetDateTime::now_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    #[test]
    fn timestamp_format() {
        let at = datetime!(2016-03-07 09:05:01 UTC);
        assert_eq!(format_timestamp(at), "2016-03-07 09:05:01");
        let shifted = datetime!(2016-03-07 11:05:01 +02:00);
        assert_eq!(format_timestamp(shifted), "2016-03-07 09:05:01");
    }

    #[test]
    fn empty_input_serializes_as_null() {
        let entry = Entry::new();
        let value = serde_json::to_value(&entry).expect("serialize");
        assert_eq!(value["input"], Value::Null);
        assert_eq!(value["test_keys"], json!({}));
        assert!(value.get("annotations").is_none());
    }

    #[test]
    fn set_key_and_failure() {
        let mut entry = Entry::new();
        entry.test_keys = Value::Null;
        entry.set_key("addresses", json!(["127.0.0.1"]));
        entry.set_failure(&Error::success());
        assert_eq!(entry.failure, None);
        entry.set_failure(&ErrorKind::ConnectionRefused.into());
        assert_eq!(entry.failure.as_deref(), Some("connection_refused"));
        assert_eq!(entry.test_keys["addresses"][0], json!("127.0.0.1"));
        assert!(entry.to_json_line().expect("json").contains("connection_refused"));
    }
}
