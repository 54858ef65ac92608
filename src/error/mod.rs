//! Structured, chainable error values.
//!
//! [`Error`] is the single result type exchanged at every component boundary:
//! leaf operations complete with an `Error`, composite operations wrap the
//! errors of their branches as children. Code zero means success.
//!
//! The structured form is an ordered JSON array
//! `[code, {"reason": .., "context": ..}, child_1, child_2, ...]` so that
//! child ordering survives a round trip.

mod kind;

pub use kind::{DNS_BASE, ErrorCategory, ErrorKind, NET_BASE, REPORT_BASE};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value, json};
use std::io;

/// A success-or-failure value with an optional causal chain.
///
/// Errors are immutable; the builder methods consume `self` and return a new
/// value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{}", reason_str(.reason))]
pub struct Error {
    code: i32,
    reason: Option<String>,
    children: Vec<Error>,
    context: Value,
}

fn reason_str(reason: &Option<String>) -> &str {
    reason.as_deref().unwrap_or("")
}

impl Error {
    /// The success value: code zero, no children.
    #[must_use]
    pub const fn success() -> Self {
        Self {
            code: 0,
            reason: None,
            children: Vec::new(),
            context: Value::Null,
        }
    }

    /// Creates an error with an explicit code and reason.
    #[must_use]
    pub fn new(code: i32, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        if code == 0 {
            return Self::success();
        }
        let reason = if reason.is_empty() {
            unknown_reason(code)
        } else {
            reason
        };
        Self {
            code,
            reason: Some(reason),
            children: Vec::new(),
            context: Value::Null,
        }
    }

    /// Creates an error from a bare code, using the catalogued reason when
    /// the code is known and `unknown_failure <code>` otherwise.
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match ErrorKind::from_code(code) {
            Some(kind) => kind.into(),
            None => Self::new(code, String::new()),
        }
    }

    /// Creates an error of `kind` whose reason is extended with `detail`.
    #[must_use]
    pub fn with_detail(kind: ErrorKind, detail: impl AsRef<str>) -> Self {
        let detail = detail.as_ref();
        if detail.is_empty() {
            return kind.into();
        }
        Self::new(kind.code(), format!("{}: {detail}", kind.reason()))
    }

    /// Creates a parent error embedding `cause` as its only child.
    #[must_use]
    pub fn wrap(parent_code: i32, reason: impl Into<String>, cause: Self) -> Self {
        Self::new(parent_code, reason).with_child(cause)
    }

    /// Returns a copy of this error with `child` appended.
    ///
    /// # Panics
    ///
    /// Panics if `self` is a success value and `child` is a failure: a
    /// successful result never carries failing causes.
    #[must_use]
    pub fn with_child(mut self, child: Self) -> Self {
        assert!(
            self.is_error() || !child.is_error(),
            "success value cannot carry failing child {}",
            child.code
        );
        self.children.push(child);
        self
    }

    /// Returns a copy of this error with every item of `children` appended.
    #[must_use]
    pub fn with_children(self, children: impl IntoIterator<Item = Self>) -> Self {
        children.into_iter().fold(self, Self::with_child)
    }

    /// Returns a copy of this error carrying `context`.
    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    /// Numeric code; zero on success.
    #[must_use]
    pub const fn code(&self) -> i32 {
        self.code
    }

    /// Reason string; empty on success.
    #[must_use]
    pub fn reason(&self) -> &str {
        reason_str(&self.reason)
    }

    /// Ordered causes.
    #[must_use]
    pub fn children(&self) -> &[Self] {
        &self.children
    }

    /// Opaque structured payload.
    #[must_use]
    pub const fn context(&self) -> &Value {
        &self.context
    }

    /// True when the code is nonzero.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.code != 0
    }

    /// True when the code is zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code == 0
    }

    /// Catalogued kind for this code, if any.
    #[must_use]
    pub const fn kind(&self) -> Option<ErrorKind> {
        ErrorKind::from_code(self.code)
    }

    /// Taxonomy class; uncatalogued codes are [`ErrorCategory::Generic`].
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        self.kind().map_or(ErrorCategory::Generic, ErrorKind::category)
    }

    /// True when this error carries the code of `kind`.
    #[must_use]
    pub const fn is(&self, kind: ErrorKind) -> bool {
        self.code == kind.code()
    }

    /// The child recorded as the first failure of an aggregate, if any.
    #[must_use]
    pub fn first_failure(&self) -> Option<&Self> {
        let index = self.context.get("first_failure")?.as_u64()?;
        self.children.get(usize::try_from(index).ok()?)
    }

    /// The `failure` string written into measurement entries.
    #[must_use]
    pub fn failure_string(&self) -> Option<String> {
        self.is_error().then(|| self.reason().to_owned())
    }

    /// Ordered structured representation.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut head = Map::new();
        head.insert(
            "reason".into(),
            self.reason.clone().map_or(Value::Null, Value::String),
        );
        head.insert("context".into(), self.context.clone());
        let mut items = Vec::with_capacity(self.children.len() + 2);
        items.push(json!(self.code));
        items.push(Value::Object(head));
        items.extend(self.children.iter().map(Self::to_json));
        Value::Array(items)
    }

    /// Parses the representation produced by [`Error::to_json`].
    pub fn from_json(value: &Value) -> Result<Self, Self> {
        let items = value
            .as_array()
            .ok_or_else(|| Self::with_detail(ErrorKind::JsonDomain, "expected array"))?;
        let code = items
            .first()
            .ok_or_else(|| Self::with_detail(ErrorKind::JsonKey, "missing code"))?
            .as_i64()
            .and_then(|c| i32::try_from(c).ok())
            .ok_or_else(|| Self::with_detail(ErrorKind::JsonDomain, "code is not an i32"))?;
        let head = items
            .get(1)
            .ok_or_else(|| Self::with_detail(ErrorKind::JsonKey, "missing header"))?
            .as_object()
            .ok_or_else(|| Self::with_detail(ErrorKind::JsonDomain, "header is not an object"))?;
        let reason = match head.get("reason") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                return Err(Self::with_detail(
                    ErrorKind::JsonDomain,
                    "reason is not a string",
                ));
            }
        };
        let children = items[2..]
            .iter()
            .map(Self::from_json)
            .collect::<Result<Vec<_>, _>>()?;
        if code == 0 && children.iter().any(Self::is_error) {
            return Err(Self::with_detail(
                ErrorKind::Value,
                "success value with failing child",
            ));
        }
        Ok(Self {
            code,
            reason: if code == 0 {
                reason
            } else {
                Some(reason.unwrap_or_else(|| unknown_reason(code)))
            },
            children,
            context: head.get("context").cloned().unwrap_or(Value::Null),
        })
    }

    /// Parses an error from a JSON string.
    pub fn from_json_str(text: &str) -> Result<Self, Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Self::with_detail(ErrorKind::JsonParse, e.to_string()))?;
        Self::from_json(&value)
    }
}

fn unknown_reason(code: i32) -> String {
    format!("unknown_failure {code}")
}

impl Default for Error {
    fn default() -> Self {
        Self::success()
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        if kind == ErrorKind::NoError {
            Self::success()
        } else {
            Self::new(kind.code(), kind.reason())
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::ConnectionRefused => ErrorKind::ConnectionRefused,
            io::ErrorKind::ConnectionReset => ErrorKind::ConnectionReset,
            io::ErrorKind::ConnectionAborted => ErrorKind::ConnectionAborted,
            io::ErrorKind::TimedOut => ErrorKind::TimedOut,
            io::ErrorKind::AddrInUse => ErrorKind::AddressInUse,
            io::ErrorKind::AddrNotAvailable => ErrorKind::AddressNotAvailable,
            io::ErrorKind::HostUnreachable => ErrorKind::HostUnreachable,
            io::ErrorKind::NetworkUnreachable => ErrorKind::NetworkUnreachable,
            io::ErrorKind::NetworkDown => ErrorKind::NetworkDown,
            io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            io::ErrorKind::BrokenPipe => ErrorKind::BrokenPipe,
            io::ErrorKind::NotConnected => ErrorKind::NotConnected,
            io::ErrorKind::WouldBlock => ErrorKind::OperationWouldBlock,
            io::ErrorKind::InvalidInput => ErrorKind::InvalidArgument,
            io::ErrorKind::Interrupted => ErrorKind::Interrupted,
            io::ErrorKind::UnexpectedEof => ErrorKind::Eof,
            _ => ErrorKind::Network,
        };
        Self::from(kind).with_context(json!({ "os": err.to_string() }))
    }
}

impl Serialize for Error {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Error {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(&value).map_err(|e| serde::de::Error::custom(e.reason().to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_has_code_zero_and_no_children() {
        let ok = Error::success();
        assert!(ok.is_success());
        assert!(!ok.is_error());
        assert!(ok.children().is_empty());
        assert_eq!(ok.reason(), "");
        assert_eq!(ok, Error::default());
    }

    #[test]
    fn missing_reason_becomes_unknown_failure() {
        let err = Error::new(4242, "");
        assert_eq!(err.reason(), "unknown_failure 4242");
        assert_eq!(Error::from_code(4243).reason(), "unknown_failure 4243");
    }

    #[test]
    fn from_code_uses_catalogue() {
        let err = Error::from_code(1038);
        assert_eq!(err.reason(), "connection_refused");
        assert_eq!(err.category(), ErrorCategory::Transport);
    }

    #[test]
    fn wrap_preserves_cause() {
        let cause = Error::from(ErrorKind::TimedOut);
        let err = Error::wrap(1003, "connect_error", cause.clone());
        assert_eq!(err.children(), &[cause]);
        assert_eq!(err.to_string(), "connect_error");
    }

    #[test]
    #[should_panic(expected = "success value cannot carry failing child")]
    fn success_with_failing_child_panics() {
        let _ = Error::success().with_child(ErrorKind::Mocked.into());
    }

    #[test]
    fn success_may_carry_successful_children() {
        let ok = Error::success().with_children([Error::success(), Error::success()]);
        assert_eq!(ok.children().len(), 2);
        assert!(ok.is_success());
    }

    #[test]
    fn with_detail_extends_reason() {
        let err = Error::with_detail(ErrorKind::Configuration, "missing nameserver");
        assert_eq!(err.reason(), "configuration_error: missing nameserver");
        assert!(err.is(ErrorKind::Configuration));
    }

    #[test]
    fn json_shape_is_ordered_array() {
        let err = Error::new(10, "parallel_operation_error")
            .with_context(json!({"first_failure": 1}))
            .with_child(Error::success())
            .with_child(ErrorKind::Mocked.into());
        let value = err.to_json();
        assert_eq!(value[0], json!(10));
        assert_eq!(value[1]["reason"], json!("parallel_operation_error"));
        assert_eq!(value[1]["context"]["first_failure"], json!(1));
        assert_eq!(value[2][0], json!(0));
        assert_eq!(value[3][0], json!(4));
        assert_eq!(err.first_failure().map(Error::code), Some(4));
    }

    #[test]
    fn nested_round_trip_preserves_order() {
        let inner = Error::wrap(2030, "dns_ipv4_failure", ErrorKind::DnsHostNotFound.into());
        let err = Error::new(2032, "dns_lookup_error")
            .with_child(inner)
            .with_child(ErrorKind::DnsNoData.into());
        let text = serde_json::to_string(&err).expect("serialize");
        let back: Error = serde_json::from_str(&text).expect("deserialize");
        assert_eq!(back, err);
        assert_eq!(back.children()[0].code(), 2030);
        assert_eq!(back.children()[0].children()[0].code(), 2024);
        assert_eq!(back.children()[1].code(), 2010);
    }

    #[test]
    fn from_json_rejects_malformed_input() {
        assert!(Error::from_json(&json!({"code": 1})).unwrap_err().is(ErrorKind::JsonDomain));
        assert!(Error::from_json(&json!([])).unwrap_err().is(ErrorKind::JsonKey));
        assert!(Error::from_json(&json!([1])).unwrap_err().is(ErrorKind::JsonKey));
        assert!(Error::from_json_str("[1,").unwrap_err().is(ErrorKind::JsonParse));
        let bad = json!([0, {"reason": null}, [4, {"reason": "mocked_error"}]]);
        assert!(Error::from_json(&bad).unwrap_err().is(ErrorKind::Value));
    }

    #[test]
    fn io_errors_map_to_network_codes() {
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert_eq!(Error::from(refused).code(), 1038);
        let timeout = io::Error::from(io::ErrorKind::TimedOut);
        assert_eq!(Error::from(timeout).code(), 1056);
        let other = io::Error::other("boom");
        let mapped = Error::from(other);
        assert_eq!(mapped.reason(), "generic_network_error");
        assert_eq!(mapped.context()["os"], json!("boom"));
    }
}
