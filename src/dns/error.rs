//! DNS failure classification.
//!
//! Resolver backends report failures as [`DnsError`]; the conversion into
//! [`Error`] assigns the catalogued DNS codes that end up in entries.

use crate::error::{Error, ErrorKind};
use std::fmt;
use std::io;

/// Error type for DNS operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsError {
    /// The reply carried no record of the requested type.
    NoRecords(String),
    /// The name does not exist.
    HostNotFound(String),
    /// No reply within the configured attempts.
    Timeout,
    /// The resolver asked to try again later.
    TemporaryFailure,
    /// The server answered with a nonzero RCODE.
    ServerError(u8),
    /// The reply did not fit a UDP datagram.
    Truncated,
    /// The reply could not be parsed.
    Malformed(&'static str),
    /// The name cannot be encoded in a query.
    InvalidHost(String),
    /// I/O error while talking to the resolver.
    Io(String),
}

impl fmt::Display for DnsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRecords(host) => write!(f, "no DNS records found for: {host}"),
            Self::HostNotFound(host) => write!(f, "host not found: {host}"),
            Self::Timeout => write!(f, "DNS query timed out"),
            Self::TemporaryFailure => write!(f, "temporary failure in name resolution"),
            Self::ServerError(rcode) => write!(f, "DNS server error: rcode {rcode}"),
            Self::Truncated => write!(f, "truncated DNS reply"),
            Self::Malformed(what) => write!(f, "malformed DNS reply: {what}"),
            Self::InvalidHost(host) => write!(f, "invalid hostname: {host}"),
            Self::Io(msg) => write!(f, "DNS I/O error: {msg}"),
        }
    }
}

impl std::error::Error for DnsError {}

impl DnsError {
    /// Catalogued kind for this failure.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NoRecords(_) => ErrorKind::DnsNoData,
            Self::HostNotFound(_) => ErrorKind::DnsHostNotFound,
            Self::Timeout => ErrorKind::Timeout,
            Self::TemporaryFailure => ErrorKind::DnsTemporaryFailure,
            Self::ServerError(1) => ErrorKind::DnsFormat,
            Self::ServerError(2) => ErrorKind::DnsServerFailed,
            Self::ServerError(3) => ErrorKind::DnsNotExist,
            Self::ServerError(4) => ErrorKind::DnsNotImplemented,
            Self::ServerError(5) => ErrorKind::DnsRefused,
            Self::ServerError(_) => ErrorKind::DnsUnknown,
            Self::Truncated => ErrorKind::DnsTruncated,
            Self::Malformed(_) | Self::InvalidHost(_) | Self::Io(_) => ErrorKind::DnsResolver,
        }
    }
}

impl From<DnsError> for Error {
    fn from(err: DnsError) -> Self {
        Self::from(err.kind()).with_context(serde_json::json!({ "detail": err.to_string() }))
    }
}

impl From<io::Error> for DnsError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => return Self::Timeout,
            _ => {}
        }
        // getaddrinfo failures only surface through the message text.
        let msg = err.to_string();
        let lower = msg.to_ascii_lowercase();
        if lower.contains("temporary failure") || lower.contains("try again") {
            Self::TemporaryFailure
        } else if lower.contains("not known")
            || lower.contains("no address associated")
            || lower.contains("nodename nor servname")
            || lower.contains("no such host")
        {
            Self::HostNotFound(msg)
        } else {
            Self::Io(msg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            DnsError::NoRecords("example.com".into()).to_string(),
            "no DNS records found for: example.com"
        );
        assert_eq!(DnsError::ServerError(2).to_string(), "DNS server error: rcode 2");
        assert_eq!(DnsError::Timeout.to_string(), "DNS query timed out");
    }

    #[test]
    fn rcodes_map_to_dns_codes() {
        assert_eq!(Error::from(DnsError::ServerError(3)).code(), 2002);
        assert_eq!(Error::from(DnsError::ServerError(5)).code(), 2004);
        assert_eq!(Error::from(DnsError::ServerError(9)).code(), 2006);
        assert_eq!(Error::from(DnsError::NoRecords(String::new())).reason(), "dns_no_data");
    }

    #[test]
    fn io_errors_are_classified() {
        let timeout = io::Error::from(io::ErrorKind::WouldBlock);
        assert_eq!(DnsError::from(timeout), DnsError::Timeout);
        let again = io::Error::other("Temporary failure in name resolution");
        assert_eq!(DnsError::from(again), DnsError::TemporaryFailure);
        let unknown = io::Error::other("failed to lookup address information: Name or service not known");
        assert!(matches!(DnsError::from(unknown), DnsError::HostNotFound(_)));
        let other = io::Error::other("boom");
        assert_eq!(Error::from(DnsError::from(other)).reason(), "dns_resolver_error");
    }
}
