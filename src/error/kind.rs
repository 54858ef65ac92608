//! Catalogue of well-known error codes.
//!
//! Codes are grouped by subsystem: common errors live below 1000, network
//! errors at `1000 + n`, DNS errors at `2000 + n` and report errors at
//! `7000 + n`. Reason strings double as the `failure` strings written into
//! measurement entries, so they must stay stable across releases.

use core::fmt;

/// Offset of the network error space.
pub const NET_BASE: i32 = 1000;
/// Offset of the DNS error space.
pub const DNS_BASE: i32 = 2000;
/// Offset of the report error space.
pub const REPORT_BASE: i32 = 7000;

/// Taxonomy class of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Code zero.
    Success,
    /// Errors that are not mapped more specifically.
    Generic,
    /// Connect failure, reset, timeout and friends.
    Transport,
    /// Per-address-family DNS failure.
    Resolution,
    /// Missing or invalid mandatory setting.
    Configuration,
    /// Operation invoked in the wrong lifecycle state.
    State,
    /// Child errors wrapped by a composite operation.
    Aggregate,
    /// Report persistence errors.
    Report,
}

impl ErrorCategory {
    /// Returns true for categories that are fatal to the operation raising them.
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::Configuration | Self::State)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::Generic => "generic",
            Self::Transport => "transport",
            Self::Resolution => "resolution",
            Self::Configuration => "configuration",
            Self::State => "state",
            Self::Aggregate => "aggregate",
            Self::Report => "report",
        };
        f.write_str(name)
    }
}

macro_rules! error_kinds {
    ($( $(#[$meta:meta])* $name:ident = ($code:literal, $reason:literal, $cat:ident), )*) => {
        /// A well-known error, identified by its numeric code.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ErrorKind {
            $( $(#[$meta])* $name, )*
        }

        impl ErrorKind {
            /// Every known kind, in code order.
            pub const ALL: &'static [Self] = &[$(Self::$name,)*];

            /// Returns the numeric code.
            #[must_use]
            pub const fn code(self) -> i32 {
                match self { $(Self::$name => $code,)* }
            }

            /// Returns the stable reason string.
            #[must_use]
            pub const fn reason(self) -> &'static str {
                match self { $(Self::$name => $reason,)* }
            }

            /// Returns the taxonomy class.
            #[must_use]
            pub const fn category(self) -> ErrorCategory {
                match self { $(Self::$name => ErrorCategory::$cat,)* }
            }

            /// Looks up the kind registered for `code`.
            #[must_use]
            pub const fn from_code(code: i32) -> Option<Self> {
                match code {
                    $($code => Some(Self::$name),)*
                    _ => None,
                }
            }
        }
    };
}

error_kinds! {
    /// No error.
    NoError = (0, "", Success),
    /// Generic failure.
    Generic = (1, "generic_error", Generic),
    /// A value was used before being initialized.
    NotInitialized = (2, "not_initialized", State),
    /// Invalid input value.
    Value = (3, "value_error", Generic),
    /// Failure injected by tests.
    Mocked = (4, "mocked_error", Generic),
    /// JSON could not be parsed.
    JsonParse = (5, "json_parse_error", Generic),
    /// A required JSON key is missing.
    JsonKey = (6, "json_key_error", Generic),
    /// A JSON value has an unexpected type.
    JsonDomain = (7, "json_domain_error", Generic),
    /// At least one branch of a parallel operation failed.
    ParallelOperation = (10, "parallel_operation_error", Aggregate),
    /// A step of a sequential operation failed.
    SequentialOperation = (11, "sequential_operation_error", Aggregate),
    /// Operation not implemented.
    NotImplemented = (15, "not_implemented", Generic),
    /// An operation did not complete in time.
    Timeout = (16, "generic_timeout_error", Transport),
    /// A mandatory setting is missing or malformed.
    Configuration = (18, "configuration_error", Configuration),
    /// An operation was invoked in the wrong lifecycle state.
    IllegalState = (19, "illegal_state", State),

    /// Peer closed the connection.
    Eof = (1000, "eof_error", Transport),
    /// Every connect attempt failed.
    ConnectFailed = (1003, "connect_error", Transport),
    /// Name resolution produced no usable address.
    DnsGeneric = (1004, "dns_lookup_error", Resolution),
    /// Unmapped network failure.
    Network = (1011, "generic_network_error", Transport),
    /// Address family not supported.
    AddressFamilyNotSupported = (1029, "address_family_not_supported", Transport),
    /// Address in use.
    AddressInUse = (1030, "address_in_use", Transport),
    /// Address not available.
    AddressNotAvailable = (1031, "address_not_available", Transport),
    /// Broken pipe.
    BrokenPipe = (1035, "broken_pipe", Transport),
    /// Connection aborted.
    ConnectionAborted = (1036, "connection_aborted", Transport),
    /// Connection refused.
    ConnectionRefused = (1038, "connection_refused", Transport),
    /// Connection reset by peer.
    ConnectionReset = (1039, "connection_reset", Transport),
    /// Host unreachable.
    HostUnreachable = (1041, "host_unreachable", Transport),
    /// Interrupted system call.
    Interrupted = (1042, "interrupted", Transport),
    /// Invalid argument.
    InvalidArgument = (1043, "invalid_argument", Transport),
    /// Network down.
    NetworkDown = (1045, "network_down", Transport),
    /// Network unreachable.
    NetworkUnreachable = (1047, "network_unreachable", Transport),
    /// Socket not connected.
    NotConnected = (1051, "not_connected", Transport),
    /// Operation would block.
    OperationWouldBlock = (1052, "operation_would_block", Transport),
    /// Permission denied.
    PermissionDenied = (1053, "permission_denied", Transport),
    /// Connect or read timed out at the socket level.
    TimedOut = (1056, "timed_out", Transport),

    /// Malformed query.
    DnsFormat = (2000, "dns_lookup_error", Resolution),
    /// Server failure.
    DnsServerFailed = (2001, "dns_lookup_error", Resolution),
    /// Name does not exist.
    DnsNotExist = (2002, "dns_lookup_error", Resolution),
    /// Query kind not implemented by the server.
    DnsNotImplemented = (2003, "dns_lookup_error", Resolution),
    /// Query refused.
    DnsRefused = (2004, "dns_lookup_error", Resolution),
    /// Truncated reply.
    DnsTruncated = (2005, "dns_lookup_error", Resolution),
    /// Unknown DNS failure.
    DnsUnknown = (2006, "dns_unknown_error", Resolution),
    /// Reply carried no records of the requested type.
    DnsNoData = (2010, "dns_no_data", Resolution),
    /// Unsupported query class.
    DnsUnsupportedClass = (2013, "dns_unsupported_class", Resolution),
    /// Generic resolver failure.
    DnsResolver = (2015, "dns_resolver_error", Resolution),
    /// Unsupported query type.
    DnsUnsupportedType = (2016, "dns_unsupported_type", Resolution),
    /// The configured engine is unusable.
    DnsInvalidEngine = (2017, "dns_invalid_engine", Resolution),
    /// Temporary failure, try again later.
    DnsTemporaryFailure = (2018, "dns_temporary_failure", Resolution),
    /// Non-recoverable resolver failure.
    DnsNonRecoverable = (2021, "dns_non_recoverable_failure", Resolution),
    /// Host not known.
    DnsHostNotFound = (2024, "dns_host_not_found", Resolution),
    /// IPv4 (A) lookup failed; see child.
    DnsIpv4Failure = (2030, "dns_ipv4_failure", Resolution),
    /// IPv6 (AAAA) lookup failed; see child.
    DnsIpv6Failure = (2031, "dns_ipv6_failure", Resolution),
    /// Both families failed; see children.
    DnsDualStackFailure = (2032, "dns_lookup_error", Aggregate),

    /// `write_entry` or `close` before `open`.
    ReportNotOpen = (7000, "report_not_open", Report),
    /// `open` called twice.
    ReportAlreadyOpen = (7001, "report_already_open", Report),
    /// Operation after `close`.
    ReportAlreadyClosed = (7002, "report_already_closed", Report),
    /// Same entry submitted twice in a row.
    DuplicateEntrySubmit = (7003, "duplicate_entry_submit", Report),
    /// The sink failed to persist an entry.
    ReportWrite = (7004, "report_write_error", Report),
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.reason(), self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn codes_are_unique() {
        let mut seen = HashSet::new();
        for kind in ErrorKind::ALL {
            assert!(seen.insert(kind.code()), "duplicate code {}", kind.code());
        }
    }

    #[test]
    fn from_code_roundtrips_every_kind() {
        for kind in ErrorKind::ALL {
            assert_eq!(ErrorKind::from_code(kind.code()), Some(*kind));
        }
        assert_eq!(ErrorKind::from_code(4242), None);
    }

    #[test]
    fn subsystem_ranges() {
        assert_eq!(ErrorKind::ConnectionRefused.code(), NET_BASE + 38);
        assert_eq!(ErrorKind::DnsResolver.code(), DNS_BASE + 15);
        assert_eq!(ErrorKind::ReportNotOpen.code(), REPORT_BASE);
    }

    #[test]
    fn only_configuration_and_state_are_fatal() {
        assert!(ErrorKind::Configuration.category().is_fatal());
        assert!(ErrorKind::IllegalState.category().is_fatal());
        assert!(!ErrorKind::Timeout.category().is_fatal());
        assert!(!ErrorKind::ParallelOperation.category().is_fatal());
    }
}
