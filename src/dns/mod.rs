//! Dual-stack hostname resolution.
//!
//! [`resolve_hostname`] issues an A and an AAAA query concurrently and
//! merges them: the resolution succeeds when either family produced
//! addresses. Queries go through a [`QueryEngine`]: the system resolver by
//! default, or a UDP [`NameserverResolver`] when the `nameserver` setting is
//! present.

pub mod error;
pub mod nameserver;
pub mod system;
pub mod wire;

pub use error::DnsError;
pub use nameserver::NameserverResolver;
pub use system::SystemResolver;

use crate::combinator::{Continuation, parallel};
use crate::error::{Error, ErrorKind};
use crate::observability::Logger;
use crate::reactor::Reactor;
use crate::types::{Settings, keys};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

/// Address record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum QueryType {
    /// IPv4 address.
    A,
    /// IPv6 address.
    Aaaa,
}

impl QueryType {
    /// Wire code.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::A => 1,
            Self::Aaaa => 28,
        }
    }

    /// True when `ip` belongs to this family.
    #[must_use]
    pub const fn matches(self, ip: &IpAddr) -> bool {
        matches!((self, ip), (Self::A, IpAddr::V4(_)) | (Self::Aaaa, IpAddr::V6(_)))
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::A => "A",
            Self::Aaaa => "AAAA",
        })
    }
}

/// Addresses of one family, or why there are none.
pub type QueryResult = Result<Vec<IpAddr>, Error>;

/// Backend answering single-family address queries.
///
/// The continuation must complete on the loop thread of `reactor`, and a
/// success must carry at least one address.
pub trait QueryEngine: Send + Sync {
    /// Looks up `name` records of `qtype`.
    fn query(
        &self,
        qtype: QueryType,
        name: &str,
        reactor: &Reactor,
        logger: &Logger,
    ) -> Continuation<QueryResult>;
}

/// Picks the engine configured by `settings`.
pub fn engine_for(settings: &Settings) -> Result<Arc<dyn QueryEngine>, Error> {
    if settings.contains(keys::NAMESERVER) {
        Ok(Arc::new(NameserverResolver::from_settings(settings)?))
    } else {
        Ok(Arc::new(SystemResolver))
    }
}

/// Outcome of a dual-stack resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolveHostnameResult {
    /// Input was an IPv4 literal; no query was issued.
    pub inet_pton_ipv4: bool,
    /// Input was an IPv6 literal; no query was issued.
    pub inet_pton_ipv6: bool,
    /// Outcome of the A query.
    pub ipv4_err: Error,
    /// Outcome of the AAAA query.
    pub ipv6_err: Error,
    /// IPv4 addresses in resolver order, then IPv6 addresses in resolver
    /// order.
    pub addresses: Vec<IpAddr>,
    /// Overall outcome: failure only when both families failed.
    pub error: Error,
}

impl ResolveHostnameResult {
    /// True when at least one address was found.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_success()
    }

    fn literal(ip: IpAddr) -> Self {
        Self {
            inet_pton_ipv4: ip.is_ipv4(),
            inet_pton_ipv6: ip.is_ipv6(),
            addresses: vec![ip],
            ..Self::default()
        }
    }

    fn failed(error: Error) -> Self {
        Self {
            ipv4_err: error.clone(),
            ipv6_err: error.clone(),
            error,
            ..Self::default()
        }
    }
}

/// Resolves `hostname` with the engine selected by `settings`.
///
/// A literal address completes synchronously without any query. An invalid
/// engine configuration completes synchronously with that error.
pub fn resolve_hostname<C>(
    hostname: &str,
    settings: &Settings,
    reactor: &Reactor,
    logger: &Logger,
    cb: C,
) where
    C: FnOnce(ResolveHostnameResult) + Send + 'static,
{
    match engine_for(settings) {
        Ok(engine) => resolve_hostname_with(engine, hostname, reactor, logger, cb),
        Err(err) => {
            logger.warn(format_args!("resolve_hostname: {err}"));
            cb(ResolveHostnameResult::failed(err));
        }
    }
}

/// [`resolve_hostname`] over an explicit engine.
pub fn resolve_hostname_with<C>(
    engine: Arc<dyn QueryEngine>,
    hostname: &str,
    reactor: &Reactor,
    logger: &Logger,
    cb: C,
) where
    C: FnOnce(ResolveHostnameResult) + Send + 'static,
{
    logger.debug(format_args!("resolve_hostname: {hostname}"));
    if let Ok(ip) = hostname.parse::<IpAddr>() {
        logger.debug(format_args!("resolve_hostname: {hostname} is a literal address"));
        cb(ResolveHostnameResult::literal(ip));
        return;
    }

    let slots: Arc<Mutex<[Option<QueryResult>; 2]>> = Arc::new(Mutex::new([None, None]));
    let family = |index: usize, qtype: QueryType| {
        let slots = Arc::clone(&slots);
        let done_logger = logger.clone();
        engine
            .query(qtype, hostname, reactor, logger)
            .map(move |result| {
                let result = result.and_then(|addrs| {
                    if addrs.is_empty() {
                        Err(Error::from(ErrorKind::DnsNoData))
                    } else {
                        Ok(addrs)
                    }
                });
                done_logger.debug(format_args!("resolve_hostname: {qtype} done"));
                let status = result.as_ref().err().cloned().unwrap_or_default();
                slots.lock()[index] = Some(result);
                status
            })
    };
    let queries = vec![family(0, QueryType::A), family(1, QueryType::Aaaa)];

    parallel(
        queries,
        move |_| {
            let [v4, v6] = std::mem::take(&mut *slots.lock());
            cb(merge(v4, v6));
        },
        2,
    );
}

fn merge(v4: Option<QueryResult>, v6: Option<QueryResult>) -> ResolveHostnameResult {
    let missing = || Err(Error::from(ErrorKind::DnsResolver));
    let v4 = v4.unwrap_or_else(missing);
    let v6 = v6.unwrap_or_else(missing);
    let mut result = ResolveHostnameResult::default();
    match v4 {
        Ok(addrs) => result.addresses.extend(addrs),
        Err(err) => result.ipv4_err = err,
    }
    match v6 {
        Ok(addrs) => result.addresses.extend(addrs),
        Err(err) => result.ipv6_err = err,
    }
    if result.ipv4_err.is_error() && result.ipv6_err.is_error() {
        result.error = Error::from(ErrorKind::DnsDualStackFailure)
            .with_child(Error::from(ErrorKind::DnsIpv4Failure).with_child(result.ipv4_err.clone()))
            .with_child(Error::from(ErrorKind::DnsIpv6Failure).with_child(result.ipv6_err.clone()));
    }
    result
}
