//! Resolution through an explicit nameserver over UDP.

use super::error::DnsError;
use super::{QueryEngine, QueryResult, QueryType, wire};
use crate::combinator::Continuation;
use crate::error::{Error, ErrorKind};
use crate::observability::Logger;
use crate::reactor::Reactor;
use crate::types::settings::{DEFAULT_DNS_ATTEMPTS, DEFAULT_DNS_TIMEOUT};
use crate::types::{Settings, keys};
use std::io;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const DNS_PORT: u16 = 53;
const MAX_DATAGRAM: usize = 4096;

static NEXT_ID: AtomicU16 = AtomicU16::new(0);

fn next_query_id() -> u16 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.subsec_nanos());
    (nanos as u16) ^ NEXT_ID.fetch_add(0x9e37, Ordering::Relaxed)
}

/// Query engine sending one UDP query per lookup to a fixed server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameserverResolver {
    server: SocketAddr,
    timeout: Duration,
    attempts: u32,
}

impl NameserverResolver {
    /// Resolver for `server` with default timeout and attempts.
    #[must_use]
    pub fn new(server: SocketAddr) -> Self {
        Self {
            server,
            timeout: Duration::from_secs_f64(DEFAULT_DNS_TIMEOUT),
            attempts: DEFAULT_DNS_ATTEMPTS,
        }
    }

    /// Reads `nameserver`, `dns/timeout` and `dns/attempts`.
    pub fn from_settings(settings: &Settings) -> Result<Self, Error> {
        let server = parse_server(settings.require(keys::NAMESERVER)?)?;
        let timeout = settings.get_timeout_or(keys::DNS_TIMEOUT, DEFAULT_DNS_TIMEOUT)?;
        let attempts = settings.get_or(keys::DNS_ATTEMPTS, DEFAULT_DNS_ATTEMPTS)?;
        Ok(Self {
            server,
            timeout,
            attempts: attempts.max(1),
        })
    }

    /// Server address.
    #[must_use]
    pub const fn server(&self) -> SocketAddr {
        self.server
    }

    /// Per-attempt timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Attempts per query.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    fn exchange(&self, name: &str, qtype: QueryType) -> Result<Vec<IpAddr>, DnsError> {
        let id = next_query_id();
        let query = wire::encode_query(id, name, qtype)?;
        let bind: SocketAddr = if self.server.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(bind)?;
        socket.connect(self.server)?;
        socket.set_read_timeout(Some(self.timeout))?;

        let mut buf = [0u8; MAX_DATAGRAM];
        for attempt in 1..=self.attempts {
            socket.send(&query)?;
            loop {
                let len = match socket.recv(&mut buf) {
                    Ok(len) => len,
                    Err(e) if is_timeout(&e) => break,
                    Err(e) => return Err(e.into()),
                };
                let Ok(response) = wire::decode_response(&buf[..len]) else {
                    continue;
                };
                if response.id != id {
                    continue;
                }
                return addresses_of(&response, name, qtype);
            }
            tracing::trace!(attempt, server = %self.server, "dns attempt timed out");
        }
        Err(DnsError::Timeout)
    }
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

fn addresses_of(
    response: &wire::Response,
    name: &str,
    qtype: QueryType,
) -> Result<Vec<IpAddr>, DnsError> {
    if response.rcode != 0 {
        return Err(DnsError::ServerError(response.rcode));
    }
    if response.truncated {
        return Err(DnsError::Truncated);
    }
    let found = response.addresses(qtype);
    if found.is_empty() {
        return Err(DnsError::NoRecords(name.to_owned()));
    }
    Ok(found)
}

/// Accepts `ip`, `ip:port` and `[ipv6]:port`.
fn parse_server(raw: &str) -> Result<SocketAddr, Error> {
    let raw = raw.trim();
    if let Ok(addr) = raw.parse::<SocketAddr>() {
        return Ok(addr);
    }
    raw.parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, DNS_PORT))
        .map_err(|_| {
            Error::with_detail(
                ErrorKind::Configuration,
                format!("malformed setting {}={raw}", keys::NAMESERVER),
            )
        })
}

impl QueryEngine for NameserverResolver {
    fn query(
        &self,
        qtype: QueryType,
        name: &str,
        reactor: &Reactor,
        logger: &Logger,
    ) -> Continuation<QueryResult> {
        let resolver = self.clone();
        let reactor = reactor.clone();
        let logger = logger.clone();
        let name = name.to_owned();
        Continuation::new(move |cb| {
            logger.debug(format_args!("nameserver {}: {qtype} {name}", resolver.server));
            reactor.call_in_thread(
                move || resolver.exchange(&name, qtype).map_err(Error::from),
                cb,
            );
        })
    }
}
