//! Built-in probes and the registry selecting them by name.

use super::probe::{Probe, ProbeContext, ProbeDescriptor};
use crate::combinator::Callback;
use crate::dns::{self, NameserverResolver, ResolveHostnameResult};
use crate::error::{Error, ErrorKind};
use crate::types::settings::DEFAULT_NET_TIMEOUT;
use crate::types::{Entry, Settings, keys};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::net::{SocketAddr, TcpStream};
use std::str::FromStr;
use std::time::Duration;

/// Delay before [`NoopProbe`] completes by default.
pub const NOOP_DELAY: Duration = Duration::from_millis(740);

/// Registry of built-in probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeKind {
    /// Completes after a short delay with empty test keys.
    Noop,
    /// Dual-stack resolution of the input hostname.
    DnsLookup,
    /// Resolution of `host:port` followed by TCP connects.
    TcpConnect,
}

impl ProbeKind {
    /// Every registered kind.
    pub const ALL: [Self; 3] = [Self::Noop, Self::DnsLookup, Self::TcpConnect];

    /// Registry name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Noop => "noop",
            Self::DnsLookup => "dns_lookup",
            Self::TcpConnect => "tcp_connect",
        }
    }

    /// Instantiates the probe.
    #[must_use]
    pub fn into_probe(self) -> Box<dyn Probe> {
        match self {
            Self::Noop => Box::new(NoopProbe::default()),
            Self::DnsLookup => Box::new(DnsLookupProbe),
            Self::TcpConnect => Box::new(TcpConnectProbe),
        }
    }
}

impl FromStr for ProbeKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| Error::with_detail(ErrorKind::Value, format!("unknown probe {s}")))
    }
}

/// Probe doing no I/O: completes after a delay with an empty entry.
#[derive(Debug, Clone, Copy)]
pub struct NoopProbe {
    delay: Duration,
}

impl NoopProbe {
    /// Completes after `delay` instead of [`NOOP_DELAY`].
    #[must_use]
    pub const fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for NoopProbe {
    fn default() -> Self {
        Self::with_delay(NOOP_DELAY)
    }
}

impl Probe for NoopProbe {
    fn descriptor(&self) -> ProbeDescriptor {
        ProbeDescriptor::new(ProbeKind::Noop.name(), "0.1.0", false)
    }

    fn main(&self, ctx: ProbeContext, _input: String, _settings: Settings, cb: Callback<Entry>) {
        ctx.reactor.schedule_after(self.delay, move || cb(Entry::new()));
    }
}

/// Resolves the input over both address families.
#[derive(Debug, Clone, Copy, Default)]
pub struct DnsLookupProbe;

fn resolver_name(settings: &Settings) -> Value {
    settings
        .get_str(keys::NAMESERVER)
        .map_or_else(|| json!("system"), |ns| json!(ns))
}

fn failure_of(err: &Error) -> Value {
    err.failure_string().map_or(Value::Null, Value::String)
}

fn resolution_keys(result: &ResolveHostnameResult) -> Value {
    json!({
        "addresses": result.addresses,
        "inet_pton_ipv4": result.inet_pton_ipv4,
        "inet_pton_ipv6": result.inet_pton_ipv6,
        "ipv4_failure": failure_of(&result.ipv4_err),
        "ipv6_failure": failure_of(&result.ipv6_err),
    })
}

fn validate_resolver(settings: &Settings) -> Result<(), Error> {
    if settings.contains(keys::NAMESERVER) {
        NameserverResolver::from_settings(settings)?;
    }
    Ok(())
}

impl Probe for DnsLookupProbe {
    fn descriptor(&self) -> ProbeDescriptor {
        ProbeDescriptor::new(ProbeKind::DnsLookup.name(), "0.1.0", true)
    }

    fn validate(&self, settings: &Settings) -> Result<(), Error> {
        validate_resolver(settings)
    }

    fn main(&self, ctx: ProbeContext, input: String, settings: Settings, cb: Callback<Entry>) {
        let resolver = resolver_name(&settings);
        dns::resolve_hostname(&input, &settings, &ctx.reactor, &ctx.logger, move |result| {
            let mut entry = Entry::new();
            entry.test_keys = resolution_keys(&result);
            entry.set_key("resolver", resolver);
            entry.set_failure(&result.error);
            cb(entry);
        });
    }
}

/// Resolves `host:port` and connects to each address in order until one
/// accepts.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnectProbe;

/// Splits `host:port`, accepting `[v6]:port`.
fn split_host_port(input: &str) -> Result<(String, u16), Error> {
    let malformed = || Error::with_detail(ErrorKind::Value, format!("expected host:port, got {input}"));
    let (host, port) = if let Some(rest) = input.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or_else(malformed)?;
        (host, tail.strip_prefix(':').ok_or_else(malformed)?)
    } else {
        let (host, port) = input.rsplit_once(':').ok_or_else(malformed)?;
        if host.contains(':') {
            return Err(malformed());
        }
        (host, port)
    };
    if host.is_empty() {
        return Err(malformed());
    }
    let port = port.parse().map_err(|_| malformed())?;
    Ok((host.to_owned(), port))
}

struct ConnectOutcome {
    attempts: Vec<Value>,
    error: Error,
}

fn connect_each(
    ctx: ProbeContext,
    mut pending: VecDeque<SocketAddr>,
    timeout: Duration,
    mut outcome: ConnectOutcome,
    cb: Callback<ConnectOutcome>,
) {
    let Some(addr) = pending.pop_front() else {
        cb(outcome);
        return;
    };
    ctx.logger.debug(format_args!("tcp_connect: trying {addr}"));
    let reactor = ctx.reactor.clone();
    reactor.call_in_thread(
        move || TcpStream::connect_timeout(&addr, timeout).map(drop),
        move |result| {
            let failure = result.err().map(Error::from);
            outcome.attempts.push(json!({
                "ip": addr.ip(),
                "port": addr.port(),
                "status": {
                    "success": failure.is_none(),
                    "failure": failure.as_ref().map_or(Value::Null, failure_of),
                },
            }));
            match failure {
                None => {
                    outcome.error = Error::success();
                    cb(outcome);
                }
                Some(err) => {
                    outcome.error = outcome.error.with_child(err);
                    connect_each(ctx, pending, timeout, outcome, cb);
                }
            }
        },
    );
}

impl Probe for TcpConnectProbe {
    fn descriptor(&self) -> ProbeDescriptor {
        ProbeDescriptor::new(ProbeKind::TcpConnect.name(), "0.1.0", true)
    }

    fn validate(&self, settings: &Settings) -> Result<(), Error> {
        settings.get_timeout_or(keys::NET_TIMEOUT, DEFAULT_NET_TIMEOUT)?;
        validate_resolver(settings)
    }

    fn main(&self, ctx: ProbeContext, input: String, settings: Settings, cb: Callback<Entry>) {
        let (host, port) = match split_host_port(&input) {
            Ok(parts) => parts,
            Err(err) => {
                let mut entry = Entry::new();
                entry.set_failure(&err);
                cb(entry);
                return;
            }
        };
        let timeout = match settings.get_timeout_or(keys::NET_TIMEOUT, DEFAULT_NET_TIMEOUT) {
            Ok(timeout) => timeout,
            Err(err) => {
                let mut entry = Entry::new();
                entry.set_failure(&err);
                cb(entry);
                return;
            }
        };
        let reactor = ctx.reactor.clone();
        let logger = ctx.logger.clone();
        dns::resolve_hostname(&host, &settings, &reactor, &logger, move |resolved| {
            let mut entry = Entry::new();
            entry.set_key("resolver", resolution_keys(&resolved));
            if resolved.error.is_error() {
                entry.set_failure(&resolved.error);
                cb(entry);
                return;
            }
            let pending = resolved
                .addresses
                .iter()
                .map(|ip| SocketAddr::new(*ip, port))
                .collect();
            let outcome = ConnectOutcome {
                attempts: Vec::new(),
                error: ErrorKind::ConnectFailed.into(),
            };
            connect_each(
                ctx,
                pending,
                timeout,
                outcome,
                Box::new(move |outcome| {
                    entry.set_key("connect", outcome.attempts);
                    entry.set_failure(&outcome.error);
                    cb(entry);
                }),
            );
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_round_trips_names() {
        for kind in ProbeKind::ALL {
            assert_eq!(kind.name().parse::<ProbeKind>(), Ok(kind));
            assert_eq!(kind.into_probe().descriptor().name, kind.name());
        }
        assert!("web_connectivity".parse::<ProbeKind>().is_err());
    }

    #[test]
    fn only_noop_runs_without_input() {
        assert!(!ProbeKind::Noop.into_probe().descriptor().needs_input);
        assert!(ProbeKind::DnsLookup.into_probe().descriptor().needs_input);
        assert!(ProbeKind::TcpConnect.into_probe().descriptor().needs_input);
    }

    #[test]
    fn dns_lookup_rejects_oversized_timeout() {
        let settings = Settings::new()
            .with(keys::NAMESERVER, "127.0.0.1")
            .with(keys::DNS_TIMEOUT, "1e300");
        let err = DnsLookupProbe.validate(&settings).unwrap_err();
        assert!(err.is(ErrorKind::Configuration));
    }

    #[test]
    fn host_port_forms() {
        assert_eq!(split_host_port("example.com:80"), Ok(("example.com".into(), 80)));
        assert_eq!(split_host_port("[::1]:443"), Ok(("::1".into(), 443)));
        assert!(split_host_port("::1:443").is_err());
        assert!(split_host_port("example.com").is_err());
        assert!(split_host_port(":80").is_err());
        assert!(split_host_port("example.com:http").is_err());
    }

    #[test]
    fn tcp_connect_rejects_bad_timeout() {
        for raw in ["0", "1e300", "inf"] {
            let settings = Settings::new().with(keys::NET_TIMEOUT, raw);
            let err = TcpConnectProbe.validate(&settings).unwrap_err();
            assert!(err.is(ErrorKind::Configuration), "{raw}");
        }
        assert!(TcpConnectProbe.validate(&Settings::new()).is_ok());
    }
}
