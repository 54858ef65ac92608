//! Resolution through the operating system resolver.
//!
//! `getaddrinfo` blocks, so each lookup runs on the reactor's worker and its
//! result is posted back to the loop.

use super::error::DnsError;
use super::{QueryEngine, QueryResult, QueryType};
use crate::combinator::Continuation;
use crate::error::Error;
use crate::observability::Logger;
use crate::reactor::Reactor;
use std::net::{IpAddr, ToSocketAddrs};

/// Query engine backed by the system resolver.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

impl QueryEngine for SystemResolver {
    fn query(
        &self,
        qtype: QueryType,
        name: &str,
        reactor: &Reactor,
        logger: &Logger,
    ) -> Continuation<QueryResult> {
        let reactor = reactor.clone();
        let logger = logger.clone();
        let name = name.to_owned();
        Continuation::new(move |cb| {
            logger.debug(format_args!("system resolver: {qtype} {name}"));
            reactor.call_in_thread(move || lookup(&name, qtype), cb);
        })
    }
}

fn lookup(name: &str, qtype: QueryType) -> QueryResult {
    let addrs = (name, 0)
        .to_socket_addrs()
        .map_err(|e| Error::from(DnsError::from(e)))?;
    let found: Vec<IpAddr> = addrs
        .map(|sa| sa.ip())
        .filter(|ip| qtype.matches(ip))
        .collect();
    if found.is_empty() {
        return Err(DnsError::NoRecords(name.to_owned()).into());
    }
    Ok(found)
}
