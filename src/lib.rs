//! Probekit: callback-driven orchestration engine for network measurement
//! probes.
//!
//! # Overview
//!
//! Probes run on a single-threaded cooperative [`Reactor`]. Every operation
//! completes by invoking a callback exactly once; failures travel as
//! structured [`Error`] values rather than panics. Blocking calls are
//! offloaded to a bounded [`Worker`] pool and their results posted back to
//! the loop.
//!
//! # Module Structure
//!
//! - [`error`](mod@error): `Error` value and the numeric `ErrorKind` catalogue
//! - [`types`]: `Settings`, `Entry`, `LifecycleState`
//! - [`observability`]: leveled `Logger` over pluggable sinks
//! - [`reactor`]: event loop, timers, cancellation handles
//! - [`worker`]: background threads for blocking calls
//! - [`combinator`]: `Continuation`, `parallel`, `sequence`, timeouts
//! - [`engine`]: background `Async` engine, `Runner`, configuration
//! - [`runnable`]: probe lifecycle and built-in probes
//! - [`dns`]: dual-stack hostname resolution
//! - [`report`]: reporter contract and in-memory reporter
//!
//! # Example
//!
//! ```no_run
//! use probekit::{Async, ProbeKind, Runnable, Settings};
//! use std::sync::Arc;
//!
//! let engine = Async::new();
//! let runnable = Runnable::from_kind(ProbeKind::DnsLookup, Settings::new())
//!     .with_inputs(["example.org"]);
//! engine
//!     .run_test(Arc::new(runnable), |r| println!("{:?}", r.entries()))
//!     .expect("engine thread");
//! engine.join().expect("join");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_inception)]
#![allow(clippy::doc_markdown)]

pub mod combinator;
pub mod dns;
pub mod engine;
pub mod error;
pub mod observability;
pub mod reactor;
pub mod report;
pub mod runnable;
pub mod types;
pub mod worker;

pub use combinator::{Callback, Continuation, parallel, sequence};
pub use dns::{QueryEngine, QueryType, ResolveHostnameResult, resolve_hostname};
pub use engine::{Async, EngineConfig, EngineError, RunPolicy, Runner};
pub use error::{Error, ErrorCategory, ErrorKind};
pub use observability::{LogLevel, Logger};
pub use reactor::{Reactor, TaskHandle};
pub use report::{MemoryReporter, Reporter};
pub use runnable::{Probe, ProbeKind, Runnable};
pub use types::{Entry, LifecycleState, Settings};
pub use worker::Worker;
