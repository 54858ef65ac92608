//! Probe lifecycle state machine.
//!
//! A [`Runnable`] wraps one [`Probe`] with its settings, inputs and
//! optional reporter, and moves through `Created -> Running -> Finished`:
//!
//! - [`Runnable::begin`] validates settings and opens the reporter. On
//!   failure the runnable goes straight to `Finished` and `main` must not
//!   run.
//! - [`Runnable::main`] measures every input, at most `parallelism` at a
//!   time, and writes each entry to the reporter.
//! - [`Runnable::end`] closes the reporter and records the runtime.
//!
//! Runnables are shared as `Arc<Runnable>`; lifecycle state sits behind a
//! mutex but is only touched from the loop thread running the probe.

pub mod probe;
pub mod probes;

pub use probe::{Probe, ProbeContext, ProbeDescriptor};
pub use probes::{DnsLookupProbe, NOOP_DELAY, NoopProbe, ProbeKind, TcpConnectProbe};

use crate::combinator::{Callback, Continuation, parallel};
use crate::error::{Error, ErrorKind};
use crate::observability::Logger;
use crate::reactor::Reactor;
use crate::report::Reporter;
use crate::types::{Entry, LifecycleState, Settings, keys, now_timestamp};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

/// Options of one run, parsed from settings by `begin`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct RunOptions {
    parallelism: usize,
    max_runtime: Option<f64>,
    ignore_write_entry_error: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            parallelism: 1,
            max_runtime: None,
            ignore_write_entry_error: true,
        }
    }
}

impl RunOptions {
    fn from_settings(settings: &Settings) -> Result<Self, Error> {
        let parallelism: usize = settings.get_or(keys::PARALLELISM, 1)?;
        let max_runtime: Option<f64> = settings.get(keys::MAX_RUNTIME)?;
        Ok(Self {
            parallelism: parallelism.max(1),
            // A negative limit means unlimited.
            max_runtime: max_runtime.filter(|limit| *limit >= 0.0),
            ignore_write_entry_error: settings.get_bool_or(keys::IGNORE_WRITE_ENTRY_ERROR, true)?,
        })
    }

    /// Runtime after which no new input starts. A tenth of the limit is
    /// kept as slack for the measurements already in flight.
    fn exceeded(&self, elapsed: Duration) -> bool {
        self.max_runtime
            .is_some_and(|limit| elapsed.as_secs_f64() > limit - limit / 10.0)
    }
}

#[derive(Debug, Default)]
struct RunState {
    lifecycle: LifecycleState,
    error: Error,
    options: RunOptions,
    entries: Vec<Entry>,
    started: Option<Instant>,
    runtime: Option<Duration>,
}

/// One schedulable probe execution.
pub struct Runnable {
    descriptor: ProbeDescriptor,
    probe: Box<dyn Probe>,
    settings: Settings,
    inputs: Vec<String>,
    annotations: BTreeMap<String, String>,
    logger: Logger,
    reporter: Option<Arc<dyn Reporter>>,
    reactor: OnceLock<Reactor>,
    state: Mutex<RunState>,
}

impl Runnable {
    /// Wraps `probe` configured by `settings`.
    pub fn new<P: Probe + 'static>(probe: P, settings: Settings) -> Self {
        Self::from_boxed(Box::new(probe), settings)
    }

    /// Instantiates a registered probe.
    #[must_use]
    pub fn from_kind(kind: ProbeKind, settings: Settings) -> Self {
        Self::from_boxed(kind.into_probe(), settings)
    }

    fn from_boxed(probe: Box<dyn Probe>, settings: Settings) -> Self {
        let descriptor = probe.descriptor();
        let logger = Logger::default().with_component(&descriptor.name);
        Self {
            descriptor,
            probe,
            settings,
            inputs: Vec::new(),
            annotations: BTreeMap::new(),
            logger,
            reporter: None,
            reactor: OnceLock::new(),
            state: Mutex::new(RunState::default()),
        }
    }

    /// Sets the inputs; each produces one entry.
    #[must_use]
    pub fn with_inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    /// Adds an annotation copied into every entry.
    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Replaces the logger.
    #[must_use]
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Sends entries to `reporter`.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Binds the runnable to `reactor`. Only the first call has an effect;
    /// returns whether this call did.
    pub fn attach_reactor(&self, reactor: &Reactor) -> bool {
        self.reactor.set(reactor.clone()).is_ok()
    }

    /// Reactor the runnable is bound to, if any.
    pub fn reactor(&self) -> Option<Reactor> {
        self.reactor.get().cloned()
    }

    /// Reactor measurements run on. Binds to the global reactor when
    /// nothing was attached before the first measurement.
    fn loop_reactor(&self) -> Reactor {
        self.reactor.get_or_init(Reactor::global).clone()
    }

    /// Name, version and input requirement.
    pub const fn descriptor(&self) -> &ProbeDescriptor {
        &self.descriptor
    }

    /// Settings supplied at construction.
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Inputs supplied at construction.
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    /// Logger.
    pub const fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.state.lock().lifecycle
    }

    /// First failure recorded by the lifecycle, success otherwise.
    pub fn error(&self) -> Error {
        self.state.lock().error.clone()
    }

    /// Entries produced so far.
    pub fn entries(&self) -> Vec<Entry> {
        self.state.lock().entries.clone()
    }

    /// Time between `begin` and `end`, once finished.
    pub fn runtime(&self) -> Option<Duration> {
        self.state.lock().runtime
    }

    fn validate(&self) -> Result<RunOptions, Error> {
        if self.descriptor.needs_input && self.inputs.is_empty() {
            return Err(Error::with_detail(
                ErrorKind::Configuration,
                format!("{} needs input", self.descriptor.name),
            ));
        }
        for key in self.probe.mandatory_settings() {
            self.settings.require(key)?;
        }
        let options = RunOptions::from_settings(&self.settings)?;
        self.probe.validate(&self.settings)?;
        Ok(options)
    }

    fn finish_with(&self, err: &Error) {
        let mut st = self.state.lock();
        st.lifecycle = LifecycleState::Finished;
        if st.error.is_success() {
            st.error = err.clone();
        }
        st.runtime = st.started.map(|s| s.elapsed());
    }

    /// Validates settings and opens the reporter, then moves to `Running`.
    ///
    /// On failure the runnable is `Finished` with the error, and `cb`
    /// receives it. Calling `begin` twice completes with `illegal_state`.
    pub fn begin<C>(self: &Arc<Self>, cb: C)
    where
        C: FnOnce(Error) + Send + 'static,
    {
        let current = self.state();
        if current != LifecycleState::Created {
            cb(Error::with_detail(
                ErrorKind::IllegalState,
                format!("begin invoked in state {current}"),
            ));
            return;
        }
        let options = match self.validate() {
            Ok(options) => options,
            Err(err) => {
                self.logger.warn(format_args!("invalid settings: {err}"));
                self.finish_with(&err);
                cb(err);
                return;
            }
        };
        {
            let mut st = self.state.lock();
            st.lifecycle = LifecycleState::Running;
            st.options = options;
            st.started = Some(Instant::now());
        }
        self.logger.debug("begin");

        let Some(reporter) = &self.reporter else {
            cb(Error::success());
            return;
        };
        let this = Arc::clone(self);
        reporter.open().run(move |err| {
            if err.is_error() {
                this.logger.warn(format_args!("cannot open report: {err}"));
                this.finish_with(&err);
            }
            cb(err);
        });
    }

    /// Measures every input and completes with the aggregate of the
    /// per-input outcomes.
    ///
    /// # Panics
    ///
    /// Panics unless the runnable is `Running`: calling `main` before a
    /// successful `begin`, or after `end`, is a scheduling bug.
    pub fn main<C>(self: &Arc<Self>, cb: C)
    where
        C: FnOnce(Error) + Send + 'static,
    {
        let options = {
            let st = self.state.lock();
            assert!(
                st.lifecycle == LifecycleState::Running,
                "main invoked in state {}",
                st.lifecycle
            );
            st.options
        };
        let inputs = if self.inputs.is_empty() {
            vec![String::new()]
        } else {
            self.inputs.clone()
        };
        let halted = Arc::new(AtomicBool::new(false));
        let measurements = inputs
            .into_iter()
            .map(|input| {
                let this = Arc::clone(self);
                let halted = Arc::clone(&halted);
                Continuation::new(move |done: Callback<Error>| {
                    this.measure(input, options, &halted, done);
                })
            })
            .collect();

        let this = Arc::clone(self);
        parallel(
            measurements,
            move |err| {
                if err.is_error() {
                    this.logger.warn(format_args!("measurements failed: {err}"));
                    let mut st = this.state.lock();
                    if st.error.is_success() {
                        st.error = err.clone();
                    }
                }
                cb(err);
            },
            options.parallelism,
        );
    }

    fn measure(
        self: &Arc<Self>,
        input: String,
        options: RunOptions,
        halted: &Arc<AtomicBool>,
        done: Callback<Error>,
    ) {
        if halted.load(Ordering::Acquire) {
            done(Error::success());
            return;
        }
        let elapsed = self.state.lock().started.map(|s| s.elapsed());
        if elapsed.is_some_and(|e| options.exceeded(e)) {
            self.logger.info("exceeded maximum runtime");
            done(Error::success());
            return;
        }
        if !input.is_empty() {
            self.logger.info(format_args!("processing input: {input}"));
        }

        let start_time = now_timestamp();
        let started = Instant::now();
        let ctx = ProbeContext {
            reactor: self.loop_reactor(),
            logger: self.logger.clone(),
        };
        let this = Arc::clone(self);
        let halted = Arc::clone(halted);
        self.probe.main(
            ctx,
            input.clone(),
            self.settings.clone(),
            Box::new(move |mut entry: Entry| {
                entry.input = (!input.is_empty()).then_some(input);
                entry.test_name.clone_from(&this.descriptor.name);
                entry.test_version.clone_from(&this.descriptor.version);
                entry.measurement_start_time = start_time;
                entry.test_runtime = started.elapsed().as_secs_f64();
                entry.annotations.extend(this.annotations.clone());
                this.state.lock().entries.push(entry.clone());
                this.write(entry, options, &halted, done);
            }),
        );
    }

    fn write(&self, entry: Entry, options: RunOptions, halted: &Arc<AtomicBool>, done: Callback<Error>) {
        let Some(reporter) = &self.reporter else {
            done(Error::success());
            return;
        };
        let logger = self.logger.clone();
        let halted = Arc::clone(halted);
        reporter.write_entry(entry).run(move |err| {
            if err.is_error() {
                logger.warn(format_args!("cannot write entry: {err}"));
                if !options.ignore_write_entry_error {
                    halted.store(true, Ordering::Release);
                    done(err);
                    return;
                }
            }
            done(Error::success());
        });
    }

    /// Closes the reporter, records the runtime and moves to `Finished`.
    ///
    /// # Panics
    ///
    /// Panics unless the runnable is `Running`.
    pub fn end<C>(self: &Arc<Self>, cb: C)
    where
        C: FnOnce(Error) + Send + 'static,
    {
        let current = self.state();
        assert!(
            current == LifecycleState::Running,
            "end invoked in state {current}"
        );
        let this = Arc::clone(self);
        let finish = move |err: Error| {
            {
                let mut st = this.state.lock();
                st.lifecycle = LifecycleState::Finished;
                st.runtime = st.started.map(|s| s.elapsed());
                if err.is_error() && st.error.is_success() {
                    st.error = err.clone();
                }
            }
            this.logger.debug("end");
            cb(err);
        };
        match &self.reporter {
            Some(reporter) => reporter.close().run(finish),
            None => finish(Error::success()),
        }
    }
}

impl fmt::Debug for Runnable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runnable")
            .field("descriptor", &self.descriptor)
            .field("inputs", &self.inputs.len())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
