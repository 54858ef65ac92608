//! Background engine running probes on a dedicated loop thread.
//!
//! An [`Async`] owns one [`Reactor`] and the thread driving it. Every
//! runnable handed to [`Async::run_test`] has its whole lifecycle scheduled
//! on that reactor, so probes interleave cooperatively on one thread.
//! [`Async::join`] blocks until every submitted runnable has completed and
//! then stops the thread; the next submission starts it again.
//!
//! [`Runner`] sits on top of an engine and decides whether the runnables it
//! is given overlap.

pub mod config;
pub mod runner;

pub use config::{ConfigError, EngineConfig, RunPolicy};
pub use runner::Runner;

use crate::observability::Logger;
use crate::reactor::Reactor;
use crate::runnable::Runnable;
use crate::worker::Worker;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

static GLOBAL: Mutex<Option<Async>> = Mutex::new(None);

/// How often `join` checks that the loop thread is still alive.
const LIVENESS_POLL: Duration = Duration::from_millis(50);

/// Misuse of an [`Async`] engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// `join` would wait for the very thread it runs on.
    #[error("join called from the engine loop thread")]
    JoinFromLoopThread,
    /// The loop thread could not be spawned.
    #[error("cannot spawn loop thread: {0}")]
    Spawn(String),
    /// A callback panicked on the loop thread. Runnables still in flight
    /// at that point are abandoned without completion.
    #[error("engine loop thread panicked")]
    LoopPanicked,
    /// The runnable is already bound to a reactor this engine does not run.
    #[error("{0} is bound to another reactor")]
    ForeignReactor(String),
    /// The configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Handle to a background engine. Clones share the same loop.
#[derive(Clone)]
pub struct Async {
    inner: Arc<Inner>,
}

struct Inner {
    reactor: Reactor,
    config: EngineConfig,
    logger: Logger,
    in_flight: Mutex<usize>,
    /// Bumped when in-flight work is abandoned; stale completions are ignored.
    epoch: AtomicU64,
    idle: Condvar,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn finish_one(&self, epoch: u64) {
        let mut in_flight = self.in_flight.lock();
        if self.epoch.load(Ordering::Acquire) != epoch {
            return;
        }
        *in_flight -= 1;
        if *in_flight == 0 {
            self.idle.notify_all();
        }
    }

    /// Starts the loop thread unless one is alive. Called with the thread
    /// slot locked.
    fn ensure_thread(&self, slot: &mut Option<JoinHandle<()>>) -> Result<(), EngineError> {
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return Ok(());
        }
        if let Some(stale) = slot.take() {
            if stale.join().is_err() {
                self.logger.error("previous loop thread panicked");
            }
        }
        let reactor = self.reactor.clone();
        let handle = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || reactor.run())
            .map_err(|e| EngineError::Spawn(e.to_string()))?;
        tracing::debug!(thread = %self.config.thread_name, "engine loop thread started");
        *slot = Some(handle);
        Ok(())
    }

    fn stop_thread(&self, slot: &mut Option<JoinHandle<()>>) -> Result<(), EngineError> {
        let Some(handle) = slot.take() else {
            return Ok(());
        };
        if !handle.is_finished() {
            self.reactor.stop();
        }
        let joined = handle.join();
        tracing::debug!(thread = %self.config.thread_name, "engine loop thread joined");
        joined.map_err(|_| EngineError::LoopPanicked)
    }

    /// Forgets the work a dead loop thread left behind so the engine can
    /// start over.
    fn abandon(&self, slot: &mut Option<JoinHandle<()>>, pending: usize) -> EngineError {
        if let Some(handle) = slot.take() {
            let _ = handle.join();
        }
        self.reactor.clear();
        self.logger.error(format_args!(
            "loop thread died with {pending} runnable(s) in flight"
        ));
        let mut in_flight = self.in_flight.lock();
        self.epoch.fetch_add(1, Ordering::AcqRel);
        *in_flight = 0;
        self.idle.notify_all();
        EngineError::LoopPanicked
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let Some(handle) = self.thread.get_mut().take() else {
            return;
        };
        self.reactor.stop();
        if handle.thread().id() != thread::current().id() {
            let _ = handle.join();
        }
    }
}

impl Async {
    /// Engine with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::build(EngineConfig::default(), Logger::default())
    }

    /// Engine with `config`.
    pub fn with_config(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self::build(config, Logger::default()))
    }

    fn build(config: EngineConfig, logger: Logger) -> Self {
        let worker = Worker::with_thread_name(
            config.worker_parallelism,
            format!("{}-worker", config.thread_name),
        );
        Self {
            inner: Arc::new(Inner {
                reactor: Reactor::with_worker(worker),
                logger: logger.with_component("engine"),
                config,
                in_flight: Mutex::new(0),
                epoch: AtomicU64::new(0),
                idle: Condvar::new(),
                thread: Mutex::new(None),
            }),
        }
    }

    /// Engine with `config` logging through `logger`.
    pub fn with_config_and_logger(config: EngineConfig, logger: Logger) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self::build(config, logger))
    }

    /// The process-wide engine, created on first use from the environment
    /// configuration. Falls back to defaults when the environment is
    /// malformed.
    #[must_use]
    pub fn global() -> Self {
        GLOBAL
            .lock()
            .get_or_insert_with(|| match EngineConfig::from_env() {
                Ok(config) if config.validate().is_ok() => {
                    Self::build(config, Logger::default())
                }
                _ => {
                    tracing::warn!("ignoring malformed PROBEKIT_* environment");
                    Self::new()
                }
            })
            .clone()
    }

    /// Joins and drops the process-wide engine; the next
    /// [`Async::global`] call creates a fresh one.
    pub fn reset_global() -> Result<(), EngineError> {
        let engine = GLOBAL.lock().take();
        engine.map_or(Ok(()), |engine| engine.join())
    }

    /// The loop every runnable of this engine runs on.
    #[must_use]
    pub fn reactor(&self) -> &Reactor {
        &self.inner.reactor
    }

    /// Configuration of this engine.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// A runner over this engine using the configured policy.
    #[must_use]
    pub fn runner(&self) -> Runner {
        Runner::new(self.clone(), self.inner.config.run_policy)
    }

    /// Schedules the lifecycle of `runnable` (`begin`, then `main`, then
    /// `end`) and calls `on_done` on the loop thread once it completes.
    ///
    /// When `begin` fails, `main` and `end` are skipped and `on_done` runs
    /// right away; the runnable carries the error.
    pub fn run_test<F>(&self, runnable: Arc<Runnable>, on_done: F) -> Result<(), EngineError>
    where
        F: FnOnce(Arc<Runnable>) + Send + 'static,
    {
        if !runnable.attach_reactor(&self.inner.reactor)
            && !runnable
                .reactor()
                .is_some_and(|bound| bound.same_as(&self.inner.reactor))
        {
            return Err(EngineError::ForeignReactor(runnable.descriptor().name.clone()));
        }
        let mut slot = self.inner.thread.lock();
        self.inner.ensure_thread(&mut slot)?;
        let epoch = {
            let mut in_flight = self.inner.in_flight.lock();
            *in_flight += 1;
            self.inner.epoch.load(Ordering::Acquire)
        };

        let inner = Arc::clone(&self.inner);
        let complete = move |runnable: Arc<Runnable>| {
            on_done(runnable);
            inner.finish_one(epoch);
        };
        let logger = self.inner.logger.clone();
        self.inner.reactor.schedule_now(move || {
            logger.debug(format_args!("running {}", runnable.descriptor().name));
            let r = Arc::clone(&runnable);
            runnable.begin(move |err| {
                if err.is_error() {
                    complete(r);
                    return;
                }
                let r2 = Arc::clone(&r);
                r.main(move |_| {
                    let r3 = Arc::clone(&r2);
                    r2.end(move |_| complete(r3));
                });
            });
        });
        drop(slot);
        Ok(())
    }

    /// True when no submitted runnable is still in flight.
    #[must_use]
    pub fn empty(&self) -> bool {
        *self.inner.in_flight.lock() == 0
    }

    /// Runnables submitted but not yet completed.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        *self.inner.in_flight.lock()
    }

    /// Blocks until every submitted runnable has completed, then stops the
    /// loop thread and waits for it to exit.
    ///
    /// If the loop thread dies with work in flight, the remaining runnables
    /// are dropped without completion and `join` returns
    /// [`EngineError::LoopPanicked`]. The engine stays usable.
    pub fn join(&self) -> Result<(), EngineError> {
        if self.inner.reactor.is_loop_thread() {
            return Err(EngineError::JoinFromLoopThread);
        }
        loop {
            {
                let mut in_flight = self.inner.in_flight.lock();
                if *in_flight > 0 {
                    self.inner.idle.wait_for(&mut in_flight, LIVENESS_POLL);
                }
            }
            let mut slot = self.inner.thread.lock();
            // Re-read under the slot lock: a submission may have slipped in.
            let pending = *self.inner.in_flight.lock();
            if pending == 0 {
                return self.inner.stop_thread(&mut slot);
            }
            if slot.as_ref().is_some_and(JoinHandle::is_finished) {
                return Err(self.inner.abandon(&mut slot, pending));
            }
        }
    }

    /// True when both handles refer to the same engine.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Async {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Async {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Async")
            .field("thread_name", &self.inner.config.thread_name)
            .field("in_flight", &self.in_flight())
            .field("reactor", &self.inner.reactor)
            .finish()
    }
}
