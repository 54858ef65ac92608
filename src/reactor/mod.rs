//! Single-threaded cooperative event loop.
//!
//! A [`Reactor`] runs callbacks one at a time on whichever thread calls
//! [`Reactor::run`]. Callbacks can be posted from any thread:
//!
//! - [`Reactor::schedule_now`] appends to a FIFO ready queue.
//! - [`Reactor::schedule_after`] arms a timer and returns a [`TaskHandle`]
//!   that can cancel it before it fires. Timers with equal deadlines fire in
//!   submission order.
//!
//! Blocking work goes through [`Reactor::call_in_thread`], which runs the
//! closure on the reactor's [`Worker`] and posts the result back with
//! `schedule_now`.

mod timer;

use crate::worker::Worker;
use crossbeam_queue::SegQueue;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use timer::{TimerHeap, TimerKey};

type Job = Box<dyn FnOnce() + Send + 'static>;

static NEXT_REACTOR_ID: AtomicU64 = AtomicU64::new(1);
static GLOBAL: Mutex<Option<Reactor>> = Mutex::new(None);

/// Deadline horizon for delays too large to add to `Instant::now()`.
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 86_400);

/// When [`Reactor::run`] returns on its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    /// Only when [`Reactor::stop`] is called.
    #[default]
    UntilStopped,
    /// Also when no callback, timer or [`KeepAlive`] guard is left.
    UntilIdle,
}

/// Handle to a deferred callback, used to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle {
    reactor_id: u64,
    timer: TimerKey,
}

/// Prevents an [`RunMode::UntilIdle`] loop from exiting while held.
///
/// Work running off-loop (on a worker thread, in another process) holds a
/// guard until its completion has been posted back.
pub struct KeepAlive {
    inner: Arc<Inner>,
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        self.inner.keep_alive.fetch_sub(1, Ordering::AcqRel);
        self.inner.wake();
    }
}

impl fmt::Debug for KeepAlive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeepAlive")
            .field("reactor", &self.inner.id)
            .finish()
    }
}

/// A cloneable handle to a cooperative event loop.
#[derive(Clone)]
pub struct Reactor {
    inner: Arc<Inner>,
}

struct Inner {
    id: u64,
    ready: SegQueue<Job>,
    timers: Mutex<TimerHeap<Job>>,
    /// Set by producers after publishing work; cleared by the loop.
    notified: Mutex<bool>,
    cond: Condvar,
    stop_requested: AtomicBool,
    running: AtomicBool,
    loop_thread: Mutex<Option<ThreadId>>,
    keep_alive: AtomicUsize,
    worker: Worker,
}

impl Inner {
    fn wake(&self) {
        let mut notified = self.notified.lock();
        *notified = true;
        self.cond.notify_one();
    }

    fn is_idle(&self) -> bool {
        self.ready.is_empty()
            && self.timers.lock().is_empty()
            && self.keep_alive.load(Ordering::Acquire) == 0
    }
}

/// Clears the running flags even when a callback panics.
struct RunGuard<'a> {
    inner: &'a Inner,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        *self.inner.loop_thread.lock() = None;
        self.inner.stop_requested.store(false, Ordering::Release);
        self.inner.running.store(false, Ordering::Release);
    }
}

impl Reactor {
    /// Creates a reactor with a default [`Worker`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_worker(Worker::default())
    }

    /// Creates a reactor offloading blocking calls to `worker`.
    #[must_use]
    pub fn with_worker(worker: Worker) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: NEXT_REACTOR_ID.fetch_add(1, Ordering::Relaxed),
                ready: SegQueue::new(),
                timers: Mutex::new(TimerHeap::new()),
                notified: Mutex::new(false),
                cond: Condvar::new(),
                stop_requested: AtomicBool::new(false),
                running: AtomicBool::new(false),
                loop_thread: Mutex::new(None),
                keep_alive: AtomicUsize::new(0),
                worker,
            }),
        }
    }

    /// The process-wide reactor, created on first use.
    ///
    /// Nothing runs it implicitly: whoever uses it must also call
    /// [`Reactor::run`] somewhere.
    #[must_use]
    pub fn global() -> Self {
        GLOBAL.lock().get_or_insert_with(Self::new).clone()
    }

    /// Drops the process-wide reactor so the next [`Reactor::global`] call
    /// creates a fresh one.
    pub fn reset_global() {
        GLOBAL.lock().take();
    }

    /// Runs `job` on the next loop iteration, after every job already queued.
    pub fn schedule_now<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.ready.push(Box::new(job));
        self.inner.wake();
    }

    /// Runs `job` once at least `delay` has elapsed.
    pub fn schedule_after<F>(&self, delay: Duration, job: F) -> TaskHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let now = Instant::now();
        let deadline = now
            .checked_add(delay)
            .or_else(|| now.checked_add(FAR_FUTURE))
            .unwrap_or(now);
        let timer = self.inner.timers.lock().insert(deadline, Box::new(job));
        self.inner.wake();
        TaskHandle {
            reactor_id: self.inner.id,
            timer,
        }
    }

    /// Cancels a deferred callback that has not fired yet.
    ///
    /// Returns false when the callback already fired, was already cancelled
    /// or belongs to another reactor.
    pub fn cancel(&self, handle: TaskHandle) -> bool {
        if handle.reactor_id != self.inner.id {
            return false;
        }
        let cancelled = self.inner.timers.lock().cancel(handle.timer);
        if cancelled {
            tracing::trace!(reactor = self.inner.id, "timer cancelled");
        }
        cancelled
    }

    /// Runs `f` on the worker and then `cb(result)` on the loop thread.
    ///
    /// The loop counts as busy until `cb` has run, so an
    /// [`RunMode::UntilIdle`] loop waits for it.
    pub fn call_in_thread<T, F, C>(&self, f: F, cb: C)
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
        C: FnOnce(T) + Send + 'static,
    {
        let guard = self.keep_alive();
        let reactor = self.clone();
        self.inner.worker.run_in_background(move || {
            let result = f();
            reactor.schedule_now(move || {
                cb(result);
                drop(guard);
            });
        });
    }

    /// Returns a guard keeping an [`RunMode::UntilIdle`] loop alive.
    #[must_use]
    pub fn keep_alive(&self) -> KeepAlive {
        self.inner.keep_alive.fetch_add(1, Ordering::AcqRel);
        KeepAlive {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Runs the loop until [`Reactor::stop`] is called.
    pub fn run(&self) {
        self.run_in_mode(RunMode::UntilStopped);
    }

    /// Runs the loop until it has no work left.
    pub fn run_until_idle(&self) {
        self.run_in_mode(RunMode::UntilIdle);
    }

    /// Queues `job` and then runs the loop until idle.
    pub fn run_with_initial_event<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule_now(job);
        self.run_until_idle();
    }

    /// Runs the loop on the calling thread.
    ///
    /// # Panics
    ///
    /// Panics if the loop is already running.
    pub fn run_in_mode(&self, mode: RunMode) {
        assert!(
            !self.inner.running.swap(true, Ordering::AcqRel),
            "reactor is already running"
        );
        *self.inner.loop_thread.lock() = Some(thread::current().id());
        let _guard = RunGuard { inner: &self.inner };
        tracing::debug!(reactor = self.inner.id, ?mode, "reactor loop started");

        loop {
            if self.inner.stop_requested.load(Ordering::Acquire) {
                break;
            }
            let mut progressed = false;
            if let Some(job) = self.inner.ready.pop() {
                job();
                progressed = true;
                if self.inner.stop_requested.load(Ordering::Acquire) {
                    break;
                }
            }
            let due = self.inner.timers.lock().pop_due(Instant::now());
            if let Some(job) = due {
                job();
                progressed = true;
            }
            if progressed {
                continue;
            }
            if mode == RunMode::UntilIdle && self.inner.is_idle() {
                break;
            }
            self.park();
        }
        tracing::debug!(reactor = self.inner.id, "reactor loop exited");
    }

    fn park(&self) {
        let deadline = self.inner.timers.lock().peek_deadline();
        let mut notified = self.inner.notified.lock();
        if !*notified {
            match deadline {
                Some(deadline) => {
                    self.inner.cond.wait_until(&mut notified, deadline);
                }
                None => self.inner.cond.wait(&mut notified),
            }
        }
        *notified = false;
    }

    /// Makes the loop return after the callback currently executing.
    ///
    /// A stop requested while the loop is not running makes the next run
    /// return before executing anything.
    pub fn stop(&self) {
        self.inner.stop_requested.store(true, Ordering::Release);
        self.inner.wake();
    }

    /// True while some thread is inside [`Reactor::run_in_mode`].
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// True when called from the thread currently running the loop.
    #[must_use]
    pub fn is_loop_thread(&self) -> bool {
        *self.inner.loop_thread.lock() == Some(thread::current().id())
    }

    /// Queued callbacks plus armed timers.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.ready.len() + self.inner.timers.lock().len()
    }

    /// Drops every queued callback and armed timer without running them.
    pub fn clear(&self) {
        while self.inner.ready.pop().is_some() {}
        self.inner.timers.lock().clear();
    }

    /// The worker used by [`Reactor::call_in_thread`].
    #[must_use]
    pub fn worker(&self) -> &Worker {
        &self.inner.worker
    }

    /// True when both handles refer to the same loop.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Reactor {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Reactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactor")
            .field("id", &self.inner.id)
            .field("running", &self.is_running())
            .field("pending", &self.pending())
            .finish()
    }
}
