//! Background threads for blocking calls.
//!
//! Some operations have no non-blocking form (the system resolver, a plain
//! `TcpStream::connect_timeout`). They run on a [`Worker`]: a queue drained by
//! at most `parallelism` detached threads. Threads are spawned on demand and
//! exit as soon as the queue is empty, so an idle worker holds no threads.

use crossbeam_queue::SegQueue;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

/// Default number of concurrent background threads.
pub const DEFAULT_PARALLELISM: usize = 3;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A cloneable handle to a bounded pool of detached threads.
#[derive(Clone)]
pub struct Worker {
    inner: Arc<WorkerInner>,
}

struct WorkerInner {
    queue: SegQueue<Job>,
    /// Threads currently alive.
    active: AtomicUsize,
    parallelism: AtomicUsize,
    thread_name: String,
}

impl Worker {
    /// Creates a worker allowing `parallelism` threads (at least one).
    #[must_use]
    pub fn new(parallelism: usize) -> Self {
        Self::with_thread_name(parallelism, "probekit-worker")
    }

    /// Creates a worker whose threads carry `thread_name`.
    #[must_use]
    pub fn with_thread_name(parallelism: usize, thread_name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(WorkerInner {
                queue: SegQueue::new(),
                active: AtomicUsize::new(0),
                parallelism: AtomicUsize::new(parallelism.max(1)),
                thread_name: thread_name.into(),
            }),
        }
    }

    /// Maximum number of concurrent threads.
    #[must_use]
    pub fn parallelism(&self) -> usize {
        self.inner.parallelism.load(Ordering::Acquire)
    }

    /// Changes the thread limit. Threads already running are not stopped.
    pub fn set_parallelism(&self, parallelism: usize) {
        self.inner
            .parallelism
            .store(parallelism.max(1), Ordering::Release);
    }

    /// Threads currently alive.
    #[must_use]
    pub fn active_threads(&self) -> usize {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Jobs queued and not yet picked up.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.queue.len()
    }

    /// Queues `job`, spawning a thread if the limit allows.
    pub fn run_in_background<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.queue.push(Box::new(job));
        if self.inner.try_acquire_slot() {
            self.spawn_thread();
        }
    }

    fn spawn_thread(&self) {
        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name(self.inner.thread_name.clone())
            .spawn(move || inner.drain());
        match spawned {
            Ok(_) => tracing::trace!(active = self.active_threads(), "worker thread spawned"),
            Err(err) => {
                self.inner.active.fetch_sub(1, Ordering::AcqRel);
                tracing::warn!(error = %err, "cannot spawn worker thread");
            }
        }
    }
}

impl WorkerInner {
    fn try_acquire_slot(&self) -> bool {
        let limit = self.parallelism.load(Ordering::Acquire);
        let mut active = self.active.load(Ordering::Acquire);
        loop {
            if active >= limit {
                return false;
            }
            match self.active.compare_exchange_weak(
                active,
                active + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(current) => active = current,
            }
        }
    }

    fn drain(&self) {
        loop {
            while let Some(job) = self.queue.pop() {
                if catch_unwind(AssertUnwindSafe(job)).is_err() {
                    tracing::error!("worker job panicked");
                }
            }
            self.active.fetch_sub(1, Ordering::AcqRel);
            // A job pushed between the last pop and the decrement may have
            // found every slot taken; reclaim a slot to run it.
            if self.queue.is_empty() || !self.try_acquire_slot() {
                return;
            }
        }
    }
}

impl Default for Worker {
    fn default() -> Self {
        Self::new(DEFAULT_PARALLELISM)
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("parallelism", &self.parallelism())
            .field("active_threads", &self.active_threads())
            .field("pending", &self.pending())
            .finish()
    }
}
