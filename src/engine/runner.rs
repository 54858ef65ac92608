//! Submission policy on top of an [`Async`] engine.

use super::{Async, EngineError, RunPolicy};
use crate::runnable::Runnable;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

type DoneFn = Box<dyn FnOnce(Arc<Runnable>) + Send + 'static>;

struct Queued {
    runnable: Arc<Runnable>,
    on_done: DoneFn,
}

#[derive(Default)]
struct Queue {
    waiting: VecDeque<Queued>,
    busy: bool,
}

/// Feeds runnables to an engine under a fixed [`RunPolicy`].
///
/// A sequential runner starts the next runnable only after the completion
/// callback of the previous one has returned. A concurrent runner hands
/// every runnable to the engine immediately.
#[derive(Clone)]
pub struct Runner {
    engine: Async,
    policy: RunPolicy,
    queue: Arc<Mutex<Queue>>,
}

impl Runner {
    /// Runner over `engine`.
    #[must_use]
    pub fn new(engine: Async, policy: RunPolicy) -> Self {
        Self {
            engine,
            policy,
            queue: Arc::new(Mutex::new(Queue::default())),
        }
    }

    /// Policy fixed at construction.
    #[must_use]
    pub const fn policy(&self) -> RunPolicy {
        self.policy
    }

    /// Engine the runnables go to.
    #[must_use]
    pub const fn engine(&self) -> &Async {
        &self.engine
    }

    /// Runnables waiting for their turn.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.lock().waiting.len()
    }

    /// Submits `runnable`; `on_done` runs on the loop thread after its `end`.
    pub fn run<F>(&self, runnable: Arc<Runnable>, on_done: F) -> Result<(), EngineError>
    where
        F: FnOnce(Arc<Runnable>) + Send + 'static,
    {
        match self.policy {
            RunPolicy::Concurrent => self.engine.run_test(runnable, on_done),
            RunPolicy::Sequential => {
                let job = Queued {
                    runnable,
                    on_done: Box::new(on_done),
                };
                {
                    let mut queue = self.queue.lock();
                    if queue.busy {
                        tracing::trace!(queued = queue.waiting.len() + 1, "runner busy");
                        queue.waiting.push_back(job);
                        return Ok(());
                    }
                    queue.busy = true;
                }
                let started = self.start(job);
                if started.is_err() {
                    self.queue.lock().busy = false;
                }
                started
            }
        }
    }

    fn start(&self, job: Queued) -> Result<(), EngineError> {
        let runner = self.clone();
        let Queued { runnable, on_done } = job;
        self.engine.run_test(runnable, move |runnable| {
            on_done(runnable);
            runner.advance();
        })
    }

    fn advance(&self) {
        loop {
            let next = {
                let mut queue = self.queue.lock();
                let next = queue.waiting.pop_front();
                if next.is_none() {
                    queue.busy = false;
                }
                next
            };
            let Some(job) = next else {
                return;
            };
            let name = job.runnable.descriptor().name.clone();
            match self.start(job) {
                Ok(()) => return,
                Err(err) => tracing::warn!(probe = %name, error = %err, "runner dropped a runnable"),
            }
        }
    }
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("policy", &self.policy)
            .field("queued", &self.queued())
            .finish_non_exhaustive()
    }
}
