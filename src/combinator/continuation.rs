//! Deferred operations completing through a callback.

use super::timeout;
use crate::error::{Error, ErrorKind};
use crate::reactor::Reactor;
use std::fmt;
use std::time::Duration;

/// Completion callback. Being `FnOnce`, it can be invoked at most once.
pub type Callback<T> = Box<dyn FnOnce(T) + Send + 'static>;

/// An owned operation that, once started with a [`Callback`], eventually
/// invokes it exactly once.
///
/// Nothing happens until [`Continuation::run`] is called.
pub struct Continuation<T> {
    op: Box<dyn FnOnce(Callback<T>) + Send + 'static>,
}

impl<T: Send + 'static> Continuation<T> {
    /// Wraps `op`, which must invoke the callback it receives exactly once.
    pub fn new<F>(op: F) -> Self
    where
        F: FnOnce(Callback<T>) + Send + 'static,
    {
        Self { op: Box::new(op) }
    }

    /// A continuation completing synchronously with `value`.
    pub fn ready(value: T) -> Self {
        Self::new(move |cb| cb(value))
    }

    /// A continuation completing with `value` on the next iteration of
    /// `reactor`.
    pub fn deferred(reactor: &Reactor, value: T) -> Self {
        let reactor = reactor.clone();
        Self::new(move |cb| reactor.schedule_now(move || cb(value)))
    }

    /// Starts the operation.
    pub fn run<C>(self, cb: C)
    where
        C: FnOnce(T) + Send + 'static,
    {
        (self.op)(Box::new(cb));
    }

    /// Transforms the result.
    pub fn map<U, M>(self, m: M) -> Continuation<U>
    where
        U: Send + 'static,
        M: FnOnce(T) -> U + Send + 'static,
    {
        Continuation::new(move |cb: Callback<U>| self.run(move |value| cb(m(value))))
    }

    /// Feeds the result into a follow-up continuation.
    pub fn and_then<U, F>(self, next: F) -> Continuation<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Continuation<U> + Send + 'static,
    {
        Continuation::new(move |cb: Callback<U>| self.run(move |value| next(value).run(cb)))
    }

    /// Races the operation against a timer on `reactor`. If `delay` elapses
    /// first, the callback receives `on_timeout()` and the late result is
    /// dropped; otherwise the timer is cancelled.
    pub fn with_timeout<F>(self, reactor: &Reactor, delay: Duration, on_timeout: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let reactor = reactor.clone();
        Self::new(move |cb| timeout::race(self, &reactor, delay, on_timeout, cb))
    }
}

impl Continuation<Error> {
    /// [`Continuation::with_timeout`] completing with `generic_timeout_error`.
    #[must_use]
    pub fn timeout(self, reactor: &Reactor, delay: Duration) -> Self {
        self.with_timeout(reactor, delay, || ErrorKind::Timeout.into())
    }
}

impl<T> fmt::Debug for Continuation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Continuation").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn capture<T: Send + 'static>() -> (Arc<Mutex<Option<T>>>, impl FnOnce(T) + Send + 'static) {
        let slot = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&slot);
        (slot, move |v| *sink.lock() = Some(v))
    }

    #[test]
    fn ready_completes_synchronously() {
        let (slot, cb) = capture();
        Continuation::ready(5).run(cb);
        assert_eq!(*slot.lock(), Some(5));
    }

    #[test]
    fn map_and_then_compose() {
        let (slot, cb) = capture();
        Continuation::ready(2)
            .map(|v| v * 10)
            .and_then(|v| Continuation::ready(format!("v={v}")))
            .run(cb);
        assert_eq!(slot.lock().as_deref(), Some("v=20"));
    }

    #[test]
    fn deferred_waits_for_loop() {
        let reactor = Reactor::new();
        let (slot, cb) = capture();
        Continuation::deferred(&reactor, 1).run(cb);
        assert_eq!(*slot.lock(), None);
        reactor.run_until_idle();
        assert_eq!(*slot.lock(), Some(1));
    }

    #[test]
    fn nothing_runs_until_started() {
        let started = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&started);
        let cont = Continuation::new(move |cb: Callback<()>| {
            *flag.lock() = true;
            cb(());
        });
        assert!(!*started.lock());
        cont.run(|()| {});
        assert!(*started.lock());
    }
}
