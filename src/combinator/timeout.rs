//! Timer race against an operation.
//!
//! Both sides share one slot holding the callback; whichever side takes it
//! first delivers, the other finds the slot empty.

use super::{Callback, Continuation};
use crate::reactor::Reactor;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

pub(super) fn race<T, F>(
    op: Continuation<T>,
    reactor: &Reactor,
    delay: Duration,
    on_timeout: F,
    cb: Callback<T>,
) where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let slot = Arc::new(Mutex::new(Some(cb)));

    let timer_slot = Arc::clone(&slot);
    let handle = reactor.schedule_after(delay, move || {
        let cb = timer_slot.lock().take();
        if let Some(cb) = cb {
            tracing::debug!(?delay, "operation timed out");
            cb(on_timeout());
        }
    });

    let reactor = reactor.clone();
    op.run(move |value| {
        let cb = slot.lock().take();
        if let Some(cb) = cb {
            reactor.cancel(handle);
            cb(value);
        }
    });
}

#[cfg(test)]
mod tests {
    use crate::combinator::{Callback, Continuation};
    use crate::error::{Error, ErrorKind};
    use crate::reactor::Reactor;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn fast_operation_wins_and_cancels_timer() {
        let reactor = Reactor::new();
        let results = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&results);
        Continuation::deferred(&reactor, Error::success())
            .timeout(&reactor, Duration::from_secs(30))
            .run(move |err| sink.lock().push(err));
        assert_eq!(reactor.pending(), 2);
        reactor.run_until_idle();
        assert_eq!(results.lock().len(), 1);
        assert!(results.lock()[0].is_success());
        assert_eq!(reactor.pending(), 0);
    }

    #[test]
    fn slow_operation_loses_and_is_suppressed() {
        let reactor = Reactor::new();
        let results = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&results);
        let r = reactor.clone();
        let slow = Continuation::new(move |cb: Callback<Error>| {
            r.schedule_after(Duration::from_millis(50), move || cb(Error::success()));
        });
        slow.timeout(&reactor, Duration::from_millis(5))
            .run(move |err| sink.lock().push(err));
        reactor.run_until_idle();
        let results = results.lock();
        assert_eq!(results.len(), 1);
        assert!(results[0].is(ErrorKind::Timeout));
    }

    #[test]
    fn synchronous_completion_beats_timer() {
        let reactor = Reactor::new();
        let results = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&results);
        Continuation::ready(7)
            .with_timeout(&reactor, Duration::from_millis(1), || 0)
            .run(move |v| sink.lock().push(v));
        reactor.run_until_idle();
        assert_eq!(*results.lock(), vec![7]);
    }
}
