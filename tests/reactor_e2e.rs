//! Reactor ordering, cancellation and cross-thread delivery.

#[macro_use]
mod common;

use common::*;
use probekit::Reactor;
use probekit::reactor::RunMode;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn immediate_callbacks_run_fifo_before_timers() {
    init_test_logging();
    test_phase!("immediate_callbacks_run_fifo_before_timers");
    let (order, push) = collect::<&'static str>();
    let reactor = Reactor::new();
    let p = push.clone();
    reactor.schedule_after(Duration::from_millis(5), move || p("timer"));
    for label in ["a", "b", "c"] {
        let p = push.clone();
        reactor.schedule_now(move || p(label));
    }
    reactor.run_until_idle();
    let order = order.lock().clone();
    assert_with_log!(
        order == ["a", "b", "c", "timer"],
        "execution order",
        ["a", "b", "c", "timer"],
        order
    );
    test_complete!("immediate_callbacks_run_fifo_before_timers");
}

#[test]
fn equal_deadlines_fire_in_submission_order() {
    init_test_logging();
    let (order, push) = collect::<usize>();
    let reactor = Reactor::new();
    for i in 0..16 {
        let p = push.clone();
        reactor.schedule_after(Duration::from_millis(3), move || p(i));
    }
    reactor.run_until_idle();
    assert_eq!(*order.lock(), (0..16).collect::<Vec<_>>());
}

#[test]
fn timers_fire_no_earlier_than_their_delay() {
    init_test_logging();
    let reactor = Reactor::new();
    let (fired, cb) = capture::<Instant>();
    let start = Instant::now();
    reactor.schedule_after(Duration::from_millis(20), move || cb(Instant::now()));
    reactor.run_until_idle();
    let at = fired.lock().expect("timer fired");
    assert!(at.duration_since(start) >= Duration::from_millis(20));
}

#[test]
fn cancelled_timer_never_runs() {
    init_test_logging();
    test_phase!("cancelled_timer_never_runs");
    let reactor = Reactor::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let h = Arc::clone(&hits);
    let handle = reactor.schedule_after(Duration::from_millis(10), move || {
        h.fetch_add(1, Ordering::SeqCst);
    });
    let r = reactor.clone();
    reactor.schedule_now(move || assert!(r.cancel(handle)));
    reactor.run_until_idle();
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert!(!reactor.cancel(handle), "second cancel is a no-op");
    test_complete!("cancelled_timer_never_runs");
}

#[test]
fn stop_from_another_thread_ends_run() {
    init_test_logging();
    let reactor = Reactor::new();
    let r = reactor.clone();
    let looper = thread::spawn(move || r.run());
    assert!(wait_until(Duration::from_secs(2), || reactor.is_running()));
    reactor.stop();
    looper.join().expect("loop thread exits");
    assert!(!reactor.is_running());
}

#[test]
fn work_posted_from_other_threads_wakes_the_loop() {
    init_test_logging();
    let reactor = Reactor::new();
    let r = reactor.clone();
    let looper = thread::spawn(move || r.run_in_mode(RunMode::UntilStopped));
    let (seen, push) = collect::<usize>();
    let producers: Vec<_> = (0..4)
        .map(|t| {
            let reactor = reactor.clone();
            let push = push.clone();
            thread::spawn(move || {
                for i in 0..25 {
                    let p = push.clone();
                    reactor.schedule_now(move || p(t * 100 + i));
                }
            })
        })
        .collect();
    for p in producers {
        p.join().expect("producer");
    }
    assert!(wait_until(Duration::from_secs(2), || seen.lock().len() == 100));
    reactor.stop();
    looper.join().expect("loop thread exits");
}

#[test]
fn call_in_thread_posts_back_to_loop_thread() {
    init_test_logging();
    let (result, cb) = capture::<(bool, u32)>();
    run_on_fresh_reactor(move |reactor| {
        let r = reactor.clone();
        reactor.call_in_thread(
            || {
                thread::sleep(Duration::from_millis(5));
                21 * 2
            },
            move |v| cb((r.is_loop_thread(), v)),
        );
    });
    assert_eq!(*result.lock(), Some((true, 42)));
}
