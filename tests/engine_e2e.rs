//! Background engine lifecycle: submission, join, failure paths, reporting.

#[macro_use]
mod common;

use common::*;
use probekit::combinator::Callback;
use probekit::runnable::{NoopProbe, ProbeContext, ProbeDescriptor};
use probekit::types::keys;
use probekit::{
    Async, EngineError, Entry, Error, ErrorKind, LifecycleState, MemoryReporter, Probe, ProbeKind, RunPolicy,
    Runnable, Settings,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Completes each input after a delay, failing inputs that start with `!`.
struct Flaky {
    mains: Arc<AtomicUsize>,
}

impl Probe for Flaky {
    fn descriptor(&self) -> ProbeDescriptor {
        ProbeDescriptor::new("flaky", "0.0.1", true)
    }

    fn mandatory_settings(&self) -> &'static [&'static str] {
        &["backend"]
    }

    fn main(&self, ctx: ProbeContext, input: String, _: Settings, cb: Callback<Entry>) {
        self.mains.fetch_add(1, Ordering::SeqCst);
        ctx.reactor.schedule_after(Duration::from_millis(3), move || {
            let mut entry = Entry::new();
            if input.starts_with('!') {
                entry.set_failure(&ErrorKind::ConnectionRefused.into());
            }
            entry.set_key("length", input.len());
            cb(entry);
        });
    }
}

fn flaky(settings: Settings, inputs: &[&str]) -> (Runnable, Arc<AtomicUsize>) {
    let mains = Arc::new(AtomicUsize::new(0));
    let probe = Flaky {
        mains: Arc::clone(&mains),
    };
    let runnable = Runnable::new(probe, settings).with_inputs(inputs.iter().copied());
    (runnable, mains)
}

#[test]
fn join_blocks_until_end_returned() {
    init_test_logging();
    test_phase!("join_blocks_until_end_returned");
    let engine = Async::new();
    let finished = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&finished);
    let runnable = Arc::new(Runnable::new(
        NoopProbe::with_delay(Duration::from_millis(20)),
        Settings::new(),
    ));
    engine
        .run_test(runnable, move |r| {
            std::thread::sleep(Duration::from_millis(5));
            assert_eq!(r.state(), LifecycleState::Finished);
            flag.store(true, Ordering::SeqCst);
        })
        .expect("submitted");
    engine.join().expect("joined");
    assert_with_log!(
        finished.load(Ordering::SeqCst),
        "on_done returned before join",
        true,
        finished.load(Ordering::SeqCst)
    );
    assert!(engine.empty());
    assert!(!engine.reactor().is_running());
    test_complete!("join_blocks_until_end_returned");
}

#[test]
fn many_runnables_interleave_on_one_thread() {
    init_test_logging();
    let engine = Async::new();
    let (threads, push) = collect::<Option<String>>();
    for _ in 0..8 {
        let push = push.clone();
        let runnable = Arc::new(Runnable::new(
            NoopProbe::with_delay(Duration::from_millis(10)),
            Settings::new(),
        ));
        engine
            .run_test(runnable, move |_| {
                push(std::thread::current().name().map(str::to_owned));
            })
            .expect("submitted");
    }
    engine.join().expect("joined");
    let threads = threads.lock();
    assert_eq!(threads.len(), 8);
    assert!(threads.iter().all(|t| t.as_deref() == Some("probekit-reactor")));
}

#[test]
fn failed_validation_finishes_without_main() {
    init_test_logging();
    let engine = Async::new();
    let (runnable, mains) = flaky(Settings::new(), &["a"]);
    let runnable = Arc::new(runnable);
    let (done, cb) = capture::<LifecycleState>();
    engine
        .run_test(Arc::clone(&runnable), move |r| cb(r.state()))
        .expect("submitted");
    engine.join().expect("joined");

    assert_eq!(*done.lock(), Some(LifecycleState::Finished));
    assert_eq!(mains.load(Ordering::SeqCst), 0);
    let err = runnable.error();
    assert!(err.is(ErrorKind::Configuration));
    assert!(err.category().is_fatal());
    assert!(engine.empty());
}

#[test]
fn failing_measurement_still_completes_lifecycle() {
    init_test_logging();
    test_phase!("failing_measurement_still_completes_lifecycle");
    let engine = Async::new();
    let reporter = Arc::new(MemoryReporter::in_memory());
    let settings = Settings::new()
        .with("backend", "local")
        .with(keys::PARALLELISM, 2);
    let (runnable, mains) = flaky(settings, &["ok", "!refused", "fine"]);
    let runnable = Arc::new(
        runnable
            .with_reporter(reporter.clone())
            .with_annotation("engine", "e2e"),
    );
    engine.run_test(Arc::clone(&runnable), |_| {}).expect("submitted");
    engine.join().expect("joined");

    assert_eq!(mains.load(Ordering::SeqCst), 3);
    assert_eq!(runnable.state(), LifecycleState::Finished);
    assert!(runnable.error().is_success());
    let written = reporter.sink().entries();
    assert_eq!(written.len(), 3);
    let failures: Vec<_> = written.iter().filter(|e| e.failure.is_some()).collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].input.as_deref(), Some("!refused"));
    assert!(written.iter().all(|e| e.annotations["engine"] == "e2e"));
    assert!(reporter.is_closed());
    test_complete!("failing_measurement_still_completes_lifecycle", entries = written.len());
}

#[test]
fn unrepresentable_timeout_is_a_configuration_error() {
    init_test_logging();
    test_phase!("unrepresentable_timeout_is_a_configuration_error");
    let engine = Async::new();
    let settings = Settings::new()
        .with(keys::NAMESERVER, "127.0.0.1")
        .with(keys::NET_TIMEOUT, "1e300");
    let runnable = Arc::new(
        Runnable::from_kind(ProbeKind::TcpConnect, settings).with_inputs(["localhost:80"]),
    );
    engine.run_test(Arc::clone(&runnable), |_| {}).expect("submitted");
    engine.join().expect("loop thread survived");
    assert_eq!(runnable.state(), LifecycleState::Finished);
    assert!(runnable.error().is(ErrorKind::Configuration));
    assert!(runnable.entries().is_empty());
    test_complete!("unrepresentable_timeout_is_a_configuration_error");
}

#[test]
fn runnable_touched_before_submission_still_runs() {
    init_test_logging();
    let engine = Async::new();
    let runnable = Arc::new(Runnable::new(
        NoopProbe::with_delay(Duration::from_millis(1)),
        Settings::new(),
    ));
    assert!(runnable.reactor().is_none());
    engine.run_test(Arc::clone(&runnable), |_| {}).expect("submitted");
    engine.join().expect("joined");
    assert_eq!(runnable.state(), LifecycleState::Finished);

    let again = engine.run_test(Arc::clone(&runnable), |_| {});
    assert!(again.is_ok());
    engine.join().expect("joined");
    let other = Async::new();
    assert_eq!(
        other.run_test(runnable, |_| {}),
        Err(EngineError::ForeignReactor("noop".into()))
    );
}

#[test]
#[should_panic(expected = "main invoked in state created")]
fn main_before_begin_is_rejected() {
    let runnable = Arc::new(Runnable::from_kind(ProbeKind::Noop, Settings::new()));
    runnable.main(|_: Error| {});
}

#[test]
fn sequential_runner_preserves_submission_order() {
    init_test_logging();
    let engine = Async::new();
    let runner = engine.runner();
    assert_eq!(runner.policy(), RunPolicy::Sequential);
    let (order, push) = collect::<usize>();
    for i in 0..4 {
        let push = push.clone();
        // Later submissions are faster: only a sequential runner keeps order.
        let delay = Duration::from_millis(20 - 5 * i as u64);
        let runnable = Arc::new(Runnable::new(NoopProbe::with_delay(delay), Settings::new()));
        runner.run(runnable, move |_| push(i)).expect("submitted");
    }
    engine.join().expect("joined");
    assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
}

#[test]
fn global_engine_can_be_torn_down() {
    init_test_logging();
    let engine = Async::global();
    let runnable = Arc::new(Runnable::new(
        NoopProbe::with_delay(Duration::from_millis(1)),
        Settings::new(),
    ));
    engine.run_test(Arc::clone(&runnable), |_| {}).expect("submitted");
    Async::reset_global().expect("reset joins the engine");
    assert_eq!(runnable.state(), LifecycleState::Finished);
    assert!(engine.empty());
}
