//! Report persistence contract.
//!
//! A [`Reporter`] receives the entries produced by a runnable. Storage
//! formats are left to [`ReportSink`] implementations; [`BaseReporter`]
//! wraps a sink and enforces the ordering rules shared by every report:
//!
//! - `write_entry` before `open` fails with `report_not_open`
//! - `write_entry` after `close` fails with `report_already_closed`
//! - a second `open` or `close` succeeds without touching the sink, with
//!   the reason recorded under `idempotent` in the success context
//! - resubmitting the entry that was last written successfully is a no-op
//!   success (`duplicate_entry_submit`)

use crate::combinator::{Callback, Continuation};
use crate::error::{Error, ErrorKind};
use crate::types::Entry;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Destination of a runnable's entries.
pub trait Reporter: Send + Sync {
    /// Prepares the report.
    fn open(&self) -> Continuation<Error>;
    /// Persists one entry.
    fn write_entry(&self, entry: Entry) -> Continuation<Error>;
    /// Finalizes the report.
    fn close(&self) -> Continuation<Error>;
}

/// Storage backend wrapped by [`BaseReporter`]. Called only in legal states.
pub trait ReportSink: Send + Sync + 'static {
    /// Prepares the storage.
    fn open(&self) -> Continuation<Error> {
        Continuation::ready(Error::success())
    }

    /// Stores one serialized entry.
    fn write_line(&self, line: String) -> Continuation<Error>;

    /// Finalizes the storage.
    fn close(&self) -> Continuation<Error> {
        Continuation::ready(Error::success())
    }
}

#[derive(Debug, Default)]
struct ReportState {
    opened: bool,
    closed: bool,
    last_entry: Option<String>,
}

/// Enforces the report state rules in front of a [`ReportSink`].
pub struct BaseReporter<S> {
    sink: Arc<S>,
    state: Arc<Mutex<ReportState>>,
}

fn idempotent(kind: ErrorKind) -> Error {
    Error::success().with_context(json!({ "idempotent": kind.reason() }))
}

impl<S: ReportSink> BaseReporter<S> {
    /// Wraps `sink`.
    pub fn new(sink: S) -> Self {
        Self {
            sink: Arc::new(sink),
            state: Arc::new(Mutex::new(ReportState::default())),
        }
    }

    /// The wrapped sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// True once `open` succeeded.
    pub fn is_open(&self) -> bool {
        self.state.lock().opened
    }

    /// True once `close` succeeded.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl<S: ReportSink> Reporter for BaseReporter<S> {
    fn open(&self) -> Continuation<Error> {
        let sink = Arc::clone(&self.sink);
        let state = Arc::clone(&self.state);
        Continuation::new(move |cb: Callback<Error>| {
            if state.lock().opened {
                cb(idempotent(ErrorKind::ReportAlreadyOpen));
                return;
            }
            sink.open().run(move |err| {
                if err.is_success() {
                    state.lock().opened = true;
                }
                cb(err);
            });
        })
    }

    fn write_entry(&self, entry: Entry) -> Continuation<Error> {
        let sink = Arc::clone(&self.sink);
        let state = Arc::clone(&self.state);
        Continuation::new(move |cb: Callback<Error>| {
            let line = {
                let st = state.lock();
                if !st.opened {
                    drop(st);
                    cb(ErrorKind::ReportNotOpen.into());
                    return;
                }
                if st.closed {
                    drop(st);
                    cb(ErrorKind::ReportAlreadyClosed.into());
                    return;
                }
                let line = match entry.to_json_line() {
                    Ok(line) => line,
                    Err(err) => {
                        drop(st);
                        cb(err);
                        return;
                    }
                };
                if st.last_entry.as_deref() == Some(line.as_str()) {
                    drop(st);
                    cb(idempotent(ErrorKind::DuplicateEntrySubmit));
                    return;
                }
                line
            };
            let saved = line.clone();
            sink.write_line(line).run(move |err| {
                if err.is_success() {
                    state.lock().last_entry = Some(saved);
                }
                cb(err);
            });
        })
    }

    fn close(&self) -> Continuation<Error> {
        let sink = Arc::clone(&self.sink);
        let state = Arc::clone(&self.state);
        Continuation::new(move |cb: Callback<Error>| {
            if state.lock().closed {
                cb(idempotent(ErrorKind::ReportAlreadyClosed));
                return;
            }
            sink.close().run(move |err| {
                if err.is_success() {
                    state.lock().closed = true;
                }
                cb(err);
            });
        })
    }
}

/// Sink keeping serialized entries in memory.
#[derive(Debug, Default)]
pub struct MemoryReport {
    lines: Mutex<Vec<String>>,
    fail_writes: AtomicBool,
}

impl MemoryReport {
    /// Stored lines, in write order.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Stored entries, parsed back.
    pub fn entries(&self) -> Vec<Entry> {
        self.lines
            .lock()
            .iter()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    /// Makes every following write fail with `report_write_error`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Release);
    }
}

impl ReportSink for MemoryReport {
    fn write_line(&self, line: String) -> Continuation<Error> {
        if self.fail_writes.load(Ordering::Acquire) {
            return Continuation::ready(ErrorKind::ReportWrite.into());
        }
        self.lines.lock().push(line);
        Continuation::ready(Error::success())
    }
}

/// In-memory reporter.
pub type MemoryReporter = BaseReporter<MemoryReport>;

impl MemoryReporter {
    /// Creates an empty in-memory reporter.
    pub fn in_memory() -> Self {
        Self::new(MemoryReport::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete(cont: Continuation<Error>) -> Error {
        let slot = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&slot);
        cont.run(move |e| *sink.lock() = Some(e));
        let result = slot.lock().take();
        result.expect("sink completes synchronously")
    }

    fn entry(input: &str) -> Entry {
        let mut entry = Entry::new();
        entry.input = Some(input.to_owned());
        entry
    }

    #[test]
    fn write_before_open_is_rejected() {
        let reporter = MemoryReporter::in_memory();
        let err = complete(reporter.write_entry(entry("a")));
        assert!(err.is(ErrorKind::ReportNotOpen));
        assert!(reporter.sink().lines().is_empty());
    }

    #[test]
    fn write_after_close_is_rejected() {
        let reporter = MemoryReporter::in_memory();
        assert!(complete(reporter.open()).is_success());
        assert!(complete(reporter.close()).is_success());
        let err = complete(reporter.write_entry(entry("a")));
        assert!(err.is(ErrorKind::ReportAlreadyClosed));
    }

    #[test]
    fn reopen_and_reclose_are_idempotent() {
        let reporter = MemoryReporter::in_memory();
        assert!(complete(reporter.open()).context().is_null());
        let again = complete(reporter.open());
        assert!(again.is_success());
        assert_eq!(again.context()["idempotent"], json!("report_already_open"));
        assert!(complete(reporter.close()).is_success());
        let again = complete(reporter.close());
        assert!(again.is_success());
        assert_eq!(again.context()["idempotent"], json!("report_already_closed"));
        assert!(reporter.is_open() && reporter.is_closed());
    }

    #[test]
    fn duplicate_entry_is_written_once() {
        let reporter = MemoryReporter::in_memory();
        complete(reporter.open());
        assert!(complete(reporter.write_entry(entry("a"))).context().is_null());
        let dup = complete(reporter.write_entry(entry("a")));
        assert_eq!(dup.context()["idempotent"], json!("duplicate_entry_submit"));
        assert!(complete(reporter.write_entry(entry("b"))).is_success());
        let inputs: Vec<_> = reporter
            .sink()
            .entries()
            .into_iter()
            .filter_map(|e| e.input)
            .collect();
        assert_eq!(inputs, vec!["a", "b"]);
    }

    #[test]
    fn failed_write_can_be_resubmitted() {
        let reporter = MemoryReporter::in_memory();
        complete(reporter.open());
        reporter.sink().set_fail_writes(true);
        assert!(complete(reporter.write_entry(entry("a"))).is(ErrorKind::ReportWrite));
        reporter.sink().set_fail_writes(false);
        assert!(complete(reporter.write_entry(entry("a"))).context().is_null());
        assert_eq!(reporter.sink().lines().len(), 1);
    }
}
