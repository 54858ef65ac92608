//! Bounded fan-out over continuations.

use super::{Callback, Continuation};
use crate::error::{Error, ErrorKind};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;

struct State {
    pending: VecDeque<(usize, Continuation<Error>)>,
    results: Vec<Option<Error>>,
    completed: usize,
    /// Free window slots not yet handed to a continuation.
    credits: usize,
    /// True while some frame is inside `pump`.
    pumping: bool,
    first_failure: Option<usize>,
    done: Option<Callback<Error>>,
}

/// Runs `continuations` with at most `max_concurrency` in flight and calls
/// `cb` once all of them completed.
///
/// Continuations start in input order; each completion frees a slot for the
/// next one. `max_concurrency == 0` starts everything at once. With no
/// input, `cb` runs synchronously with a success.
///
/// The aggregate carries every result as a child, in input order. When any
/// child failed, the aggregate is `parallel_operation_error` and its context
/// records the input index of the first failure to complete under
/// `first_failure`.
pub fn parallel<C>(continuations: Vec<Continuation<Error>>, cb: C, max_concurrency: usize)
where
    C: FnOnce(Error) + Send + 'static,
{
    let total = continuations.len();
    if total == 0 {
        cb(Error::success());
        return;
    }
    let window = if max_concurrency == 0 {
        total
    } else {
        max_concurrency.min(total)
    };
    tracing::trace!(total, window, "parallel started");

    let state = Arc::new(Mutex::new(State {
        pending: continuations.into_iter().enumerate().collect(),
        results: std::iter::repeat_with(|| None).take(total).collect(),
        completed: 0,
        credits: window,
        pumping: true,
        first_failure: None,
        done: Some(Box::new(cb)),
    }));
    pump(&state);
}

/// Starts continuations while slots are free. Synchronous completions only
/// return credits; the outermost frame keeps starting, so the stack does not
/// grow with the input length.
fn pump(state: &Arc<Mutex<State>>) {
    loop {
        let next = {
            let mut st = state.lock();
            if st.credits == 0 || st.pending.is_empty() {
                st.pumping = false;
                return;
            }
            st.credits -= 1;
            st.pending.pop_front()
        };
        let Some((index, continuation)) = next else {
            return;
        };
        let shared = Arc::clone(state);
        continuation.run(move |result| complete(&shared, index, result));
    }
}

fn complete(state: &Arc<Mutex<State>>, index: usize, result: Error) {
    let finished = {
        let mut st = state.lock();
        if result.is_error() && st.first_failure.is_none() {
            st.first_failure = Some(index);
        }
        st.results[index] = Some(result);
        st.completed += 1;
        st.credits += 1;
        if st.completed == st.results.len() {
            let children: Vec<Error> = st.results.iter_mut().filter_map(Option::take).collect();
            Some((st.done.take(), children, st.first_failure))
        } else if st.pumping {
            None
        } else {
            st.pumping = true;
            drop(st);
            pump(state);
            None
        }
    };
    if let Some((Some(done), children, first_failure)) = finished {
        done(aggregate(children, first_failure));
    }
}

fn aggregate(children: Vec<Error>, first_failure: Option<usize>) -> Error {
    match first_failure {
        None => Error::success().with_children(children),
        Some(index) => Error::from(ErrorKind::ParallelOperation)
            .with_children(children)
            .with_context(json!({ "first_failure": index })),
    }
}
