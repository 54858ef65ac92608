//! One-after-another execution, stopping at the first failure.

use super::Continuation;
use crate::error::{Error, ErrorKind};
use serde_json::json;
use std::vec;

/// Runs `continuations` strictly one after another.
///
/// Stops at the first failure, which is wrapped in
/// `sequential_operation_error` with the failing index recorded as
/// `failed_step`. Empty input succeeds synchronously.
pub fn sequence<C>(continuations: Vec<Continuation<Error>>, cb: C)
where
    C: FnOnce(Error) + Send + 'static,
{
    step(continuations.into_iter().enumerate(), Box::new(cb));
}

fn step(
    mut rest: std::iter::Enumerate<vec::IntoIter<Continuation<Error>>>,
    cb: Box<dyn FnOnce(Error) + Send + 'static>,
) {
    let Some((index, next)) = rest.next() else {
        cb(Error::success());
        return;
    };
    next.run(move |result| {
        if result.is_error() {
            tracing::debug!(index, code = result.code(), "sequence stopped");
            cb(Error::from(ErrorKind::SequentialOperation)
                .with_child(result)
                .with_context(json!({ "failed_step": index })));
        } else {
            step(rest, cb);
        }
    });
}
