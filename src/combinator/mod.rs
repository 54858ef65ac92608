//! Callback combinators.
//!
//! - [`Continuation`]: a deferred operation delivering one result
//! - [`parallel`]: bounded fan-out, aggregating every result
//! - [`sequence`]: run one after another, stop at the first failure
//! - [`Continuation::with_timeout`]: race an operation against a timer

pub mod continuation;
pub mod parallel;
pub mod sequence;
mod timeout;

pub use continuation::{Callback, Continuation};
pub use parallel::parallel;
pub use sequence::sequence;
