//! Value types shared by probes, engines and reporters.
//!
//! - [`settings`]: read-only string configuration of a probe run
//! - [`entry`]: the result record of one measurement
//! - [`LifecycleState`]: states of a runnable

pub mod entry;
pub mod settings;

pub use entry::{Entry, format_timestamp, now_timestamp};
pub use settings::{Settings, keys};

use core::fmt;

/// Lifecycle of a runnable. Transitions only move forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Constructed, `begin` not yet completed.
    #[default]
    Created,
    /// `begin` succeeded; `main` may run.
    Running,
    /// Terminal.
    Finished,
}

impl LifecycleState {
    /// True when `next` is a legal successor of `self`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Running | Self::Finished) | (Self::Running, Self::Finished)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Finished => "finished",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_only_move_forward() {
        use LifecycleState::{Created, Finished, Running};
        assert!(Created.can_transition_to(Running));
        assert!(Created.can_transition_to(Finished));
        assert!(Running.can_transition_to(Finished));
        assert!(!Running.can_transition_to(Running));
        assert!(!Finished.can_transition_to(Created));
        assert!(!Finished.can_transition_to(Finished));
    }
}
