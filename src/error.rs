//! Error taxonomy for timer commands

use thiserror::Error;

use crate::state::TimerId;

/// Errors returned by the timer collection and the application state around it.
///
/// None of these are fatal: callers either correct their input, wait for the
/// running timer to stop, or drop the command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimerError {
    /// A timer was requested with a period that is zero or negative
    #[error("period must be greater than 0 ms, got {0}")]
    InvalidPeriod(i64),

    /// The command references a timer that does not exist (or no longer does)
    #[error("no timer with id {0}")]
    UnknownId(TimerId),

    /// Another timer is already counting down
    #[error("timer {running} is already running")]
    AlreadyRunning { running: TimerId },

    /// The shared state mutex was poisoned by a panicking holder
    #[error("failed to lock timer state: {0}")]
    StatePoisoned(String),
}

impl TimerError {
    /// Whether the error should be treated as a silent no-op at the boundary.
    ///
    /// Deletions racing with in-flight commands are expected, so a command for
    /// a vanished id is dropped rather than reported.
    pub fn is_ignorable(&self) -> bool {
        matches!(self, TimerError::UnknownId(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unknown_id_is_ignorable() {
        assert!(TimerError::UnknownId(TimerId(3)).is_ignorable());
        assert!(!TimerError::InvalidPeriod(0).is_ignorable());
        assert!(!TimerError::AlreadyRunning { running: TimerId(1) }.is_ignorable());
        assert!(!TimerError::StatePoisoned("boom".to_string()).is_ignorable());
    }

    #[test]
    fn messages_name_the_offending_value() {
        assert_eq!(
            TimerError::InvalidPeriod(-5).to_string(),
            "period must be greater than 0 ms, got -5"
        );
        assert_eq!(
            TimerError::AlreadyRunning { running: TimerId(7) }.to_string(),
            "timer 7 is already running"
        );
    }
}
