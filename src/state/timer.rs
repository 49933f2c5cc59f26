//! Timer entity: a single countdown's state

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier assigned by the collection; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimerId(pub u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerStatus {
    Idle,
    Running,
    Paused,
    Finished,
}

/// One countdown instance.
///
/// Fields are only mutated by [`TimerCollection`](super::TimerCollection);
/// everyone else gets clones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timer {
    pub id: TimerId,
    /// Total configured duration, always > 0
    pub period_ms: u64,
    /// Time left, always within `0..=period_ms`
    pub remaining_ms: u64,
    pub status: TimerStatus,
    /// When the current run was started, if it has been started since the last reset
    pub started_at: Option<DateTime<Utc>>,
}

impl Timer {
    /// Create an idle timer with the full period remaining
    pub(crate) fn new(id: TimerId, period_ms: u64) -> Self {
        Self {
            id,
            period_ms,
            remaining_ms: period_ms,
            status: TimerStatus::Idle,
            started_at: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == TimerStatus::Running
    }

    /// Clamp a caller-supplied remaining value into the valid range
    pub(crate) fn clamp_remaining(&self, remaining_ms: u64) -> u64 {
        remaining_ms.min(self.period_ms)
    }
}
