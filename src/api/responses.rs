//! API request and response structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    state::{Timer, TimerId, TimerStatus},
    utils::{format_hms, progress},
};

/// Body of `POST /timers`; one of the two periods must be given
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateTimerRequest {
    pub period_ms: Option<i64>,
    pub period_minutes: Option<i64>,
}

impl CreateTimerRequest {
    /// Period in milliseconds; minutes are converted, a missing period is 0
    pub fn period_ms(&self) -> i64 {
        match (self.period_ms, self.period_minutes) {
            (Some(ms), _) => ms,
            (None, Some(minutes)) => minutes.saturating_mul(60_000),
            (None, None) => 0,
        }
    }
}

/// Optional body of `stop` and `reset`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemainingRequest {
    pub remaining_ms: Option<u64>,
}

/// Optional body of `POST /suspend`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuspendRequest {
    pub now_epoch_ms: Option<i64>,
}

/// Timer as shown to clients, with display fields filled in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerView {
    pub id: TimerId,
    pub period_ms: u64,
    pub remaining_ms: u64,
    pub status: TimerStatus,
    pub started_at: Option<DateTime<Utc>>,
    /// Remaining time as `HH:MM:SS`
    pub display: String,
    /// Fraction of the period used up
    pub progress: f64,
}

impl From<Timer> for TimerView {
    fn from(timer: Timer) -> Self {
        Self {
            display: format_hms(timer.remaining_ms as i64),
            progress: progress(timer.period_ms, timer.remaining_ms),
            id: timer.id,
            period_ms: timer.period_ms,
            remaining_ms: timer.remaining_ms,
            status: timer.status,
            started_at: timer.started_at,
        }
    }
}

/// API response structure for command endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub timer: Option<TimerView>,
}

impl ApiResponse {
    /// Create a new API response
    pub fn new(status: &str, message: String, timer: Option<Timer>) -> Self {
        Self {
            status: status.to_string(),
            message,
            timestamp: Utc::now(),
            timer: timer.map(TimerView::from),
        }
    }

    /// The command took effect
    pub fn ok(message: String, timer: Option<Timer>) -> Self {
        Self::new("ok", message, timer)
    }

    /// The command was accepted but changed nothing
    pub fn ignored(message: String, timer: Option<Timer>) -> Self {
        Self::new("ignored", message, timer)
    }

    /// The command was rejected
    pub fn error(message: String) -> Self {
        Self::new("error", message, None)
    }
}

/// Response of `GET /timers`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimersResponse {
    pub timers: Vec<TimerView>,
    pub running: Option<TimerId>,
    pub suspended: bool,
}

/// Response of `POST /suspend` and `POST /resume`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffResponse {
    pub status: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub active: Option<TimerId>,
}

/// Service status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub timer_count: usize,
    pub running: Option<TimerId>,
    pub suspended: bool,
    pub tick_ms: u64,
    pub uptime: String,
    pub port: u16,
    pub host: String,
    pub last_action: Option<String>,
    pub last_action_time: Option<DateTime<Utc>>,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

impl HealthResponse {
    /// Create a new health response
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minutes_are_converted() {
        let request = CreateTimerRequest {
            period_ms: None,
            period_minutes: Some(25),
        };
        assert_eq!(request.period_ms(), 1_500_000);
        assert_eq!(CreateTimerRequest::default().period_ms(), 0);
    }

    #[test]
    fn view_carries_display_fields() {
        let timer = Timer {
            id: TimerId(4),
            period_ms: 120_000,
            remaining_ms: 90_000,
            status: TimerStatus::Paused,
            started_at: None,
        };
        let view = TimerView::from(timer);
        assert_eq!(view.display, "00:01:30");
        assert_eq!(view.progress, 0.25);
    }
}
