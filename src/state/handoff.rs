//! Foreground handoff: wall-clock accounting while ticks are not delivered

use serde::Serialize;
use tracing::{debug, info};

use super::TimerId;

/// A recorded suspension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Suspension {
    pub suspended_at_ms: i64,
    /// The active runner when the suspension began
    pub active: Option<TimerId>,
}

/// Elapsed time to reconcile on resume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handoff {
    pub active: Option<TimerId>,
    pub elapsed_ms: u64,
}

/// Tracks at most one pending suspension.
///
/// A second `suspend` overwrites the first; `resume` consumes it, so a
/// suspension reconciles exactly once.
#[derive(Debug, Default)]
pub struct HandoffController {
    pending: Option<Suspension>,
}

impl HandoffController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn suspend(&mut self, now_epoch_ms: i64, active: Option<TimerId>) {
        if self.pending.is_some() {
            debug!("Already suspended, overwriting suspend timestamp");
        }
        info!("Suspended at {} with active timer {:?}", now_epoch_ms, active);
        self.pending = Some(Suspension {
            suspended_at_ms: now_epoch_ms,
            active,
        });
    }

    pub fn is_suspended(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<Suspension> {
        self.pending
    }

    /// Time since the pending suspension began, never negative
    pub fn elapsed_ms(&self, now_epoch_ms: i64) -> Option<u64> {
        self.pending
            .map(|s| now_epoch_ms.saturating_sub(s.suspended_at_ms).max(0) as u64)
    }

    /// Forget `id` as the runner to reconcile.
    ///
    /// Called when that timer stops, resets, finishes or is deleted while
    /// suspended; the gap is then discarded even if it is started again.
    pub fn release(&mut self, id: TimerId) {
        if let Some(suspension) = self.pending.as_mut() {
            if suspension.active == Some(id) {
                debug!("Timer {} left the running state while suspended, dropping its delta", id);
                suspension.active = None;
            }
        }
    }

    /// Consume the pending suspension. `None` if there was none.
    pub fn resume(&mut self, now_epoch_ms: i64) -> Option<Handoff> {
        let elapsed_ms = self.elapsed_ms(now_epoch_ms)?;
        let suspension = self.pending.take()?;
        info!("Resumed after {}ms", elapsed_ms);
        Some(Handoff {
            active: suspension.active,
            elapsed_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resume_without_suspend_is_noop() {
        let mut handoff = HandoffController::new();
        assert_eq!(handoff.resume(1_000), None);
    }

    #[test]
    fn resume_reports_elapsed_once() {
        let mut handoff = HandoffController::new();
        handoff.suspend(10_000, Some(TimerId(2)));
        assert!(handoff.is_suspended());

        assert_eq!(
            handoff.resume(12_500),
            Some(Handoff {
                active: Some(TimerId(2)),
                elapsed_ms: 2_500
            })
        );
        assert!(!handoff.is_suspended());
        assert_eq!(handoff.resume(20_000), None);
    }

    #[test]
    fn second_suspend_overwrites_timestamp() {
        let mut handoff = HandoffController::new();
        handoff.suspend(1_000, Some(TimerId(0)));
        handoff.suspend(4_000, Some(TimerId(0)));
        assert_eq!(handoff.resume(5_000).map(|h| h.elapsed_ms), Some(1_000));
    }

    #[test]
    fn released_runner_is_not_reconciled() {
        let mut handoff = HandoffController::new();
        handoff.suspend(0, Some(TimerId(1)));
        handoff.release(TimerId(2));
        assert_eq!(handoff.pending().and_then(|s| s.active), Some(TimerId(1)));

        handoff.release(TimerId(1));
        assert!(handoff.is_suspended());
        assert_eq!(
            handoff.resume(3_000),
            Some(Handoff {
                active: None,
                elapsed_ms: 3_000
            })
        );
    }

    #[test]
    fn clock_going_backwards_counts_as_zero() {
        let mut handoff = HandoffController::new();
        handoff.suspend(5_000, None);
        assert_eq!(handoff.elapsed_ms(4_000), Some(0));
    }
}
