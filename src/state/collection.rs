//! Timer collection: the authoritative store of timers
//!
//! All timer mutation goes through here. The collection owns the
//! "which timer is running" slot and refuses a second runner.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use super::{
    scheduler::{CountdownEvent, Registered, Scheduler},
    Timer, TimerId, TimerStatus,
};
use crate::error::TimerError;

/// Starts on timers with this much time left or less are ignored
pub const DEFAULT_START_THRESHOLD_MS: u64 = 10;

/// Events emitted towards the display collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TimerEvent {
    Tick { id: TimerId, remaining_ms: u64 },
    Finished { id: TimerId },
}

impl TimerEvent {
    /// Event name as used on the wire
    pub fn name(&self) -> &'static str {
        match self {
            TimerEvent::Tick { .. } => "tick",
            TimerEvent::Finished { .. } => "finished",
        }
    }
}

/// What a `start` command did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The timer is now running; ticks must carry this generation
    Started { generation: u64 },
    /// Nothing changed: too little time left, or it was already running
    Ignored,
}

/// What reconciling a suspension did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// There was no suspension to reconcile
    NotSuspended,
    /// The timer active at suspend time is gone or no longer running
    Discarded,
    /// Elapsed time applied, ticking continues with this generation
    Resumed {
        id: TimerId,
        remaining_ms: u64,
        generation: u64,
    },
    /// Elapsed time used up the remainder
    Finished { id: TimerId },
}

#[derive(Debug)]
pub struct TimerCollection {
    timers: Vec<Timer>,
    next_id: u64,
    running: Option<TimerId>,
    scheduler: Scheduler,
    start_threshold_ms: u64,
}

impl TimerCollection {
    pub fn new(tick_ms: u64, start_threshold_ms: u64) -> Self {
        Self {
            timers: Vec::new(),
            next_id: 0,
            running: None,
            scheduler: Scheduler::new(tick_ms),
            start_threshold_ms,
        }
    }

    /// The active runner, if any
    pub fn running(&self) -> Option<TimerId> {
        self.running
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    fn position(&self, id: TimerId) -> Result<usize, TimerError> {
        self.timers
            .iter()
            .position(|t| t.id == id)
            .ok_or(TimerError::UnknownId(id))
    }

    /// Snapshot of all timers in insertion order
    pub fn list(&self) -> Vec<Timer> {
        self.timers.clone()
    }

    pub fn get(&self, id: TimerId) -> Result<Timer, TimerError> {
        let idx = self.position(id)?;
        Ok(self.timers[idx].clone())
    }

    /// Add a new idle timer with `period_ms` on the clock
    pub fn create(&mut self, period_ms: i64) -> Result<TimerId, TimerError> {
        if period_ms <= 0 {
            return Err(TimerError::InvalidPeriod(period_ms));
        }

        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.timers.push(Timer::new(id, period_ms as u64));
        info!("Created timer {} with period {}ms", id, period_ms);
        Ok(id)
    }

    pub fn start(&mut self, id: TimerId, now: DateTime<Utc>) -> Result<StartOutcome, TimerError> {
        let idx = self.position(id)?;

        if let Some(running) = self.running {
            if running == id {
                debug!("Timer {} is already running, ignoring start", id);
                return Ok(StartOutcome::Ignored);
            }
            return Err(TimerError::AlreadyRunning { running });
        }

        let remaining_ms = self.timers[idx].remaining_ms;
        if remaining_ms <= self.start_threshold_ms {
            debug!(
                "Timer {} has {}ms left (threshold {}ms), ignoring start",
                id, remaining_ms, self.start_threshold_ms
            );
            return Ok(StartOutcome::Ignored);
        }

        let Registered::Ticking { generation } = self.scheduler.register(id, remaining_ms) else {
            return Ok(StartOutcome::Ignored);
        };

        let timer = &mut self.timers[idx];
        timer.status = TimerStatus::Running;
        timer.started_at = Some(now);
        self.running = Some(id);
        info!("Started timer {} with {}ms remaining", id, remaining_ms);
        Ok(StartOutcome::Started { generation })
    }

    /// Pause a running timer.
    ///
    /// `snapshot` is the remaining time last seen by the caller; without one
    /// the last applied tick stands. A timer stopped at 0 ms is finished
    /// rather than paused. Stopping a timer that is not running leaves it
    /// untouched.
    pub fn stop(&mut self, id: TimerId, snapshot: Option<u64>) -> Result<Timer, TimerError> {
        let idx = self.position(id)?;
        self.scheduler.cancel(id);

        let timer = &mut self.timers[idx];
        if timer.status != TimerStatus::Running {
            debug!("Timer {} is {:?}, nothing to stop", id, timer.status);
            return Ok(timer.clone());
        }

        if let Some(remaining_ms) = snapshot {
            timer.remaining_ms = timer.clamp_remaining(remaining_ms);
        }
        if timer.remaining_ms == 0 {
            self.finish(idx);
            return Ok(self.timers[idx].clone());
        }

        timer.status = TimerStatus::Paused;
        if self.running == Some(id) {
            self.running = None;
        }
        info!("Stopped timer {} at {}ms", id, timer.remaining_ms);
        Ok(timer.clone())
    }

    /// Return a timer to idle with `remaining_ms` on the clock (the full period if `None`)
    pub fn reset(&mut self, id: TimerId, remaining_ms: Option<u64>) -> Result<Timer, TimerError> {
        let idx = self.position(id)?;
        self.scheduler.cancel(id);
        if self.running == Some(id) {
            self.running = None;
        }

        let timer = &mut self.timers[idx];
        timer.remaining_ms = timer.clamp_remaining(remaining_ms.unwrap_or(timer.period_ms));
        timer.status = TimerStatus::Idle;
        timer.started_at = None;
        info!("Reset timer {} to {}ms", id, timer.remaining_ms);
        Ok(timer.clone())
    }

    pub fn delete(&mut self, id: TimerId) -> Result<Timer, TimerError> {
        let idx = self.position(id)?;
        self.scheduler.cancel(id);
        if self.running == Some(id) {
            self.running = None;
        }

        let removed = self.timers.remove(idx);
        info!("Deleted timer {}", id);
        Ok(removed)
    }

    /// Whether ticks carrying `generation` still apply to `id`
    pub fn is_ticking(&self, id: TimerId, generation: u64) -> bool {
        self.scheduler.is_current(id, generation)
    }

    /// Apply one scheduler tick and return the events it produced
    pub fn tick(&mut self, id: TimerId, generation: u64) -> Vec<TimerEvent> {
        let steps = self.scheduler.tick(id, generation);
        if steps.is_empty() {
            return Vec::new();
        }

        let Ok(idx) = self.position(id) else {
            self.scheduler.cancel(id);
            return Vec::new();
        };

        let mut events = Vec::with_capacity(steps.len());
        for step in steps {
            match step {
                CountdownEvent::Tick { remaining_ms } => {
                    self.timers[idx].remaining_ms = remaining_ms;
                    events.push(TimerEvent::Tick { id, remaining_ms });
                }
                CountdownEvent::Finished => {
                    self.finish(idx);
                    events.push(TimerEvent::Finished { id });
                }
            }
        }
        events
    }

    fn finish(&mut self, idx: usize) {
        let timer = &mut self.timers[idx];
        timer.remaining_ms = 0;
        timer.status = TimerStatus::Finished;
        let id = timer.id;

        self.scheduler.cancel(id);
        if self.running == Some(id) {
            self.running = None;
        }
        info!("Timer {} finished", id);
    }

    /// Stop tick delivery for the active runner without changing its state.
    ///
    /// Returns the runner, which keeps `Running` until reconciled.
    pub fn halt_ticking(&mut self) -> Option<TimerId> {
        let id = self.running?;
        self.scheduler.cancel(id);
        debug!("Halted ticking for timer {}", id);
        Some(id)
    }

    /// Apply time that passed without ticks to `id`, if it is still the runner
    pub fn apply_elapsed(&mut self, id: TimerId, elapsed_ms: u64) -> Reconciliation {
        if self.running != Some(id) {
            debug!("Timer {} is no longer running, discarding {}ms", id, elapsed_ms);
            return Reconciliation::Discarded;
        }
        let Ok(idx) = self.position(id) else {
            self.running = None;
            return Reconciliation::Discarded;
        };

        let remaining_ms = self.timers[idx].remaining_ms.saturating_sub(elapsed_ms);
        self.timers[idx].remaining_ms = remaining_ms;

        match self.scheduler.register(id, remaining_ms) {
            Registered::Ticking { generation } => {
                info!(
                    "Reconciled timer {}: {}ms elapsed, {}ms remaining",
                    id, elapsed_ms, remaining_ms
                );
                Reconciliation::Resumed {
                    id,
                    remaining_ms,
                    generation,
                }
            }
            Registered::Finished => {
                self.finish(idx);
                Reconciliation::Finished { id }
            }
        }
    }

    /// Snapshot with `elapsed_ms` already taken off the runner `id`
    pub fn list_projected(&self, id: TimerId, elapsed_ms: u64) -> Vec<Timer> {
        self.timers
            .iter()
            .cloned()
            .map(|mut timer| {
                if timer.id == id && timer.is_running() {
                    timer.remaining_ms = timer.remaining_ms.saturating_sub(elapsed_ms);
                }
                timer
            })
            .collect()
    }
}

impl Default for TimerCollection {
    fn default() -> Self {
        Self::new(super::scheduler::DEFAULT_TICK_MS, DEFAULT_START_THRESHOLD_MS)
    }
}
