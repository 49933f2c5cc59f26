//! Main application state: the timer engine plus its event channel and drivers

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Instant,
};
use chrono::{DateTime, Utc};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, info, warn};

use super::{
    HandoffController, Reconciliation, StartOutcome, Timer, TimerCollection, TimerEvent, TimerId,
    TimerStatus,
};
use crate::{error::TimerError, tasks::spawn_countdown};

/// Engine settings taken from the configuration
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub tick_ms: u64,
    pub start_threshold_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tick_ms: super::scheduler::DEFAULT_TICK_MS,
            start_threshold_ms: super::collection::DEFAULT_START_THRESHOLD_MS,
        }
    }
}

/// Main application state shared by the HTTP handlers and countdown tasks
#[derive(Debug)]
pub struct AppState {
    /// All timers; the single owner of timer state
    timers: Mutex<TimerCollection>,
    /// Pending suspension, if the interactive surface is away
    handoff: Mutex<HandoffController>,
    /// Countdown driver tasks by timer, with the generation they deliver
    drivers: Mutex<HashMap<TimerId, (u64, JoinHandle<()>)>>,
    pub tick_ms: u64,
    /// Server metadata
    pub start_time: Instant,
    pub port: u16,
    pub host: String,
    /// Last action tracking
    pub last_action: Mutex<Option<String>>,
    pub last_action_time: Mutex<Option<DateTime<Utc>>>,
    /// Tick and finish events for display collaborators
    pub event_tx: broadcast::Sender<TimerEvent>,
    /// Keep the receiver alive to prevent channel closure
    _event_rx: broadcast::Receiver<TimerEvent>,
}

impl AppState {
    pub fn new(port: u16, host: String, settings: EngineSettings) -> Self {
        let (event_tx, event_rx) = broadcast::channel(1024);

        Self {
            timers: Mutex::new(TimerCollection::new(
                settings.tick_ms,
                settings.start_threshold_ms,
            )),
            handoff: Mutex::new(HandoffController::new()),
            drivers: Mutex::new(HashMap::new()),
            tick_ms: settings.tick_ms.max(1),
            start_time: Instant::now(),
            port,
            host,
            last_action: Mutex::new(None),
            last_action_time: Mutex::new(None),
            event_tx,
            _event_rx: event_rx,
        }
    }

    fn lock_timers(&self) -> Result<MutexGuard<'_, TimerCollection>, TimerError> {
        self.timers
            .lock()
            .map_err(|e| TimerError::StatePoisoned(e.to_string()))
    }

    fn lock_handoff(&self) -> Result<MutexGuard<'_, HandoffController>, TimerError> {
        self.handoff
            .lock()
            .map_err(|e| TimerError::StatePoisoned(e.to_string()))
    }

    fn record_action(&self, action: String) {
        if let Ok(mut last_action) = self.last_action.lock() {
            *last_action = Some(action);
        }
        if let Ok(mut last_time) = self.last_action_time.lock() {
            *last_time = Some(Utc::now());
        }
    }

    fn emit(&self, event: TimerEvent) {
        if let Err(e) = self.event_tx.send(event) {
            warn!("Failed to send timer event: {}", e);
        }
    }

    /// Track the driver for `generation`, unless a newer one is already attached.
    ///
    /// Attach and detach run with the collection lock held, so they follow
    /// command order; an older generation never replaces a newer one.
    fn attach_driver(self: &Arc<Self>, id: TimerId, generation: u64) {
        let mut drivers = match self.drivers.lock() {
            Ok(drivers) => drivers,
            Err(e) => {
                warn!("Failed to track countdown task for timer {}: {}", id, e);
                return;
            }
        };

        if let Some((current, _)) = drivers.get(&id) {
            if *current > generation {
                debug!(
                    "Timer {} already driven by generation {}, not attaching {}",
                    id, current, generation
                );
                return;
            }
        }

        let handle = spawn_countdown(Arc::clone(self), id, generation);
        if let Some((_, previous)) = drivers.insert(id, (generation, handle)) {
            previous.abort();
        }
    }

    fn detach_driver(&self, id: TimerId) {
        match self.drivers.lock() {
            Ok(mut drivers) => {
                if let Some((_, handle)) = drivers.remove(&id) {
                    handle.abort();
                    debug!("Aborted countdown task for timer {}", id);
                }
            }
            Err(e) => warn!("Failed to abort countdown task for timer {}: {}", id, e),
        }
    }

    pub fn create(&self, period_ms: i64) -> Result<Timer, TimerError> {
        let timer = {
            let mut timers = self.lock_timers()?;
            let id = timers.create(period_ms)?;
            timers.get(id)?
        };
        self.record_action(format!("create {}", timer.id));
        Ok(timer)
    }

    pub fn start(self: &Arc<Self>, id: TimerId) -> Result<StartOutcome, TimerError> {
        let outcome = {
            let mut timers = self.lock_timers()?;
            let outcome = timers.start(id, Utc::now())?;
            if let StartOutcome::Started { generation } = outcome {
                self.attach_driver(id, generation);
            }
            outcome
        };
        if let StartOutcome::Started { .. } = outcome {
            self.record_action(format!("start {}", id));
        }
        Ok(outcome)
    }

    /// Pause a timer. Without a snapshot, a suspended runner is stopped at
    /// its projected remaining time.
    pub fn stop(&self, id: TimerId, snapshot: Option<u64>) -> Result<Timer, TimerError> {
        let timer = {
            let mut handoff = self.lock_handoff()?;
            let mut timers = self.lock_timers()?;
            let was_running = timers.get(id)?.is_running();
            let snapshot = match (snapshot, handoff.pending()) {
                (None, Some(suspension)) if suspension.active == Some(id) => {
                    let elapsed = handoff.elapsed_ms(Utc::now().timestamp_millis()).unwrap_or(0);
                    timers
                        .get(id)
                        .ok()
                        .map(|t| t.remaining_ms.saturating_sub(elapsed))
                }
                (snapshot, _) => snapshot,
            };
            let timer = timers.stop(id, snapshot)?;
            handoff.release(id);
            if was_running && timer.status == TimerStatus::Finished {
                self.emit(TimerEvent::Finished { id });
            }
            self.detach_driver(id);
            timer
        };
        self.record_action(format!("stop {}", id));
        Ok(timer)
    }

    pub fn reset(&self, id: TimerId, remaining_ms: Option<u64>) -> Result<Timer, TimerError> {
        let timer = {
            let mut handoff = self.lock_handoff()?;
            let mut timers = self.lock_timers()?;
            let timer = timers.reset(id, remaining_ms)?;
            handoff.release(id);
            self.detach_driver(id);
            timer
        };
        self.record_action(format!("reset {}", id));
        Ok(timer)
    }

    pub fn delete(&self, id: TimerId) -> Result<Timer, TimerError> {
        let timer = {
            let mut handoff = self.lock_handoff()?;
            let mut timers = self.lock_timers()?;
            let timer = timers.delete(id)?;
            handoff.release(id);
            self.detach_driver(id);
            timer
        };
        self.record_action(format!("delete {}", id));
        Ok(timer)
    }

    /// Apply one tick from a countdown task.
    ///
    /// Events go out while the collection is locked, so they are ordered with
    /// the commands around them. Returns whether the task should keep ticking.
    pub fn apply_tick(&self, id: TimerId, generation: u64) -> Result<bool, TimerError> {
        let mut timers = self.lock_timers()?;
        for event in timers.tick(id, generation) {
            debug!("Timer event: {:?}", event);
            self.emit(event);
        }
        Ok(timers.is_ticking(id, generation))
    }

    /// The interactive surface went away: stop ticking and start wall-clock accounting
    pub fn suspend(&self, now_epoch_ms: i64) -> Result<Option<TimerId>, TimerError> {
        let active = {
            let mut handoff = self.lock_handoff()?;
            let mut timers = self.lock_timers()?;
            let active = timers.halt_ticking();
            handoff.suspend(now_epoch_ms, active);
            if let Some(id) = active {
                self.detach_driver(id);
            }
            active
        };
        self.record_action("suspend".to_string());
        Ok(active)
    }

    /// The interactive surface is back: apply the elapsed time and resume ticking
    pub fn resume(self: &Arc<Self>, now_epoch_ms: i64) -> Result<Reconciliation, TimerError> {
        let reconciliation = {
            let mut controller = self.lock_handoff()?;
            let Some(handoff) = controller.resume(now_epoch_ms) else {
                debug!("Resume without a pending suspension, ignoring");
                return Ok(Reconciliation::NotSuspended);
            };
            let Some(id) = handoff.active else {
                return Ok(Reconciliation::Discarded);
            };

            let mut timers = self.lock_timers()?;
            let reconciliation = timers.apply_elapsed(id, handoff.elapsed_ms);
            match reconciliation {
                Reconciliation::Resumed { id, generation, .. } => {
                    self.attach_driver(id, generation)
                }
                Reconciliation::Finished { id } => self.emit(TimerEvent::Finished { id }),
                _ => {}
            }
            reconciliation
        };
        self.record_action("resume".to_string());
        info!("Resume reconciled: {:?}", reconciliation);
        Ok(reconciliation)
    }

    /// Snapshot of all timers; while suspended the runner shows its projected time
    pub fn list(&self) -> Result<Vec<Timer>, TimerError> {
        let handoff = self.lock_handoff()?;
        let timers = self.lock_timers()?;
        let projected = handoff
            .pending()
            .and_then(|s| s.active)
            .zip(handoff.elapsed_ms(Utc::now().timestamp_millis()));

        Ok(match projected {
            Some((id, elapsed)) => timers.list_projected(id, elapsed),
            None => timers.list(),
        })
    }

    pub fn get(&self, id: TimerId) -> Result<Timer, TimerError> {
        self.list()?
            .into_iter()
            .find(|t| t.id == id)
            .ok_or(TimerError::UnknownId(id))
    }

    pub fn running(&self) -> Result<Option<TimerId>, TimerError> {
        Ok(self.lock_timers()?.running())
    }

    pub fn is_suspended(&self) -> Result<bool, TimerError> {
        Ok(self.lock_handoff()?.is_suspended())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TimerEvent> {
        self.event_tx.subscribe()
    }

    /// Calculate server uptime as a formatted string
    pub fn get_uptime(&self) -> String {
        let duration = self.start_time.elapsed();
        let hours = duration.as_secs() / 3600;
        let minutes = (duration.as_secs() % 3600) / 60;
        let seconds = duration.as_secs() % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }

    /// Get last action information
    pub fn get_last_action(&self) -> (Option<String>, Option<DateTime<Utc>>) {
        let last_action = self.last_action.lock().ok().and_then(|a| a.clone());
        let last_action_time = self.last_action_time.lock().ok().and_then(|t| *t);
        (last_action, last_action_time)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;

    fn app() -> Arc<AppState> {
        Arc::new(AppState::new(0, "127.0.0.1".to_string(), EngineSettings::default()))
    }

    fn drain(rx: &mut broadcast::Receiver<TimerEvent>) -> Vec<TimerEvent> {
        let mut events = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                Err(TryRecvError::Lagged(_)) => continue,
            }
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn running_timer_ticks_every_resolution() {
        let state = app();
        let timer = state.create(60_000).unwrap();
        let mut rx = state.subscribe();

        state.start(timer.id).unwrap();
        tokio::time::sleep(Duration::from_millis(35)).await;

        let timer = state.get(timer.id).unwrap();
        assert_eq!(timer.remaining_ms, 59_970);
        assert_eq!(timer.status, TimerStatus::Running);
        assert_eq!(drain(&mut rx).len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn short_timer_runs_to_a_single_finish() {
        let state = app();
        let timer = state.create(100).unwrap();
        let mut rx = state.subscribe();

        state.start(timer.id).unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        let events = drain(&mut rx);
        let ticks = events
            .iter()
            .filter(|e| matches!(e, TimerEvent::Tick { .. }))
            .count();
        assert_eq!(ticks, 10);
        assert_eq!(events.last(), Some(&TimerEvent::Finished { id: timer.id }));
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, TimerEvent::Finished { .. }))
                .count(),
            1
        );

        let timer = state.get(timer.id).unwrap();
        assert_eq!(timer.status, TimerStatus::Finished);
        assert_eq!(timer.remaining_ms, 0);
        assert_eq!(state.running().unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn no_ticks_after_stop_returns() {
        let state = app();
        let timer = state.create(10_000).unwrap();
        let mut rx = state.subscribe();

        state.start(timer.id).unwrap();
        tokio::time::sleep(Duration::from_millis(55)).await;
        let stopped = state.stop(timer.id, None).unwrap();
        drain(&mut rx);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(drain(&mut rx).is_empty());
        assert_eq!(state.get(timer.id).unwrap(), stopped);
        assert_eq!(stopped.status, TimerStatus::Paused);
        assert_eq!(stopped.remaining_ms, 9_950);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_while_running_stops_events() {
        let state = app();
        let timer = state.create(10_000).unwrap();
        let mut rx = state.subscribe();

        state.start(timer.id).unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;
        state.delete(timer.id).unwrap();
        drain(&mut rx);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(drain(&mut rx).is_empty());
        assert_eq!(state.get(timer.id), Err(TimerError::UnknownId(timer.id)));
    }

    #[tokio::test(start_paused = true)]
    async fn suspend_resume_applies_wall_clock_gap() {
        let state = app();
        let timer = state.create(60_000).unwrap();
        state.start(timer.id).unwrap();
        tokio::time::sleep(Duration::from_millis(15)).await;
        let before = state.get(timer.id).unwrap().remaining_ms;
        assert_eq!(before, 59_990);

        assert_eq!(state.suspend(1_000_000).unwrap(), Some(timer.id));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(
            state.lock_timers().unwrap().get(timer.id).unwrap().remaining_ms,
            before
        );

        match state.resume(1_004_000).unwrap() {
            Reconciliation::Resumed { remaining_ms, .. } => {
                assert_eq!(remaining_ms, before - 4_000)
            }
            other => panic!("expected resume, got {:?}", other),
        }
        assert!(!state.is_suspended().unwrap());

        tokio::time::sleep(Duration::from_millis(15)).await;
        assert_eq!(
            state.get(timer.id).unwrap().remaining_ms,
            before - 4_000 - 10
        );
        assert_eq!(state.resume(1_010_000).unwrap(), Reconciliation::NotSuspended);
    }

    #[tokio::test(start_paused = true)]
    async fn resume_past_remaining_finishes_timer() {
        let state = app();
        let timer = state.create(1_000).unwrap();
        let mut rx = state.subscribe();
        state.start(timer.id).unwrap();
        state.suspend(0).unwrap();
        drain(&mut rx);

        assert_eq!(
            state.resume(90_000).unwrap(),
            Reconciliation::Finished { id: timer.id }
        );
        assert_eq!(drain(&mut rx), vec![TimerEvent::Finished { id: timer.id }]);
        assert_eq!(state.get(timer.id).unwrap().status, TimerStatus::Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_while_suspended_discards_the_gap() {
        let state = app();
        let timer = state.create(10_000).unwrap();
        state.start(timer.id).unwrap();
        state.suspend(5_000).unwrap();
        state.stop(timer.id, Some(7_000)).unwrap();

        assert_eq!(state.resume(8_000).unwrap(), Reconciliation::Discarded);
        let timer = state.get(timer.id).unwrap();
        assert_eq!(timer.remaining_ms, 7_000);
        assert_eq!(timer.status, TimerStatus::Paused);
    }

    #[tokio::test(start_paused = true)]
    async fn restarted_runner_is_not_reconciled_with_old_gap() {
        let state = app();
        let timer = state.create(60_000).unwrap();
        state.start(timer.id).unwrap();
        state.suspend(0).unwrap();
        state.stop(timer.id, Some(50_000)).unwrap();
        assert!(matches!(
            state.start(timer.id).unwrap(),
            StartOutcome::Started { .. }
        ));

        tokio::time::sleep(Duration::from_millis(5)).await;
        let shown = state.get(timer.id).unwrap();
        assert_eq!(shown.status, TimerStatus::Running);
        assert_eq!(shown.remaining_ms, 50_000);

        assert_eq!(state.resume(10_000).unwrap(), Reconciliation::Discarded);
        let timer = state.get(timer.id).unwrap();
        assert_eq!(timer.status, TimerStatus::Running);
        assert_eq!(timer.remaining_ms, 50_000);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_while_suspended_commits_projected_time() {
        let state = app();
        let timer = state.create(60_000).unwrap();
        state.start(timer.id).unwrap();
        state.suspend(Utc::now().timestamp_millis() - 5_000).unwrap();

        let stopped = state.stop(timer.id, None).unwrap();
        assert_eq!(stopped.status, TimerStatus::Paused);
        assert!(stopped.remaining_ms <= 55_000);
        assert!(stopped.remaining_ms > 54_000);
        assert_eq!(
            state.resume(Utc::now().timestamp_millis()).unwrap(),
            Reconciliation::Discarded
        );
        assert_eq!(state.get(timer.id).unwrap(), stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn list_projects_the_suspended_runner() {
        let state = app();
        let runner = state.create(60_000).unwrap();
        let idle = state.create(30_000).unwrap();
        state.start(runner.id).unwrap();
        state.suspend(Utc::now().timestamp_millis() - 20_000).unwrap();

        let listed = state.list().unwrap();
        let shown = listed.iter().find(|t| t.id == runner.id).unwrap();
        assert!(shown.remaining_ms <= 40_000);
        assert!(shown.remaining_ms > 39_000);
        assert_eq!(shown.status, TimerStatus::Running);
        assert_eq!(listed.iter().find(|t| t.id == idle.id), Some(&idle));

        let single = state.get(runner.id).unwrap();
        assert!(single.remaining_ms <= 40_000);
        assert!(single.remaining_ms > 39_000);
        assert_eq!(
            state.lock_timers().unwrap().get(runner.id).unwrap().remaining_ms,
            60_000
        );
    }

    #[tokio::test(start_paused = true)]
    async fn delete_while_suspended_discards_the_gap() {
        let state = app();
        let timer = state.create(60_000).unwrap();
        state.start(timer.id).unwrap();
        state.suspend(0).unwrap();
        state.delete(timer.id).unwrap();

        assert_eq!(state.resume(10_000).unwrap(), Reconciliation::Discarded);
        assert_eq!(state.running().unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_at_zero_sends_one_finish() {
        let state = app();
        let timer = state.create(10_000).unwrap();
        let mut rx = state.subscribe();
        state.start(timer.id).unwrap();

        let stopped = state.stop(timer.id, Some(0)).unwrap();
        assert_eq!(stopped.status, TimerStatus::Finished);
        assert_eq!(drain(&mut rx), vec![TimerEvent::Finished { id: timer.id }]);

        state.stop(timer.id, Some(0)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_attach_keeps_the_newer_driver() {
        let state = app();
        let timer = state.create(60_000).unwrap();
        let StartOutcome::Started { generation: old } = state.start(timer.id).unwrap() else {
            panic!("expected timer to start");
        };
        state.stop(timer.id, None).unwrap();
        let StartOutcome::Started { generation: new } = state.start(timer.id).unwrap() else {
            panic!("expected timer to restart");
        };
        assert!(new > old);

        let mut rx = state.subscribe();
        state.attach_driver(timer.id, old);
        tokio::time::sleep(Duration::from_millis(35)).await;

        assert_eq!(drain(&mut rx).len(), 3);
        assert_eq!(state.get(timer.id).unwrap().remaining_ms, 59_970);
    }

    #[tokio::test]
    async fn suspend_without_runner_resumes_to_nothing() {
        let state = app();
        state.create(1_000).unwrap();
        assert_eq!(state.suspend(0).unwrap(), None);
        assert_eq!(state.resume(500).unwrap(), Reconciliation::Discarded);
    }

    #[tokio::test]
    async fn commands_record_last_action() {
        let state = app();
        let timer = state.create(1_000).unwrap();
        state.reset(timer.id, None).unwrap();
        let (action, time) = state.get_last_action();
        assert_eq!(action, Some(format!("reset {}", timer.id)));
        assert!(time.is_some());
    }
}
