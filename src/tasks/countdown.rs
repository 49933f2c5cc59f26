//! Countdown driver: delivers scheduler ticks for one running timer

use std::{sync::Arc, time::Duration};
use tokio::{
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, error};

use crate::state::{AppState, TimerId};

/// Spawn the tick loop for `id` at the configured resolution
pub fn spawn_countdown(state: Arc<AppState>, id: TimerId, generation: u64) -> JoinHandle<()> {
    tokio::spawn(countdown_task(state, id, generation))
}

/// Tick loop for one countdown registration.
///
/// Ends on its own once the registration is finished, cancelled or replaced.
pub async fn countdown_task(state: Arc<AppState>, id: TimerId, generation: u64) {
    let period = Duration::from_millis(state.tick_ms);
    debug!(
        "Starting countdown task for timer {} (generation {}, tick {}ms)",
        id, generation, state.tick_ms
    );

    // First tick is one period out; the timer has not lost any time yet
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Burst);

    loop {
        interval.tick().await;

        match state.apply_tick(id, generation) {
            Ok(true) => {}
            Ok(false) => {
                debug!("Countdown task for timer {} (generation {}) done", id, generation);
                break;
            }
            Err(e) => {
                error!("Failed to apply tick for timer {}: {}", id, e);
                break;
            }
        }
    }
}
