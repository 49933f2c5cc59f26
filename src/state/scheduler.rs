//! Countdown scheduler: fixed-resolution tick sequences, one per running timer
//!
//! The scheduler knows nothing about cross-timer policy. It only holds the
//! live countdown for each registered timer and hands out the next step when
//! a tick arrives. Every registration gets a fresh generation number; ticks
//! carrying an older generation are dropped, which is how cancellation stays
//! synchronous even when the task delivering the ticks is still winding down.

use std::collections::HashMap;

use super::TimerId;

/// Tick resolution used when nothing else is configured
pub const DEFAULT_TICK_MS: u64 = 10;

/// A single step of a countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownEvent {
    Tick { remaining_ms: u64 },
    Finished,
}

/// Lazy, finite tick sequence for one countdown.
///
/// Yields `Tick` with `max(0, previous - tick)` until the remaining time hits
/// zero, then a single `Finished`, then nothing.
#[derive(Debug, Clone)]
pub struct Countdown {
    remaining_ms: u64,
    tick_ms: u64,
    done: bool,
}

impl Countdown {
    pub fn new(remaining_ms: u64, tick_ms: u64) -> Self {
        Self {
            remaining_ms,
            tick_ms: tick_ms.max(1),
            done: false,
        }
    }

    pub fn remaining_ms(&self) -> u64 {
        self.remaining_ms
    }
}

impl Iterator for Countdown {
    type Item = CountdownEvent;

    fn next(&mut self) -> Option<CountdownEvent> {
        if self.done {
            return None;
        }
        if self.remaining_ms == 0 {
            self.done = true;
            return Some(CountdownEvent::Finished);
        }
        self.remaining_ms = self.remaining_ms.saturating_sub(self.tick_ms);
        Some(CountdownEvent::Tick {
            remaining_ms: self.remaining_ms,
        })
    }
}

/// Result of registering a timer with the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registered {
    /// Ticks should be delivered with this generation
    Ticking { generation: u64 },
    /// Nothing left to count down; the finish event is due immediately
    Finished,
}

#[derive(Debug)]
struct Registration {
    generation: u64,
    countdown: Countdown,
}

/// Holds the live countdown of every registered timer
#[derive(Debug)]
pub struct Scheduler {
    tick_ms: u64,
    next_generation: u64,
    registrations: HashMap<TimerId, Registration>,
}

impl Scheduler {
    pub fn new(tick_ms: u64) -> Self {
        Self {
            tick_ms: tick_ms.max(1),
            next_generation: 0,
            registrations: HashMap::new(),
        }
    }

    pub fn tick_ms(&self) -> u64 {
        self.tick_ms
    }

    /// Begin a new countdown for `id`, replacing any previous one
    pub fn register(&mut self, id: TimerId, remaining_ms: u64) -> Registered {
        self.cancel(id);

        if remaining_ms == 0 {
            return Registered::Finished;
        }

        let generation = self.next_generation;
        self.next_generation += 1;
        self.registrations.insert(
            id,
            Registration {
                generation,
                countdown: Countdown::new(remaining_ms, self.tick_ms),
            },
        );
        Registered::Ticking { generation }
    }

    /// Drop the countdown for `id`. Returns whether one was registered.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.registrations.remove(&id).is_some()
    }

    pub fn is_registered(&self, id: TimerId) -> bool {
        self.registrations.contains_key(&id)
    }

    /// Whether `generation` is still the live countdown for `id`
    pub fn is_current(&self, id: TimerId, generation: u64) -> bool {
        self.registrations
            .get(&id)
            .is_some_and(|r| r.generation == generation)
    }

    /// Advance the countdown for `id` by one tick.
    ///
    /// Stale generations and unknown ids produce no events. The tick that
    /// reaches zero is followed by `Finished` in the same batch, after which
    /// the registration is gone.
    pub fn tick(&mut self, id: TimerId, generation: u64) -> Vec<CountdownEvent> {
        let Some(registration) = self.registrations.get_mut(&id) else {
            return Vec::new();
        };
        if registration.generation != generation {
            return Vec::new();
        }

        let mut events = Vec::with_capacity(2);
        if let Some(event) = registration.countdown.next() {
            events.push(event);
        }
        if registration.countdown.remaining_ms() == 0 {
            events.extend(registration.countdown.next());
        }

        if events.last() == Some(&CountdownEvent::Finished) || events.is_empty() {
            self.registrations.remove(&id);
        }
        events
    }
}
