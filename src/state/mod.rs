//! State management module
//! 
//! This module contains the timer engine: the timer entity, the countdown
//! scheduler, the collection that owns every timer, and the foreground
//! handoff controller.

pub mod timer;
pub mod scheduler;
pub mod collection;
pub mod handoff;
pub mod app_state;

// Re-export main types
pub use timer::{Timer, TimerId, TimerStatus};
pub use scheduler::{Countdown, CountdownEvent, Scheduler};
pub use collection::{Reconciliation, StartOutcome, TimerCollection, TimerEvent};
pub use handoff::{Handoff, HandoffController, Suspension};
pub use app_state::{AppState, EngineSettings};
