//! Countdown Timers - independent countdown timers served over HTTP
//! 
//! This library provides the timer engine: timers that count down from a
//! configured period at a fixed tick resolution, can be paused and reset,
//! and keep correct time across suspend/resume of the interactive surface.

pub mod config;
pub mod error;
pub mod state;
pub mod api;
pub mod tasks;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use error::TimerError;
pub use state::{AppState, TimerCollection};
pub use api::create_router;
pub use utils::signals::shutdown_signal;
