//! State management module
//!
//! This module contains the timer engine, the score board and the
//! application state that ties them to the broadcast channel.

pub mod app_state;
pub mod score_state;
pub mod timer_state;

// Re-export main types
pub use app_state::{AppState, CommandOutcome};
pub use score_state::{ScoreBoard, ScoreState, Team};
pub use timer_state::{TimerEngine, TimerSnapshot, TimerState};
