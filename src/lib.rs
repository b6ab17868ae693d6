//! Scoreboard - live match clock, score and overlay event server
//!
//! A control panel posts commands; broadcast overlays subscribe to a
//! server-sent event stream and rebuild the running clock locally from the
//! anchor, offset and server time carried by every timer event.

pub mod api;
pub mod config;
pub mod error;
pub mod services;
pub mod state;
pub mod utils;

// Re-export commonly used types
pub use api::create_router;
pub use config::Config;
pub use error::{Result, ScoreboardError};
pub use state::{AppState, TimerEngine, TimerSnapshot};
pub use utils::signals::shutdown_signal;
