//! Collaborators the scoreboard state depends on
//!
//! The clock, the overlay broadcast sink and snapshot persistence live here so
//! the state types only see them through small interfaces.

pub mod clock;
pub mod events;
pub mod persistence;

// Re-export main types
pub use clock::{Clock, ManualClock, SystemClock};
pub use events::{EventSink, OverlayEvent};
pub use persistence::{load_snapshot, save_snapshot, Snapshot};
