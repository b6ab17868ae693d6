//! Overlay broadcast events and the sink they are published through

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use crate::state::{ScoreState, TimerSnapshot};

/// Payload of `show-extra-time`: the new annotation plus a full timer
/// snapshot so the receiver can re-anchor its local prediction as well
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtraTimeNotice {
    #[serde(rename = "extraTime")]
    pub extra_time: u64,
    #[serde(flatten)]
    pub timer: TimerSnapshot,
}

/// Every notification pushed to connected overlays.
///
/// Serializes to the bare payload; the wire event name comes from [`OverlayEvent::name`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OverlayEvent {
    UpdateTimerStart(TimerSnapshot),
    UpdateTimerStop(TimerSnapshot),
    UpdateTimer(TimerSnapshot),
    ShowExtraTime(ExtraTimeNotice),
    AddToScore(ScoreState),
    DecreaseToScore(ScoreState),
    DisplayEvent(Value),
    DisplayAd { id: Value },
}

impl OverlayEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OverlayEvent::UpdateTimerStart(_) => "update-timer-start",
            OverlayEvent::UpdateTimerStop(_) => "update-timer-stop",
            OverlayEvent::UpdateTimer(_) => "update-timer",
            OverlayEvent::ShowExtraTime(_) => "show-extra-time",
            OverlayEvent::AddToScore(_) => "add-to-score",
            OverlayEvent::DecreaseToScore(_) => "decrease-to-score",
            OverlayEvent::DisplayEvent(_) => "display-event",
            OverlayEvent::DisplayAd { .. } => "display-ad",
        }
    }
}

/// Publish side of the broadcast channel.
///
/// Implementations must deliver events to each viewer in the order `publish` was called.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: OverlayEvent);
}

impl EventSink for broadcast::Sender<OverlayEvent> {
    fn publish(&self, event: OverlayEvent) {
        let name = event.name();
        match self.send(event) {
            Ok(receivers) => debug!("Broadcast {} to {} viewer(s)", name, receivers),
            // No overlay connected yet
            Err(_) => debug!("Broadcast {} dropped, no viewers subscribed", name),
        }
    }
}
