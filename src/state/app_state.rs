//! Main application state management

use std::{
    sync::{Arc, Mutex},
    time::Instant,
};
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::info;

use crate::{
    api::commands::Command,
    error::Result,
    services::{
        clock::{Clock, SystemClock},
        events::{EventSink, OverlayEvent},
        persistence::Snapshot,
    },
};
use super::{ScoreBoard, ScoreState, TimerEngine, TimerSnapshot};

/// What a successfully applied command changed
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Timer(TimerSnapshot),
    Score(ScoreState),
    Broadcast,
}

/// Shared state handed to every handler
pub struct AppState {
    pub timer: TimerEngine,
    pub score: ScoreBoard,
    /// Server metadata
    pub start_time: Instant,
    pub port: u16,
    pub host: String,
    /// Last action tracking
    pub last_action: Mutex<Option<String>>,
    pub last_action_time: Mutex<Option<DateTime<Utc>>>,
    /// Overlay broadcast channel; every connected viewer holds a receiver
    pub events_tx: broadcast::Sender<OverlayEvent>,
    clock: Arc<dyn Clock>,
}

impl AppState {
    /// Create state driven by the system clock
    pub fn new(port: u16, host: String, channel_capacity: usize) -> Self {
        Self::with_clock(port, host, channel_capacity, Arc::new(SystemClock))
    }

    pub fn with_clock(port: u16, host: String, channel_capacity: usize, clock: Arc<dyn Clock>) -> Self {
        let (events_tx, _) = broadcast::channel(channel_capacity.max(1));
        let sink: Arc<dyn EventSink> = Arc::new(events_tx.clone());

        Self {
            timer: TimerEngine::new(Arc::clone(&clock), Arc::clone(&sink)),
            score: ScoreBoard::new(sink),
            start_time: Instant::now(),
            port,
            host,
            last_action: Mutex::new(None),
            last_action_time: Mutex::new(None),
            events_tx,
            clock,
        }
    }

    /// Current reading of the injected clock
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Subscribe a new viewer to overlay events
    pub fn subscribe(&self) -> broadcast::Receiver<OverlayEvent> {
        self.events_tx.subscribe()
    }

    /// Apply a validated command and record it as the last action
    pub fn apply(&self, command: Command) -> Result<CommandOutcome> {
        let name = command.name();
        let outcome = match command {
            Command::StartTimer => CommandOutcome::Timer(self.timer.start()?),
            Command::StopTimer => CommandOutcome::Timer(self.timer.stop()?),
            Command::ResetTimer => CommandOutcome::Timer(self.timer.reset()?),
            Command::SetTimer { seconds } => CommandOutcome::Timer(self.timer.set_absolute(seconds)?),
            Command::SetExtraTime { seconds } => {
                CommandOutcome::Timer(self.timer.set_extra_time(seconds)?)
            }
            Command::TriggerGoal(team) => CommandOutcome::Score(self.score.goal(team)?),
            Command::CancelGoal(team) => CommandOutcome::Score(self.score.cancel_goal(team)?),
            Command::TriggerEvent(payload) => {
                info!("Displaying overlay event");
                self.events_tx.publish(OverlayEvent::DisplayEvent(payload));
                CommandOutcome::Broadcast
            }
            Command::TriggerAd { id } => {
                info!("Displaying advertisement {}", id);
                self.events_tx.publish(OverlayEvent::DisplayAd { id });
                CommandOutcome::Broadcast
            }
        };

        self.record_action(name);
        Ok(outcome)
    }

    fn record_action(&self, action: &str) {
        if let Ok(mut last_action) = self.last_action.lock() {
            *last_action = Some(action.to_string());
        }
        if let Ok(mut last_time) = self.last_action_time.lock() {
            *last_time = Some(self.now());
        }
    }

    /// Get last action information
    pub fn get_last_action(&self) -> (Option<String>, Option<DateTime<Utc>>) {
        let last_action = self.last_action.lock().ok().and_then(|a| a.clone());
        let last_action_time = self.last_action_time.lock().ok().and_then(|t| *t);
        (last_action, last_action_time)
    }

    /// Calculate server uptime as a formatted string
    pub fn get_uptime(&self) -> String {
        format_uptime(self.start_time.elapsed().as_secs())
    }

    /// Capture timer and score for persistence
    pub fn export_snapshot(&self) -> Result<Snapshot> {
        Ok(Snapshot {
            timer: self.timer.export()?,
            score: self.score.get()?,
            saved_at: self.clock.now(),
        })
    }

    /// Restore timer and score from a persisted snapshot
    pub fn restore_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        self.timer.restore(snapshot.timer)?;
        self.score.restore(snapshot.score)?;
        info!("State restored from snapshot saved at {}", snapshot.saved_at);
        Ok(())
    }
}

fn format_uptime(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::{services::clock::ManualClock, state::Team};

    fn state_at(epoch: i64) -> (AppState, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_epoch(epoch));
        let state = AppState::with_clock(5000, "127.0.0.1".to_string(), 32, clock.clone());
        (state, clock)
    }

    #[test]
    fn apply_routes_commands_and_records_action() {
        let (state, clock) = state_at(1000);
        let mut rx = state.subscribe();

        state.apply(Command::StartTimer).unwrap();
        clock.set_epoch(1030);
        let outcome = state.apply(Command::TriggerGoal(Team::Team1)).unwrap();
        assert_eq!(outcome, CommandOutcome::Score(ScoreState { team1_score: 1, team2_score: 0 }));

        state.apply(Command::TriggerAd { id: json!(3) }).unwrap();

        let (action, at) = state.get_last_action();
        assert_eq!(action.as_deref(), Some("trigger-ad"));
        assert_eq!(at.map(|t| t.timestamp()), Some(1030));

        let names: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).map(|e| e.name()).collect();
        assert_eq!(names, vec!["update-timer-start", "add-to-score", "display-ad"]);
    }

    #[test]
    fn rejected_command_is_not_recorded() {
        let (state, _clock) = state_at(0);
        let mut rx = state.subscribe();

        assert!(state.apply(Command::SetTimer { seconds: -1 }).is_err());
        assert_eq!(state.get_last_action(), (None, None));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn snapshot_round_trip() {
        let (state, clock) = state_at(0);
        state.apply(Command::SetTimer { seconds: 1800 }).unwrap();
        state.apply(Command::TriggerGoal(Team::Team2)).unwrap();
        let saved = state.export_snapshot().unwrap();

        let (restored, restored_clock) = state_at(0);
        restored.restore_snapshot(saved).unwrap();
        clock.set_epoch(99);
        restored_clock.set_epoch(99);

        assert_eq!(restored.timer.snapshot().unwrap(), state.timer.snapshot().unwrap());
        assert_eq!(restored.score.get().unwrap().team2_score, 1);
    }

    #[test]
    fn uptime_formatting() {
        assert_eq!(format_uptime(42), "42s");
        assert_eq!(format_uptime(125), "2m 5s");
        assert_eq!(format_uptime(3725), "1h 2m 5s");
    }
}
