//! Two-team score state

use std::{
    str::FromStr,
    sync::{Arc, Mutex, MutexGuard},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    error::{Result, ScoreboardError},
    services::events::{EventSink, OverlayEvent},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Team {
    Team1,
    Team2,
}

impl FromStr for Team {
    type Err = ScoreboardError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "team1" => Ok(Team::Team1),
            "team2" => Ok(Team::Team2),
            other => Err(ScoreboardError::InvalidArgument(format!("unknown team `{}`", other))),
        }
    }
}

/// Score as shown on the overlay, serialized the way `GET /game_state` returns it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreState {
    pub team1_score: u32,
    pub team2_score: u32,
}

impl ScoreState {
    pub fn score_mut(&mut self, team: Team) -> &mut u32 {
        match team {
            Team::Team1 => &mut self.team1_score,
            Team::Team2 => &mut self.team2_score,
        }
    }
}

/// Owner of the score; every change is broadcast while the lock is held
pub struct ScoreBoard {
    state: Mutex<ScoreState>,
    events: Arc<dyn EventSink>,
}

impl ScoreBoard {
    pub fn new(events: Arc<dyn EventSink>) -> Self {
        Self {
            state: Mutex::new(ScoreState::default()),
            events,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, ScoreState>> {
        self.state.lock().map_err(|_| ScoreboardError::StateLock("score"))
    }

    /// Add a goal for `team`
    pub fn goal(&self, team: Team) -> Result<ScoreState> {
        let mut state = self.lock()?;
        let score = state.score_mut(team);
        *score = score.saturating_add(1);
        info!("Goal for {:?}: {} - {}", team, state.team1_score, state.team2_score);

        let new_state = *state;
        self.events.publish(OverlayEvent::AddToScore(new_state));
        Ok(new_state)
    }

    /// Take back a goal for `team`; a score of zero stays at zero
    pub fn cancel_goal(&self, team: Team) -> Result<ScoreState> {
        let mut state = self.lock()?;
        let score = state.score_mut(team);
        if *score == 0 {
            debug!("Cancel goal for {:?} with no goals on the board", team);
        }
        *score = score.saturating_sub(1);
        info!("Goal cancelled for {:?}: {} - {}", team, state.team1_score, state.team2_score);

        let new_state = *state;
        self.events.publish(OverlayEvent::DecreaseToScore(new_state));
        Ok(new_state)
    }

    pub fn get(&self) -> Result<ScoreState> {
        Ok(*self.lock()?)
    }

    /// Replace the score from a persisted copy. Does not broadcast.
    pub fn restore(&self, restored: ScoreState) -> Result<()> {
        *self.lock()? = restored;
        Ok(())
    }
}
