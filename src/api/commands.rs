//! Control-panel commands and their payload validation
//!
//! Commands arrive as an event name plus an optional JSON payload. Parsing
//! does all validation up front so that a rejected command never touches
//! state.

use serde_json::Value;

use crate::{
    error::{Result, ScoreboardError},
    state::Team,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    StartTimer,
    StopTimer,
    ResetTimer,
    SetTimer { seconds: i64 },
    SetExtraTime { seconds: i64 },
    TriggerGoal(Team),
    CancelGoal(Team),
    /// Overlay event forwarded verbatim (cards, substitutions, ...)
    TriggerEvent(Value),
    TriggerAd { id: Value },
}

impl Command {
    pub fn parse(name: &str, payload: &Value) -> Result<Self> {
        match name {
            "start-timer" => Ok(Command::StartTimer),
            "stop-timer" => Ok(Command::StopTimer),
            "reset-timer" => Ok(Command::ResetTimer),
            "set-timer" => Ok(Command::SetTimer {
                seconds: integer_field(payload, &["set"])?,
            }),
            "set-extra-time" => Ok(Command::SetExtraTime {
                seconds: integer_field(payload, &["extraTime", "extra-time"])?,
            }),
            "trigger-goal" => Ok(Command::TriggerGoal(team_field(payload)?)),
            "cancel-goal" => Ok(Command::CancelGoal(team_field(payload)?)),
            "trigger-event" => match payload {
                Value::Object(_) => Ok(Command::TriggerEvent(payload.clone())),
                _ => Err(ScoreboardError::InvalidArgument(
                    "trigger-event needs an object payload".to_string(),
                )),
            },
            "trigger-ad" => match payload.get("id") {
                Some(id) if !id.is_null() => Ok(Command::TriggerAd { id: id.clone() }),
                _ => Err(ScoreboardError::InvalidArgument("missing field `id`".to_string())),
            },
            other => Err(ScoreboardError::UnknownCommand(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::StartTimer => "start-timer",
            Command::StopTimer => "stop-timer",
            Command::ResetTimer => "reset-timer",
            Command::SetTimer { .. } => "set-timer",
            Command::SetExtraTime { .. } => "set-extra-time",
            Command::TriggerGoal(_) => "trigger-goal",
            Command::CancelGoal(_) => "cancel-goal",
            Command::TriggerEvent(_) => "trigger-event",
            Command::TriggerAd { .. } => "trigger-ad",
        }
    }
}

/// Read an integer from the first of `keys` present. Numeric strings are
/// accepted since control panels often send form values as text.
fn integer_field(payload: &Value, keys: &[&str]) -> Result<i64> {
    let Some((key, value)) = keys
        .iter()
        .find_map(|key| payload.get(*key).map(|value| (*key, value)))
    else {
        return Err(ScoreboardError::InvalidArgument(format!(
            "missing field `{}`",
            keys[0]
        )));
    };

    let parsed = match value {
        Value::Number(number) => number.as_i64().or_else(|| whole_float(number.as_f64()?)),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    };

    parsed.ok_or_else(|| {
        ScoreboardError::InvalidArgument(format!("`{}` must be an integer, got {}", key, value))
    })
}

/// `600.0` counts as an integer; `1.5` does not
fn whole_float(value: f64) -> Option<i64> {
    let in_range = value >= i64::MIN as f64 && value < i64::MAX as f64;
    (value.fract() == 0.0 && in_range).then_some(value as i64)
}

fn team_field(payload: &Value) -> Result<Team> {
    payload
        .get("team")
        .and_then(Value::as_str)
        .ok_or_else(|| ScoreboardError::InvalidArgument("missing field `team`".to_string()))?
        .parse()
}
