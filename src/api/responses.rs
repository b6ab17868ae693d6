//! API response structures
//!
//! Every body is stamped from the state's clock so response timestamps agree
//! with the `serverTimeEpochSeconds` of the snapshots they carry.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::{
    error::ScoreboardError,
    state::{ScoreState, TimerSnapshot},
};

/// Reply to the control panel after a command was applied
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    pub status: String,
    pub event: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timer: Option<TimerSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<ScoreState>,
}

impl CommandResponse {
    pub fn ok(event: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            status: "ok".to_string(),
            event: event.to_string(),
            timestamp,
            timer: None,
            score: None,
        }
    }
}

/// Failure body, reported only to the caller that sent the request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// A [`ScoreboardError`] paired with the instant it was reported
#[derive(Debug)]
pub struct ApiError {
    pub error: ScoreboardError,
    pub timestamp: DateTime<Utc>,
}

impl ApiError {
    pub fn at(error: ScoreboardError, timestamp: DateTime<Utc>) -> Self {
        Self { error, timestamp }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.error {
            ScoreboardError::InvalidArgument(_) | ScoreboardError::UnknownCommand(_) => {
                StatusCode::BAD_REQUEST
            }
            ScoreboardError::StateLock(_) => {
                error!("{}", self.error);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = ErrorResponse {
            status: "error".to_string(),
            message: self.error.to_string(),
            timestamp: self.timestamp,
        };
        (status, Json(body)).into_response()
    }
}

/// Server status with the live timer and score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub timer: TimerSnapshot,
    pub score: ScoreState,
    pub viewers: usize,
    pub uptime: String,
    pub port: u16,
    pub host: String,
    pub last_action: Option<String>,
    pub last_action_time: Option<DateTime<Utc>>,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

impl HealthResponse {
    /// Create a new health response
    pub fn ok(timestamp: DateTime<Utc>) -> Self {
        Self {
            status: "ok".to_string(),
            timestamp,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
