//! HTTP endpoint handlers

use std::{convert::Infallible, sync::Arc};
use axum::{
    body::Bytes,
    extract::{Path, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
};
use futures::stream::{self, Stream};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::{
    error::ScoreboardError,
    state::{AppState, CommandOutcome, ScoreState, TimerSnapshot},
};
use super::{
    commands::Command,
    responses::{ApiError, CommandResponse, HealthResponse, StatusResponse},
};

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// Stamp an error with the state's clock for the caller's reply
fn reject(state: &AppState) -> impl Fn(ScoreboardError) -> ApiError + '_ {
    move |error| ApiError::at(error, state.now())
}

/// Handle GET /timer - Fresh timer snapshot with server time
pub async fn timer_handler(State(state): State<Arc<AppState>>) -> ApiResult<TimerSnapshot> {
    let snapshot = state.timer.snapshot().map_err(reject(&state))?;
    Ok(Json(snapshot))
}

/// Handle GET /game_state - Current score
pub async fn game_state_handler(State(state): State<Arc<AppState>>) -> ApiResult<ScoreState> {
    let score = state.score.get().map_err(reject(&state))?;
    Ok(Json(score))
}

/// Handle POST /events/:name - Apply a control-panel command
pub async fn command_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> ApiResult<CommandResponse> {
    let payload: Value = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            warn!("Rejected {} with malformed payload: {}", name, e);
            reject(&state)(ScoreboardError::InvalidArgument(format!("malformed JSON payload: {}", e)))
        })?
    };

    let command = Command::parse(&name, &payload).map_err(|e| {
        warn!("Rejected {}: {}", name, e);
        reject(&state)(e)
    })?;

    let outcome = state.apply(command).map_err(|e| {
        warn!("Command {} failed: {}", name, e);
        reject(&state)(e)
    })?;
    info!("Command {} applied", name);

    let mut response = CommandResponse::ok(&name, state.now());
    match outcome {
        CommandOutcome::Timer(timer) => response.timer = Some(timer),
        CommandOutcome::Score(score) => response.score = Some(score),
        CommandOutcome::Broadcast => {}
    }
    Ok(Json(response))
}

/// Handle GET /events/stream - Server-sent overlay events
///
/// Viewers that fall behind the channel receive a `resync` event and should
/// refetch `/timer` and `/game_state`.
pub async fn stream_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    info!("Overlay viewer connected ({} total)", state.events_tx.receiver_count() + 1);
    let rx = state.subscribe();

    let events = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => match Event::default().event(event.name()).json_data(&event) {
                    Ok(sse) => return Some((Ok(sse), rx)),
                    Err(e) => warn!("Failed to encode {} for viewer: {}", event.name(), e),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Viewer lagged, {} event(s) skipped", skipped);
                    let resync = Event::default().event("resync").data(skipped.to_string());
                    return Some((Ok(resync), rx));
                }
                Err(RecvError::Closed) => {
                    debug!("Broadcast channel closed, ending viewer stream");
                    return None;
                }
            }
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}

/// Handle GET /status - Return current server status
pub async fn status_handler(State(state): State<Arc<AppState>>) -> ApiResult<StatusResponse> {
    let timer = state.timer.snapshot().map_err(reject(&state))?;
    let score = state.score.get().map_err(reject(&state))?;
    let (last_action, last_action_time) = state.get_last_action();

    Ok(Json(StatusResponse {
        timer,
        score,
        viewers: state.events_tx.receiver_count(),
        uptime: state.get_uptime(),
        port: state.port,
        host: state.host.clone(),
        last_action,
        last_action_time,
    }))
}

/// Handle GET /health - Health check endpoint
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse::ok(state.now()))
}
