//! JSON snapshot file for surviving restarts

use std::path::{Path, PathBuf};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::state::{ScoreState, TimerState};

/// Everything needed to bring the scoreboard back after a restart.
///
/// A timer saved while running keeps its wall-clock anchor, so time spent
/// offline counts as match time once restored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timer: TimerState,
    pub score: ScoreState,
    pub saved_at: DateTime<Utc>,
}

/// Load a snapshot, returning `None` when no file has been written yet
pub async fn load_snapshot(path: &Path) -> anyhow::Result<Option<Snapshot>> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No snapshot at {}", path.display());
            return Ok(None);
        }
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read snapshot {}", path.display()))
        }
    };

    let snapshot = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse snapshot {}", path.display()))?;
    Ok(Some(snapshot))
}

/// Write a snapshot through a temporary file so a crash never leaves a torn file
pub async fn save_snapshot(path: &Path, snapshot: &Snapshot) -> anyhow::Result<()> {
    let json = serde_json::to_vec_pretty(snapshot).context("failed to serialize snapshot")?;
    let tmp = temp_path(path);

    tokio::fs::write(&tmp, json)
        .await
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("failed to move snapshot into {}", path.display()))?;

    info!("Snapshot saved to {}", path.display());
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
