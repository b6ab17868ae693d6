//! Injectable wall-clock source
//!
//! Every timestamp the timer engine records comes from a [`Clock`], so tests
//! can drive it with a [`ManualClock`] and pin exact elapsed values.

use std::{
    sync::Mutex,
    time::Duration,
};
use chrono::{DateTime, TimeZone, Utc};

/// Trait for time sources
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// System clock, wrapping chrono
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and replays
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock frozen at the given unix time in whole seconds
    ///
    /// # Panics
    ///
    /// Panics if `seconds` is outside the range chrono can represent.
    pub fn at_epoch(seconds: i64) -> Self {
        Self {
            current: Mutex::new(from_epoch(seconds)),
        }
    }

    /// Jump to the given unix time in whole seconds
    pub fn set_epoch(&self, seconds: i64) {
        self.set(from_epoch(seconds));
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current = instant;
    }

    /// Move the clock forward
    ///
    /// # Panics
    ///
    /// Panics if `by` does not fit in a `chrono::Duration`.
    pub fn advance(&self, by: Duration) {
        let step = chrono::Duration::from_std(by).expect("advance step out of range for chrono::Duration");
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current += step;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn from_epoch(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0)
        .single()
        .expect("epoch seconds out of range for chrono::DateTime")
}

/// Unix time with sub-second precision, as sent on the wire
pub fn epoch_seconds(instant: DateTime<Utc>) -> f64 {
    instant.timestamp_millis() as f64 / 1000.0
}
