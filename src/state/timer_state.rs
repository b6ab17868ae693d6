//! Match clock state and the engine that owns it
//!
//! The clock is stored as an anchor plus a banked offset instead of a ticking
//! counter. While running, elapsed time is `offset + (now - anchor)`; while
//! stopped it is exactly `offset`. Remote viewers receive the same three values
//! plus the server time and rebuild the running clock locally, so their clocks
//! never have to agree with ours.
//!
//! Fractional seconds are always floored, both when banking time on stop and
//! when reporting elapsed time.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    error::{Result, ScoreboardError},
    services::{
        clock::{epoch_seconds, Clock},
        events::{EventSink, ExtraTimeNotice, OverlayEvent},
    },
};

/// Raw timer state; also the persisted form handed to storage collaborators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    pub running: bool,
    /// Instant of the last start, stop, reset or set. `None` only before first use.
    pub anchor: Option<DateTime<Utc>>,
    /// Whole seconds banked before `anchor`
    pub offset: u64,
    /// Display-only stoppage time, independent of run state
    pub extra_time: u64,
}

impl TimerState {
    /// Create a stopped timer at zero
    pub fn new() -> Self {
        Self {
            running: false,
            anchor: None,
            offset: 0,
            extra_time: 0,
        }
    }

    /// Elapsed whole seconds as of `now`
    pub fn elapsed_at(&self, now: DateTime<Utc>) -> u64 {
        if !self.running {
            return self.offset;
        }
        self.offset.saturating_add(running_seconds(self.anchor, now))
    }
}

impl Default for TimerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Whole seconds since `anchor`, clamped to zero on clock anomalies
fn running_seconds(anchor: Option<DateTime<Utc>>, now: DateTime<Utc>) -> u64 {
    let Some(anchor) = anchor else {
        warn!("Clock anomaly: timer is running without an anchor, counting no running time");
        return 0;
    };

    let millis = (now - anchor).num_milliseconds();
    if millis < 0 {
        warn!(
            "Clock anomaly: now is {}ms before the timer anchor, clamping to zero",
            -millis
        );
        return 0;
    }
    (millis / 1000) as u64
}

/// Point-in-time view of the timer, as returned by `GET /timer` and broadcast
/// with every timer event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub running: bool,
    pub anchor_epoch_seconds: Option<f64>,
    pub offset_seconds: u64,
    pub extra_time_seconds: u64,
    pub elapsed_seconds: u64,
    pub server_time_epoch_seconds: f64,
}

impl TimerSnapshot {
    pub fn capture(state: &TimerState, now: DateTime<Utc>) -> Self {
        Self {
            running: state.running,
            anchor_epoch_seconds: state.anchor.map(epoch_seconds),
            offset_seconds: state.offset,
            extra_time_seconds: state.extra_time,
            elapsed_seconds: state.elapsed_at(now),
            server_time_epoch_seconds: epoch_seconds(now),
        }
    }
}

/// Sole owner of the match clock.
///
/// Mutations take the write lock for their whole read-modify-write and publish
/// their broadcast before releasing it, so viewers receive events in exactly
/// the order they were applied. Snapshots share the read lock.
pub struct TimerEngine {
    state: RwLock<TimerState>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
}

impl TimerEngine {
    pub fn new(clock: Arc<dyn Clock>, events: Arc<dyn EventSink>) -> Self {
        Self {
            state: RwLock::new(TimerState::new()),
            clock,
            events,
        }
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, TimerState>> {
        self.state.write().map_err(|_| ScoreboardError::StateLock("timer"))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, TimerState>> {
        self.state.read().map_err(|_| ScoreboardError::StateLock("timer"))
    }

    /// Start the clock. Starting a running clock changes nothing and broadcasts nothing.
    pub fn start(&self) -> Result<TimerSnapshot> {
        let mut state = self.write()?;
        let now = self.clock.now();

        if state.running {
            debug!("Timer already running, ignoring start");
            return Ok(TimerSnapshot::capture(&state, now));
        }

        state.anchor = Some(now);
        state.running = true;
        info!("Timer started from {}s", state.offset);

        let snapshot = TimerSnapshot::capture(&state, now);
        self.events.publish(OverlayEvent::UpdateTimerStart(snapshot.clone()));
        Ok(snapshot)
    }

    /// Stop the clock, banking the floored elapsed time. Stopping a stopped clock is a no-op.
    pub fn stop(&self) -> Result<TimerSnapshot> {
        let mut state = self.write()?;
        let now = self.clock.now();

        if !state.running {
            debug!("Timer already stopped, ignoring stop");
            return Ok(TimerSnapshot::capture(&state, now));
        }

        state.offset = state.elapsed_at(now);
        state.running = false;
        state.anchor = Some(now);
        info!("Timer stopped at {}s", state.offset);

        let snapshot = TimerSnapshot::capture(&state, now);
        self.events.publish(OverlayEvent::UpdateTimerStop(snapshot.clone()));
        Ok(snapshot)
    }

    /// Stop and zero the clock. Also clears extra time, since a reset starts a new period.
    pub fn reset(&self) -> Result<TimerSnapshot> {
        let mut state = self.write()?;
        let now = self.clock.now();

        state.running = false;
        state.anchor = Some(now);
        state.offset = 0;
        state.extra_time = 0;
        info!("Timer reset");

        let snapshot = TimerSnapshot::capture(&state, now);
        self.events.publish(OverlayEvent::UpdateTimer(snapshot.clone()));
        Ok(snapshot)
    }

    /// Stop the clock and set it to `total_seconds`. Extra time is kept.
    pub fn set_absolute(&self, total_seconds: i64) -> Result<TimerSnapshot> {
        let total = non_negative("timer value", total_seconds)?;

        let mut state = self.write()?;
        let now = self.clock.now();

        state.offset = total;
        state.anchor = Some(now);
        state.running = false;
        info!("Timer set to {}s", total);

        let snapshot = TimerSnapshot::capture(&state, now);
        self.events.publish(OverlayEvent::UpdateTimer(snapshot.clone()));
        Ok(snapshot)
    }

    /// Set the stoppage-time annotation without touching the clock
    pub fn set_extra_time(&self, seconds: i64) -> Result<TimerSnapshot> {
        let extra = non_negative("extra time", seconds)?;

        let mut state = self.write()?;
        let now = self.clock.now();

        state.extra_time = extra;
        info!("Extra time set to {}s", extra);

        let snapshot = TimerSnapshot::capture(&state, now);
        self.events.publish(OverlayEvent::ShowExtraTime(ExtraTimeNotice {
            extra_time: extra,
            timer: snapshot.clone(),
        }));
        Ok(snapshot)
    }

    /// Fresh snapshot relative to the current clock reading
    pub fn snapshot(&self) -> Result<TimerSnapshot> {
        let state = self.read()?;
        Ok(TimerSnapshot::capture(&state, self.clock.now()))
    }

    /// Snapshot relative to a caller-supplied instant
    pub fn snapshot_at(&self, now: DateTime<Utc>) -> Result<TimerSnapshot> {
        let state = self.read()?;
        Ok(TimerSnapshot::capture(&state, now))
    }

    /// Copy of the raw state for persistence
    pub fn export(&self) -> Result<TimerState> {
        Ok(self.read()?.clone())
    }

    /// Replace the raw state from a persisted copy. Does not broadcast.
    pub fn restore(&self, mut restored: TimerState) -> Result<()> {
        if restored.running && restored.anchor.is_none() {
            warn!("Restored timer claims to run without an anchor, restoring it stopped");
            restored.running = false;
        }

        let mut state = self.write()?;
        *state = restored;
        info!(
            "Timer restored: running={}, offset={}s, extra_time={}s",
            state.running, state.offset, state.extra_time
        );
        Ok(())
    }
}

fn non_negative(what: &str, value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| {
        warn!("Rejected negative {}: {}", what, value);
        ScoreboardError::InvalidArgument(format!("{} must not be negative, got {}", what, value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use proptest::prelude::*;
    use tokio::sync::broadcast;

    use crate::services::clock::ManualClock;

    fn engine_at(epoch: i64) -> (TimerEngine, Arc<ManualClock>, broadcast::Receiver<OverlayEvent>) {
        let clock = Arc::new(ManualClock::at_epoch(epoch));
        let (tx, rx) = broadcast::channel(64);
        let engine = TimerEngine::new(clock.clone(), Arc::new(tx));
        (engine, clock, rx)
    }

    fn drain(rx: &mut broadcast::Receiver<OverlayEvent>) -> Vec<&'static str> {
        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(event.name());
        }
        names
    }

    #[test]
    fn starts_stopped_at_zero() {
        let (engine, _clock, _rx) = engine_at(1000);
        let snapshot = engine.snapshot().unwrap();

        assert!(!snapshot.running);
        assert_eq!(snapshot.anchor_epoch_seconds, None);
        assert_eq!(snapshot.offset_seconds, 0);
        assert_eq!(snapshot.extra_time_seconds, 0);
        assert_eq!(snapshot.elapsed_seconds, 0);
        assert_eq!(snapshot.server_time_epoch_seconds, 1000.0);
    }

    #[test]
    fn start_stop_start_scenario() {
        let (engine, clock, _rx) = engine_at(1000);

        let started = engine.start().unwrap();
        assert!(started.running);
        assert_eq!(started.anchor_epoch_seconds, Some(1000.0));
        assert_eq!(started.offset_seconds, 0);

        clock.set_epoch(1010);
        assert_eq!(engine.snapshot().unwrap().elapsed_seconds, 10);

        let stopped = engine.stop().unwrap();
        assert!(!stopped.running);
        assert_eq!(stopped.offset_seconds, 10);

        clock.set_epoch(1020);
        let restarted = engine.start().unwrap();
        assert_eq!(restarted.anchor_epoch_seconds, Some(1020.0));
        assert_eq!(restarted.offset_seconds, 10);
        assert!(restarted.running);

        clock.set_epoch(1025);
        assert_eq!(engine.snapshot().unwrap().elapsed_seconds, 15);
    }

    #[test]
    fn elapsed_frozen_while_stopped_and_growing_while_running() {
        let (engine, clock, _rx) = engine_at(0);
        engine.set_absolute(90).unwrap();

        for t in [5, 50, 500] {
            clock.set_epoch(t);
            assert_eq!(engine.snapshot().unwrap().elapsed_seconds, 90);
        }

        engine.start().unwrap();
        let mut last = 0;
        for _ in 0..20 {
            clock.advance(Duration::from_millis(700));
            let elapsed = engine.snapshot().unwrap().elapsed_seconds;
            assert!(elapsed >= last, "elapsed went backwards: {} < {}", elapsed, last);
            last = elapsed;
        }
        assert_eq!(last, 90 + 14);
    }

    #[test]
    fn stop_then_start_at_same_instant_preserves_offset() {
        let (engine, clock, _rx) = engine_at(100);
        engine.start().unwrap();
        clock.set_epoch(137);

        let stopped = engine.stop().unwrap();
        let started = engine.start().unwrap();

        assert_eq!(stopped.offset_seconds, 37);
        assert_eq!(started.offset_seconds, 37);
        assert_eq!(started.elapsed_seconds, 37);
    }

    #[test]
    fn stop_floors_fractional_seconds() {
        let (engine, clock, _rx) = engine_at(0);
        engine.start().unwrap();
        clock.advance(Duration::from_millis(9_999));

        assert_eq!(engine.stop().unwrap().offset_seconds, 9);

        // Repeated sub-second runs are dropped, not rounded up
        for _ in 0..3 {
            engine.start().unwrap();
            clock.advance(Duration::from_millis(600));
            engine.stop().unwrap();
        }
        assert_eq!(engine.snapshot().unwrap().elapsed_seconds, 9);
    }

    #[test]
    fn duplicate_start_keeps_anchor_and_offset() {
        let (engine, clock, mut rx) = engine_at(1000);
        let first = engine.start().unwrap();

        clock.set_epoch(1004);
        let second = engine.start().unwrap();

        assert_eq!(first.offset_seconds, second.offset_seconds);
        assert_eq!(second.anchor_epoch_seconds, Some(1000.0));
        assert_eq!(second.elapsed_seconds, 4);
        assert_eq!(drain(&mut rx), vec!["update-timer-start"]);
    }

    #[test]
    fn duplicate_stop_is_silent() {
        let (engine, clock, mut rx) = engine_at(0);
        engine.start().unwrap();
        clock.set_epoch(20);
        engine.stop().unwrap();
        clock.set_epoch(40);

        let again = engine.stop().unwrap();
        assert_eq!(again.offset_seconds, 20);
        assert_eq!(again.anchor_epoch_seconds, Some(20.0));
        assert_eq!(drain(&mut rx), vec!["update-timer-start", "update-timer-stop"]);
    }

    #[test]
    fn reset_clears_everything_from_any_state() {
        let (engine, clock, _rx) = engine_at(0);
        engine.set_extra_time(180).unwrap();
        engine.start().unwrap();
        clock.set_epoch(2700);

        let reset = engine.reset().unwrap();
        assert!(!reset.running);
        assert_eq!(reset.elapsed_seconds, 0);
        assert_eq!(reset.extra_time_seconds, 0);
        assert_eq!(reset.anchor_epoch_seconds, Some(2700.0));

        let again = engine.reset().unwrap();
        assert_eq!(again.elapsed_seconds, 0);
    }

    #[test]
    fn set_absolute_stops_and_keeps_extra_time() {
        let (engine, clock, _rx) = engine_at(0);
        engine.set_extra_time(60).unwrap();
        engine.start().unwrap();
        clock.set_epoch(33);

        let set = engine.set_absolute(600).unwrap();
        assert!(!set.running);
        assert_eq!(set.extra_time_seconds, 60);

        clock.set_epoch(1_000);
        assert_eq!(engine.snapshot_at(clock.now()).unwrap().elapsed_seconds, 600);
    }

    #[test]
    fn negative_input_is_rejected_without_mutation() {
        let (engine, clock, mut rx) = engine_at(0);
        engine.start().unwrap();
        clock.set_epoch(12);
        engine.set_extra_time(30).unwrap();
        let before = engine.export().unwrap();
        drain(&mut rx);

        assert!(matches!(engine.set_absolute(-5), Err(ScoreboardError::InvalidArgument(_))));
        assert!(matches!(engine.set_extra_time(-1), Err(ScoreboardError::InvalidArgument(_))));

        assert_eq!(engine.export().unwrap(), before);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn set_extra_time_leaves_run_state_alone() {
        let (engine, clock, mut rx) = engine_at(0);
        engine.start().unwrap();
        clock.set_epoch(8);

        let snapshot = engine.set_extra_time(240).unwrap();
        assert!(snapshot.running);
        assert_eq!(snapshot.anchor_epoch_seconds, Some(0.0));
        assert_eq!(snapshot.elapsed_seconds, 8);
        assert_eq!(snapshot.extra_time_seconds, 240);

        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        match events.last() {
            Some(OverlayEvent::ShowExtraTime(notice)) => assert_eq!(notice.extra_time, 240),
            other => panic!("unexpected last event: {:?}", other),
        }
    }

    #[test]
    fn clock_behind_anchor_clamps_to_offset() {
        let (engine, clock, _rx) = engine_at(500);
        engine.set_absolute(40).unwrap();
        engine.start().unwrap();

        clock.set_epoch(450);
        assert_eq!(engine.snapshot().unwrap().elapsed_seconds, 40);
    }

    #[test]
    fn running_without_anchor_counts_only_offset() {
        let state = TimerState {
            running: true,
            anchor: None,
            offset: 75,
            extra_time: 0,
        };
        assert_eq!(state.elapsed_at(Utc::now()), 75);
    }

    #[test]
    fn broadcasts_follow_mutation_order() {
        let (engine, clock, mut rx) = engine_at(0);
        engine.start().unwrap();
        clock.set_epoch(5);
        engine.stop().unwrap();
        engine.set_absolute(120).unwrap();
        engine.set_extra_time(30).unwrap();
        engine.reset().unwrap();

        assert_eq!(
            drain(&mut rx),
            vec![
                "update-timer-start",
                "update-timer-stop",
                "update-timer",
                "show-extra-time",
                "update-timer",
            ]
        );
    }

    #[test]
    fn export_restore_round_trip_keeps_running_clock() {
        let (engine, clock, _rx) = engine_at(1000);
        engine.set_absolute(300).unwrap();
        engine.start().unwrap();
        let saved = engine.export().unwrap();

        let (fresh, fresh_clock, mut rx) = engine_at(1000);
        fresh.restore(saved).unwrap();
        fresh_clock.set_epoch(1060);
        clock.set_epoch(1060);

        assert_eq!(fresh.snapshot().unwrap(), engine.snapshot().unwrap());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn restore_repairs_running_state_without_anchor() {
        let (engine, _clock, _rx) = engine_at(0);
        engine
            .restore(TimerState {
                running: true,
                anchor: None,
                offset: 12,
                extra_time: 0,
            })
            .unwrap();

        let snapshot = engine.snapshot().unwrap();
        assert!(!snapshot.running);
        assert_eq!(snapshot.elapsed_seconds, 12);
    }

    #[test]
    fn concurrent_starts_and_snapshots_stay_consistent() {
        let (engine, _clock, _rx) = engine_at(0);
        let engine = Arc::new(engine);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        if i % 2 == 0 {
                            engine.start().unwrap();
                            engine.stop().unwrap();
                        } else {
                            let snapshot = engine.snapshot().unwrap();
                            assert!(!snapshot.running || snapshot.anchor_epoch_seconds.is_some());
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(engine.snapshot().unwrap().elapsed_seconds, 0);
    }

    #[derive(Debug, Clone)]
    enum ClockOp {
        Start,
        Stop,
        AdvanceMillis(u64),
    }

    fn clock_op_strategy() -> impl Strategy<Value = ClockOp> {
        prop_oneof![
            3 => Just(ClockOp::Start),
            2 => Just(ClockOp::Stop),
            5 => (0u64..5_000).prop_map(ClockOp::AdvanceMillis),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            .. ProptestConfig::default()
        })]

        #[test]
        fn prop_elapsed_follows_run_state(ops in prop::collection::vec(clock_op_strategy(), 1..64)) {
            let (engine, clock, _rx) = engine_at(1_000);
            let mut now_ms: u64 = 0;
            let mut running_since: Option<u64> = None;
            let mut banked: u64 = 0;
            let mut last_elapsed = engine.snapshot().unwrap().elapsed_seconds;

            for op in ops {
                match op {
                    ClockOp::Start => {
                        let before = engine.export().unwrap();
                        let after = engine.start().unwrap();

                        if before.running {
                            prop_assert_eq!(after.offset_seconds, before.offset);
                            prop_assert_eq!(after.anchor_epoch_seconds, before.anchor.map(epoch_seconds));
                        } else {
                            running_since = Some(now_ms);
                        }
                        prop_assert_eq!(after.offset_seconds, banked);
                    }
                    ClockOp::Stop => {
                        if let Some(since) = running_since.take() {
                            banked += (now_ms - since) / 1000;
                        }
                        let after = engine.stop().unwrap();
                        prop_assert!(!after.running);
                        prop_assert_eq!(after.offset_seconds, banked);
                    }
                    ClockOp::AdvanceMillis(ms) => {
                        clock.advance(Duration::from_millis(ms));
                        now_ms += ms;

                        let elapsed = engine.snapshot().unwrap().elapsed_seconds;
                        if running_since.is_some() {
                            prop_assert!(elapsed >= last_elapsed, "elapsed went backwards: {} < {}", elapsed, last_elapsed);
                        } else {
                            prop_assert_eq!(elapsed, last_elapsed);
                        }
                    }
                }
                last_elapsed = engine.snapshot().unwrap().elapsed_seconds;
            }

            let expected = banked + running_since.map_or(0, |since| (now_ms - since) / 1000);
            prop_assert_eq!(engine.snapshot().unwrap().elapsed_seconds, expected);
        }
    }
}
