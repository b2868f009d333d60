//! Scan scheduling engine.
//!
//! One loop evaluates two timers (full scan and refresh) on a fixed tick.
//! A timer is due at `last automatic run + interval`, or, before its first
//! automatic run, at `anchor + interval` where the anchor is when scheduling
//! started or the timer was last re-enabled. A due timer that finds the scan
//! slot busy is skipped and retried on the next tick.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use lanwatch_core::{ScanTrigger, ScanType};

use crate::error::DiscoverError;
use crate::orchestrator::{ScanOrchestrator, ScanTarget};
use crate::settings::SettingsHandle;

/// When a timer next fires. Saturates at the latest representable time
/// instead of overflowing.
pub fn next_due(
    last_auto: Option<DateTime<Utc>>,
    anchor: DateTime<Utc>,
    interval_minutes: u64,
) -> DateTime<Utc> {
    let minutes = i64::try_from(interval_minutes.max(1)).unwrap_or(i64::MAX);
    let interval = TimeDelta::try_minutes(minutes).unwrap_or(TimeDelta::MAX);
    last_auto
        .unwrap_or(anchor)
        .checked_add_signed(interval)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[derive(Debug, Clone, Copy)]
struct TimerState {
    anchor: DateTime<Utc>,
    last_auto: Option<DateTime<Utc>>,
    enabled: bool,
}

impl TimerState {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            anchor: now,
            last_auto: None,
            enabled: false,
        }
    }

    /// Track enablement; the anchor moves to `now` while disabled so a
    /// re-enabled timer waits a full interval.
    fn observe(&mut self, enabled: bool, now: DateTime<Utc>) {
        if !enabled {
            self.anchor = now;
        }
        self.enabled = enabled;
    }
}

#[derive(Debug, Clone, Copy)]
struct Timers {
    full_scan: TimerState,
    refresh: TimerState,
}

/// What one timer did on a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOutcome {
    Disabled,
    NotDue,
    Started(Uuid),
    /// Another job held the slot.
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub full_scan: TimerOutcome,
    pub refresh: TimerOutcome,
}

/// Next fire times; `None` for a disabled timer.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NextRuns {
    pub full_scan: Option<DateTime<Utc>>,
    pub refresh: Option<DateTime<Utc>>,
}

/// Drives automatic full scans and refreshes.
pub struct ScanScheduler {
    orchestrator: Arc<ScanOrchestrator>,
    settings: SettingsHandle,
    tick: Duration,
    timers: Mutex<Timers>,
}

impl ScanScheduler {
    pub fn new(orchestrator: Arc<ScanOrchestrator>, settings: SettingsHandle, tick: Duration) -> Self {
        let now = Utc::now();
        Self {
            orchestrator,
            settings,
            tick,
            timers: Mutex::new(Timers {
                full_scan: TimerState::new(now),
                refresh: TimerState::new(now),
            }),
        }
    }

    /// Tick until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(tick_secs = self.tick.as_secs(), "Scheduler started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.tick(Utc::now());
                    tracing::trace!(?report, "Scheduler tick");
                }
            }
        }
        tracing::info!("Scheduler stopped");
    }

    /// Evaluate both timers at `now` and start whatever is due.
    pub fn tick(&self, now: DateTime<Utc>) -> TickReport {
        let schedule = self.settings.schedule();
        let mut timers = self.timers();

        let full_enabled = schedule.enabled && schedule.full_scan.enabled;
        timers.full_scan.observe(full_enabled, now);
        let full_scan = if !full_enabled {
            TimerOutcome::Disabled
        } else if now < next_due(timers.full_scan.last_auto, timers.full_scan.anchor, schedule.full_scan.interval_minutes) {
            TimerOutcome::NotDue
        } else {
            let result = self
                .orchestrator
                .start_scan(ScanTarget::Default, ScanType::Full, ScanTrigger::Auto);
            settle("full_scan", &mut timers.full_scan, result, now)
        };

        let refresh_enabled = schedule.enabled && schedule.refresh.enabled;
        timers.refresh.observe(refresh_enabled, now);
        let refresh = if !refresh_enabled {
            TimerOutcome::Disabled
        } else if now < next_due(timers.refresh.last_auto, timers.refresh.anchor, schedule.refresh.interval_minutes) {
            TimerOutcome::NotDue
        } else {
            let result = self
                .orchestrator
                .spawn_refresh(schedule.refresh.scan_type, ScanTrigger::Auto);
            settle("refresh", &mut timers.refresh, result, now)
        };

        TickReport { full_scan, refresh }
    }

    pub fn next_runs(&self) -> NextRuns {
        let schedule = self.settings.schedule();
        let timers = *self.timers();
        let now = Utc::now();

        let full_enabled = schedule.enabled && schedule.full_scan.enabled;
        let refresh_enabled = schedule.enabled && schedule.refresh.enabled;
        // A timer the loop has not yet seen enabled will anchor on its next tick.
        let anchor = |t: &TimerState| if t.enabled { t.anchor } else { now };

        NextRuns {
            full_scan: full_enabled.then(|| {
                next_due(
                    timers.full_scan.last_auto,
                    anchor(&timers.full_scan),
                    schedule.full_scan.interval_minutes,
                )
            }),
            refresh: refresh_enabled.then(|| {
                next_due(
                    timers.refresh.last_auto,
                    anchor(&timers.refresh),
                    schedule.refresh.interval_minutes,
                )
            }),
        }
    }

    fn timers(&self) -> MutexGuard<'_, Timers> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn settle(
    timer: &str,
    state: &mut TimerState,
    result: Result<Uuid, DiscoverError>,
    now: DateTime<Utc>,
) -> TimerOutcome {
    match result {
        Ok(job_id) => {
            tracing::info!(timer, job_id = %job_id, "Scheduled job started");
            state.last_auto = Some(now);
            TimerOutcome::Started(job_id)
        }
        Err(DiscoverError::Conflict(running)) => {
            tracing::debug!(timer, running = %running, "Scan slot busy, retrying next tick");
            TimerOutcome::Skipped
        }
        Err(e) => {
            // Count the attempt so a bad default range does not retry every tick.
            tracing::error!(timer, error = %e, "Scheduled job failed to start");
            state.last_auto = Some(now);
            TimerOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_due_from_anchor_then_last_run() {
        let anchor = Utc::now();
        assert_eq!(next_due(None, anchor, 60), anchor + TimeDelta::minutes(60));

        let last = anchor + TimeDelta::minutes(75);
        assert_eq!(next_due(Some(last), anchor, 60), last + TimeDelta::minutes(60));
    }

    #[test]
    fn test_zero_interval_treated_as_one_minute() {
        let anchor = Utc::now();
        assert_eq!(next_due(None, anchor, 0), anchor + TimeDelta::minutes(1));
    }

    #[test]
    fn test_huge_interval_never_fires_early() {
        let anchor = Utc::now();
        for minutes in [10_000_000_000_000, i64::MAX as u64, u64::MAX] {
            let due = next_due(None, anchor, minutes);
            assert!(due > anchor + TimeDelta::days(365), "interval {minutes}");
        }
        assert_eq!(next_due(Some(anchor), anchor, u64::MAX), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_disabled_timer_reanchors() {
        let start = Utc::now();
        let mut state = TimerState::new(start);
        state.observe(true, start);

        let later = start + TimeDelta::minutes(90);
        state.observe(false, later);
        state.observe(true, later + TimeDelta::minutes(1));
        assert_eq!(state.anchor, later);
        assert_eq!(next_due(state.last_auto, state.anchor, 60), later + TimeDelta::minutes(60));
    }

    #[test]
    fn test_conflict_does_not_consume_the_timer() {
        let now = Utc::now();
        let mut state = TimerState::new(now);
        let outcome = settle(
            "refresh",
            &mut state,
            Err(DiscoverError::Conflict("job".to_string())),
            now,
        );
        assert_eq!(outcome, TimerOutcome::Skipped);
        assert_eq!(state.last_auto, None);

        let id = Uuid::new_v4();
        assert_eq!(settle("refresh", &mut state, Ok(id), now), TimerOutcome::Started(id));
        assert_eq!(state.last_auto, Some(now));
    }
}
