//! Scheduler Loop: parses an interval + wall-clock start time,
//! sleeps in short tranches so a termination signal is observed quickly,
//! and invokes the orchestrator on each activation. A `tokio` async loop
//! rather than a thread-and-mutex one, since there is a single scheduled
//! action to drive rather than a queue of independent jobs.

use std::time::Duration;

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::config::ScheduleConfig;
use crate::constants::SCHEDULER_POLL_INTERVAL_SECS;
use crate::error::{KaiError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntervalUnit {
    Hours,
    Days,
    Weeks,
    Months,
}

#[derive(Clone, Copy, Debug)]
pub struct Interval {
    pub amount: i64,
    pub unit: IntervalUnit,
}

impl Interval {
    /// Parse `<N>{h|d|w|mo}`.
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        let digits_end = spec.find(|c: char| !c.is_ascii_digit()).unwrap_or(spec.len());
        if digits_end == 0 {
            return Err(KaiError::Config(format!("invalid schedule interval {spec:?}: missing amount")));
        }
        let amount: i64 = spec[..digits_end]
            .parse()
            .map_err(|_| KaiError::Config(format!("invalid schedule interval {spec:?}")))?;
        let unit = match &spec[digits_end..] {
            "h" => IntervalUnit::Hours,
            "d" => IntervalUnit::Days,
            "w" => IntervalUnit::Weeks,
            "mo" => IntervalUnit::Months,
            other => {
                return Err(KaiError::Config(format!(
                    "invalid schedule interval unit {other:?}, expected one of h/d/w/mo"
                )))
            }
        };
        Ok(Interval { amount, unit })
    }

    fn as_duration_approx(&self) -> chrono::Duration {
        match self.unit {
            IntervalUnit::Hours => chrono::Duration::hours(self.amount),
            IntervalUnit::Days => chrono::Duration::days(self.amount),
            IntervalUnit::Weeks => chrono::Duration::weeks(self.amount),
            // Calendar months vary in length; 30 days is an approximation
            // used only to compute the epoch-multiple anchor, not to add
            // to a concrete date.
            IntervalUnit::Months => chrono::Duration::days(self.amount * 30),
        }
    }
}

pub struct Schedule {
    interval: Interval,
    start_time: NaiveTime,
    timezone: Tz,
}

impl Schedule {
    pub fn from_config(config: &ScheduleConfig) -> Result<Self> {
        let interval = Interval::parse(&config.interval)?;
        let start_time = NaiveTime::parse_from_str(&config.start_time, "%H:%M")
            .map_err(|e| KaiError::Config(format!("invalid schedule start_time {:?}: {e}", config.start_time)))?;
        let timezone: Tz = config
            .timezone
            .parse()
            .map_err(|_| KaiError::Config(format!("unknown timezone {:?}", config.timezone)))?;
        Ok(Schedule { interval, start_time, timezone })
    }

    /// Earliest future instant at or after `now` whose local clock-time
    /// equals `start_time` and whose offset from the Unix epoch is a
    /// multiple of the interval.
    pub fn next_activation(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local_now = now.with_timezone(&self.timezone);
        let mut candidate = local_now.date_naive().and_time(self.start_time);
        let mut candidate_utc = self
            .timezone
            .from_local_datetime(&candidate)
            .single()
            .unwrap_or(now.with_timezone(&self.timezone))
            .with_timezone(&Utc);

        let step = self.interval.as_duration_approx().max(chrono::Duration::hours(1));
        let epoch = DateTime::<Utc>::from_timestamp(0, 0).unwrap();

        while candidate_utc <= now || !is_epoch_aligned(epoch, candidate_utc, step) {
            candidate = candidate + chrono::Duration::days(1);
            candidate_utc = self
                .timezone
                .from_local_datetime(&candidate)
                .single()
                .unwrap_or((candidate_utc + chrono::Duration::days(1)).with_timezone(&self.timezone))
                .with_timezone(&Utc);
            if candidate_utc > now + chrono::Duration::days(370) {
                // Guards against an unsatisfiable alignment (e.g. a step
                // larger than a year) looping forever.
                break;
            }
        }
        candidate_utc
    }
}

fn is_epoch_aligned(epoch: DateTime<Utc>, candidate: DateTime<Utc>, step: chrono::Duration) -> bool {
    let elapsed = candidate - epoch;
    let step_secs = step.num_seconds().max(1);
    elapsed.num_seconds() % step_secs == 0
}

/// Sleep until `target`, in tranches no longer than
/// [`SCHEDULER_POLL_INTERVAL_SECS`] so a cancellation signal checked
/// between tranches takes effect promptly. Returns early (without
/// completing the full sleep) if `cancelled` becomes true.
pub async fn sleep_until<F: Fn() -> bool>(target: DateTime<Utc>, cancelled: F) {
    loop {
        let now = Utc::now();
        if now >= target || cancelled() {
            return;
        }
        let remaining = (target - now).num_seconds().max(0) as u64;
        let tranche = remaining.min(SCHEDULER_POLL_INTERVAL_SECS);
        tokio::time::sleep(Duration::from_secs(tranche.max(1))).await;
    }
}
