//! Schedule policy due-ness.
//!
//! Wall-clock policies (hourly/daily/weekly) are mapped onto 6-field cron
//! expressions and checked with a tick-window test: the policy is due at
//! `now` iff a scheduled tick falls in `(since, now]`, where `since` is the
//! later of the last fire and the moment the config was applied. That makes
//! a daily 02:00 schedule set at 01:59 fire exactly once when the clock
//! reaches 02:00 — never once per minute of drift, and never retroactively.
//! The custom policy is a plain elapsed-interval check.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tracing::warn;

use kasane_core::model::{parse_hhmm, ScheduleConfig, SchedulePolicy};

/// Cron day-of-week names indexed by the config's 0-6 (Sunday = 0) scheme.
const DOW_NAMES: &[&str] = &["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// Whether `config` should fire at `now`, given the anchor instant `since`
/// (last fire, or when the config was applied if it has never fired).
pub fn is_due(config: &ScheduleConfig, now: DateTime<Utc>, since: DateTime<Utc>) -> bool {
    if !config.enabled {
        return false;
    }
    match &config.policy {
        SchedulePolicy::Custom { every_minutes } => {
            now.signed_duration_since(since) >= chrono::Duration::minutes(*every_minutes as i64)
        }
        policy => match policy_cron(policy) {
            Ok(schedule) => is_cron_due(&schedule, now, since),
            Err(e) => {
                warn!(error = %e, "invalid schedule policy — treating as not due");
                false
            }
        },
    }
}

/// Map a wall-clock policy onto a 6-field cron expression
/// (sec min hour day-of-month month day-of-week).
fn policy_cron(policy: &SchedulePolicy) -> Result<Schedule, String> {
    let expr = match policy {
        SchedulePolicy::Hourly => "0 0 * * * *".to_string(),
        SchedulePolicy::Daily { time } => {
            let (hour, minute) = parse_hhmm(time).map_err(|e| e.to_string())?;
            format!("0 {} {} * * *", minute, hour)
        }
        SchedulePolicy::Weekly { day, time } => {
            let (hour, minute) = parse_hhmm(time).map_err(|e| e.to_string())?;
            let dow = DOW_NAMES
                .get(*day as usize)
                .ok_or_else(|| format!("day {} out of range", day))?;
            format!("0 {} {} * * {}", minute, hour, dow)
        }
        SchedulePolicy::Custom { .. } => {
            return Err("custom policy is interval-based, not cron".to_string())
        }
    };
    Schedule::from_str(&expr).map_err(|e| e.to_string())
}

/// Check if a cron schedule has a tick in the window `(since, now]`.
fn is_cron_due(schedule: &Schedule, now: DateTime<Utc>, since: DateTime<Utc>) -> bool {
    if let Some(next) = schedule.after(&since).next() {
        next <= now
    } else {
        false
    }
}

// ── Tests ────────────────────────────────────────────────────────────
