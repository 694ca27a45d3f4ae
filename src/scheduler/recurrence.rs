//! Weekly recurrence math for shutdown rules.
//!
//! All functions are deterministic and generic over the chrono time zone so tests can
//! pin `now` in UTC while the scheduler uses the local zone.

use crate::config::ShutdownRule;
use chrono::{DateTime, Datelike, Days, NaiveTime, TimeZone, Weekday};

/// Parse a rule time. Accepts `HH:MM:SS` and `HH:MM`.
pub fn parse_rule_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()
}

/// Map a stored weekday index (0 = Sunday .. 6 = Saturday).
pub fn weekday_from_index(index: u8) -> Option<Weekday> {
    match index {
        0 => Some(Weekday::Sun),
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        _ => None,
    }
}

/// The next instant strictly after `now` that falls on `weekday` at `time`.
///
/// Returns `None` only when the wall-clock time does not exist on the target
/// date (a DST gap). Ambiguous times resolve to the earliest instant.
pub fn next_occurrence<Tz: TimeZone>(
    now: &DateTime<Tz>,
    weekday: Weekday,
    time: NaiveTime,
) -> Option<DateTime<Tz>> {
    let current = now.weekday().num_days_from_sunday();
    let target = weekday.num_days_from_sunday();
    let mut delta = (target + 7 - current) % 7;

    let today = now.date_naive();
    if delta == 0 {
        let candidate = now
            .timezone()
            .from_local_datetime(&today.and_time(time))
            .earliest();
        match candidate {
            Some(c) if c > *now => return Some(c),
            _ => delta = 7,
        }
    }

    let date = today.checked_add_days(Days::new(u64::from(delta)))?;
    now.timezone()
        .from_local_datetime(&date.and_time(time))
        .earliest()
}

/// Expand one rule into its next firing instant per weekday.
///
/// Inactive rules, unparseable times, and out-of-range weekdays yield nothing.
/// Repeated weekdays are collapsed.
pub fn expand_rule<Tz: TimeZone>(
    rule: &ShutdownRule,
    now: &DateTime<Tz>,
) -> Vec<(Weekday, DateTime<Tz>)> {
    if !rule.active || rule.weekdays.is_empty() {
        return Vec::new();
    }
    let Some(time) = parse_rule_time(&rule.time) else {
        tracing::warn!("ignoring shutdown rule with unparsable time {:?}", rule.time);
        return Vec::new();
    };

    let mut seen: Vec<Weekday> = Vec::with_capacity(rule.weekdays.len());
    let mut out = Vec::with_capacity(rule.weekdays.len());
    for &index in &rule.weekdays {
        let Some(weekday) = weekday_from_index(index) else {
            tracing::warn!("ignoring invalid weekday {index} in shutdown rule");
            continue;
        };
        if seen.contains(&weekday) {
            continue;
        }
        seen.push(weekday);
        if let Some(at) = next_occurrence(now, weekday, time) {
            out.push((weekday, at));
        }
    }
    out
}
