//! Turning user time expressions into concrete local timestamps.
//!
//! Supported forms (case-insensitive):
//! - `now`
//! - `in 15 minutes`, `in 2h`, `in 3 days`, `in 1 week`
//! - `10 minutes ago`
//! - `today 17:30`, `tomorrow`, `tomorrow at 5pm`
//! - `17:30`, `5pm`, `at 9:15 am` (today)
//! - `2025-01-31`, `2025-01-31 09:00`, `2025-01-31T09:00:00`

use std::sync::{Arc, OnceLock};

use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use regex::Regex;

use crate::ReminderError;

/// Source of "now" for the scheduler and service. Tests substitute a fixed clock.
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// The local wall clock.
pub fn system_clock() -> Clock {
    Arc::new(local_now)
}

/// Shown to the user when an expression is not understood.
pub const PARSE_HINT: &str =
    "Try phrases like 'in 2 hours', 'tomorrow at 17:00', or '2025-01-31 09:00'.";

/// Time of day used when only a date is given.
const DEFAULT_HOUR: u32 = 9;

const ABSOLUTE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// Current local wall-clock time, truncated to whole seconds.
pub fn local_now() -> NaiveDateTime {
    truncate_to_seconds(Local::now().naive_local())
}

/// Drop sub-second precision; persisted timestamps only keep seconds.
pub fn truncate_to_seconds(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_nanosecond(0).unwrap_or(ts)
}

fn relative_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:in\s+)?(\d+)\s*([a-z]+)(\s+ago)?$").unwrap())
}

fn day_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(today|tomorrow)(?:\s+(?:at\s+)?(\d{1,2})(?::(\d{2}))?\s*(am|pm)?)?$").unwrap()
    })
}

fn clock_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:at\s+)?(\d{1,2})(?::(\d{2}))?\s*(am|pm)?$").unwrap())
}

/// Resolve `input` relative to `now`.
///
/// The result may lie in the past (`10 minutes ago`, `08:00` in the evening);
/// rejecting past times is up to the caller.
pub fn parse_when(input: &str, now: NaiveDateTime) -> Result<NaiveDateTime, ReminderError> {
    let normalized = input.trim().to_lowercase();
    let normalized = normalized.split_whitespace().collect::<Vec<_>>().join(" ");

    resolve(&normalized, now)
        .map(truncate_to_seconds)
        .ok_or_else(|| ReminderError::Parse(format!("'{}'. {}", input.trim(), PARSE_HINT)))
}

fn resolve(input: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    if input.is_empty() {
        return None;
    }
    if input == "now" {
        return Some(now);
    }

    // Exactly one of "in ..." / "... ago", otherwise "5pm" and friends fall through
    if let Some(caps) = relative_regex()
        .captures(input)
        .filter(|caps| input.starts_with("in ") != caps.get(3).is_some())
    {
        let ago = caps.get(3).is_some();
        let amount: i64 = caps[1].parse().ok()?;
        let offset = unit_duration(&caps[2], amount)?;
        return if ago {
            now.checked_sub_signed(offset)
        } else {
            now.checked_add_signed(offset)
        };
    }

    if let Some(caps) = day_regex().captures(input) {
        let date = match &caps[1] {
            "today" => now.date(),
            _ => now.date().succ_opt()?,
        };
        let time = match caps.get(2) {
            Some(hour) => time_of_day(
                hour.as_str(),
                caps.get(3).map(|m| m.as_str()),
                caps.get(4).map(|m| m.as_str()),
            )?,
            None => NaiveTime::from_hms_opt(DEFAULT_HOUR, 0, 0)?,
        };
        return Some(date.and_time(time));
    }

    if let Some(caps) = clock_regex().captures(input) {
        let minute = caps.get(2).map(|m| m.as_str());
        let meridiem = caps.get(3).map(|m| m.as_str());
        // A bare number is too ambiguous to be a time
        if minute.is_none() && meridiem.is_none() {
            return None;
        }
        let time = time_of_day(&caps[1], minute, meridiem)?;
        return Some(now.date().and_time(time));
    }

    for format in ABSOLUTE_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(input, format) {
            return Some(ts);
        }
    }

    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(DEFAULT_HOUR, 0, 0))
}

fn unit_duration(unit: &str, amount: i64) -> Option<Duration> {
    let seconds_per_unit: i64 = match unit {
        "s" | "sec" | "secs" | "second" | "seconds" => 1,
        "m" | "min" | "mins" | "minute" | "minutes" => 60,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3_600,
        "d" | "day" | "days" => 86_400,
        "w" | "wk" | "wks" | "week" | "weeks" => 604_800,
        _ => return None,
    };
    Duration::try_seconds(amount.checked_mul(seconds_per_unit)?)
}

fn time_of_day(hour: &str, minute: Option<&str>, meridiem: Option<&str>) -> Option<NaiveTime> {
    let mut hour: u32 = hour.parse().ok()?;
    let minute: u32 = minute.map(str::parse).transpose().ok()?.unwrap_or(0);

    match meridiem {
        Some(m) => {
            if !(1..=12).contains(&hour) {
                return None;
            }
            hour %= 12;
            if m == "pm" {
                hour += 12;
            }
        }
        None if hour > 23 => return None,
        None => {}
    }

    NaiveTime::from_hms_opt(hour, minute, 0)
}
