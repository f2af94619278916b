//! Reminder types.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::recurrence::next_occurrence;

/// Format used for timestamps shown to the user.
pub const DISPLAY_FORMAT: &str = "%b %d %Y %I:%M %p";

/// Latest timestamp a reminder may carry.
///
/// Stored timestamps are compared as text, which only orders correctly for
/// four-digit years.
pub fn latest_timestamp() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(9999, 12, 31)
        .and_then(|d| d.and_hms_opt(23, 59, 59))
        .unwrap_or(NaiveDateTime::MAX)
}

/// Store-assigned reminder identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReminderId(pub i64);

impl fmt::Display for ReminderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ReminderId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().trim_start_matches('#').parse().map(ReminderId)
    }
}

/// Calendar unit between occurrences of a recurring reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recurrence {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Recurrence {
    /// All recurrence kinds, in increasing unit size.
    pub const ALL: [Recurrence; 4] = [
        Recurrence::Daily,
        Recurrence::Weekly,
        Recurrence::Monthly,
        Recurrence::Yearly,
    ];

    /// Name as persisted and accepted on input.
    pub fn as_str(&self) -> &'static str {
        match self {
            Recurrence::Daily => "daily",
            Recurrence::Weekly => "weekly",
            Recurrence::Monthly => "monthly",
            Recurrence::Yearly => "yearly",
        }
    }

    /// Singular noun for the unit ("day", "week", ...).
    pub fn unit(&self) -> &'static str {
        match self {
            Recurrence::Daily => "day",
            Recurrence::Weekly => "week",
            Recurrence::Monthly => "month",
            Recurrence::Yearly => "year",
        }
    }
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Recurrence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" | "day" => Ok(Recurrence::Daily),
            "weekly" | "week" => Ok(Recurrence::Weekly),
            "monthly" | "month" => Ok(Recurrence::Monthly),
            "yearly" | "year" | "annually" => Ok(Recurrence::Yearly),
            other => Err(format!(
                "unknown recurrence '{}', expected daily, weekly, monthly or yearly",
                other
            )),
        }
    }
}

/// Clamp a user-supplied interval to the valid range (>= 1).
pub fn normalize_interval(raw: i64) -> u32 {
    if raw < 1 {
        1
    } else {
        u32::try_from(raw).unwrap_or(u32::MAX)
    }
}

/// A reminder that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReminder {
    pub text: String,
    pub due_at: NaiveDateTime,
    pub recurrence: Option<Recurrence>,
    pub interval: u32,
    pub recurrence_end: Option<NaiveDateTime>,
}

impl NewReminder {
    /// A one-time reminder.
    pub fn once(text: impl Into<String>, due_at: NaiveDateTime) -> Self {
        Self {
            text: text.into(),
            due_at,
            recurrence: None,
            interval: 1,
            recurrence_end: None,
        }
    }

    /// A reminder repeating every `interval` units of `recurrence`.
    pub fn recurring(
        text: impl Into<String>,
        due_at: NaiveDateTime,
        recurrence: Recurrence,
        interval: u32,
    ) -> Self {
        Self {
            text: text.into(),
            due_at,
            recurrence: Some(recurrence),
            interval: interval.max(1),
            recurrence_end: None,
        }
    }

    /// Stop recurring after `end`.
    pub fn until(mut self, end: NaiveDateTime) -> Self {
        self.recurrence_end = Some(end);
        self
    }

    /// Attach the id the store assigned.
    pub fn with_id(self, id: ReminderId) -> Reminder {
        Reminder {
            id,
            text: self.text,
            due_at: self.due_at,
            recurrence: self.recurrence,
            interval: self.interval.max(1),
            recurrence_end: self.recurrence_end,
        }
    }
}

/// A persisted reminder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: ReminderId,
    pub text: String,
    pub due_at: NaiveDateTime,
    pub recurrence: Option<Recurrence>,
    pub interval: u32,
    pub recurrence_end: Option<NaiveDateTime>,
}

impl Reminder {
    /// Whether this reminder should fire at `now`.
    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        self.due_at <= now
    }

    /// The occurrence after the current `due_at`, or `None` once the reminder is finished.
    ///
    /// One-time reminders never have a next occurrence.
    pub fn next_occurrence(&self) -> Option<NaiveDateTime> {
        let kind = self.recurrence?;
        next_occurrence(self.due_at, kind, self.interval, self.recurrence_end)
    }

    /// Human-readable recurrence suffix, empty for one-time reminders.
    ///
    /// e.g. ` (Repeats every 2 weeks), until Mar 01 2025`
    pub fn describe_recurrence(&self) -> String {
        let Some(kind) = self.recurrence else {
            return String::new();
        };

        let mut out = format!(" (Repeats every {} {}", self.interval, kind.unit());
        if self.interval > 1 {
            out.push('s');
        }
        out.push(')');
        if let Some(end) = self.recurrence_end {
            out.push_str(&format!(", until {}", end.format("%b %d %Y")));
        }
        out
    }

    /// One line for listings: `[Jan 05 2025 09:00 AM] - text (Repeats ...)`.
    pub fn describe(&self) -> String {
        format!(
            "[{}] - {}{}",
            self.due_at.format(DISPLAY_FORMAT),
            self.text,
            self.describe_recurrence()
        )
    }
}
