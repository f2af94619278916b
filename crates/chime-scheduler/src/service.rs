//! Foreground reminder management: add, list, edit, delete.
//!
//! Input is validated and normalized here before it reaches the store, so the
//! scheduler only ever sees reminders with non-empty text and a positive
//! interval.

use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::{info, warn};

use crate::when::truncate_to_seconds;
use crate::{
    Clock, NewReminder, Recurrence, Reminder, ReminderError, ReminderId, ReminderStore,
    StoreError, latest_timestamp, normalize_interval, system_clock,
};

/// Message for a time that is not in the future.
pub const PAST_TIME_MESSAGE: &str =
    "The time you entered is in the past. Please enter a future time.";

/// Parse a user-supplied recurrence name leniently.
///
/// Unknown names fall back to a one-time reminder with a warning.
pub fn recurrence_or_once(name: &str) -> Option<Recurrence> {
    match name.parse::<Recurrence>() {
        Ok(kind) => Some(kind),
        Err(e) => {
            warn!(error = %e, "invalid recurrence, setting as one-time reminder");
            None
        }
    }
}

/// Changes to apply to an existing reminder. `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReminderEdit {
    pub text: Option<String>,
    pub due_at: Option<NaiveDateTime>,
    /// `Some(None)` removes the recurrence.
    pub recurrence: Option<Option<Recurrence>>,
    pub interval: Option<i64>,
    /// `Some(None)` removes the end date.
    pub recurrence_end: Option<Option<NaiveDateTime>>,
}

impl ReminderEdit {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Reminder CRUD on top of a shared store.
#[derive(Clone)]
pub struct ReminderService {
    store: Arc<dyn ReminderStore>,
    clock: Clock,
}

impl ReminderService {
    pub fn new(store: Arc<dyn ReminderStore>) -> Self {
        Self {
            store,
            clock: system_clock(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Arc<dyn ReminderStore> {
        &self.store
    }

    fn now(&self) -> NaiveDateTime {
        (self.clock)()
    }

    /// Validate and persist a new reminder.
    ///
    /// `due_at` must be in the future and no later than [`latest_timestamp`].
    /// An interval below one becomes one, and an end date that has already
    /// passed is dropped; both are logged as warnings.
    #[tracing::instrument(skip(self, text))]
    pub fn add_reminder(
        &self,
        text: &str,
        due_at: NaiveDateTime,
        recurrence: Option<Recurrence>,
        interval: Option<i64>,
        recurrence_end: Option<NaiveDateTime>,
    ) -> Result<ReminderId, ReminderError> {
        let now = self.now();
        let text = validate_text(text)?;
        let due_at = validate_due_at(due_at, now)?;

        let reminder = match recurrence {
            None => NewReminder::once(text, due_at),
            Some(kind) => NewReminder {
                recurrence_end: checked_end(recurrence_end, now)?,
                ..NewReminder::recurring(text, due_at, kind, checked_interval(interval))
            },
        };

        let id = self.store.create(&reminder)?;
        info!(
            id = %id,
            due_at = %reminder.due_at,
            recurrence = reminder.recurrence.map(|r| r.as_str()),
            "reminder created"
        );
        Ok(id)
    }

    /// Reminders that have not fired yet, soonest first.
    pub fn list_upcoming(&self) -> Result<Vec<Reminder>, ReminderError> {
        Ok(self.store.upcoming_reminders(self.now())?)
    }

    /// Look up one reminder, failing if it does not exist.
    pub fn get(&self, id: ReminderId) -> Result<Reminder, ReminderError> {
        self.store
            .get(id)?
            .ok_or(ReminderError::Store(StoreError::NotFound(id)))
    }

    /// Apply `edit` to reminder `id` and persist it.
    ///
    /// Removing the recurrence also resets the interval to one and clears the
    /// end date.
    #[tracing::instrument(skip(self, edit))]
    pub fn edit_reminder(
        &self,
        id: ReminderId,
        edit: ReminderEdit,
    ) -> Result<Reminder, ReminderError> {
        if edit.is_empty() {
            return Err(ReminderError::Validation("nothing to change".to_string()));
        }

        // Validate everything before touching the store
        let now = self.now();
        let text = edit.text.as_deref().map(validate_text).transpose()?;
        let due_at = edit
            .due_at
            .map(|due_at| validate_due_at(due_at, now))
            .transpose()?;
        let interval = edit.interval.map(|raw| checked_interval(Some(raw)));
        let recurrence_end = edit
            .recurrence_end
            .map(|end| checked_end(end, now))
            .transpose()?;

        // Only the edited fields change, so a concurrent reschedule is kept
        let reminder = self.store.modify(id, &mut |reminder: &mut Reminder| {
            if let Some(text) = &text {
                reminder.text = text.clone();
            }
            if let Some(due_at) = due_at {
                reminder.due_at = due_at;
            }
            if let Some(recurrence) = edit.recurrence {
                reminder.recurrence = recurrence;
            }
            if let Some(interval) = interval {
                reminder.interval = interval;
            }
            if let Some(end) = recurrence_end {
                reminder.recurrence_end = end;
            }
            if reminder.recurrence.is_none() {
                reminder.interval = 1;
                reminder.recurrence_end = None;
            }
        })?;

        info!(id = %id, due_at = %reminder.due_at, "reminder updated");
        Ok(reminder)
    }

    /// Delete reminder `id`, failing if it does not exist.
    #[tracing::instrument(skip(self))]
    pub fn delete_reminder(&self, id: ReminderId) -> Result<(), ReminderError> {
        self.get(id)?;
        self.store.delete(id)?;
        info!(id = %id, "reminder deleted");
        Ok(())
    }
}

fn validate_text(text: &str) -> Result<String, ReminderError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ReminderError::Validation(
            "reminder text cannot be empty".to_string(),
        ));
    }
    Ok(text.to_string())
}

fn validate_due_at(due_at: NaiveDateTime, now: NaiveDateTime) -> Result<NaiveDateTime, ReminderError> {
    let due_at = truncate_to_seconds(due_at);
    if due_at <= now {
        return Err(ReminderError::Validation(PAST_TIME_MESSAGE.to_string()));
    }
    check_latest(due_at)
}

fn check_latest(ts: NaiveDateTime) -> Result<NaiveDateTime, ReminderError> {
    if ts > latest_timestamp() {
        return Err(ReminderError::Validation(format!(
            "{} is too far in the future, the latest supported time is {}",
            ts,
            latest_timestamp()
        )));
    }
    Ok(ts)
}

fn checked_interval(raw: Option<i64>) -> u32 {
    let raw = raw.unwrap_or(1);
    let interval = normalize_interval(raw);
    if i64::from(interval) != raw {
        warn!(raw, interval, "invalid interval, using {}", interval);
    }
    interval
}

fn checked_end(
    end: Option<NaiveDateTime>,
    now: NaiveDateTime,
) -> Result<Option<NaiveDateTime>, ReminderError> {
    match end {
        Some(end) if end <= now => {
            warn!(%end, "end date is in the past, no end date set");
            Ok(None)
        }
        Some(end) => check_latest(truncate_to_seconds(end)).map(Some),
        None => Ok(None),
    }
}
