//! Reminder scheduling for Chime.
//!
//! This crate provides:
//! - A SQLite-backed reminder store (plus an in-memory one for tests)
//! - Calendar-aware recurrence (daily, weekly, monthly, yearly with clamping)
//! - A polling scheduler that delivers due reminders at least once
//! - Pluggable notification sinks
//! - Natural time expressions such as `in 2 hours` or `tomorrow at 5pm`

mod config;
mod error;
mod notify;
mod recurrence;
mod scheduler;
mod service;
mod store;
mod types;
pub mod when;

pub use config::{DEFAULT_DELIVERY_TIMEOUT, DEFAULT_POLL_INTERVAL, SchedulerConfig};
pub use error::{DeliveryError, ReminderError, StoreError};
pub use notify::{CommandSink, ConsoleSink, NotificationSink};
pub use recurrence::next_occurrence;
pub use scheduler::{LoopState, PollReport, Scheduler, SchedulerHandle};
pub use service::{PAST_TIME_MESSAGE, ReminderEdit, ReminderService, recurrence_or_once};
pub use store::{MemoryStore, ReminderStore, SqliteStore};
pub use types::{
    DISPLAY_FORMAT, NewReminder, Recurrence, Reminder, ReminderId, latest_timestamp,
    normalize_interval,
};
pub use when::{Clock, PARSE_HINT, local_now, parse_when, system_clock};
