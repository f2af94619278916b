//! Error types for reminder operations.

use thiserror::Error;

use crate::ReminderId;

/// Errors raised by a [`ReminderStore`](crate::ReminderStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The backing medium cannot be used (poisoned lock, unreadable row).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// No reminder with this id.
    #[error("reminder not found: {0}")]
    NotFound(ReminderId),
}

/// A notification could not be shown.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// IO error while talking to the display mechanism.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The notifier ran but reported failure.
    #[error("notifier failed: {0}")]
    Failed(String),

    /// The notifier did not finish within the delivery timeout.
    #[error("notification timed out after {0:?}")]
    TimedOut(std::time::Duration),
}

/// Errors surfaced to callers of the reminder service.
#[derive(Debug, Error)]
pub enum ReminderError {
    /// Time input was not understood or lies in the past.
    #[error("could not understand time: {0}")]
    Parse(String),

    /// Input was rejected before touching the store.
    #[error("invalid reminder: {0}")]
    Validation(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Delivery error.
    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),
}
