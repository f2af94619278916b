//! Scheduler configuration.

use std::time::Duration;

use crate::ReminderError;

/// Default time between poll cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Default upper bound on a single notification delivery.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// How the polling loop runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Wall-clock time between poll cycles.
    pub poll_interval: Duration,
    /// Maximum time to wait for one notification before giving up on it.
    pub delivery_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
        }
    }
}

impl SchedulerConfig {
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_delivery_timeout(mut self, delivery_timeout: Duration) -> Self {
        self.delivery_timeout = delivery_timeout;
        self
    }

    /// Reject settings the loop cannot run with.
    pub fn validate(&self) -> Result<(), ReminderError> {
        if self.poll_interval.is_zero() {
            return Err(ReminderError::Validation(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        if self.delivery_timeout.is_zero() {
            return Err(ReminderError::Validation(
                "delivery timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
