//! Reminder scheduler implementation.

use std::sync::Arc;

use chrono::NaiveDateTime;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{debug, error, info, warn};

use crate::{
    Clock, DeliveryError, NotificationSink, Reminder, ReminderError, ReminderStore,
    SchedulerConfig, StoreError, system_clock,
};

/// Where the polling loop currently is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoopState {
    /// Waiting for the next tick.
    #[default]
    Idle,
    /// Querying the store for due reminders.
    Polling,
    /// Delivering and rescheduling the reminders found by the last poll.
    Delivering,
}

/// Outcome counts for one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Notifications shown successfully.
    pub delivered: usize,
    /// Notifications that failed or timed out.
    pub delivery_failures: usize,
    /// Recurring reminders moved to their next occurrence.
    pub rescheduled: usize,
    /// Reminders removed because they will not fire again.
    pub completed: usize,
    /// Store reads or writes that failed.
    pub store_failures: usize,
}

impl PollReport {
    /// Number of due reminders this cycle handed to the sink.
    pub fn processed(&self) -> usize {
        self.delivered + self.delivery_failures
    }
}

/// The reminder scheduler.
///
/// Every poll fetches the due reminders, shows each one, then either moves a
/// recurring reminder to its next occurrence or deletes it. A reminder whose
/// write-back fails keeps its old `due_at` and is delivered again on the next
/// poll (at-least-once).
pub struct Scheduler {
    store: Arc<dyn ReminderStore>,
    sink: Arc<dyn NotificationSink>,
    config: SchedulerConfig,
    clock: Clock,
    /// Held for a whole cycle so a manual poll never interleaves with the loop.
    poll_lock: Mutex<()>,
    state: watch::Sender<LoopState>,
}

impl Scheduler {
    /// Create a new scheduler.
    pub fn new(
        store: Arc<dyn ReminderStore>,
        sink: Arc<dyn NotificationSink>,
        config: SchedulerConfig,
    ) -> Result<Self, ReminderError> {
        config.validate()?;
        let (state, _) = watch::channel(LoopState::Idle);
        Ok(Self {
            store,
            sink,
            config,
            clock: system_clock(),
            poll_lock: Mutex::new(()),
            state,
        })
    }

    /// Replace the wall clock used to decide what is due.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Current loop state.
    pub fn state(&self) -> LoopState {
        *self.state.borrow()
    }

    /// Watch loop state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<LoopState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: LoopState) {
        self.state.send_replace(state);
    }

    /// Spawn the polling loop on the current runtime.
    pub fn start(self: &Arc<Self>) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scheduler = Arc::clone(self);
        let task = tokio::spawn(async move { scheduler.run(shutdown_rx).await });
        SchedulerHandle { shutdown_tx, task }
    }

    /// Run the scheduler loop until `shutdown_rx` turns true or its sender is dropped.
    ///
    /// The first poll happens immediately. A poll cycle that is in progress when
    /// shutdown is requested runs to completion.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(poll_interval = ?self.config.poll_interval, "scheduler starting");

        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("scheduler received shutdown signal");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let report = self.poll_now().await;
                    if report.processed() > 0 || report.store_failures > 0 {
                        info!(
                            delivered = report.delivered,
                            delivery_failures = report.delivery_failures,
                            rescheduled = report.rescheduled,
                            completed = report.completed,
                            store_failures = report.store_failures,
                            "poll cycle complete"
                        );
                    }
                }
            }
        }

        self.set_state(LoopState::Idle);
        info!("scheduler shut down gracefully");
    }

    /// Run one poll cycle against the scheduler's clock.
    pub async fn poll_now(&self) -> PollReport {
        let now = (self.clock)();
        self.poll_once(now).await
    }

    /// Run one poll cycle treating `now` as the current time.
    #[tracing::instrument(skip(self))]
    pub async fn poll_once(&self, now: NaiveDateTime) -> PollReport {
        let _cycle = self.poll_lock.lock().await;
        let mut report = PollReport::default();

        self.set_state(LoopState::Polling);
        let due = match self.store.due_reminders(now) {
            Ok(due) => due,
            Err(e) => {
                error!(error = %e, "failed to query due reminders");
                report.store_failures += 1;
                self.set_state(LoopState::Idle);
                return report;
            }
        };

        if !due.is_empty() {
            self.set_state(LoopState::Delivering);
            debug!(count = due.len(), "delivering due reminders");
            for reminder in due {
                self.fire(reminder, &mut report).await;
            }
        }

        self.set_state(LoopState::Idle);
        report
    }

    /// Deliver one reminder, then reschedule or delete it.
    ///
    /// Failures are logged and counted, never propagated.
    #[tracing::instrument(skip(self, reminder, report), fields(id = %reminder.id))]
    async fn fire(&self, reminder: Reminder, report: &mut PollReport) {
        let id = reminder.id;

        let delivery = match timeout(self.config.delivery_timeout, self.sink.deliver(&reminder.text)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::TimedOut(self.config.delivery_timeout)),
        };
        match delivery {
            Ok(()) => {
                report.delivered += 1;
                debug!(id = %id, "reminder delivered");
            }
            Err(e) => {
                report.delivery_failures += 1;
                warn!(id = %id, error = %e, "notification delivery failed");
            }
        }

        let written = match reminder.next_occurrence() {
            Some(next) => {
                let previous = reminder.due_at;
                let mut moved = false;
                // Advance only the occurrence that was delivered; a foreground
                // edit that moved `due_at` in the meantime wins.
                let result = self.store.modify(id, &mut |current: &mut Reminder| {
                    if current.due_at == previous {
                        current.due_at = next;
                        moved = true;
                    }
                });
                result.map(|_| {
                    if moved {
                        report.rescheduled += 1;
                        debug!(id = %id, %previous, %next, "rescheduled recurring reminder");
                    } else {
                        debug!(id = %id, "reminder was moved during delivery, keeping the edit");
                    }
                })
            }
            None => {
                if reminder.recurrence.is_some() {
                    info!(id = %id, "recurring reminder ended");
                }
                self.store.delete(id).map(|()| {
                    report.completed += 1;
                })
            }
        };

        match written {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) => {
                debug!(id = %id, "reminder was deleted during delivery");
            }
            Err(e) => {
                report.store_failures += 1;
                error!(
                    id = %id,
                    error = %e,
                    "failed to persist reminder after delivery, it will be delivered again"
                );
            }
        }
    }
}

/// Handle to a running scheduler loop.
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signal shutdown and wait for the current poll cycle to drain.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "scheduler task failed");
        }
    }

    /// Whether the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
