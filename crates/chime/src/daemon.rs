//! Daemon mode: run the reminder scheduler until interrupted.

use std::sync::Arc;
use std::time::Duration;

use miette::Result;
use tokio::sync::watch;
use tracing::{info, warn};

use chime_scheduler::{
    CommandSink, ConsoleSink, NotificationSink, ReminderStore, Scheduler, SchedulerConfig,
    SqliteStore, local_now,
};

fn notification_sink(notify_command: Option<&str>) -> Arc<dyn NotificationSink> {
    match notify_command {
        Some(command) => match CommandSink::from_command_line(command) {
            Some(sink) => {
                info!(command, "delivering reminders through external command");
                Arc::new(sink)
            }
            None => {
                warn!("empty notify command, printing reminders to the console");
                Arc::new(ConsoleSink)
            }
        },
        None => Arc::new(ConsoleSink),
    }
}

/// Run the daemon.
pub async fn run(
    store: Arc<SqliteStore>,
    poll_interval: u64,
    delivery_timeout: u64,
    notify_command: Option<String>,
) -> Result<()> {
    let config = SchedulerConfig::default()
        .with_poll_interval(Duration::from_secs(poll_interval))
        .with_delivery_timeout(Duration::from_secs(delivery_timeout));

    match store.upcoming_reminders(local_now()) {
        Ok(upcoming) => info!(count = upcoming.len(), "loaded upcoming reminders"),
        Err(e) => warn!(error = %e, "failed to count upcoming reminders"),
    }

    let sink = notification_sink(notify_command.as_deref());
    let scheduler =
        Scheduler::new(store, sink, config).map_err(|e| miette::miette!("{}", e))?;

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Handle shutdown signals
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    scheduler.run(shutdown_rx).await;
    Ok(())
}
