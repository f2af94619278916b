//! Notification delivery.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

use crate::DeliveryError;

/// Shows a reminder's message to the user.
///
/// Implementations may block until the message has been displayed; the
/// scheduler bounds each call with its delivery timeout.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, message: &str) -> Result<(), DeliveryError>;
}

/// Prints reminders to standard output.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

#[async_trait]
impl NotificationSink for ConsoleSink {
    async fn deliver(&self, message: &str) -> Result<(), DeliveryError> {
        println!("⏰ Reminder: {}", message);
        info!(text = message, "notification sent");
        Ok(())
    }
}

/// Runs an external program with the message as its last argument,
/// e.g. `notify-send Reminder`.
#[derive(Debug, Clone)]
pub struct CommandSink {
    program: String,
    args: Vec<String>,
}

impl CommandSink {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Split a whitespace-separated command line. Returns `None` if it is blank.
    pub fn from_command_line(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }
}

#[async_trait]
impl NotificationSink for CommandSink {
    async fn deliver(&self, message: &str) -> Result<(), DeliveryError> {
        // kill_on_drop: a delivery abandoned on timeout must not leave the child running
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(message)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.trim();
            return Err(DeliveryError::Failed(if detail.is_empty() {
                format!("{} exited with {}", self.program, output.status)
            } else {
                format!("{} exited with {}: {}", self.program, output.status, detail)
            }));
        }

        info!(text = message, program = %self.program, "notification sent");
        Ok(())
    }
}
