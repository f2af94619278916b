//! Chime: recurring reminders from the command line
//!
//! Main binary with subcommands:
//! - `add`, `list`, `edit`, `delete`: manage reminders
//! - `daemon`: poll for due reminders and show them

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chime_scheduler::ReminderId;

mod commands;
mod daemon;

#[derive(Parser)]
#[command(name = "chime")]
#[command(about = "Recurring reminders from the command line", long_about = None)]
struct Cli {
    /// Reminder database (defaults to <data dir>/chime/reminders.db)
    #[arg(long, global = true, env = "CHIME_DB")]
    db: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, global = true, env = "CHIME_LOG_FILE")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a reminder
    Add {
        /// What to be reminded of
        #[arg(long)]
        text: String,

        /// When, e.g. "in 2 hours", "tomorrow at 17:00", "2025-01-31 09:00"
        #[arg(long)]
        when: String,

        /// Repeat daily, weekly, monthly or yearly
        #[arg(long)]
        repeat: Option<String>,

        /// Repeat every N days/weeks/months/years
        #[arg(long, allow_negative_numbers = true, requires = "repeat")]
        every: Option<i64>,

        /// Stop repeating after this time
        #[arg(long, requires = "repeat")]
        until: Option<String>,
    },

    /// List upcoming reminders
    List {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Change an existing reminder
    Edit {
        /// Reminder id as shown by `list`
        id: ReminderId,

        /// New text
        #[arg(long)]
        text: Option<String>,

        /// New time
        #[arg(long)]
        when: Option<String>,

        /// New recurrence
        #[arg(long, conflicts_with = "no_repeat")]
        repeat: Option<String>,

        /// Make this a one-time reminder
        #[arg(long)]
        no_repeat: bool,

        /// New repeat interval
        #[arg(long, allow_negative_numbers = true)]
        every: Option<i64>,

        /// New end of recurrence
        #[arg(long, conflicts_with = "no_until")]
        until: Option<String>,

        /// Repeat forever
        #[arg(long)]
        no_until: bool,
    },

    /// Delete a reminder
    Delete {
        /// Reminder id as shown by `list`
        id: ReminderId,

        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Run the scheduler until interrupted
    Daemon {
        /// Seconds between checks for due reminders
        #[arg(long, env = "CHIME_POLL_INTERVAL", default_value = "60")]
        poll_interval: u64,

        /// Seconds to wait for a notification before giving up on it
        #[arg(long, env = "CHIME_DELIVERY_TIMEOUT", default_value = "10")]
        delivery_timeout: u64,

        /// Program to show notifications, e.g. "notify-send Reminder".
        /// The reminder text is passed as the last argument.
        #[arg(long, env = "CHIME_NOTIFY_COMMAND")]
        notify_command: Option<String>,
    },
}

/// Console logging plus an optional plain-text log file.
///
/// The returned guard flushes the file writer when dropped.
fn init_tracing(log_file: Option<&PathBuf>) -> Result<Option<WorkerGuard>> {
    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let name = path
                .file_name()
                .ok_or_else(|| miette::miette!("invalid log file path: {}", path.display()))?;
            std::fs::create_dir_all(&dir)
                .map_err(|e| miette::miette!("failed to create log directory: {}", e))?;

            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "chime=info,chime_scheduler=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_file.as_ref())?;

    let db_path = match cli.db {
        Some(path) => path,
        None => commands::default_db_path()?,
    };
    let store = commands::open_store(&db_path)?;

    match cli.command {
        Commands::Add {
            text,
            when,
            repeat,
            every,
            until,
        } => commands::add(
            store,
            &text,
            &when,
            repeat.as_deref(),
            every,
            until.as_deref(),
        ),

        Commands::List { json } => commands::list(store, json),

        Commands::Edit {
            id,
            text,
            when,
            repeat,
            no_repeat,
            every,
            until,
            no_until,
        } => commands::edit(
            store,
            id,
            commands::EditArgs {
                text,
                when,
                repeat,
                no_repeat,
                every,
                until,
                no_until,
            },
        ),

        Commands::Delete { id, yes } => commands::delete(store, id, yes),

        Commands::Daemon {
            poll_interval,
            delivery_timeout,
            notify_command,
        } => daemon::run(store, poll_interval, delivery_timeout, notify_command).await,
    }
}
