//! Foreground subcommands: add, list, edit, delete.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDateTime;
use miette::Result;

use chime_scheduler::{
    DISPLAY_FORMAT, Reminder, ReminderEdit, ReminderId, ReminderService, SqliteStore, local_now,
    parse_when, recurrence_or_once,
};

/// `<data dir>/chime/reminders.db`.
pub fn default_db_path() -> Result<PathBuf> {
    let data_dir =
        dirs::data_dir().ok_or_else(|| miette::miette!("could not determine data directory"))?;
    Ok(data_dir.join("chime").join("reminders.db"))
}

/// Open (creating if needed) the reminder database.
pub fn open_store(path: &Path) -> Result<Arc<SqliteStore>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| miette::miette!("failed to create {}: {}", parent.display(), e))?;
    }
    let store = SqliteStore::open(path).map_err(|e| miette::miette!("{}", e))?;
    Ok(Arc::new(store))
}

fn parse_time(input: &str, now: NaiveDateTime) -> Result<NaiveDateTime> {
    parse_when(input, now).map_err(|e| miette::miette!("{}", e))
}

pub fn add(
    store: Arc<SqliteStore>,
    text: &str,
    when: &str,
    repeat: Option<&str>,
    every: Option<i64>,
    until: Option<&str>,
) -> Result<()> {
    let now = local_now();
    let due_at = parse_time(when, now)?;
    let recurrence = repeat.and_then(recurrence_or_once);
    let until = until.map(|s| parse_time(s, now)).transpose()?;

    let service = ReminderService::new(store);
    let id = service
        .add_reminder(text, due_at, recurrence, every, until)
        .map_err(|e| miette::miette!("{}", e))?;

    let reminder = service.get(id).map_err(|e| miette::miette!("{}", e))?;
    println!(
        "Reminder set for {}{}",
        reminder.due_at.format(DISPLAY_FORMAT),
        reminder.describe_recurrence()
    );
    println!("  id: {}", id);
    Ok(())
}

/// Render the listing, one reminder per line.
pub fn render_list(reminders: &[Reminder]) -> String {
    if reminders.is_empty() {
        return "No upcoming reminders.".to_string();
    }
    reminders
        .iter()
        .map(|r| format!("{}. {}", r.id, r.describe()))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn list(store: Arc<SqliteStore>, json: bool) -> Result<()> {
    let reminders = ReminderService::new(store)
        .list_upcoming()
        .map_err(|e| miette::miette!("{}", e))?;

    if json {
        let out = serde_json::to_string_pretty(&reminders)
            .map_err(|e| miette::miette!("failed to serialize reminders: {}", e))?;
        println!("{}", out);
    } else {
        println!("{}", render_list(&reminders));
    }
    Ok(())
}

/// Raw `edit` flags before time parsing.
#[derive(Debug, Default)]
pub struct EditArgs {
    pub text: Option<String>,
    pub when: Option<String>,
    pub repeat: Option<String>,
    pub no_repeat: bool,
    pub every: Option<i64>,
    pub until: Option<String>,
    pub no_until: bool,
}

impl EditArgs {
    fn into_edit(self, now: NaiveDateTime) -> Result<ReminderEdit> {
        let recurrence = if self.no_repeat {
            Some(None)
        } else {
            self.repeat.as_deref().map(recurrence_or_once)
        };
        let recurrence_end = if self.no_until {
            Some(None)
        } else {
            self.until
                .as_deref()
                .map(|s| parse_time(s, now))
                .transpose()?
                .map(Some)
        };

        Ok(ReminderEdit {
            text: self.text,
            due_at: self.when.as_deref().map(|s| parse_time(s, now)).transpose()?,
            recurrence,
            interval: self.every,
            recurrence_end,
        })
    }
}

pub fn edit(store: Arc<SqliteStore>, id: ReminderId, args: EditArgs) -> Result<()> {
    let edit = args.into_edit(local_now())?;
    let reminder = ReminderService::new(store)
        .edit_reminder(id, edit)
        .map_err(|e| miette::miette!("{}", e))?;

    println!("Reminder updated: {}. {}", reminder.id, reminder.describe());
    Ok(())
}

/// Ask a yes/no question on `output` and read the answer from `input`.
///
/// Only "y" or "yes" (any case) count as yes; an empty answer is no.
fn confirm(prompt: &str, input: &mut impl BufRead, output: &mut impl Write) -> std::io::Result<bool> {
    write!(output, "{} (y/n) ", prompt)?;
    output.flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    let answer = answer.trim();
    Ok(answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes"))
}

fn delete_prompt(reminder: &Reminder) -> String {
    format!("Are you sure you want to delete reminder '{}'?", reminder.text)
}

/// Delete a reminder after confirming on the terminal, unless `yes` is set.
pub fn delete(store: Arc<SqliteStore>, id: ReminderId, yes: bool) -> Result<()> {
    let service = ReminderService::new(store);
    let reminder = service.get(id).map_err(|e| miette::miette!("{}", e))?;

    if !yes {
        let confirmed = confirm(
            &delete_prompt(&reminder),
            &mut std::io::stdin().lock(),
            &mut std::io::stderr(),
        )
        .map_err(|e| miette::miette!("failed to read confirmation: {}", e))?;
        if !confirmed {
            println!("Deletion cancelled.");
            return Ok(());
        }
    }

    service
        .delete_reminder(id)
        .map_err(|e| miette::miette!("{}", e))?;

    println!("Reminder {} deleted.", id);
    Ok(())
}
