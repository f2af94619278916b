//! Durable reminder storage.
//!
//! Every store serializes access behind a mutex, so the scheduler task and
//! foreground edits can share one instance. Conflicting writes to the same
//! reminder are last-writer-wins.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDateTime;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{info, warn};

use crate::{NewReminder, Recurrence, Reminder, ReminderId, StoreError, normalize_interval};

/// Persisted timestamp format. Fixed width, so text order is chronological order.
pub const STORAGE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// CRUD over reminders plus the two time-based queries the scheduler and CLI need.
pub trait ReminderStore: Send + Sync {
    /// Persist a new reminder and return its assigned id.
    fn create(&self, reminder: &NewReminder) -> Result<ReminderId, StoreError>;

    /// Overwrite every mutable field of an existing reminder.
    ///
    /// Fails with [`StoreError::NotFound`] when the id does not exist.
    fn update(&self, reminder: &Reminder) -> Result<(), StoreError>;

    /// Apply `edit` to a stored reminder and write it back as one step.
    ///
    /// No other write to the store can land between the read and the write.
    /// The id is kept even if `edit` changes it. Fails with
    /// [`StoreError::NotFound`] when the id does not exist.
    fn modify(
        &self,
        id: ReminderId,
        edit: &mut dyn FnMut(&mut Reminder),
    ) -> Result<Reminder, StoreError>;

    /// Remove a reminder. Deleting a missing id is not an error.
    fn delete(&self, id: ReminderId) -> Result<(), StoreError>;

    /// Fetch one reminder.
    fn get(&self, id: ReminderId) -> Result<Option<Reminder>, StoreError>;

    /// All reminders with `due_at <= now`.
    fn due_reminders(&self, now: NaiveDateTime) -> Result<Vec<Reminder>, StoreError>;

    /// All reminders with `due_at > now`, earliest first.
    fn upcoming_reminders(&self, now: NaiveDateTime) -> Result<Vec<Reminder>, StoreError>;
}

pub(crate) fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(STORAGE_FORMAT).to_string()
}

fn parse_timestamp(s: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(s, STORAGE_FORMAT)
        .map_err(|e| format!("bad timestamp '{}': {}", s, e))
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("store lock poisoned".to_string())
}

/// A reminder row as stored, before decoding.
struct ReminderRow {
    id: i64,
    text: String,
    due_at: String,
    recurrence: Option<String>,
    interval: i64,
    recurrence_end: Option<String>,
}

impl ReminderRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            text: row.get(1)?,
            due_at: row.get(2)?,
            recurrence: row.get(3)?,
            interval: row.get(4)?,
            recurrence_end: row.get(5)?,
        })
    }

    fn decode(self) -> Result<Reminder, String> {
        let id = ReminderId(self.id);

        // An unrecognized kind can no longer produce a next occurrence, so the
        // reminder fires one final time and is then removed.
        let recurrence = match self.recurrence.as_deref() {
            None | Some("") => None,
            Some(raw) => match raw.parse::<Recurrence>() {
                Ok(kind) => Some(kind),
                Err(e) => {
                    warn!(id = %id, error = %e, "unrecognized recurrence, treating as one-time");
                    None
                }
            },
        };

        Ok(Reminder {
            id,
            text: self.text,
            due_at: parse_timestamp(&self.due_at)?,
            recurrence,
            interval: normalize_interval(self.interval),
            recurrence_end: self
                .recurrence_end
                .as_deref()
                .map(parse_timestamp)
                .transpose()?,
        })
    }
}

const SELECT_COLUMNS: &str =
    "SELECT id, text, due_at, recurrence, recurrence_interval, recurrence_end FROM reminders";

/// SQLite-backed reminder store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;

        // WAL lets listings read while the scheduler writes
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self::init(conn)?;
        info!(path = %path.display(), "reminder database initialized");
        Ok(store)
    }

    /// A private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS reminders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                text TEXT NOT NULL,
                due_at TEXT NOT NULL,
                recurrence TEXT DEFAULT NULL,
                recurrence_interval INTEGER NOT NULL DEFAULT 1,
                recurrence_end TEXT DEFAULT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_reminders_due_at ON reminders(due_at);
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(poisoned)
    }

    fn read(conn: &Connection, id: ReminderId) -> Result<Option<Reminder>, StoreError> {
        let row = conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                params![id.0],
                ReminderRow::from_row,
            )
            .optional()?;

        row.map(|r| r.decode().map_err(StoreError::Unavailable))
            .transpose()
    }

    /// Overwrite the row for `reminder.id`, returning the number of rows changed.
    fn write(conn: &Connection, reminder: &Reminder) -> Result<usize, StoreError> {
        let changed = conn.execute(
            "UPDATE reminders
             SET text = ?1, due_at = ?2, recurrence = ?3, recurrence_interval = ?4, recurrence_end = ?5
             WHERE id = ?6",
            params![
                reminder.text,
                format_timestamp(reminder.due_at),
                reminder.recurrence.map(|r| r.as_str()),
                reminder.interval.max(1),
                reminder.recurrence_end.map(format_timestamp),
                reminder.id.0,
            ],
        )?;
        Ok(changed)
    }

    /// Run a listing query, skipping rows that cannot be decoded.
    fn query_reminders(&self, sql: &str, now: NaiveDateTime) -> Result<Vec<Reminder>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params![format_timestamp(now)], ReminderRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id;
                match row.decode() {
                    Ok(reminder) => Some(reminder),
                    Err(e) => {
                        warn!(id, error = %e, "skipping undecodable reminder row");
                        None
                    }
                }
            })
            .collect())
    }
}

impl ReminderStore for SqliteStore {
    fn create(&self, reminder: &NewReminder) -> Result<ReminderId, StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO reminders (text, due_at, recurrence, recurrence_interval, recurrence_end)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                reminder.text,
                format_timestamp(reminder.due_at),
                reminder.recurrence.map(|r| r.as_str()),
                reminder.interval.max(1),
                reminder.recurrence_end.map(format_timestamp),
            ],
        )?;
        Ok(ReminderId(conn.last_insert_rowid()))
    }

    fn update(&self, reminder: &Reminder) -> Result<(), StoreError> {
        let conn = self.lock()?;
        if Self::write(&conn, reminder)? == 0 {
            return Err(StoreError::NotFound(reminder.id));
        }
        Ok(())
    }

    fn modify(
        &self,
        id: ReminderId,
        edit: &mut dyn FnMut(&mut Reminder),
    ) -> Result<Reminder, StoreError> {
        let conn = self.lock()?;
        let mut reminder = Self::read(&conn, id)?.ok_or(StoreError::NotFound(id))?;
        edit(&mut reminder);
        reminder.id = id;
        reminder.interval = reminder.interval.max(1);
        Self::write(&conn, &reminder)?;
        Ok(reminder)
    }

    fn delete(&self, id: ReminderId) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM reminders WHERE id = ?1", params![id.0])?;
        Ok(())
    }

    fn get(&self, id: ReminderId) -> Result<Option<Reminder>, StoreError> {
        let conn = self.lock()?;
        Self::read(&conn, id)
    }

    fn due_reminders(&self, now: NaiveDateTime) -> Result<Vec<Reminder>, StoreError> {
        self.query_reminders(
            &format!("{SELECT_COLUMNS} WHERE due_at <= ?1 ORDER BY due_at ASC, id ASC"),
            now,
        )
    }

    fn upcoming_reminders(&self, now: NaiveDateTime) -> Result<Vec<Reminder>, StoreError> {
        self.query_reminders(
            &format!("{SELECT_COLUMNS} WHERE due_at > ?1 ORDER BY due_at ASC, id ASC"),
            now,
        )
    }
}

/// In-memory reminder store with the same contract as [`SqliteStore`].
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    reminders: BTreeMap<ReminderId, Reminder>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.inner.lock().map_err(poisoned)
    }
}

impl ReminderStore for MemoryStore {
    fn create(&self, reminder: &NewReminder) -> Result<ReminderId, StoreError> {
        let mut state = self.lock()?;
        state.next_id += 1;
        let id = ReminderId(state.next_id);
        state.reminders.insert(id, reminder.clone().with_id(id));
        Ok(id)
    }

    fn update(&self, reminder: &Reminder) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        match state.reminders.get_mut(&reminder.id) {
            Some(existing) => {
                *existing = reminder.clone();
                existing.interval = existing.interval.max(1);
                Ok(())
            }
            None => Err(StoreError::NotFound(reminder.id)),
        }
    }

    fn modify(
        &self,
        id: ReminderId,
        edit: &mut dyn FnMut(&mut Reminder),
    ) -> Result<Reminder, StoreError> {
        let mut state = self.lock()?;
        let existing = state.reminders.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        edit(existing);
        existing.id = id;
        existing.interval = existing.interval.max(1);
        Ok(existing.clone())
    }

    fn delete(&self, id: ReminderId) -> Result<(), StoreError> {
        self.lock()?.reminders.remove(&id);
        Ok(())
    }

    fn get(&self, id: ReminderId) -> Result<Option<Reminder>, StoreError> {
        Ok(self.lock()?.reminders.get(&id).cloned())
    }

    fn due_reminders(&self, now: NaiveDateTime) -> Result<Vec<Reminder>, StoreError> {
        let state = self.lock()?;
        let mut due: Vec<_> = state
            .reminders
            .values()
            .filter(|r| r.due_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|r| (r.due_at, r.id));
        Ok(due)
    }

    fn upcoming_reminders(&self, now: NaiveDateTime) -> Result<Vec<Reminder>, StoreError> {
        let state = self.lock()?;
        let mut upcoming: Vec<_> = state
            .reminders
            .values()
            .filter(|r| r.due_at > now)
            .cloned()
            .collect();
        upcoming.sort_by_key(|r| (r.due_at, r.id));
        Ok(upcoming)
    }
}
