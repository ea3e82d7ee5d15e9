//! SqliteBackend - one row per record, one SQL transaction per batch.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};

use super::{Backend, BackendError, Batch, Change};
use crate::record::{Category, Rank, Record, RecordId};

const SCHEMA_SQL: &str = "
    PRAGMA journal_mode = WAL;

    CREATE TABLE IF NOT EXISTS records (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        is_completed INTEGER NOT NULL DEFAULT 0,
        category TEXT NOT NULL,
        created_at TEXT NOT NULL,
        completed_at TEXT,
        rank INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_records_rank ON records(rank);
";

const UPSERT_SQL: &str = "
    INSERT INTO records (id, title, is_completed, category, created_at, completed_at, rank)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
    ON CONFLICT(id) DO UPDATE SET
        title = excluded.title,
        is_completed = excluded.is_completed,
        category = excluded.category,
        created_at = excluded.created_at,
        completed_at = excluded.completed_at,
        rank = excluded.rank
";

pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Open (or create) a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BackendError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::init_with_connection(conn)
    }

    /// In-memory database, mostly for tests.
    pub fn open_in_memory() -> Result<Self, BackendError> {
        let conn = Connection::open_in_memory()?;
        Self::init_with_connection(conn)
    }

    fn init_with_connection(conn: Connection) -> Result<Self, BackendError> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn format_time(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, BackendError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| BackendError::Corrupt(format!("bad timestamp {value:?}: {e}")))
}

struct Row {
    id: String,
    title: String,
    is_completed: bool,
    category: String,
    created_at: String,
    completed_at: Option<String>,
    rank: i64,
}

impl Row {
    fn into_record(self) -> Result<Record, BackendError> {
        let id: RecordId = self
            .id
            .parse()
            .map_err(|e| BackendError::Corrupt(format!("bad record id {:?}: {e}", self.id)))?;
        let completed_at = match self.completed_at.as_deref() {
            Some(value) => Some(parse_time(value)?),
            None => None,
        };
        Ok(Record::restore(
            id,
            self.title,
            self.is_completed,
            Category::from_tag(&self.category),
            parse_time(&self.created_at)?,
            completed_at,
            Rank(self.rank),
        ))
    }
}

impl Backend for SqliteBackend {
    fn load_all(&self) -> Result<Vec<Record>, BackendError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| BackendError::Unavailable("database mutex poisoned".into()))?;

        let mut stmt = conn.prepare(
            "SELECT id, title, is_completed, category, created_at, completed_at, rank FROM records",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Row {
                id: row.get(0)?,
                title: row.get(1)?,
                is_completed: row.get(2)?,
                category: row.get(3)?,
                created_at: row.get(4)?,
                completed_at: row.get(5)?,
                rank: row.get(6)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?.into_record()?);
        }
        Ok(records)
    }

    fn apply(&self, batch: &Batch) -> Result<(), BackendError> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| BackendError::Unavailable("database mutex poisoned".into()))?;

        // Dropping the transaction without commit rolls it back.
        let tx = conn.transaction()?;
        for change in batch.changes() {
            match change {
                Change::Put(record) => {
                    tx.execute(
                        UPSERT_SQL,
                        params![
                            record.id().to_string(),
                            record.title(),
                            record.is_completed(),
                            record.category().as_str(),
                            format_time(record.created_at()),
                            record.completed_at().map(format_time),
                            record.rank().value(),
                        ],
                    )?;
                }
                Change::Remove(id) => {
                    tx.execute("DELETE FROM records WHERE id = ?1", params![id.to_string()])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "sqlite"
    }
}
