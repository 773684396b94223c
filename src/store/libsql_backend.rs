//! libSQL implementation of the async `Store` trait.
//!
//! Supports local file and in-memory databases. Local files run in WAL mode
//! so readers never block the single writer.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::model::{Reminder, Todo};
use crate::store::traits::Store;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use;
/// every write is one statement, so each commits or fails as a unit.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.enable_wal().await?;
        store.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        Ok(store)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Switch a file database to write-ahead logging.
    async fn enable_wal(&self) -> Result<(), DatabaseError> {
        // journal_mode answers with a row, so it has to go through query().
        let mut rows = self
            .conn()
            .query("PRAGMA journal_mode=WAL", ())
            .await
            .map_err(|e| DatabaseError::Pool(format!("enable WAL: {e}")))?;
        if let Ok(Some(row)) = rows.next().await {
            let mode: String = row.get(0).unwrap_or_default();
            debug!(mode = %mode, "Journal mode set");
        }
        Ok(())
    }

    async fn init_schema(&self) -> Result<(), DatabaseError> {
        self.conn()
            .execute("PRAGMA foreign_keys=ON", ())
            .await
            .map_err(|e| DatabaseError::Pool(format!("enable foreign keys: {e}")))?;
        migrations::run_migrations(self.conn()).await
    }

    /// Run a query that yields a single integer (e.g. `RETURNING id`).
    async fn query_id(
        &self,
        op: &str,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<i64, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<i64>(0)
                .map_err(|e| DatabaseError::Query(format!("{op} row parse: {e}"))),
            Ok(None) => Err(DatabaseError::Query(format!("{op}: no id returned"))),
            Err(e) => Err(DatabaseError::Query(format!("{op}: {e}"))),
        }
    }

    async fn query_reminders(
        &self,
        op: &str,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<Reminder>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        let mut reminders = Vec::new();
        loop {
            match rows.next().await {
                Ok(Some(row)) => reminders.push(row_to_reminder(&row)?),
                Ok(None) => break,
                Err(e) => return Err(DatabaseError::Query(format!("{op}: {e}"))),
            }
        }
        Ok(reminders)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical write format: RFC 3339, millisecond precision, `Z` suffix.
///
/// The fixed width keeps lexicographic order equal to chronological order,
/// which `ORDER BY run_at` relies on.
pub(crate) fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC 3339 or SQLite datetime string into `DateTime<Utc>`.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(ndt.and_utc());
    }
    Err(DatabaseError::Corrupt(format!("unparseable timestamp '{s}'")))
}

const TODO_COLUMNS: &str = "id, owner, text, done, created_at, done_at";

const REMINDER_COLUMNS: &str = "id, owner, chat, text, run_at, sent, created_at";

/// Map a libsql Row to a Todo. Column order matches `TODO_COLUMNS`.
fn row_to_todo(row: &libsql::Row) -> Result<Todo, DatabaseError> {
    let parse = |e: libsql::Error| DatabaseError::Query(format!("todo row parse: {e}"));
    let created: String = row.get(4).map_err(parse)?;
    let done_at: Option<String> = row.get(5).ok();

    Ok(Todo {
        id: row.get(0).map_err(parse)?,
        owner: row.get(1).map_err(parse)?,
        text: row.get(2).map_err(parse)?,
        done: row.get::<i64>(3).map_err(parse)? != 0,
        created_at: parse_datetime(&created)?,
        done_at: done_at.as_deref().map(parse_datetime).transpose()?,
    })
}

/// Map a libsql Row to a Reminder. Column order matches `REMINDER_COLUMNS`.
fn row_to_reminder(row: &libsql::Row) -> Result<Reminder, DatabaseError> {
    let parse = |e: libsql::Error| DatabaseError::Query(format!("reminder row parse: {e}"));
    let run_at: String = row.get(4).map_err(parse)?;
    let created: String = row.get(6).map_err(parse)?;

    Ok(Reminder {
        id: row.get(0).map_err(parse)?,
        owner: row.get(1).map_err(parse)?,
        chat: row.get(2).map_err(parse)?,
        text: row.get(3).map_err(parse)?,
        run_at: parse_datetime(&run_at)?,
        sent: row.get::<i64>(5).map_err(parse)? != 0,
        created_at: parse_datetime(&created)?,
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Store for LibSqlStore {
    // ── Todos ───────────────────────────────────────────────────────

    async fn add_todo(&self, owner: i64, text: &str) -> Result<i64, DatabaseError> {
        let now = format_timestamp(&Utc::now());
        let id = self
            .query_id(
                "add_todo",
                "INSERT INTO todos (owner, text, done, created_at) VALUES (?1, ?2, 0, ?3) RETURNING id",
                params![owner, text, now],
            )
            .await?;
        debug!(id, owner, "Todo created");
        Ok(id)
    }

    async fn list_todos(&self, owner: i64, include_done: bool) -> Result<Vec<Todo>, DatabaseError> {
        let sql = if include_done {
            format!("SELECT {TODO_COLUMNS} FROM todos WHERE owner = ?1 ORDER BY done, id")
        } else {
            format!("SELECT {TODO_COLUMNS} FROM todos WHERE owner = ?1 AND done = 0 ORDER BY id")
        };
        let mut rows = self
            .conn()
            .query(&sql, params![owner])
            .await
            .map_err(|e| DatabaseError::Query(format!("list_todos: {e}")))?;

        let mut todos = Vec::new();
        loop {
            match rows.next().await {
                Ok(Some(row)) => todos.push(row_to_todo(&row)?),
                Ok(None) => break,
                Err(e) => return Err(DatabaseError::Query(format!("list_todos: {e}"))),
            }
        }
        Ok(todos)
    }

    async fn complete_todo(&self, owner: i64, id: i64) -> Result<bool, DatabaseError> {
        let now = format_timestamp(&Utc::now());
        let count = self
            .conn()
            .execute(
                "UPDATE todos SET done = 1, done_at = ?1 WHERE owner = ?2 AND id = ?3 AND done = 0",
                params![now, owner, id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("complete_todo: {e}")))?;
        debug!(id, owner, completed = count > 0, "Todo completion attempted");
        Ok(count > 0)
    }

    // ── Reminders ───────────────────────────────────────────────────

    async fn add_reminder(
        &self,
        owner: i64,
        chat: i64,
        text: &str,
        run_at: DateTime<Utc>,
    ) -> Result<i64, DatabaseError> {
        let now = format_timestamp(&Utc::now());
        let id = self
            .query_id(
                "add_reminder",
                "INSERT INTO reminders (owner, chat, text, run_at, sent, created_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5) RETURNING id",
                params![owner, chat, text, format_timestamp(&run_at), now],
            )
            .await?;
        debug!(id, owner, chat, run_at = %run_at, "Reminder created");
        Ok(id)
    }

    async fn list_pending_reminders(&self) -> Result<Vec<Reminder>, DatabaseError> {
        self.query_reminders(
            "list_pending_reminders",
            &format!("SELECT {REMINDER_COLUMNS} FROM reminders WHERE sent = 0 ORDER BY run_at, id"),
            (),
        )
        .await
    }

    async fn list_user_reminders(&self, owner: i64) -> Result<Vec<Reminder>, DatabaseError> {
        self.query_reminders(
            "list_user_reminders",
            &format!(
                "SELECT {REMINDER_COLUMNS} FROM reminders WHERE owner = ?1 AND sent = 0 ORDER BY run_at, id"
            ),
            params![owner],
        )
        .await
    }

    async fn get_reminder(&self, id: i64) -> Result<Option<Reminder>, DatabaseError> {
        let mut found = self
            .query_reminders(
                "get_reminder",
                &format!("SELECT {REMINDER_COLUMNS} FROM reminders WHERE id = ?1"),
                params![id],
            )
            .await?;
        Ok(found.pop())
    }

    async fn mark_reminder_sent(&self, id: i64) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE reminders SET sent = 1 WHERE id = ?1 AND sent = 0",
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_reminder_sent: {e}")))?;
        debug!(id, transitioned = count > 0, "Reminder marked sent");
        Ok(count > 0)
    }
}
