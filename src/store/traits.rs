//! Backend-agnostic `Store` trait for todos and reminders.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;
use crate::store::model::{Reminder, Todo};

/// Durable persistence for the bot.
///
/// State transitions (`complete_todo`, `mark_reminder_sent`) are single
/// conditional updates, so concurrent callers never both observe success.
#[async_trait]
pub trait Store: Send + Sync {
    // ── Todos ───────────────────────────────────────────────────────

    /// Insert a new pending todo. The caller validates `text`.
    async fn add_todo(&self, owner: i64, text: &str) -> Result<i64, DatabaseError>;

    /// List an owner's todos.
    ///
    /// Without `include_done` only pending todos are returned, by ascending id.
    /// With it, pending todos come first, then done ones, each by ascending id.
    async fn list_todos(&self, owner: i64, include_done: bool) -> Result<Vec<Todo>, DatabaseError>;

    /// Mark a pending todo done. Returns `false` when the todo does not exist,
    /// belongs to someone else, or is already done.
    async fn complete_todo(&self, owner: i64, id: i64) -> Result<bool, DatabaseError>;

    // ── Reminders ───────────────────────────────────────────────────

    /// Insert a new unsent reminder. Callers holding a local time convert with
    /// `with_timezone(&Utc)`; the row always stores UTC.
    async fn add_reminder(
        &self,
        owner: i64,
        chat: i64,
        text: &str,
        run_at: DateTime<Utc>,
    ) -> Result<i64, DatabaseError>;

    /// All unsent reminders, by ascending `run_at` then id.
    async fn list_pending_reminders(&self) -> Result<Vec<Reminder>, DatabaseError>;

    /// Unsent reminders of one owner, by ascending `run_at` then id.
    async fn list_user_reminders(&self, owner: i64) -> Result<Vec<Reminder>, DatabaseError>;

    async fn get_reminder(&self, id: i64) -> Result<Option<Reminder>, DatabaseError>;

    /// Flip `sent` to true. Returns whether this call performed the
    /// transition; marking an already-sent or unknown reminder is a no-op.
    async fn mark_reminder_sent(&self, id: i64) -> Result<bool, DatabaseError>;
}
