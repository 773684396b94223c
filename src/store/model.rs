//! Persisted entities.

use chrono::{DateTime, Utc};

/// A todo item owned by one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Todo {
    pub id: i64,
    pub owner: i64,
    pub text: String,
    /// Only ever moves from `false` to `true`.
    pub done: bool,
    pub created_at: DateTime<Utc>,
    pub done_at: Option<DateTime<Utc>>,
}

/// A durable request to notify a chat at an absolute time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    pub id: i64,
    pub owner: i64,
    pub chat: i64,
    pub text: String,
    pub run_at: DateTime<Utc>,
    /// Only ever moves from `false` to `true`, exactly once.
    pub sent: bool,
    pub created_at: DateTime<Utc>,
}
