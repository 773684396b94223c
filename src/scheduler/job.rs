//! Job identity and the handler seam.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

const REMINDER_PREFIX: &str = "reminder:";

/// Stable identifier of a scheduled job.
///
/// Reminder jobs use `"reminder:<id>"`, the only correlation key between a
/// stored reminder row and its in-memory job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn reminder(reminder_id: i64) -> Self {
        Self(format!("{REMINDER_PREFIX}{reminder_id}"))
    }

    /// Recover the reminder id from a `"reminder:<id>"` job id.
    pub fn reminder_id(&self) -> Option<i64> {
        self.0.strip_prefix(REMINDER_PREFIX)?.parse().ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fired (or pending) job: its id, due time, and the data its handler needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job<P> {
    pub id: JobId,
    pub run_at: DateTime<Utc>,
    pub payload: P,
}

/// Receives jobs as they come due.
///
/// The engine awaits each call before evaluating the next job, so a slow
/// handler delays everything queued behind it.
#[async_trait]
pub trait JobHandler<P: Send + 'static>: Send + Sync {
    async fn run(&self, job: Job<P>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reminder_job_id_round_trips() {
        let id = JobId::reminder(42);
        assert_eq!(id.as_str(), "reminder:42");
        assert_eq!(id.reminder_id(), Some(42));
    }

    #[test]
    fn foreign_job_ids_have_no_reminder_id() {
        assert_eq!(JobId::new("cleanup").reminder_id(), None);
        assert_eq!(JobId::new("reminder:abc").reminder_id(), None);
    }
}
