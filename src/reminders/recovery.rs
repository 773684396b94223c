//! Startup recovery: rebuild the scheduler's job table from the store.

use crate::error::DatabaseError;
use crate::reminders::ReminderJob;
use crate::scheduler::Scheduler;
use crate::store::Store;

/// Outcome of a recovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Number of pending reminders handed to the scheduler.
    pub scheduled: usize,
}

/// Schedule a job for every unsent reminder.
///
/// Reminders whose `run_at` lies further in the past than the misfire grace
/// window are still scheduled; the scheduler drops them when it evaluates
/// them. Must complete before the dispatcher starts accepting commands.
pub async fn recover_pending_reminders(
    store: &dyn Store,
    scheduler: &Scheduler<ReminderJob>,
) -> Result<RecoveryReport, DatabaseError> {
    let pending = store.list_pending_reminders().await?;

    for reminder in &pending {
        let job = ReminderJob::from(reminder);
        scheduler.schedule_once(job.job_id(), reminder.run_at, job);
    }

    tracing::info!(scheduled = pending.len(), "Recovered pending reminders");
    Ok(RecoveryReport {
        scheduled: pending.len(),
    })
}
