//! Fires a reminder: flips its durable `sent` flag and notifies the chat.

use std::sync::Arc;

use async_trait::async_trait;

use crate::channels::Notifier;
use crate::config::{DeliveryConfig, DeliveryOrder};
use crate::scheduler::{Job, JobHandler, JobId};
use crate::store::{Reminder, Store};

/// Payload of a reminder job. Everything delivery needs, so firing never
/// has to read the reminder row back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderJob {
    pub reminder_id: i64,
    pub chat: i64,
    pub text: String,
}

impl ReminderJob {
    pub fn job_id(&self) -> JobId {
        JobId::reminder(self.reminder_id)
    }
}

impl From<&Reminder> for ReminderJob {
    fn from(reminder: &Reminder) -> Self {
        Self {
            reminder_id: reminder.id,
            chat: reminder.chat,
            text: reminder.text.clone(),
        }
    }
}

/// Text sent to the chat for a reminder.
pub fn format_reminder_text(prefix: &str, text: &str) -> String {
    format!("{prefix}{text}")
}

/// Scheduler callback for reminder jobs.
///
/// Failures never propagate: a failed send or mark is logged and the job is
/// considered done. Nothing here retries.
pub struct ReminderDelivery {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    config: DeliveryConfig,
}

impl ReminderDelivery {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>, config: DeliveryConfig) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    /// Deliver one reminder according to the configured order.
    pub async fn deliver(&self, job: &ReminderJob) {
        match self.config.order {
            DeliveryOrder::MarkThenSend => self.mark_then_send(job).await,
            DeliveryOrder::SendThenMark => self.send_then_mark(job).await,
        }
    }

    async fn mark_then_send(&self, job: &ReminderJob) {
        match self.store.mark_reminder_sent(job.reminder_id).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!(
                    reminder_id = job.reminder_id,
                    "Reminder already marked sent; skipping notification"
                );
                return;
            }
            Err(e) => {
                // The notification still goes out; the row stays unsent and
                // may be delivered again after a restart.
                tracing::error!(
                    reminder_id = job.reminder_id,
                    error = %e,
                    "Failed to mark reminder sent"
                );
            }
        }

        if self.send(job).await {
            tracing::info!(reminder_id = job.reminder_id, chat = job.chat, "Reminder delivered");
        }
    }

    async fn send_then_mark(&self, job: &ReminderJob) {
        if !self.send(job).await {
            return;
        }

        match self.store.mark_reminder_sent(job.reminder_id).await {
            Ok(true) => {
                tracing::info!(reminder_id = job.reminder_id, chat = job.chat, "Reminder delivered");
            }
            Ok(false) => {
                tracing::warn!(
                    reminder_id = job.reminder_id,
                    "Reminder was already marked sent; notification may be a duplicate"
                );
            }
            Err(e) => {
                tracing::error!(
                    reminder_id = job.reminder_id,
                    error = %e,
                    "Reminder delivered but could not be marked sent"
                );
            }
        }
    }

    /// Returns whether the notifier accepted the message.
    async fn send(&self, job: &ReminderJob) -> bool {
        let text = format_reminder_text(&self.config.prefix, &job.text);
        match self.notifier.send(job.chat, &text).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    reminder_id = job.reminder_id,
                    chat = job.chat,
                    error = %e,
                    "Failed to send reminder"
                );
                false
            }
        }
    }
}

#[async_trait]
impl JobHandler<ReminderJob> for ReminderDelivery {
    async fn run(&self, job: Job<ReminderJob>) {
        self.deliver(&job.payload).await;
    }
}
