//! Reminder delivery and startup recovery.

mod delivery;
mod recovery;

pub use delivery::{ReminderDelivery, ReminderJob, format_reminder_text};
pub use recovery::{RecoveryReport, recover_pending_reminders};
