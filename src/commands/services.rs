//! Shared services handed to every extension at registration time.

use std::sync::Arc;

use crate::clock::Clock;
use crate::config::BotConfig;
use crate::reminders::ReminderJob;
use crate::scheduler::Scheduler;
use crate::store::Store;

/// Everything a command handler may depend on. Cloning is cheap.
#[derive(Clone)]
pub struct Services {
    pub config: Arc<BotConfig>,
    pub store: Arc<dyn Store>,
    pub scheduler: Arc<Scheduler<ReminderJob>>,
    pub clock: Arc<dyn Clock>,
}
