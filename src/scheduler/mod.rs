//! One-shot job scheduling.

mod engine;
mod job;
mod table;

pub use engine::Scheduler;
pub use job::{Job, JobHandler, JobId};
