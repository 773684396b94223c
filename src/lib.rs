//! Taskbot: a chat bot with per-user todos and reminders that survive restarts.

pub mod channels;
pub mod clock;
pub mod commands;
pub mod config;
pub mod error;
pub mod extensions;
pub mod reminders;
pub mod scheduler;
pub mod store;
