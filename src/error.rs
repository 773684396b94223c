//! Error types for the bot.

use std::any::Any;

/// Configuration-related errors. All of these are fatal at boot.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Persistence errors (the store error of the reminder core).
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Invalid stored value: {0}")]
    Corrupt(String),
}

/// Transport errors raised by channels and notifiers.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send message on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },
}

/// Raised while an extension registers its commands. Never fatal.
#[derive(Debug, thiserror::Error)]
pub enum ExtensionError {
    #[error("Extension {name} is unavailable: {reason}")]
    Unavailable { name: String, reason: String },

    #[error("Extension {name} panicked during registration: {message}")]
    Panicked { name: String, message: String },
}

/// Errors returned by command handlers.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Malformed user input. The message is shown to the user verbatim.
    #[error("{0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl CommandError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
