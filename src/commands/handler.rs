//! Command handler trait and per-invocation context.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CommandError;

/// The help listing shown by `/help`: command name to help text, sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HelpListing {
    entries: BTreeMap<String, String>,
}

impl HelpListing {
    pub(crate) fn new(entries: BTreeMap<String, String>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(c, h)| (c.as_str(), h.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One `/command — help` line per entry, in command order.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|(command, help)| format!("/{command} — {help}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// One invocation of a command.
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// User issuing the command.
    pub owner: i64,
    /// Chat the command came from; replies and reminders go here.
    pub chat: i64,
    /// Command name without the leading `/` or `@bot` suffix.
    pub command: String,
    /// Everything after the command, trimmed.
    pub args: String,
    pub help: Arc<HelpListing>,
}

impl CommandContext {
    /// Whitespace-separated arguments.
    pub fn arg_list(&self) -> Vec<&str> {
        self.args.split_whitespace().collect()
    }
}

/// Handles one or more registered commands.
///
/// The returned string is sent back to the chat. A
/// [`CommandError::Validation`] is shown to the user verbatim; any other error
/// becomes a generic failure reply.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, ctx: &CommandContext) -> Result<String, CommandError>;
}
