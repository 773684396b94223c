//! Routes inbound command text to its handler.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;

use crate::channels::IncomingMessage;
use crate::commands::handler::{CommandContext, CommandHandler, HelpListing};
use crate::error::{CommandError, panic_message};

/// Reply sent when a handler fails for reasons the user cannot fix.
pub const GENERIC_FAILURE_REPLY: &str = "⚠️ Something went wrong. Please try again later.";

/// Split `"/cmd[@bot] args"` into the lowercase command name and its trimmed
/// arguments. Text that does not start with `/` is not a command.
///
/// When `bot_username` is known, a command addressed to a different bot
/// (`/cmd@OtherBot`) is not a command for us. The comparison ignores case.
pub fn parse_command(text: &str, bot_username: Option<&str>) -> Option<(String, String)> {
    let rest = text.trim_start().strip_prefix('/')?;
    let (head, args) = match rest.split_once(char::is_whitespace) {
        Some((head, args)) => (head, args.trim()),
        None => (rest, ""),
    };
    let (command, target) = match head.split_once('@') {
        Some((command, target)) => (command, Some(target)),
        None => (head, None),
    };
    if command.is_empty() {
        return None;
    }
    if let (Some(target), Some(me)) = (target, bot_username)
        && !target.eq_ignore_ascii_case(me.trim_start_matches('@'))
    {
        return None;
    }
    Some((command.to_ascii_lowercase(), args.to_string()))
}

/// Routes commands to handlers, isolating each invocation's failures.
pub struct Dispatcher {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
    help: Arc<HelpListing>,
    bot_username: Option<String>,
}

impl Dispatcher {
    pub(crate) fn new(
        handlers: HashMap<String, Arc<dyn CommandHandler>>,
        help: Arc<HelpListing>,
    ) -> Self {
        Self {
            handlers,
            help,
            bot_username: None,
        }
    }

    /// Only accept `/cmd@name` suffixes naming this bot.
    pub fn with_bot_username(mut self, username: impl Into<String>) -> Self {
        self.bot_username = Some(username.into());
        self
    }

    pub fn help(&self) -> &HelpListing {
        &self.help
    }

    /// Handle an inbound message. Returns the reply, or `None` when the
    /// message is not a known command.
    pub async fn dispatch(&self, message: &IncomingMessage) -> Option<String> {
        self.dispatch_text(message.owner, message.chat, &message.text)
            .await
    }

    pub async fn dispatch_text(&self, owner: i64, chat: i64, text: &str) -> Option<String> {
        let (command, args) = parse_command(text, self.bot_username.as_deref())?;
        let Some(handler) = self.handlers.get(&command) else {
            tracing::debug!(command = %command, "Unknown command");
            return None;
        };

        let ctx = CommandContext {
            owner,
            chat,
            command,
            args,
            help: Arc::clone(&self.help),
        };

        let result = AssertUnwindSafe(handler.handle(&ctx)).catch_unwind().await;
        let reply = match result {
            Ok(Ok(reply)) => reply,
            Ok(Err(CommandError::Validation(message))) => {
                tracing::debug!(command = %ctx.command, owner, "Rejected command input");
                message
            }
            Ok(Err(e)) => {
                tracing::error!(command = %ctx.command, owner, error = %e, "Command failed");
                GENERIC_FAILURE_REPLY.to_string()
            }
            Err(panic) => {
                tracing::error!(
                    command = %ctx.command,
                    owner,
                    panic = %panic_message(panic.as_ref()),
                    "Command handler panicked"
                );
                GENERIC_FAILURE_REPLY.to_string()
            }
        };
        Some(reply)
    }
}
