//! `/start` and `/help`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::commands::{
    CommandContext, CommandExtension, CommandHandler, HelpSink, Registrar, Services,
};
use crate::error::{CommandError, ExtensionError};

const GREETING: &str = "👋 Hi! I keep your todos and send you reminders.\nSend /help to see what I can do.";

pub struct GeneralExtension;

impl CommandExtension for GeneralExtension {
    fn name(&self) -> &str {
        "general"
    }

    fn register(
        &self,
        registrar: &mut Registrar,
        _services: &Services,
        help: &mut HelpSink,
    ) -> Result<(), ExtensionError> {
        registrar.add("start", Arc::new(Start));
        registrar.add("help", Arc::new(Help));
        help.add("start", "Show the welcome message");
        help.add("help", "List available commands");
        Ok(())
    }
}

struct Start;

#[async_trait]
impl CommandHandler for Start {
    async fn handle(&self, _ctx: &CommandContext) -> Result<String, CommandError> {
        Ok(GREETING.to_string())
    }
}

struct Help;

#[async_trait]
impl CommandHandler for Help {
    async fn handle(&self, ctx: &CommandContext) -> Result<String, CommandError> {
        if ctx.help.is_empty() {
            return Ok("No commands available.".to_string());
        }
        Ok(format!("Available commands:\n{}", ctx.help.render()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CommandRegistry;
    use crate::commands::test_support::test_services;
    use crate::extensions::UtilityExtension;

    #[tokio::test]
    async fn help_lists_every_loaded_command_sorted() {
        let services = test_services().await;
        let extensions: Vec<Box<dyn CommandExtension>> =
            vec![Box::new(UtilityExtension), Box::new(GeneralExtension)];
        let dispatcher = CommandRegistry::load(&extensions, &services).into_dispatcher();

        let reply = dispatcher.dispatch_text(1, 1, "/help").await.unwrap();
        assert_eq!(
            reply,
            "Available commands:\n\
             /echo — Repeat the given text\n\
             /help — List available commands\n\
             /start — Show the welcome message\n\
             /time — Show the current time in the configured timezone"
        );
    }

    #[tokio::test]
    async fn start_greets() {
        let services = test_services().await;
        let extensions: Vec<Box<dyn CommandExtension>> = vec![Box::new(GeneralExtension)];
        let dispatcher = CommandRegistry::load(&extensions, &services).into_dispatcher();

        let reply = dispatcher.dispatch_text(1, 1, "/start").await.unwrap();
        assert!(reply.contains("/help"));
    }
}
