//! `/echo` and `/time`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono_tz::Tz;

use crate::clock::Clock;
use crate::commands::parse::format_local;
use crate::commands::{
    CommandContext, CommandExtension, CommandHandler, HelpSink, Registrar, Services,
};
use crate::error::{CommandError, ExtensionError};

pub struct UtilityExtension;

impl CommandExtension for UtilityExtension {
    fn name(&self) -> &str {
        "utility"
    }

    fn register(
        &self,
        registrar: &mut Registrar,
        services: &Services,
        help: &mut HelpSink,
    ) -> Result<(), ExtensionError> {
        registrar.add("echo", Arc::new(Echo));
        registrar.add(
            "time",
            Arc::new(Time {
                clock: services.clock.clone(),
                timezone: services.config.timezone,
            }),
        );
        help.add("echo", "Repeat the given text");
        help.add("time", "Show the current time in the configured timezone");
        Ok(())
    }
}

struct Echo;

#[async_trait]
impl CommandHandler for Echo {
    async fn handle(&self, ctx: &CommandContext) -> Result<String, CommandError> {
        if ctx.args.is_empty() {
            return Err(CommandError::validation("Usage: /echo <text>"));
        }
        Ok(ctx.args.clone())
    }
}

struct Time {
    clock: Arc<dyn Clock>,
    timezone: Tz,
}

#[async_trait]
impl CommandHandler for Time {
    async fn handle(&self, _ctx: &CommandContext) -> Result<String, CommandError> {
        Ok(format_local(self.clock.now(), &self.timezone))
    }
}
