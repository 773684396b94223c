//! Reminder commands: `/remind_in`, `/remind_at`, `/reminders`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::commands::parse::{format_local, parse_duration, parse_local_datetime};
use crate::commands::{
    CommandContext, CommandExtension, CommandHandler, HelpSink, Registrar, Services,
};
use crate::error::{CommandError, ExtensionError};
use crate::reminders::ReminderJob;

pub struct RemindersExtension;

impl CommandExtension for RemindersExtension {
    fn name(&self) -> &str {
        "reminders"
    }

    fn register(
        &self,
        registrar: &mut Registrar,
        services: &Services,
        help: &mut HelpSink,
    ) -> Result<(), ExtensionError> {
        let remind_in: Arc<dyn CommandHandler> = Arc::new(RemindIn(services.clone()));
        let remind_at: Arc<dyn CommandHandler> = Arc::new(RemindAt(services.clone()));

        registrar.add("remind_in", remind_in.clone());
        registrar.add("remindin", remind_in);
        registrar.add("remind_at", remind_at.clone());
        registrar.add("remindat", remind_at);
        registrar.add("reminders", Arc::new(ListReminders(services.clone())));

        help.add("remind_in", "Remind me after a delay: /remind_in 10m <text> (m, h, d)");
        help.add("remind_at", "Remind me at a time: /remind_at YYYY-MM-DD HH:MM <text>");
        help.add("reminders", "Show my pending reminders");
        Ok(())
    }
}

/// Persist the reminder first, then schedule its job. The row is the source
/// of truth; a crash between the two is repaired by startup recovery.
async fn create_reminder(
    services: &Services,
    ctx: &CommandContext,
    text: &str,
    run_at: DateTime<Utc>,
) -> Result<String, CommandError> {
    let id = services
        .store
        .add_reminder(ctx.owner, ctx.chat, text, run_at)
        .await?;

    let job = ReminderJob {
        reminder_id: id,
        chat: ctx.chat,
        text: text.to_string(),
    };
    services.scheduler.schedule_once(job.job_id(), run_at, job);

    tracing::info!(
        reminder_id = id,
        owner = ctx.owner,
        run_at = %run_at,
        "Reminder scheduled"
    );
    Ok(format!(
        "⏰ Reminder #{id} set for {}",
        format_local(run_at, &services.config.timezone)
    ))
}

/// Split off the first word. Both parts must be non-empty.
fn split_word(s: &str) -> Option<(&str, &str)> {
    let (word, rest) = s.trim().split_once(char::is_whitespace)?;
    let rest = rest.trim();
    if rest.is_empty() { None } else { Some((word, rest)) }
}

struct RemindIn(Services);

#[async_trait]
impl CommandHandler for RemindIn {
    async fn handle(&self, ctx: &CommandContext) -> Result<String, CommandError> {
        let (delay, text) = split_word(&ctx.args).ok_or_else(|| {
            CommandError::validation(
                "Usage: /remind_in <duration> <text>, e.g. /remind_in 10m drink water",
            )
        })?;

        let delay = parse_duration(delay)?;
        let run_at = self.0.clock.now() + delay;
        create_reminder(&self.0, ctx, text, run_at).await
    }
}

struct RemindAt(Services);

#[async_trait]
impl CommandHandler for RemindAt {
    async fn handle(&self, ctx: &CommandContext) -> Result<String, CommandError> {
        let parsed = split_word(&ctx.args).and_then(|(date, rest)| {
            let (time, text) = split_word(rest)?;
            Some((date, time, text))
        });
        let Some((date, time, text)) = parsed else {
            return Err(CommandError::validation(
                "Usage: /remind_at YYYY-MM-DD HH:MM <text>",
            ));
        };

        let run_at = parse_local_datetime(date, time, &self.0.config.timezone)?;
        if run_at <= self.0.clock.now() {
            return Err(CommandError::validation("That time is already in the past."));
        }
        create_reminder(&self.0, ctx, text, run_at).await
    }
}

struct ListReminders(Services);

#[async_trait]
impl CommandHandler for ListReminders {
    async fn handle(&self, ctx: &CommandContext) -> Result<String, CommandError> {
        let pending = self.0.store.list_user_reminders(ctx.owner).await?;
        if pending.is_empty() {
            return Ok("You have no pending reminders.".to_string());
        }

        let tz = &self.0.config.timezone;
        let lines: Vec<String> = pending
            .iter()
            .map(|r| format!("#{} {} — {}", r.id, format_local(r.run_at, tz), r.text))
            .collect();
        Ok(format!("Pending reminders:\n{}", lines.join("\n")))
    }
}
