use std::sync::Arc;

use anyhow::Context;
use futures::StreamExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use taskbot::channels::{Channel, CliChannel, Notifier, TelegramChannel};
use taskbot::clock::{Clock, SystemClock};
use taskbot::commands::{CommandRegistry, Services};
use taskbot::config::BotConfig;
use taskbot::extensions::builtin_extensions;
use taskbot::reminders::{ReminderDelivery, recover_pending_reminders};
use taskbot::scheduler::Scheduler;
use taskbot::store::{LibSqlStore, Store};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; the environment may already be set.
    let _ = dotenvy::dotenv();

    let config = Arc::new(BotConfig::from_env().context("Failed to load configuration")?);
    let _log_guard = init_tracing(&config);

    eprintln!("🤖 Taskbot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.database_path.display());
    eprintln!(
        "   Timezone: {}  Misfire grace: {}s  Delivery: {:?}",
        config.timezone,
        config.scheduler.misfire_grace.as_secs(),
        config.delivery.order
    );

    // ── Database ─────────────────────────────────────────────────────────
    let store: Arc<dyn Store> = Arc::new(
        LibSqlStore::new_local(&config.database_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to open database at {}",
                    config.database_path.display()
                )
            })?,
    );

    // ── Channel ──────────────────────────────────────────────────────────
    let (channel, notifier) = build_channel(&config)?;
    eprintln!("   Channel: {}", channel.name());

    // ── Scheduler + recovery ─────────────────────────────────────────────
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let delivery = Arc::new(ReminderDelivery::new(
        Arc::clone(&store),
        notifier,
        config.delivery.clone(),
    ));
    let scheduler = Arc::new(Scheduler::new(
        config.scheduler.clone(),
        Arc::clone(&clock),
        delivery,
    ));

    let recovered = recover_pending_reminders(store.as_ref(), &scheduler)
        .await
        .context("Failed to recover pending reminders")?;
    if recovered.scheduled > 0 {
        eprintln!("   Recovered {} pending reminders", recovered.scheduled);
    }
    scheduler.start();

    // ── Commands ─────────────────────────────────────────────────────────
    let services = Services {
        config: Arc::clone(&config),
        store: Arc::clone(&store),
        scheduler: Arc::clone(&scheduler),
        clock,
    };
    let registry = CommandRegistry::load(&builtin_extensions(), &services);
    for (name, reason) in &registry.report().failed {
        eprintln!("   ⚠️  Extension '{name}' disabled: {reason}");
    }

    // ── Message loop ─────────────────────────────────────────────────────
    if let Err(e) = channel.health_check().await {
        tracing::warn!(channel = channel.name(), error = %e, "Channel health check failed");
    }
    let dispatcher = match channel.bot_username() {
        Some(username) => registry.into_dispatcher().with_bot_username(username),
        None => registry.into_dispatcher(),
    };
    let mut messages = channel.start().await?;
    eprintln!("   Ready. Press Ctrl-C to exit.\n");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            next = messages.next() => {
                let Some(message) = next else {
                    tracing::info!("Channel closed");
                    break;
                };
                let Some(reply) = dispatcher.dispatch(&message).await else {
                    continue;
                };
                if let Err(e) = channel.send(message.chat, &reply).await {
                    tracing::warn!(chat = message.chat, error = %e, "Failed to send reply");
                }
            }
            _ = &mut shutdown => {
                tracing::info!("Shutdown requested");
                break;
            }
        }
    }

    scheduler.shutdown();
    channel.shutdown().await?;
    Ok(())
}

/// Pick the transport: the local CLI with `BOT_CLI=1`, otherwise Telegram.
fn build_channel(config: &BotConfig) -> anyhow::Result<(Arc<dyn Channel>, Arc<dyn Notifier>)> {
    if config.use_cli {
        let cli = Arc::new(CliChannel::new());
        let channel: Arc<dyn Channel> = cli.clone();
        let notifier: Arc<dyn Notifier> = cli;
        return Ok((channel, notifier));
    }

    let token = config
        .telegram_token
        .clone()
        .context("TELEGRAM_BOT_TOKEN is required unless BOT_CLI=1")?;
    let telegram = Arc::new(TelegramChannel::new(token, config.allowed_users.clone()));
    let channel: Arc<dyn Channel> = telegram.clone();
    let notifier: Arc<dyn Notifier> = telegram;
    Ok((channel, notifier))
}

/// Log to stderr, and additionally to a daily-rolling file when `BOT_LOG_DIR`
/// is set. The returned guard flushes the file writer on drop.
fn init_tracing(config: &BotConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "taskbot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}
