//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;
use secrecy::SecretString;

use crate::error::ConfigError;

/// Default lateness tolerated before a due job is dropped instead of fired.
pub const DEFAULT_MISFIRE_GRACE: Duration = Duration::from_secs(60);

/// Default text prepended to every delivered reminder.
pub const DEFAULT_REMINDER_PREFIX: &str = "⏰ Reminder: ";

/// Order of the two side effects performed when a reminder fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryOrder {
    /// Mark the row sent, then notify. At-most-once: a failed send is lost.
    #[default]
    MarkThenSend,
    /// Notify, then mark the row sent only if the send succeeded. A failed send
    /// stays pending and is retried by the next startup recovery; a failed mark
    /// after a good send can produce a duplicate.
    SendThenMark,
}

impl FromStr for DeliveryOrder {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mark_then_send" => Ok(Self::MarkThenSend),
            "send_then_mark" => Ok(Self::SendThenMark),
            other => Err(ConfigError::InvalidValue {
                key: "BOT_DELIVERY_ORDER".into(),
                message: format!("expected mark_then_send or send_then_mark, got '{other}'"),
            }),
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Jobs evaluated later than `run_at + misfire_grace` are dropped silently.
    pub misfire_grace: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            misfire_grace: DEFAULT_MISFIRE_GRACE,
        }
    }
}

/// Reminder delivery configuration.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub order: DeliveryOrder,
    pub prefix: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            order: DeliveryOrder::default(),
            prefix: DEFAULT_REMINDER_PREFIX.to_string(),
        }
    }
}

/// Bot configuration, loaded once at boot.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Telegram bot token. Absent only when running on the local CLI channel.
    pub telegram_token: Option<SecretString>,
    /// Telegram usernames or numeric ids allowed to talk to the bot (`*` = everyone).
    pub allowed_users: Vec<String>,
    /// Use the stdin/stdout channel instead of Telegram.
    pub use_cli: bool,
    pub database_path: PathBuf,
    /// IANA timezone used to parse and display wall-clock times.
    pub timezone: Tz,
    pub scheduler: SchedulerConfig,
    pub delivery: DeliveryConfig,
    /// Optional directory for a daily-rolling log file.
    pub log_dir: Option<PathBuf>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            telegram_token: None,
            allowed_users: vec!["*".to_string()],
            use_cli: false,
            database_path: PathBuf::from("./data/bot.db"),
            timezone: Tz::UTC,
            scheduler: SchedulerConfig::default(),
            delivery: DeliveryConfig::default(),
            log_dir: None,
        }
    }
}

impl BotConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let use_cli = get("BOT_CLI").is_some_and(|v| matches!(v.as_str(), "1" | "true" | "yes"));

        let telegram_token = get("TELEGRAM_BOT_TOKEN").map(SecretString::from);
        if telegram_token.is_none() && !use_cli {
            return Err(ConfigError::MissingEnvVar("TELEGRAM_BOT_TOKEN".into()));
        }

        let allowed_users: Vec<String> = get("TELEGRAM_ALLOWED_USERS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let database_path = get("BOT_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/bot.db"));

        let timezone = match get("BOT_TIMEZONE") {
            Some(tz) => parse_timezone(&tz)?,
            None => Tz::UTC,
        };

        let misfire_grace = match get("BOT_MISFIRE_GRACE_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| ConfigError::InvalidValue {
                    key: "BOT_MISFIRE_GRACE_SECS".into(),
                    message: e.to_string(),
                })?,
            None => DEFAULT_MISFIRE_GRACE,
        };

        let order = match get("BOT_DELIVERY_ORDER") {
            Some(raw) => raw.parse()?,
            None => DeliveryOrder::default(),
        };

        // The prefix is read untrimmed so a trailing space survives.
        let prefix = lookup("BOT_REMINDER_PREFIX")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_REMINDER_PREFIX.to_string());

        Ok(Self {
            telegram_token,
            allowed_users,
            use_cli,
            database_path,
            timezone,
            scheduler: SchedulerConfig { misfire_grace },
            delivery: DeliveryConfig { order, prefix },
            log_dir: get("BOT_LOG_DIR").map(PathBuf::from),
        })
    }
}

/// Parse an IANA zone name such as `Europe/Paris` or `Asia/Tehran`.
/// `UTC` and `Z` are accepted in any case.
pub fn parse_timezone(raw: &str) -> Result<Tz, ConfigError> {
    let s = raw.trim();
    if s.eq_ignore_ascii_case("utc") || s.eq_ignore_ascii_case("z") {
        return Ok(Tz::UTC);
    }
    s.parse::<Tz>().map_err(|e| ConfigError::InvalidValue {
        key: "BOT_TIMEZONE".into(),
        message: format!("unknown timezone '{raw}': {e}"),
    })
}
