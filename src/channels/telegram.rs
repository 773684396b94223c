//! Telegram channel. Long-polls the Bot API for updates.

use std::sync::OnceLock;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::channels::{Channel, IncomingMessage, MessageStream, Notifier};
use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Seconds the Bot API holds a getUpdates request open.
const POLL_TIMEOUT_SECS: u64 = 30;

/// Pause after a failed poll before retrying.
const POLL_ERROR_BACKOFF: std::time::Duration = std::time::Duration::from_secs(5);

// ── Bot API payloads ────────────────────────────────────────────────

/// Envelope of every Bot API response.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    from: Option<User>,
    chat: Option<Chat>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct User {
    id: i64,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

/// `sendMessage` body. No `parse_mode`: reminder and todo text is the
/// user's own and is delivered exactly as typed.
#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GetUpdates {
    offset: i64,
    timeout: u64,
    allowed_updates: &'static [&'static str],
}

/// Telegram Bot API channel using long-polling.
pub struct TelegramChannel {
    bot_token: SecretString,
    allowed_users: Vec<String>,
    client: reqwest::Client,
    username: OnceLock<String>,
}

impl TelegramChannel {
    pub fn new(bot_token: SecretString, allowed_users: Vec<String>) -> Self {
        Self {
            bot_token,
            allowed_users,
            client: reqwest::Client::new(),
            username: OnceLock::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        api_url(&self.bot_token, method)
    }

    /// Check if a username or numeric id is in the allowed list.
    pub fn is_user_allowed(&self, identity: &str) -> bool {
        check_user_allowed(&self.allowed_users, [identity])
    }

    /// Send a text message, splitting it to fit Telegram's 4096 char limit.
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), ChannelError> {
        for chunk in split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH) {
            self.send_message_chunk(chat_id, &chunk).await?;
        }
        Ok(())
    }

    async fn send_message_chunk(&self, chat_id: i64, text: &str) -> Result<(), ChannelError> {
        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&SendMessage { chat_id, text })
            .send()
            .await
            .map_err(send_failed)?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        Err(ChannelError::SendFailed {
            name: "telegram".into(),
            reason: format!("sendMessage returned {status}: {body}"),
        })
    }
}

#[async_trait]
impl Notifier for TelegramChannel {
    async fn send(&self, chat: i64, text: &str) -> Result<(), ChannelError> {
        self.send_message(chat, text).await
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let url = self.api_url("getUpdates");
        let allowed_users = self.allowed_users.clone();
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for messages...");

            loop {
                let body = GetUpdates {
                    offset,
                    timeout: POLL_TIMEOUT_SECS,
                    allowed_updates: &["message"],
                };

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {}", e.without_url());
                        tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                        continue;
                    }
                };

                let data: ApiResponse<Vec<Update>> = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {}", e.without_url());
                        tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                        continue;
                    }
                };

                if !data.ok {
                    tracing::warn!(
                        description = data.description.as_deref().unwrap_or("unknown"),
                        "Telegram getUpdates rejected"
                    );
                    tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                    continue;
                }

                for update in data.result.unwrap_or_default() {
                    // Advance offset past this update
                    offset = update.update_id + 1;

                    let Some(incoming) = parse_update(update) else {
                        continue;
                    };

                    let owner = incoming.owner.to_string();
                    let mut identities = vec![owner.as_str()];
                    if let Some(name) = incoming.username.as_deref() {
                        identities.push(name);
                    }
                    if !check_user_allowed(&allowed_users, identities) {
                        tracing::warn!(
                            user_id = incoming.owner,
                            username = incoming.username.as_deref().unwrap_or("unknown"),
                            "Telegram: ignoring message from unauthorized user"
                        );
                        continue;
                    }

                    if tx.send(incoming).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    /// Calls `getMe` and remembers the bot's username.
    async fn health_check(&self) -> Result<(), ChannelError> {
        let startup_failed = |reason: String| ChannelError::StartupFailed {
            name: "telegram".into(),
            reason,
        };

        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| startup_failed(e.without_url().to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(startup_failed(format!("getMe returned {status}")));
        }

        let me: ApiResponse<User> = resp
            .json()
            .await
            .map_err(|e| startup_failed(e.without_url().to_string()))?;
        if let Some(username) = me.result.and_then(|user| user.username) {
            tracing::info!(username = %username, "Telegram bot identified");
            let _ = self.username.set(username);
        }
        Ok(())
    }

    fn bot_username(&self) -> Option<String> {
        self.username.get().cloned()
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn api_url(token: &SecretString, method: &str) -> String {
    format!("https://api.telegram.org/bot{}/{method}", token.expose_secret())
}

fn send_failed(e: reqwest::Error) -> ChannelError {
    ChannelError::SendFailed {
        name: "telegram".into(),
        reason: e.without_url().to_string(),
    }
}

/// Turn an update into an inbound message.
///
/// Updates without text, sender or chat (stickers, joins, edits) yield `None`.
fn parse_update(update: Update) -> Option<IncomingMessage> {
    let message = update.message?;
    let text = message.text?;
    let from = message.from?;
    let chat = message.chat?;

    let incoming = IncomingMessage::new("telegram", chat.id, from.id, text);
    Some(match from.username {
        Some(username) => incoming.with_username(username),
        None => incoming,
    })
}

/// Check if any identity in the iterator matches the allowed users list.
fn check_user_allowed<'a>(
    allowed_users: &[String],
    identities: impl IntoIterator<Item = &'a str>,
) -> bool {
    let ids: Vec<&str> = identities.into_iter().collect();
    allowed_users
        .iter()
        .any(|u| u == "*" || ids.contains(&u.as_str()))
}

/// Split a message into chunks of at most `max_len` bytes.
/// Tries to split on newlines, then spaces, then hard-cuts on a char boundary.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut boundary = max_len;
        while !remaining.is_char_boundary(boundary) {
            boundary -= 1;
        }

        // Find a good split point
        let chunk = &remaining[..boundary];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(boundary);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { boundary } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(allowed: &[&str]) -> TelegramChannel {
        TelegramChannel::new(
            SecretString::from("123:ABC"),
            allowed.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn telegram_channel_name() {
        assert_eq!(channel(&["*"]).name(), "telegram");
    }

    #[test]
    fn telegram_api_url() {
        assert_eq!(
            channel(&[]).api_url("getMe"),
            "https://api.telegram.org/bot123:ABC/getMe"
        );
    }

    // ── User allowlist tests ────────────────────────────────────────

    #[test]
    fn telegram_user_allowed_wildcard() {
        assert!(channel(&["*"]).is_user_allowed("anyone"));
    }

    #[test]
    fn telegram_user_allowed_specific() {
        let ch = channel(&["alice", "bob"]);
        assert!(ch.is_user_allowed("alice"));
        assert!(!ch.is_user_allowed("eve"));
    }

    #[test]
    fn telegram_user_denied_empty() {
        assert!(!channel(&[]).is_user_allowed("anyone"));
    }

    #[test]
    fn telegram_user_exact_match_not_substring() {
        let ch = channel(&["alice"]);
        assert!(!ch.is_user_allowed("alice_bot"));
        assert!(!ch.is_user_allowed("malice"));
    }

    #[test]
    fn telegram_user_allowed_by_numeric_id_identity() {
        let allowed = vec!["123456789".to_string()];
        assert!(check_user_allowed(&allowed, ["unknown", "123456789"]));
        assert!(!check_user_allowed(&allowed, ["alice", "42"]));
    }

    // ── Update parsing tests ────────────────────────────────────────

    #[test]
    fn parse_update_extracts_chat_owner_and_text() {
        let update = serde_json::json!({
            "update_id": 10,
            "message": {
                "message_id": 1,
                "from": {"id": 42, "username": "alice", "first_name": "Alice"},
                "chat": {"id": -100200, "type": "group"},
                "text": "/todo_add buy milk"
            }
        });

        let msg = parse_update(serde_json::from_value(update).unwrap()).unwrap();
        assert_eq!(msg.channel, "telegram");
        assert_eq!(msg.owner, 42);
        assert_eq!(msg.chat, -100200);
        assert_eq!(msg.username.as_deref(), Some("alice"));
        assert_eq!(msg.text, "/todo_add buy milk");
    }

    #[test]
    fn parse_update_skips_non_text_messages() {
        let sticker = serde_json::json!({
            "update_id": 11,
            "message": {
                "from": {"id": 42},
                "chat": {"id": 42},
                "sticker": {"file_id": "x"}
            }
        });
        assert!(parse_update(serde_json::from_value(sticker).unwrap()).is_none());

        let edited = serde_json::json!({"update_id": 12, "edited_message": {"text": "hi"}});
        assert!(parse_update(serde_json::from_value(edited).unwrap()).is_none());
    }

    #[test]
    fn parse_update_without_username() {
        let update = serde_json::json!({
            "update_id": 13,
            "message": {"from": {"id": 7}, "chat": {"id": 7}, "text": "/help"}
        });
        let msg = parse_update(serde_json::from_value(update).unwrap()).unwrap();
        assert!(msg.username.is_none());
    }

    #[test]
    fn get_updates_batch_deserializes() {
        let body = serde_json::json!({
            "ok": true,
            "result": [
                {"update_id": 20, "message": {"from": {"id": 1}, "chat": {"id": 1}, "text": "/help"}},
                {"update_id": 21, "my_chat_member": {"chat": {"id": 1}}}
            ]
        });
        let resp: ApiResponse<Vec<Update>> = serde_json::from_value(body).unwrap();
        assert!(resp.ok);
        let updates = resp.result.unwrap();
        assert_eq!(updates.iter().map(|u| u.update_id).collect::<Vec<_>>(), vec![20, 21]);
        assert!(updates[1].message.is_none());
    }

    #[test]
    fn rejected_response_carries_description() {
        let body = serde_json::json!({"ok": false, "error_code": 401, "description": "Unauthorized"});
        let resp: ApiResponse<Vec<Update>> = serde_json::from_value(body).unwrap();
        assert!(!resp.ok);
        assert_eq!(resp.description.as_deref(), Some("Unauthorized"));
        assert!(resp.result.is_none());
    }

    // ── Outbound body tests ─────────────────────────────────────────

    #[test]
    fn send_message_body_is_plain_text() {
        let text = "⏰ Reminder: call _mom_ *now*";
        let body = serde_json::to_value(SendMessage { chat_id: 42, text }).unwrap();
        assert_eq!(body, serde_json::json!({"chat_id": 42, "text": text}));
        assert!(body.get("parse_mode").is_none());
    }

    #[test]
    fn bot_username_unknown_before_health_check() {
        assert_eq!(channel(&["*"]).bot_username(), None);
    }

    // ── Message splitting tests ─────────────────────────────────────

    #[test]
    fn split_message_short() {
        assert_eq!(split_message("Hello", 4096), vec!["Hello"]);
    }

    #[test]
    fn split_message_exact_limit() {
        let msg = "a".repeat(4096);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 4096);
    }

    #[test]
    fn split_message_over_limit_on_newline() {
        let msg = format!("{}\n{}", "a".repeat(2000), "b".repeat(3000));
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks, vec!["a".repeat(2000), "b".repeat(3000)]);
    }

    #[test]
    fn split_message_no_good_split_point() {
        let msg = "a".repeat(5000);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 4096);
        assert_eq!(chunks[1].len(), 904);
    }

    #[test]
    fn split_message_respects_char_boundaries() {
        // "é" is two bytes; a 4096-byte cut would land mid-character.
        let msg = format!("a{}", "é".repeat(3000));
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.concat(), msg);
        assert!(chunks.iter().all(|c| c.len() <= 4096));
    }
}
