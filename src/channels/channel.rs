//! Transport traits and message types.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::ChannelError;

/// A text message received from a chat.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Name of the channel that produced the message.
    pub channel: String,
    /// Chat the reply (and any reminder) goes to.
    pub chat: i64,
    /// Sender's user id; owns the todos and reminders it creates.
    pub owner: i64,
    pub username: Option<String>,
    pub text: String,
}

impl IncomingMessage {
    pub fn new(channel: impl Into<String>, chat: i64, owner: i64, text: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            chat,
            owner,
            username: None,
            text: text.into(),
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

/// Stream of inbound messages from a channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// Outbound capability: deliver text to a chat.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, chat: i64, text: &str) -> Result<(), ChannelError>;
}

/// A bidirectional chat transport.
#[async_trait]
pub trait Channel: Notifier {
    fn name(&self) -> &str;

    /// Begin receiving messages. The stream ends when the transport closes.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Verify the transport is reachable.
    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    /// The bot's own account name, once known. Group-chat commands addressed
    /// as `/cmd@name` to any other name are ignored.
    fn bot_username(&self) -> Option<String> {
        None
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
