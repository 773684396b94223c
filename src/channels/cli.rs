//! CLI channel: a stdin/stdout REPL for local testing.

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::channels::{Channel, IncomingMessage, MessageStream, Notifier};
use crate::error::ChannelError;

/// Chat and user id of the single local user.
pub const CLI_USER_ID: i64 = 1;

/// A simple CLI channel that reads from stdin and writes to stdout.
#[derive(Debug, Default)]
pub struct CliChannel;

impl CliChannel {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for CliChannel {
    async fn send(&self, _chat: i64, text: &str) -> Result<(), ChannelError> {
        let mut stdout = tokio::io::stdout();
        let line = format!("\n{text}\n\n");
        stdout
            .write_all(line.as_bytes())
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "cli".into(),
                reason: e.to_string(),
            })?;
        stdout.flush().await.map_err(|e| ChannelError::SendFailed {
            name: "cli".into(),
            reason: e.to_string(),
        })?;
        eprint!("> ");
        Ok(())
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            eprint!("> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            eprint!("> ");
                            continue;
                        }
                        let msg = IncomingMessage::new("cli", CLI_USER_ID, CLI_USER_ID, line)
                            .with_username("local-user");
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }
}
