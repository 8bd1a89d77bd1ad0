use super::traits::{Channel, MessageEvent};
use async_trait::async_trait;
use chrono::Utc;
use tokio::io::{self, AsyncBufReadExt, BufReader};

/// CLI channel — stdin/stdout, always available, zero setup. Every line is a
/// message in one shared conversation from one local user; handy for trying
/// gating behavior without wiring a real platform.
pub struct CliChannel;

impl CliChannel {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn send(&self, _conversation_id: &str, text: &str) -> anyhow::Result<()> {
        println!("{text}");
        Ok(())
    }

    async fn listen(&self, tx: tokio::sync::mpsc::Sender<MessageEvent>) -> anyhow::Result<()> {
        let stdin = io::stdin();
        let reader = BufReader::new(stdin);
        let mut lines = reader.lines();

        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }
            if line == "/quit" || line == "/exit" {
                break;
            }

            let event = MessageEvent {
                conversation_id: "cli".into(),
                user_id: "local".into(),
                text: line,
                timestamp_ms: Utc::now().timestamp_millis(),
                is_reply_to_bot: false,
            };
            if tx.send(event).await.is_err() {
                break;
            }
        }
        Ok(())
    }
}
