use async_trait::async_trait;

/// One inbound chat message, created per delivery and consumed once.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub conversation_id: String,
    pub user_id: String,
    pub text: String,
    pub timestamp_ms: i64,
    /// Set when the platform marks this as a direct reply to the bot's own
    /// prior message — it bypasses the probability gates downstream.
    pub is_reply_to_bot: bool,
}

/// Boundary to a messaging platform — implement for any transport.
/// Platform delivery and polling are collaborators; the core only consumes
/// `MessageEvent`s and hands text back.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable channel name
    fn name(&self) -> &str;

    /// Send a message into a conversation.
    async fn send(&self, conversation_id: &str, text: &str) -> anyhow::Result<()>;

    /// Start listening for incoming messages (long-running).
    async fn listen(&self, tx: tokio::sync::mpsc::Sender<MessageEvent>) -> anyhow::Result<()>;
}
