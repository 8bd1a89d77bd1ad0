use async_trait::async_trait;

/// Everything a backend needs to produce one reply.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// The message being replied to.
    pub prompt: String,
    /// Recent conversation rendered as a `speaker: text` transcript,
    /// already trimmed to the token budget.
    pub transcript: String,
    /// Style label from the engagement scorer ("technical", "casual", ...).
    pub style: String,
    /// Hard cap applied to the reply after generation.
    pub max_output_chars: usize,
}

#[derive(Debug, Clone)]
pub struct GenerateResponse {
    pub text: String,
}

/// A text generation backend. The daemon only ever talks to this trait, so
/// tests swap in scripted implementations.
#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse>;
}
