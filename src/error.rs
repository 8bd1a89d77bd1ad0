use thiserror::Error;

/// Failure taxonomy for the gating core.
///
/// `RateDenied` and spam suppression are *not* errors — they are ordinary
/// verdicts returned by the decision engine. Only conditions that abort or
/// degrade the handling of a single message live here.
#[derive(Debug, Error)]
pub enum BotError {
    /// Missing or out-of-range setting. Fatal at startup, before any
    /// traffic is accepted.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Cache read/write failure. Logged and treated as a cache miss;
    /// never aborts message handling.
    #[error("transient store error: {0}")]
    TransientStore(#[from] rusqlite::Error),

    /// Generation collaborator failed after all retries.
    #[error("generation failed: {0}")]
    Generation(String),
}

impl BotError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}
