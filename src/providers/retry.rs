//! Retry wrapper around a generation backend: bounded exponential backoff
//! with a small jitter so parallel handlers do not retry in lockstep.

use crate::error::BotError;
use crate::providers::traits::{GenerateRequest, GenerateResponse, Generator};
use async_trait::async_trait;
use std::time::Duration;

/// Client errors other than 429/408 will not resolve with retries.
fn is_non_retryable(err: &anyhow::Error) -> bool {
    if let Some(reqwest_err) = err.downcast_ref::<reqwest::Error>() {
        if let Some(status) = reqwest_err.status() {
            let code = status.as_u16();
            return status.is_client_error() && code != 429 && code != 408;
        }
    }
    false
}

pub struct RetryingGenerator {
    inner: Box<dyn Generator>,
    max_retries: u32,
    base_backoff_ms: u64,
}

impl RetryingGenerator {
    pub fn new(inner: Box<dyn Generator>, max_retries: u32, base_backoff_ms: u64) -> Self {
        Self {
            inner,
            max_retries,
            base_backoff_ms: base_backoff_ms.max(50),
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.base_backoff_ms.saturating_mul(1 << attempt.min(6));
        // Sub-millisecond clock noise as jitter; enough to desynchronize.
        let jitter = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| u64::from(d.subsec_millis()) % (base / 2 + 1))
            .unwrap_or(0);
        Duration::from_millis((base + jitter).min(30_000))
    }
}

#[async_trait]
impl Generator for RetryingGenerator {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        let mut last_err = None;
        for attempt in 0..=self.max_retries {
            match self.inner.generate(request).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    if is_non_retryable(&err) {
                        return Err(err);
                    }
                    tracing::warn!(
                        backend = self.inner.name(),
                        attempt,
                        error = %err,
                        "generation attempt failed"
                    );
                    last_err = Some(err);
                    if attempt < self.max_retries {
                        tokio::time::sleep(self.backoff(attempt)).await;
                    }
                }
            }
        }
        // Retry budget exhausted: classify for the pipeline's error taxonomy.
        let cause = last_err
            .map(|err| err.to_string())
            .unwrap_or_else(|| "no attempts made".to_string());
        Err(anyhow::Error::new(BotError::Generation(format!(
            "retries exhausted: {cause}"
        ))))
    }
}
