pub mod compatible;
pub mod retry;
pub mod traits;

pub use compatible::OpenAiCompatibleGenerator;
pub use retry::RetryingGenerator;
pub use traits::{GenerateRequest, GenerateResponse, Generator};

use crate::config::Config;
use crate::error::BotError;
use std::sync::Arc;

/// Build the generator stack from configuration: the OpenAI-compatible HTTP
/// backend wrapped in the retry layer.
pub fn create_generator(config: &Config) -> Result<Arc<dyn Generator>, BotError> {
    let api_key = config
        .api_key
        .clone()
        .ok_or_else(|| BotError::config("no API key configured (set PURRSONA_API_KEY)"))?;

    let inner = OpenAiCompatibleGenerator::new(
        &config.generator.base_url,
        &api_key,
        &config.generator.model,
        config.generator.temperature,
        &config.persona.name,
    );

    Ok(Arc::new(RetryingGenerator::new(
        Box::new(inner),
        config.reliability.generation_retries,
        config.reliability.generation_backoff_ms,
    )))
}
