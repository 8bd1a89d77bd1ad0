//! OpenAI-compatible chat completions backend. Most hosted LLM APIs speak
//! this format, so one implementation covers them all.

use crate::providers::traits::{GenerateRequest, GenerateResponse, Generator};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub struct OpenAiCompatibleGenerator {
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
    persona_name: String,
    client: Client,
}

impl OpenAiCompatibleGenerator {
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: &str,
        temperature: f64,
        persona_name: &str,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            temperature,
            persona_name: persona_name.to_string(),
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .connect_timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn system_prompt(&self, request: &GenerateRequest) -> String {
        let mut prompt = format!(
            "You are {}, replying in a group chat. Match a {} register and keep \
             replies under {} characters.",
            self.persona_name, request.style, request.max_output_chars
        );
        if !request.transcript.is_empty() {
            prompt.push_str("\n\nRecent conversation:\n");
            prompt.push_str(&request.transcript);
        }
        prompt
    }
}

#[async_trait]
impl Generator for OpenAiCompatibleGenerator {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: self.system_prompt(request),
                },
                Message {
                    role: "user".to_string(),
                    content: request.prompt.clone(),
                },
            ],
            temperature: self.temperature,
        };

        let url = format!("{}/v1/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error = response.text().await?;
            anyhow::bail!("generation API error ({status}): {error}");
        }

        let chat_response: ChatResponse = response.json().await?;
        let mut text = chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("empty completion from {}", self.model))?;

        if text.chars().count() > request.max_output_chars {
            text = text.chars().take(request.max_output_chars).collect();
        }
        Ok(GenerateResponse { text })
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f64,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}
