//! OpenAI-compatible chat-completions client.

use super::ModelClient;
use crate::ConversationTurn;
use crate::config::LlmConfig;
use crate::error::{LlmError, Result};
use anyhow::Context as _;
use async_trait::async_trait;
use serde::Deserialize;

/// Chat-completions client for any OpenAI-compatible endpoint.
pub struct OpenAiClient {
    config: LlmConfig,
    http_client: reqwest::Client,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl OpenAiClient {
    /// Create a new client with its own timeout-bound HTTP client.
    pub fn new(config: LlmConfig) -> Result<Self> {
        if config.openai_key.is_empty() {
            return Err(LlmError::MissingProviderKey("openai".into()).into());
        }

        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .with_context(|| "failed to build HTTP client")?;

        Ok(Self { config, http_client })
    }
}

#[async_trait]
impl ModelClient for OpenAiClient {
    async fn generate(&self, messages: &[ConversationTurn]) -> std::result::Result<String, LlmError> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": messages
                .iter()
                .map(|turn| serde_json::json!({
                    "role": turn.role.as_str(),
                    "content": turn.content,
                }))
                .collect::<Vec<_>>(),
            "temperature": 0.9,
            "max_tokens": 150,
        });

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.openai_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            // Provider error bodies stay in the logs, never in replies.
            let detail = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), detail, "model provider rejected request");
            return Err(LlmError::RequestFailed(format!("provider returned {status}")));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::BadResponse(e.to_string()))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| LlmError::BadResponse("completion had no content".into()))
    }
}
