//! Anthropic model client implementation.

use crate::error::{EngineError, Result};
use crate::model::{CompletionParams, Message, MessageRole, ModelClient};
use crate::provider::ProviderConfig;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Anthropic model client.
pub struct AnthropicProvider {
    api_key: String,
    config: ProviderConfig,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            config: ProviderConfig::new("claude-3-5-sonnet-20241022"),
        }
    }

    /// Create a new Anthropic provider from the `ANTHROPIC_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
            EngineError::Configuration(
                "ANTHROPIC_API_KEY environment variable not set".to_string(),
            )
        })?;

        Ok(Self::new(api_key))
    }

    /// Set the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    /// Set the maximum tokens.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.config = self.config.with_max_tokens(max_tokens);
        self
    }
}

#[async_trait]
impl ModelClient for AnthropicProvider {
    async fn complete(&self, messages: Vec<Message>, params: CompletionParams) -> Result<String> {
        info!(
            model = %self.config.model,
            message_count = messages.len(),
            json_mode = params.json_mode,
            "requesting Anthropic completion"
        );

        let mut anthropic_messages = Vec::new();
        let mut system_prompt = String::new();

        for msg in messages {
            match msg.role {
                MessageRole::System => {
                    system_prompt = msg.content;
                }
                MessageRole::User => {
                    anthropic_messages.push(json!({"role": "user", "content": msg.content}));
                }
                MessageRole::Assistant => {
                    anthropic_messages.push(json!({"role": "assistant", "content": msg.content}));
                }
            }
        }

        // Anthropic has no dedicated JSON-object response mode; the caller's
        // system prompt is expected to demand JSON explicitly, which every
        // structured call site in this crate already does.
        let messages_value = json!(anthropic_messages);

        let mut client_builder = anthropic_sdk::Client::new()
            .auth(&self.api_key)
            .model(&self.config.model)
            .messages(&messages_value)
            .max_tokens(self.config.max_tokens.unwrap_or(4096) as i32)
            .temperature(params.temperature);

        if !system_prompt.is_empty() {
            client_builder = client_builder.system(&system_prompt);
        }

        let request = client_builder.build().map_err(|e| {
            EngineError::ModelProvider(format!("failed to build request: {e}").into())
        })?;

        let response_text = Arc::new(Mutex::new(String::new()));
        let response_text_clone = Arc::clone(&response_text);

        request
            .execute(|chunk| {
                let response_text = Arc::clone(&response_text_clone);
                async move {
                    let mut text = response_text.lock().await;
                    text.push_str(&chunk);
                }
            })
            .await
            .map_err(|e| EngineError::ModelProvider(format!("Anthropic API error: {e}").into()))?;

        let final_text = response_text.lock().await.clone();
        Ok(final_text)
    }

    fn name(&self) -> &str {
        "Anthropic"
    }
}
