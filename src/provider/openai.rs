//! OpenAI model client implementation.

use crate::error::{EngineError, Result};
use crate::model::{CompletionParams, Message, MessageRole, ModelClient};
use crate::provider::ProviderConfig;
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessage, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        ChatCompletionResponseFormat, ChatCompletionResponseFormatType,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{debug, info, trace, warn};

/// OpenAI model client, used for both structured (JSON-object) and
/// free-form completions.
pub struct OpenAIProvider {
    client: Client<OpenAIConfig>,
    config: ProviderConfig,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        let openai_config = OpenAIConfig::new().with_api_key(api_key);
        let client = Client::with_config(openai_config);

        Self {
            client,
            config: ProviderConfig::new("gpt-4o"),
        }
    }

    /// Create a new OpenAI provider from the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            EngineError::Configuration("OPENAI_API_KEY environment variable not set".to_string())
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

    fn convert_messages(&self, messages: &[Message]) -> Vec<ChatCompletionRequestMessage> {
        messages
            .iter()
            .map(|m| match m.role {
                MessageRole::System => {
                    ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                        content:
                            async_openai::types::ChatCompletionRequestSystemMessageContent::Text(
                                m.content.clone(),
                            ),
                        name: None,
                    })
                }
                MessageRole::User => {
                    ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                        content: async_openai::types::ChatCompletionRequestUserMessageContent::Text(
                            m.content.clone(),
                        ),
                        name: None,
                    })
                }
                MessageRole::Assistant => {
                    ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                        content: Some(
                            async_openai::types::ChatCompletionRequestAssistantMessageContent::Text(
                                m.content.clone(),
                            ),
                        ),
                        name: None,
                        tool_calls: None,
                        refusal: None,
                        #[allow(deprecated)]
                        function_call: None,
                    })
                }
            })
            .collect()
    }
}

#[async_trait]
impl ModelClient for OpenAIProvider {
    async fn complete(&self, messages: Vec<Message>, params: CompletionParams) -> Result<String> {
        info!(
            model = %self.config.model,
            message_count = messages.len(),
            json_mode = params.json_mode,
            "requesting OpenAI completion"
        );

        let openai_messages = self.convert_messages(&messages);

        let mut request_builder = CreateChatCompletionRequestArgs::default();
        request_builder
            .model(&self.config.model)
            .messages(openai_messages)
            .temperature(params.temperature);

        if let Some(max_tokens) = self.config.max_tokens {
            request_builder.max_tokens(max_tokens);
        }

        if params.json_mode {
            request_builder.response_format(ChatCompletionResponseFormat {
                r#type: ChatCompletionResponseFormatType::JsonObject,
            });
        }

        let request = request_builder.build().map_err(|e| {
            EngineError::ModelProvider(format!("failed to build request: {e}").into())
        })?;

        trace!("sending request to OpenAI");

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!(error = %e, "OpenAI API error");
            EngineError::ModelProvider(format!("OpenAI API error: {e}").into())
        })?;

        let message = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| {
                warn!("no content in OpenAI response");
                EngineError::ModelProvider("no content in OpenAI response".into())
            })?;

        debug!(response_length = message.len(), "OpenAI completion successful");

        Ok(message)
    }

    fn name(&self) -> &str {
        "OpenAI"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_provider_creation_defaults() {
        let provider = OpenAIProvider::new("test-api-key");
        assert_eq!(provider.name(), "OpenAI");
        assert_eq!(provider.config.model, "gpt-4o");
    }

    #[test]
    fn openai_provider_with_model() {
        let provider = OpenAIProvider::new("test-api-key").with_model("gpt-4o-mini");
        assert_eq!(provider.config.model, "gpt-4o-mini");
    }

    #[test]
    fn message_conversion_preserves_count() {
        let provider = OpenAIProvider::new("test-api-key");
        let messages = vec![
            Message::system("be terse"),
            Message::user("hello"),
            Message::assistant("hi"),
        ];
        let converted = provider.convert_messages(&messages);
        assert_eq!(converted.len(), 3);
    }
}
