//! Model provider implementations.
//!
//! `ModelClient` (defined in [`crate::model`]) is the seam; this module
//! supplies two concrete backends, OpenAI and Anthropic, each a thin
//! wrapper over the vendor SDK plus a `from_env()` constructor.

pub mod anthropic;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAIProvider;

use serde::{Deserialize, Serialize};

/// Per-provider defaults (model name, fallback temperature/max_tokens).
/// Per-call temperature is always overridden by [`crate::model::CompletionParams`];
/// this only supplies `max_tokens` and the provider's configured model name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Model name to use.
    pub model: String,
    /// Maximum tokens to generate, when the provider supports capping it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ProviderConfig {
    /// Create a new provider configuration with default values.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_tokens: None,
        }
    }

    /// Set the maximum tokens.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_config_defaults() {
        let config = ProviderConfig::new("gpt-4o");
        assert_eq!(config.model, "gpt-4o");
        assert!(config.max_tokens.is_none());
    }

    #[test]
    fn provider_config_with_max_tokens() {
        let config = ProviderConfig::new("gpt-4o").with_max_tokens(500);
        assert_eq!(config.max_tokens, Some(500));
    }
}
