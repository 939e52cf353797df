//! Wire format for model (LLM) completion requests.
//!
//! The model backend is treated as an opaque chat-style completion RPC;
//! this module only defines the message shape the rest of the engine
//! builds prompts with, and the small `ModelClient` trait every call site
//! in `journey::matcher`, `guideline::matcher`, and `guideline::validator`
//! programs against.

use serde::{Deserialize, Serialize};

/// Role of a message in a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System/instruction message.
    System,
    /// End-user (or, here, the caller building a structured prompt) message.
    User,
    /// A prior assistant turn, when replaying history into the prompt.
    Assistant,
}

/// A single message in a completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who the message is from.
    pub role: MessageRole,
    /// Message text.
    pub content: String,
}

impl Message {
    /// Build a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Build a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Build an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Per-call tuning. The engine issues two distinct shapes of call:
/// structured JSON-object responses at temperature 0 for every
/// classification/scoring call site, and one free-form call at
/// temperature 0.3 for the validator's auto-fix attempt.
#[derive(Debug, Clone, Copy)]
pub struct CompletionParams {
    /// Sampling temperature.
    pub temperature: f32,
    /// Whether the provider should be asked to constrain output to a JSON object.
    pub json_mode: bool,
}

impl CompletionParams {
    /// Temperature 0, JSON-object response — used by activation, transition,
    /// guideline batch relevance, and response validation.
    pub fn structured() -> Self {
        Self {
            temperature: 0.0,
            json_mode: true,
        }
    }

    /// Temperature 0.3, free-form text — used only by the validator's
    /// auto-fix call.
    pub fn free_form_correction() -> Self {
        Self {
            temperature: 0.3,
            json_mode: false,
        }
    }
}

/// Trait implemented by each model backend (OpenAI, Anthropic, or a test
/// double). A single request/response shape suffices: every call site
/// sends a short message list and reads back either a JSON object or free
/// text, never a stream.
#[async_trait::async_trait]
pub trait ModelClient: Send + Sync {
    /// Run one completion and return the raw text (JSON-encoded when
    /// `params.json_mode` is set; the caller is responsible for parsing and
    /// for treating every field of the result as untrusted input).
    async fn complete(
        &self,
        messages: Vec<Message>,
        params: CompletionParams,
    ) -> crate::error::Result<String>;

    /// Name of the backend, for logging.
    fn name(&self) -> &str;
}
