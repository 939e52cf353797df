//! Error types for the conversation-control engine.
//!
//! Layered per domain with `thiserror`: one umbrella error with `#[from]`
//! conversions from each subsystem's own error enum, plus a `Result`
//! alias per domain so call sites can stay narrow.

use crate::types::{ContextId, GuidelineId, JourneyId, ToolId};
use thiserror::Error;

/// Top-level error for engine operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum EngineError {
    /// A YAML definition failed schema validation. Fatal at load time.
    #[error("definition validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Durable store or cache I/O failure.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Tool registry or execution failure.
    #[error("tool error: {0}")]
    Tool(#[from] ToolError),

    /// Journey engine failure.
    #[error("journey error: {0}")]
    Journey(#[from] JourneyError),

    /// Guideline engine failure.
    #[error("guideline error: {0}")]
    Guideline(#[from] GuidelineError),

    /// Model provider (LLM) failure.
    #[error("model provider error: {0}")]
    ModelProvider(#[from] Box<dyn std::error::Error + Send + Sync>),

    /// Serialization error surfaced at the API boundary.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Missing or invalid configuration (e.g. absent API key).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Caller supplied invalid input.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// A definition failed schema validation while loading YAML. Always
/// fatal: the directory load that produced it must abort.
#[derive(Error, Debug, Clone)]
#[error("{file}: entry {index:?}, field `{field}`: {message}")]
pub struct ValidationError {
    /// Source file the offending definition came from.
    pub file: String,
    /// Index within the file's list (guidelines) or key (journeys), if applicable.
    pub index: Option<String>,
    /// Name of the offending field.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl ValidationError {
    /// Construct a validation error naming the file and field.
    pub fn new(
        file: impl Into<String>,
        index: Option<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            index,
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Storage-related errors (cache facade + durable store).
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StorageError {
    /// Backend connection failed.
    #[error("storage connection failed: {0}")]
    Connection(String),

    /// Query failed.
    #[error("storage query failed: {0}")]
    Query(String),

    /// Serialization failed while writing.
    #[error("storage serialization failed: {0}")]
    Serialization(String),

    /// Deserialization failed while reading; treated as a cache miss where
    /// the call site can degrade, propagated where it cannot.
    #[error("storage deserialization failed: {0}")]
    Deserialization(String),

    /// Resource not found.
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Resource with this key already exists.
    #[error("resource already exists: {0}")]
    AlreadyExists(String),

    /// Backend unreachable; the caller must decide whether to degrade.
    #[error("storage backend not available: {0}")]
    BackendUnavailable(String),
}

/// Guideline-related errors (definition-level, not matching failures —
/// a failed match degrades to an empty result, it never raises).
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GuidelineError {
    /// Referenced guideline id is unknown.
    #[error("guideline not found: {0}")]
    NotFound(GuidelineId),

    /// Guideline id collision on insert.
    #[error("guideline already exists: {0}")]
    AlreadyExists(GuidelineId),

    /// STATE/JOURNEY scope guideline references a journey name the loader
    /// has not seen.
    #[error("unknown journey name referenced by guideline: {0}")]
    UnknownJourneyName(String),

    /// A confidence value outside `[0, 1]` was supplied for a match.
    #[error("guideline match confidence {0} out of range [0, 1]")]
    InvalidConfidence(f32),
}

/// Tool-related errors.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ToolError {
    /// No tool registered under this name.
    #[error("tool not found: {0}")]
    NotFound(String),

    /// A tool with this name is already registered.
    #[error("tool already registered: {0}")]
    AlreadyExists(String),

    /// Execution exceeded its deadline.
    #[error("tool `{tool}` timed out after {timeout_secs}s")]
    Timeout { tool: String, timeout_secs: u64 },

    /// Rate limit policy rejected this call before execution.
    #[error("tool `{tool}` rate limit exceeded for identifier `{identifier}`")]
    RateLimitExceeded { tool: String, identifier: String },

    /// The tool callable returned an error.
    #[error("tool `{tool}` execution failed: {message}")]
    ExecutionFailed { tool: String, message: String },

    /// Arguments did not match the tool's parameter schema.
    #[error("invalid parameters for tool `{tool}`: {message}")]
    InvalidParameters { tool: String, message: String },
}

impl ToolError {
    /// The identifier of the tool this error concerns, when known.
    pub fn tool_name(&self) -> Option<&str> {
        match self {
            ToolError::NotFound(t)
            | ToolError::AlreadyExists(t)
            | ToolError::Timeout { tool: t, .. }
            | ToolError::RateLimitExceeded { tool: t, .. }
            | ToolError::ExecutionFailed { tool: t, .. }
            | ToolError::InvalidParameters { tool: t, .. } => Some(t),
        }
    }
}

/// Journey-related errors surfaced where a caller needs an error rather
/// than the usual "degrade to null/no-op" runtime behavior.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum JourneyError {
    /// Referenced journey id is unknown.
    #[error("journey not found: {0}")]
    NotFound(JourneyId),

    /// Journey id or name collision on insert.
    #[error("journey already exists: {0}")]
    AlreadyExists(JourneyId),

    /// Context references a state the journey no longer declares (or never did).
    #[error("state `{state}` not found in journey {journey_id}")]
    StateNotFound {
        journey_id: JourneyId,
        state: String,
    },

    /// No active context for this session.
    #[error("no active context for context id {0}")]
    ContextNotActive(ContextId),

    /// Internal inconsistency (e.g. a context referencing a journey that
    /// vanished between turns). Logged as a warning at the call site, not
    /// necessarily surfaced to the caller.
    #[error("journey engine inconsistency: {0}")]
    Inconsistent(String),
}

/// Result alias for engine-level operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Result alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Result alias for guideline operations.
pub type GuidelineResult<T> = std::result::Result<T, GuidelineError>;

/// Result alias for tool operations.
pub type ToolOpResult<T> = std::result::Result<T, ToolError>;

/// Result alias for journey operations.
pub type JourneyResult<T> = std::result::Result<T, JourneyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_display_includes_file_and_field() {
        let err = ValidationError::new(
            "journeys/claim.yaml",
            Some("states.verify".to_string()),
            "action",
            "must be non-empty",
        );
        let display = format!("{}", err);
        assert!(display.contains("journeys/claim.yaml"));
        assert!(display.contains("action"));
        assert!(display.contains("must be non-empty"));
    }

    #[test]
    fn storage_error_display() {
        let err = StorageError::Connection("connection refused".to_string());
        assert!(format!("{}", err).contains("connection refused"));
    }

    #[test]
    fn tool_error_timeout_display_and_name() {
        let err = ToolError::Timeout {
            tool: "lookup_claim".to_string(),
            timeout_secs: 5,
        };
        let display = format!("{}", err);
        assert!(display.contains("lookup_claim"));
        assert!(display.contains("5s"));
        assert_eq!(err.tool_name(), Some("lookup_claim"));
    }

    #[test]
    fn journey_error_state_not_found_display() {
        let journey_id = JourneyId::new();
        let err = JourneyError::StateNotFound {
            journey_id,
            state: "verify_identity".to_string(),
        };
        let display = format!("{}", err);
        assert!(display.contains("verify_identity"));
        assert!(display.contains(&journey_id.to_string()));
    }

    #[test]
    fn error_conversion_from_storage_to_engine() {
        let storage_err = StorageError::Connection("test".to_string());
        let engine_err: EngineError = storage_err.into();
        assert!(matches!(engine_err, EngineError::Storage(_)));
    }

    #[test]
    fn error_conversion_from_tool_to_engine() {
        let tool_err = ToolError::NotFound("lookup_claim".to_string());
        let engine_err: EngineError = tool_err.into();
        assert!(matches!(engine_err, EngineError::Tool(_)));
    }

    #[test]
    fn error_conversion_from_journey_to_engine() {
        let journey_err = JourneyError::NotFound(JourneyId::new());
        let engine_err: EngineError = journey_err.into();
        assert!(matches!(engine_err, EngineError::Journey(_)));
    }

    #[test]
    fn result_type_aliases_compile() {
        fn returns_result() -> Result<()> {
            Ok(())
        }
        fn returns_storage_result() -> StorageResult<()> {
            Ok(())
        }
        fn returns_guideline_result() -> GuidelineResult<()> {
            Ok(())
        }
        fn returns_tool_result() -> ToolOpResult<()> {
            Ok(())
        }
        fn returns_journey_result() -> JourneyResult<()> {
            Ok(())
        }

        assert!(returns_result().is_ok());
        assert!(returns_storage_result().is_ok());
        assert!(returns_guideline_result().is_ok());
        assert!(returns_tool_result().is_ok());
        assert!(returns_journey_result().is_ok());
    }
}
