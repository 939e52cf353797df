//! # flowcore
//!
//! flowcore runs an LLM voice/chat agent against a declarative set of
//! conversation journeys and behavioral guidelines, validating every drafted
//! reply against the active guideline set before it reaches the caller.
//!
//! ## Features
//!
//! - 🗺️ **Journeys**: YAML-defined multi-state conversation flows, with
//!   model-driven activation and transition classification — every model
//!   claim is re-validated against the caller's own enumeration before use
//! - 🎯 **Guidelines**: scoped behavioral rules (GLOBAL/JOURNEY/STATE)
//!   retrieved through a two-stage keyword-prefilter-then-batch-relevance
//!   pipeline
//! - ✅ **Response validation**: every drafted reply is checked against the
//!   active guideline set, with an auto-fix pass and a durable audit trail
//! - 🔧 **Tools**: async tool execution with rate limiting, result caching,
//!   and a deadline per call
//! - 💾 **Storage**: in-memory default, optional PostgreSQL-backed durable
//!   store; a three-tier cache facade (L1/L2/L3) in front of both
//! - 🔌 **Model providers**: OpenAI and Anthropic, behind one
//!   [`model::ModelClient`] trait
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use flowcore::cache::CacheFacade;
//! use flowcore::guideline::{GuidelineMatcher, GuidelineStore, ResponseValidator};
//! use flowcore::journey::{JourneyEngine, JourneyMatcher, JourneyStore};
//! use flowcore::provider::OpenAIProvider;
//! use flowcore::storage::memory::InMemoryDurableStore;
//! use flowcore::turn::TurnCoordinator;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let model = Arc::new(OpenAIProvider::from_env()?);
//! let durable = Arc::new(InMemoryDurableStore::new());
//!
//! let journey_store = Arc::new(JourneyStore::new(durable.clone(), CacheFacade::in_memory()));
//! journey_store.load_all().await?;
//! let journey_matcher = Arc::new(JourneyMatcher::new(model.clone(), CacheFacade::in_memory(), 0.6));
//! let journey_engine = Arc::new(JourneyEngine::new(journey_store, journey_matcher));
//!
//! let guideline_store = Arc::new(GuidelineStore::new(durable.clone(), CacheFacade::in_memory()));
//! guideline_store.load_all().await?;
//! let guideline_matcher = Arc::new(GuidelineMatcher::new(guideline_store, model.clone(), 0.6));
//!
//! let validator = Arc::new(ResponseValidator::new(model, durable));
//!
//! let coordinator = TurnCoordinator::new(journey_engine, guideline_matcher, validator);
//! let session_id = flowcore::types::SessionId::new("call-1");
//! let outcome = coordinator
//!     .handle_turn(&session_id, "what's my claim status", "Your claim is in review.", &Default::default())
//!     .await?;
//! println!("{}", outcome.final_reply);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                   TurnCoordinator                      │
//! │  ┌────────────────┐ ┌─────────────────┐ ┌───────────┐ │
//! │  │  JourneyEngine │ │ GuidelineMatcher │ │ Validator │ │
//! │  │  - activation  │ │  - keyword pre-  │ │ - check   │ │
//! │  │  - transition  │ │    filter        │ │ - autofix │ │
//! │  │  - contexts    │ │  - batch scoring │ │ - audit   │ │
//! │  └────────────────┘ └─────────────────┘ └───────────┘ │
//! │  ┌─────────────────────────────────────────────────┐  │
//! │  │                  ModelClient                      │ │
//! │  │            OpenAI  ·  Anthropic                   │ │
//! │  └─────────────────────────────────────────────────┘  │
//! │  ┌─────────────────────────────────────────────────┐  │
//! │  │  CacheFacade (L1/L2/L3)  ·  DurableStore          │ │
//! │  │  in-memory  ·  postgres (feature)                 │ │
//! │  └─────────────────────────────────────────────────┘  │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`types`]: newtype identifiers, scope enum, session id
//! - [`error`]: layered error taxonomy and per-domain `Result` aliases
//! - [`config`]: environment-driven runtime configuration
//! - [`model`]: the `ModelClient` seam and prompt message types
//! - [`provider`]: OpenAI and Anthropic `ModelClient` implementations
//! - [`cache`]: the L1/L2/L3 cache facade over a pluggable `KvStore`
//! - [`storage`]: the `DurableStore` seam, in-memory and (optional) postgres
//! - [`journey`]: journey definitions, loader, store, matcher, engine
//! - [`guideline`]: guideline definitions, loader, store, matcher, validator
//! - [`tool`]: tool registry and rate-limited, cached, deadline-bound execution
//! - [`turn`]: `TurnCoordinator`, the per-turn composition root
//!
//! ## License
//!
//! Licensed under either of Apache License 2.0 or MIT license at your option.

// Core type definitions
pub mod types;

// Error types
pub mod error;

// Runtime configuration
pub mod config;

// Model provider seam (message/params types, ModelClient trait)
pub mod model;

// Model provider implementations
pub mod provider;

// Cache facade
pub mod cache;

// Storage backends
pub mod storage;

// Guideline matching engine
pub mod guideline;

// Tool integration
pub mod tool;

// Journey system
pub mod journey;

// Per-turn composition root
pub mod turn;

pub use cache::{CacheFacade, CacheTier, KvStore};
pub use config::{AppConfig, CacheBackendConfig, DatabaseConfig, EngineTuning};
pub use error::{
    EngineError, GuidelineError, JourneyError, Result, StorageError, ToolError, ValidationError,
};
pub use guideline::{
    Guideline, GuidelineBuilder, GuidelineLoader, GuidelineMatch, GuidelineMatcher,
    GuidelineStore, ResponseValidator, ValidationAuditRecord, ValidationResult,
};
pub use journey::{
    Journey, JourneyContext, JourneyEngine, JourneyLoader, JourneyMatcher, JourneyState,
    JourneyStore, JourneyTransition, TurnMeta,
};
pub use model::{CompletionParams, Message, MessageRole, ModelClient};
pub use provider::{AnthropicProvider, OpenAIProvider, ProviderConfig};
pub use storage::{memory::InMemoryDurableStore, DurableStore};
pub use tool::{
    ParameterSchema, RateLimitPolicy, Tool, ToolDefinition, ToolExecutor, ToolRegistry, ToolResult,
};
pub use turn::{TurnCoordinator, TurnOutcome};
pub use types::{ContextId, GuidelineId, GuidelineScope, JourneyId, SessionId, ToolId};
