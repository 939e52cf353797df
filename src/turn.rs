//! Per-turn composition of the journey and guideline engines.
//!
//! Stripped of every speech-to-text/text-to-speech frame-processor
//! concern, which stays out of scope for this crate. `TurnCoordinator` is
//! the thin composition root tying the engines together; reply generation
//! itself remains an external collaborator the caller supplies as
//! `draft_reply`.

use crate::error::Result;
use crate::guideline::matcher::GuidelineMatcher;
use crate::guideline::validator::{ResponseValidator, ValidationResult};
use crate::guideline::GuidelineMatch;
use crate::journey::engine::{JourneyEngine, TurnMeta};
use crate::journey::JourneyContext;
use crate::types::SessionId;
use std::collections::HashMap;
use std::sync::Arc;

/// Everything one turn produced: the (possibly advanced) context, the
/// guidelines that applied, the validated reply, and per-turn metadata.
pub struct TurnOutcome {
    pub context: Option<JourneyContext>,
    pub guidelines: Vec<GuidelineMatch>,
    pub validation: ValidationResult,
    pub final_reply: String,
    pub meta: TurnMeta,
}

/// Composes the journey engine, guideline matcher, and response validator
/// into the one operation a caller needs per turn.
pub struct TurnCoordinator {
    journey_engine: Arc<JourneyEngine>,
    guideline_matcher: Arc<GuidelineMatcher>,
    validator: Arc<ResponseValidator>,
}

impl TurnCoordinator {
    pub fn new(
        journey_engine: Arc<JourneyEngine>,
        guideline_matcher: Arc<GuidelineMatcher>,
        validator: Arc<ResponseValidator>,
    ) -> Self {
        Self {
            journey_engine,
            guideline_matcher,
            validator,
        }
    }

    /// Run one turn: resolve/advance the journey context, match applicable
    /// guidelines, and validate the caller-supplied draft reply against
    /// them.
    pub async fn handle_turn(
        &self,
        session_id: &SessionId,
        utterance: &str,
        draft_reply: &str,
        hints: &HashMap<String, serde_json::Value>,
    ) -> Result<TurnOutcome> {
        let outcome = self
            .journey_engine
            .process_message(session_id, utterance, hints)
            .await?;

        let journey_id = outcome.context.as_ref().map(|c| c.journey_id);
        let state_name = outcome.state.as_ref().map(|s| s.name.clone());
        let variables = outcome
            .context
            .as_ref()
            .map(|c| serde_json::to_value(&c.variables).unwrap_or(serde_json::Value::Null))
            .unwrap_or(serde_json::Value::Null);

        let guidelines = self
            .guideline_matcher
            .match_guidelines(utterance, &variables, journey_id, state_name.as_deref())
            .await;

        let validation = self
            .validator
            .validate_response(draft_reply, &guidelines, session_id.as_str(), journey_id)
            .await;

        let final_reply = validation
            .fixed_response
            .clone()
            .unwrap_or_else(|| draft_reply.to_string());

        Ok(TurnOutcome {
            context: outcome.context,
            guidelines,
            validation,
            final_reply,
            meta: outcome.meta,
        })
    }
}
