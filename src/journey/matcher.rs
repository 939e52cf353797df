//! Journey activation and transition classification.
//!
//! Both operations are structured model calls at temperature 0; the model
//! is untrusted, so every id/state it returns is re-validated against the
//! caller's own enumeration before use.

use crate::journey::{Journey, JourneyTransition};
use crate::model::{CompletionParams, Message, ModelClient};
use crate::types::JourneyId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::{CacheFacade, CacheTier};

#[derive(Debug, Deserialize)]
struct ActivationResponse {
    matched: bool,
    #[serde(default)]
    journey_id: Option<JourneyId>,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    #[allow(dead_code)]
    reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct CachedActivation {
    journey_id: Option<JourneyId>,
}

#[derive(Debug, Deserialize)]
struct TransitionResponse {
    should_transition: bool,
    #[serde(default)]
    to_state: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    reasoning: String,
}

/// Classifies journey activation and in-journey transitions via structured
/// model calls.
pub struct JourneyMatcher {
    model: Arc<dyn ModelClient>,
    cache: CacheFacade,
    confidence_floor: f32,
}

impl JourneyMatcher {
    /// Construct a matcher. `confidence_floor` is `EngineTuning::activation_confidence_floor`.
    pub fn new(model: Arc<dyn ModelClient>, cache: CacheFacade, confidence_floor: f32) -> Self {
        Self {
            model,
            cache,
            confidence_floor,
        }
    }

    fn stable_hash(utterance: &str) -> String {
        let digest = Sha256::digest(utterance.as_bytes());
        format!("{digest:x}")
    }

    /// Decide which (if any) journey should activate for an utterance with
    /// no active context. Returns `None` on a cache-confirmed non-match, a
    /// sub-floor confidence, an unknown returned id, or a model failure.
    pub async fn activate_journey(
        &self,
        session_id: &str,
        utterance: &str,
        hints: &HashMap<String, serde_json::Value>,
        candidates: &[Journey],
    ) -> Option<JourneyId> {
        let cache_key = format!("activation:{session_id}:{}", Self::stable_hash(utterance));
        if let Some(cached) = self
            .cache
            .get::<CachedActivation>(CacheTier::L2, &cache_key)
            .await
        {
            debug!(session_id, "journey activation cache hit");
            return cached.journey_id;
        }

        if candidates.is_empty() {
            return None;
        }

        let prompt = Self::activation_prompt(utterance, hints, candidates);
        let raw = match self
            .model
            .complete(prompt, CompletionParams::structured())
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "journey activation model call failed");
                return None;
            }
        };

        let parsed: ActivationResponse = match serde_json::from_str(&raw) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "journey activation response did not parse");
                return None;
            }
        };

        let journey_id = if parsed.matched && parsed.confidence >= self.confidence_floor {
            parsed
                .journey_id
                .filter(|id| candidates.iter().any(|j| j.id == *id))
        } else {
            None
        };

        self.cache
            .set(
                CacheTier::L2,
                &cache_key,
                &CachedActivation { journey_id },
            )
            .await;

        journey_id
    }

    fn activation_prompt(
        utterance: &str,
        hints: &HashMap<String, serde_json::Value>,
        candidates: &[Journey],
    ) -> Vec<Message> {
        let listing: Vec<String> = candidates
            .iter()
            .map(|j| format!("- id: {}\n  name: {}\n  activates when: {}", j.id, j.name, j.activation_conditions))
            .collect();
        let system = Message::system(
            "You classify which caller journey, if any, applies to an utterance. \
             Respond with a JSON object: {\"matched\": bool, \"journey_id\": string|null, \
             \"confidence\": number, \"reasoning\": string}.",
        );
        let user = Message::user(format!(
            "Utterance: {utterance}\nHints: {}\nCandidate journeys:\n{}",
            serde_json::to_string(hints).unwrap_or_default(),
            listing.join("\n"),
        ));
        vec![system, user]
    }

    /// Decide whether the current state should transition. The returned
    /// state, if any, is guaranteed to be a declared transition target from
    /// `current_state` (the model's own claim is re-validated).
    pub async fn can_transition(
        &self,
        journey: &Journey,
        current_state: &str,
        utterance: &str,
        variables: &HashMap<String, serde_json::Value>,
    ) -> Option<String> {
        let transitions = journey.transitions_from(current_state);
        if transitions.is_empty() {
            return None;
        }

        let prompt = Self::transition_prompt(utterance, variables, current_state, &transitions);
        let raw = match self
            .model
            .complete(prompt, CompletionParams::structured())
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "transition model call failed");
                return None;
            }
        };

        let parsed: TransitionResponse = match serde_json::from_str(&raw) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "transition response did not parse");
                return None;
            }
        };

        if !parsed.should_transition {
            return None;
        }

        parsed
            .to_state
            .filter(|to| transitions.iter().any(|t| &t.to_state == to))
    }

    fn transition_prompt(
        utterance: &str,
        variables: &HashMap<String, serde_json::Value>,
        current_state: &str,
        transitions: &[&JourneyTransition],
    ) -> Vec<Message> {
        let listing: Vec<String> = transitions
            .iter()
            .map(|t| format!("- to '{}' when: {}", t.to_state, t.condition))
            .collect();
        let system = Message::system(
            "You decide whether a conversation should move to a new state. \
             Respond with a JSON object: {\"should_transition\": bool, \
             \"to_state\": string|null, \"reasoning\": string}.",
        );
        let user = Message::user(format!(
            "Current state: {current_state}\nUtterance: {utterance}\nVariables: {}\nPossible transitions:\n{}",
            serde_json::to_string(variables).unwrap_or_default(),
            listing.join("\n"),
        ));
        vec![system, user]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result as EngineResult;
    use async_trait::async_trait;
    use std::collections::HashMap as Map;

    struct StubModel {
        response: String,
    }

    #[async_trait]
    impl ModelClient for StubModel {
        async fn complete(
            &self,
            _messages: Vec<Message>,
            _params: CompletionParams,
        ) -> EngineResult<String> {
            Ok(self.response.clone())
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    struct FailingModel;

    #[async_trait]
    impl ModelClient for FailingModel {
        async fn complete(
            &self,
            _messages: Vec<Message>,
            _params: CompletionParams,
        ) -> EngineResult<String> {
            Err(crate::error::EngineError::Configuration("boom".into()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    fn sample_journey() -> Journey {
        let mut states = Map::new();
        states.insert(
            "start".to_string(),
            crate::journey::JourneyState {
                name: "start".to_string(),
                action: "greet".to_string(),
                tools: vec![],
                metadata: Map::new(),
            },
        );
        states.insert(
            "end".to_string(),
            crate::journey::JourneyState {
                name: "end".to_string(),
                action: "close".to_string(),
                tools: vec![],
                metadata: Map::new(),
            },
        );
        Journey::new(
            JourneyId::new(),
            "claim_inquiry",
            None,
            "caller asks about a claim",
            "start",
            states,
            vec![JourneyTransition {
                from_state: "start".to_string(),
                to_state: "end".to_string(),
                condition: "caller is satisfied".to_string(),
                priority: 0,
            }],
            true,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn activation_above_floor_returns_journey_id() {
        let journey = sample_journey();
        let response = serde_json::json!({
            "matched": true,
            "journey_id": journey.id,
            "confidence": 0.9,
            "reasoning": "matches"
        });
        let model = Arc::new(StubModel {
            response: response.to_string(),
        });
        let matcher = JourneyMatcher::new(model, CacheFacade::in_memory(), 0.6);

        let result = matcher
            .activate_journey("s1", "what's my claim status", &Map::new(), &[journey.clone()])
            .await;
        assert_eq!(result, Some(journey.id));
    }

    #[tokio::test]
    async fn activation_below_floor_returns_none() {
        let journey = sample_journey();
        let response = serde_json::json!({
            "matched": true,
            "journey_id": journey.id,
            "confidence": 0.4,
            "reasoning": "weak"
        });
        let model = Arc::new(StubModel {
            response: response.to_string(),
        });
        let matcher = JourneyMatcher::new(model, CacheFacade::in_memory(), 0.6);

        let result = matcher
            .activate_journey("s1", "hello", &Map::new(), &[journey])
            .await;
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn activation_rejects_unknown_journey_id() {
        let journey = sample_journey();
        let response = serde_json::json!({
            "matched": true,
            "journey_id": JourneyId::new(),
            "confidence": 0.95,
            "reasoning": "hallucinated"
        });
        let model = Arc::new(StubModel {
            response: response.to_string(),
        });
        let matcher = JourneyMatcher::new(model, CacheFacade::in_memory(), 0.6);

        let result = matcher
            .activate_journey("s1", "hello", &Map::new(), &[journey])
            .await;
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn activation_model_failure_returns_none() {
        let journey = sample_journey();
        let matcher = JourneyMatcher::new(Arc::new(FailingModel), CacheFacade::in_memory(), 0.6);
        let result = matcher
            .activate_journey("s1", "hello", &Map::new(), &[journey])
            .await;
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn activation_is_cached_across_calls() {
        let journey = sample_journey();
        let response = serde_json::json!({
            "matched": true,
            "journey_id": journey.id,
            "confidence": 0.9,
            "reasoning": "matches"
        });
        let model = Arc::new(StubModel {
            response: response.to_string(),
        });
        let matcher = JourneyMatcher::new(model, CacheFacade::in_memory(), 0.6);

        let first = matcher
            .activate_journey("s1", "claim status please", &Map::new(), &[journey.clone()])
            .await;
        // Second call uses an empty candidate list; a genuine cache hit
        // still returns the cached id without consulting candidates.
        let second = matcher
            .activate_journey("s1", "claim status please", &Map::new(), &[])
            .await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn transition_to_undeclared_state_is_rejected() {
        let journey = sample_journey();
        let response = serde_json::json!({
            "should_transition": true,
            "to_state": "nonexistent",
            "reasoning": "hallucinated"
        });
        let model = Arc::new(StubModel {
            response: response.to_string(),
        });
        let matcher = JourneyMatcher::new(model, CacheFacade::in_memory(), 0.6);

        let result = matcher
            .can_transition(&journey, "start", "I'm done", &Map::new())
            .await;
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn transition_to_declared_state_is_accepted() {
        let journey = sample_journey();
        let response = serde_json::json!({
            "should_transition": true,
            "to_state": "end",
            "reasoning": "caller is satisfied"
        });
        let model = Arc::new(StubModel {
            response: response.to_string(),
        });
        let matcher = JourneyMatcher::new(model, CacheFacade::in_memory(), 0.6);

        let result = matcher
            .can_transition(&journey, "start", "I'm done", &Map::new())
            .await;
        assert_eq!(result, Some("end".to_string()));
    }

    #[tokio::test]
    async fn no_transitions_from_state_short_circuits() {
        let journey = sample_journey();
        let matcher = JourneyMatcher::new(Arc::new(FailingModel), CacheFacade::in_memory(), 0.6);
        let result = matcher
            .can_transition(&journey, "end", "bye", &Map::new())
            .await;
        assert_eq!(result, None);
    }

    #[test]
    fn stable_hash_is_deterministic() {
        let a = JourneyMatcher::stable_hash("hello");
        let b = JourneyMatcher::stable_hash("hello");
        assert_eq!(a, b);
        let c = JourneyMatcher::stable_hash("world");
        assert_ne!(a, c);
    }
}
