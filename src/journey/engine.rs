//! Per-turn journey orchestration.
//!
//! `process_message` is the sole read path a turn coordinator calls into;
//! `execute_transition`, `complete_journey`, and `set_context_variable` are
//! the only mutation entry points on a context, each persisting
//! immediately.

use crate::error::{JourneyError, StorageResult};
use crate::journey::matcher::JourneyMatcher;
use crate::journey::store::JourneyStore;
use crate::journey::{Journey, JourneyContext, JourneyState};
use crate::types::{ContextId, SessionId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Per-turn bookkeeping returned alongside a context/state, distinct from
/// the context's own persisted history.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnMeta {
    pub is_new_journey: bool,
    pub journey_activated: bool,
    pub transition_occurred: bool,
}

/// Outcome of `process_message`: the (possibly newly created or advanced)
/// context and the state the caller should now build guidance from.
pub struct ProcessOutcome {
    pub context: Option<JourneyContext>,
    pub state: Option<JourneyState>,
    pub meta: TurnMeta,
}

/// Orchestrates activation, transition, and guidance for one conversational
/// turn.
pub struct JourneyEngine {
    store: Arc<JourneyStore>,
    matcher: Arc<JourneyMatcher>,
}

impl JourneyEngine {
    pub fn new(store: Arc<JourneyStore>, matcher: Arc<JourneyMatcher>) -> Self {
        Self { store, matcher }
    }

    /// Resolve (or activate) the context for this turn, apply any
    /// transition the utterance warrants, and return the updated context
    /// and current state.
    pub async fn process_message(
        &self,
        session_id: &SessionId,
        utterance: &str,
        hints: &HashMap<String, serde_json::Value>,
    ) -> Result<ProcessOutcome, crate::error::EngineError> {
        let mut meta = TurnMeta::default();

        let mut context = self.store.get_active_context(session_id).await?;

        if context.is_none() {
            let candidates = self.store.get_all_journeys().await?;
            if let Some(journey_id) = self
                .matcher
                .activate_journey(session_id.as_str(), utterance, hints, &candidates)
                .await
            {
                if let Some(journey) = self.store.get_journey(journey_id).await? {
                    let created = self
                        .store
                        .create_context(session_id.clone(), &journey)
                        .await?;
                    info!(session_id = %session_id, journey = %journey.name, "journey activated");
                    meta.is_new_journey = true;
                    meta.journey_activated = true;
                    context = Some(created);
                }
            }
        }

        let Some(mut ctx) = context else {
            return Ok(ProcessOutcome {
                context: None,
                state: None,
                meta,
            });
        };

        let Some(journey) = self.store.get_journey(ctx.journey_id).await? else {
            warn!(journey_id = %ctx.journey_id, "context references a journey that no longer exists");
            return Ok(ProcessOutcome {
                context: Some(ctx),
                state: None,
                meta,
            });
        };

        let Some(current_state) = journey.get_state(&ctx.current_state).cloned() else {
            warn!(state = %ctx.current_state, journey = %journey.name, "context references an unknown state");
            return Ok(ProcessOutcome {
                context: Some(ctx),
                state: None,
                meta,
            });
        };

        if let Some(to_state) = self
            .matcher
            .can_transition(&journey, &ctx.current_state, utterance, &ctx.variables)
            .await
        {
            self.apply_transition(&mut ctx, &to_state, None).await?;
            meta.transition_occurred = true;
        }

        let state = journey.get_state(&ctx.current_state).cloned().or(Some(current_state));

        Ok(ProcessOutcome {
            context: Some(ctx),
            state,
            meta,
        })
    }

    async fn apply_transition(
        &self,
        context: &mut JourneyContext,
        to_state: &str,
        reason: Option<String>,
    ) -> StorageResult<()> {
        context.transition_to(to_state, reason);
        self.store.update_context(context).await
    }

    /// Explicitly move a context to a new state outside the normal
    /// `process_message` flow (e.g. driven by a tool result).
    pub async fn execute_transition(
        &self,
        context_id: ContextId,
        to_state: &str,
        reason: Option<String>,
    ) -> Result<JourneyContext, crate::error::EngineError> {
        let mut ctx = self
            .store
            .get_context(context_id)
            .await?
            .ok_or(JourneyError::ContextNotActive(context_id))?;
        self.apply_transition(&mut ctx, to_state, reason).await?;
        Ok(ctx)
    }

    /// Mark a context complete. A no-op (with a warning) if already
    /// completed.
    pub async fn complete_journey(
        &self,
        context_id: ContextId,
    ) -> Result<JourneyContext, crate::error::EngineError> {
        let mut ctx = self
            .store
            .get_context(context_id)
            .await?
            .ok_or(JourneyError::ContextNotActive(context_id))?;
        if !ctx.is_active() {
            warn!(context_id = %context_id, "completing an already-completed journey is a no-op");
            return Ok(ctx);
        }
        ctx.complete();
        self.store.update_context(&ctx).await?;
        Ok(ctx)
    }

    /// Set a context variable, persisting immediately.
    pub async fn set_context_variable(
        &self,
        context_id: ContextId,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Result<JourneyContext, crate::error::EngineError> {
        let mut ctx = self
            .store
            .get_context(context_id)
            .await?
            .ok_or(JourneyError::ContextNotActive(context_id))?;
        ctx.set_variable(key, value);
        self.store.update_context(&ctx).await?;
        Ok(ctx)
    }

    /// Build the prompt fragment describing a journey/state pair: name,
    /// description, state action, tools, and possible transitions.
    pub fn get_journey_guidance(journey: &Journey, state: &JourneyState) -> String {
        let mut fragment = format!("Journey: {}", journey.name);
        if let Some(description) = &journey.description {
            fragment.push_str(&format!("\nDescription: {description}"));
        }
        fragment.push_str(&format!("\nCurrent state: {}\nAction: {}", state.name, state.action));
        if !state.tools.is_empty() {
            fragment.push_str(&format!("\nAvailable tools: {}", state.tools.join(", ")));
        }
        let transitions = journey.transitions_from(&state.name);
        if !transitions.is_empty() {
            fragment.push_str("\nPossible transitions:");
            for t in transitions {
                fragment.push_str(&format!("\n- to '{}' when: {}", t.to_state, t.condition));
            }
        }
        fragment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheFacade;
    use crate::error::Result as EngineResult;
    use crate::journey::JourneyTransition;
    use crate::model::{CompletionParams, Message, ModelClient};
    use crate::storage::memory::InMemoryDurableStore;
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

    fn sample_journey() -> Journey {
        let mut states = Map::new();
        states.insert(
            "greet".to_string(),
            JourneyState {
                name: "greet".to_string(),
                action: "Greet the caller".to_string(),
                tools: vec![],
                metadata: Map::new(),
            },
        );
        states.insert(
            "done".to_string(),
            JourneyState {
                name: "done".to_string(),
                action: "Wrap up".to_string(),
                tools: vec![],
                metadata: Map::new(),
            },
        );
        Journey::new(
            crate::types::JourneyId::new(),
            "claim_inquiry",
            Some("Handles claim status questions".to_string()),
            "caller asks about a claim",
            "greet",
            states,
            vec![JourneyTransition {
                from_state: "greet".to_string(),
                to_state: "done".to_string(),
                condition: "caller is satisfied".to_string(),
                priority: 0,
            }],
            true,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn process_message_activates_a_new_journey() {
        let durable = Arc::new(InMemoryDurableStore::new());
        let journey = sample_journey();
        durable.put_journey(&journey).await.unwrap();
        let store = Arc::new(JourneyStore::new(durable, CacheFacade::in_memory()));

        let activation = serde_json::json!({
            "matched": true,
            "journey_id": journey.id,
            "confidence": 0.9,
            "reasoning": "matches"
        });
        let model = Arc::new(StubModel {
            response: activation.to_string(),
        });
        let matcher = Arc::new(JourneyMatcher::new(model, CacheFacade::in_memory(), 0.6));
        let engine = JourneyEngine::new(store, matcher);

        let session_id = SessionId::new("call-1");
        let outcome = engine
            .process_message(&session_id, "what's my claim status", &Map::new())
            .await
            .unwrap();

        assert!(outcome.meta.is_new_journey);
        assert!(outcome.meta.journey_activated);
        assert_eq!(outcome.context.unwrap().current_state, "greet");
    }

    #[tokio::test]
    async fn process_message_with_no_active_context_and_no_match_returns_none() {
        let durable = Arc::new(InMemoryDurableStore::new());
        let store = Arc::new(JourneyStore::new(durable, CacheFacade::in_memory()));
        let model = Arc::new(StubModel {
            response: serde_json::json!({"matched": false, "confidence": 0.0, "reasoning": "no match"}).to_string(),
        });
        let matcher = Arc::new(JourneyMatcher::new(model, CacheFacade::in_memory(), 0.6));
        let engine = JourneyEngine::new(store, matcher);

        let session_id = SessionId::new("call-2");
        let outcome = engine
            .process_message(&session_id, "just saying hi", &Map::new())
            .await
            .unwrap();
        assert!(outcome.context.is_none());
        assert!(outcome.state.is_none());
    }

    #[tokio::test]
    async fn complete_journey_is_idempotent_with_warning() {
        let durable = Arc::new(InMemoryDurableStore::new());
        let journey = sample_journey();
        durable.put_journey(&journey).await.unwrap();
        let store = Arc::new(JourneyStore::new(durable, CacheFacade::in_memory()));
        let model = Arc::new(StubModel { response: "{}".into() });
        let matcher = Arc::new(JourneyMatcher::new(model, CacheFacade::in_memory(), 0.6));
        let engine = JourneyEngine::new(store.clone(), matcher);

        let ctx = store
            .create_context(SessionId::new("call-3"), &journey)
            .await
            .unwrap();

        let completed_once = engine.complete_journey(ctx.id).await.unwrap();
        assert!(completed_once.completed_at.is_some());
        let completed_twice = engine.complete_journey(ctx.id).await.unwrap();
        assert_eq!(completed_once.completed_at, completed_twice.completed_at);
    }

    #[test]
    fn guidance_fragment_includes_transitions() {
        let journey = sample_journey();
        let state = journey.get_state("greet").unwrap();
        let fragment = JourneyEngine::get_journey_guidance(&journey, state);
        assert!(fragment.contains("claim_inquiry"));
        assert!(fragment.contains("to 'done' when: caller is satisfied"));
    }
}
