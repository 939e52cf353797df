//! Two-stage guideline retrieval: keyword pre-filter, then batch relevance
//! scoring via a single structured model call.
//!
//! Stage 1 never touches the model, only the in-memory inverted index and
//! a scope filter, keeping it fast enough to run on every turn.

use crate::guideline::store::GuidelineStore;
use crate::guideline::{Guideline, GuidelineMatch};
use crate::model::{CompletionParams, Message, ModelClient};
use crate::types::{GuidelineId, JourneyId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "that", "this", "with", "you", "your", "have", "has", "are", "was",
    "were", "can", "could", "would", "should", "about", "what", "when", "where", "how",
];
const STAGE1_FALLBACK_LIMIT: usize = 20;

fn tokenize(utterance: &str) -> Vec<String> {
    utterance
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .filter(|t| t.len() >= 3)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

#[derive(Debug, Serialize)]
struct CandidatePayload<'a> {
    id: GuidelineId,
    name: &'a str,
    description: Option<&'a str>,
    condition: &'a str,
    action: &'a str,
    scope: String,
}

#[derive(Debug, Deserialize)]
struct Verdict {
    guideline_id: GuidelineId,
    applies: bool,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    reasoning: String,
}

#[derive(Debug, Deserialize)]
struct VerdictResponse {
    verdicts: Vec<Verdict>,
}

/// Resolves which guidelines apply to an utterance in a given journey/state
/// context.
pub struct GuidelineMatcher {
    store: Arc<GuidelineStore>,
    model: Arc<dyn ModelClient>,
    confidence_floor: f32,
}

impl GuidelineMatcher {
    /// Construct a matcher. `confidence_floor` is `EngineTuning::guideline_confidence_floor`.
    pub fn new(store: Arc<GuidelineStore>, model: Arc<dyn ModelClient>, confidence_floor: f32) -> Self {
        Self {
            store,
            model,
            confidence_floor,
        }
    }

    /// Run the full two-stage pipeline for one turn.
    pub async fn match_guidelines(
        &self,
        utterance: &str,
        variables: &serde_json::Value,
        journey_id: Option<JourneyId>,
        state_name: Option<&str>,
    ) -> Vec<GuidelineMatch> {
        let scoped = match self.store.get_guidelines_by_scope(journey_id, state_name).await {
            Ok(g) => g,
            Err(e) => {
                warn!(error = %e, "failed to load scope-eligible guidelines");
                return Vec::new();
            }
        };
        if scoped.is_empty() {
            return Vec::new();
        }

        let candidates = self.keyword_intersected(utterance, &scoped).await;
        if candidates.is_empty() {
            return Vec::new();
        }

        self.stage2_relevance(utterance, variables, &candidates)
            .await
    }

    /// Stage 1: keyword pre-filter intersected with the scope-eligible set,
    /// falling back to the first 20 scope-eligible guidelines (already
    /// priority-ordered) when no keyword hits.
    async fn keyword_intersected<'a>(
        &self,
        utterance: &str,
        scoped: &'a [Guideline],
    ) -> Vec<&'a Guideline> {
        let tokens = tokenize(utterance);
        if tokens.is_empty() {
            return scoped.iter().take(STAGE1_FALLBACK_LIMIT).collect();
        }
        let candidate_ids: HashSet<GuidelineId> = self.store.get_candidates_by_keywords(&tokens).await;
        let intersected: Vec<&Guideline> = scoped
            .iter()
            .filter(|g| candidate_ids.contains(&g.id))
            .collect();
        if intersected.is_empty() {
            scoped.iter().take(STAGE1_FALLBACK_LIMIT).collect()
        } else {
            intersected
        }
    }

    async fn stage2_relevance(
        &self,
        utterance: &str,
        variables: &serde_json::Value,
        candidates: &[&Guideline],
    ) -> Vec<GuidelineMatch> {
        let payload: Vec<CandidatePayload> = candidates
            .iter()
            .map(|g| CandidatePayload {
                id: g.id,
                name: &g.name,
                description: g.description.as_deref(),
                condition: &g.condition,
                action: &g.action,
                scope: g.scope.to_string(),
            })
            .collect();

        let system = Message::system(
            "You judge which behavioral guidelines apply to the caller's utterance. \
             Respond with a JSON object: {\"verdicts\": [{\"guideline_id\": string, \
             \"applies\": bool, \"confidence\": number, \"reasoning\": string}]}.",
        );
        let user = Message::user(format!(
            "Utterance: {utterance}\nVariables: {variables}\nCandidate guidelines:\n{}",
            serde_json::to_string(&payload).unwrap_or_default(),
        ));

        let raw = match self
            .model
            .complete(vec![system, user], CompletionParams::structured())
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "guideline relevance model call failed");
                return Vec::new();
            }
        };

        let parsed: VerdictResponse = match serde_json::from_str(&raw) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "guideline relevance response did not parse");
                return Vec::new();
            }
        };

        let mut matches: Vec<GuidelineMatch> = Vec::new();
        for verdict in parsed.verdicts {
            if !verdict.applies || verdict.confidence < self.confidence_floor {
                continue;
            }
            let Some(guideline) = candidates
                .iter()
                .find(|g| g.id == verdict.guideline_id)
                .map(|g| (*g).clone())
            else {
                continue;
            };
            match GuidelineMatch::new(guideline, verdict.confidence, verdict.reasoning) {
                Ok(m) => matches.push(m),
                Err(e) => warn!(error = %e, "dropping malformed guideline match"),
            }
        }

        matches.sort_by(|a, b| {
            let score_a = a
                .guideline
                .priority_score(a.guideline.journey_id, a.guideline.state_name.as_deref());
            let score_b = b
                .guideline
                .priority_score(b.guideline.journey_id, b.guideline.state_name.as_deref());
            score_b
                .cmp(&score_a)
                .then_with(|| a.guideline.name.cmp(&b.guideline.name))
        });
        matches
    }
}
