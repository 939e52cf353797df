//! Guideline data model: scoped behavioral rules plus their priority
//! resolution.
//!
//! Scope resolution and priority ordering are the core invariants here.

pub mod loader;
pub mod matcher;
pub mod store;
pub mod validator;

pub use loader::GuidelineLoader;
pub use matcher::GuidelineMatcher;
pub use store::GuidelineStore;
pub use validator::{ResponseValidator, ValidationAuditRecord, ValidationResult};

use crate::error::GuidelineError;
use crate::types::{GuidelineId, GuidelineScope, JourneyId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A scoped behavioral rule: "when `condition` holds, `action`."
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guideline {
    pub id: GuidelineId,
    pub scope: GuidelineScope,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub condition: String,
    pub action: String,
    /// Case-insensitive keywords used by the stage-1 pre-filter. Stored
    /// lowercase so the store's inverted index never has to re-lowercase on
    /// lookup.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Informational list of tool names this guideline's action may invoke.
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Required for JOURNEY and STATE scope, forbidden for GLOBAL.
    #[serde(default)]
    pub journey_id: Option<JourneyId>,
    /// Required for STATE scope only.
    #[serde(default)]
    pub state_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_enabled() -> bool {
    true
}

impl Guideline {
    /// Whether this guideline's scope matches a caller's active
    /// journey/state context. GLOBAL always matches; JOURNEY matches when
    /// `journey_id` agrees; STATE matches only when both `journey_id` and
    /// `state_name` agree.
    pub fn matches_scope(&self, journey_id: Option<JourneyId>, state_name: Option<&str>) -> bool {
        match self.scope {
            GuidelineScope::Global => true,
            GuidelineScope::Journey => {
                self.journey_id.is_some() && self.journey_id == journey_id
            }
            GuidelineScope::State => {
                self.journey_id.is_some()
                    && self.journey_id == journey_id
                    && self.state_name.as_deref() == state_name
            }
        }
    }

    /// Effective priority score for a given journey/state context:
    /// scope-base + declared priority, or 0 if the scope doesn't match.
    /// This is the sole source of truth for ordering matches.
    pub fn priority_score(&self, journey_id: Option<JourneyId>, state_name: Option<&str>) -> i64 {
        if !self.matches_scope(journey_id, state_name) {
            return 0;
        }
        self.scope.base_score() + self.priority as i64
    }
}

/// Builder enforcing the scope invariants: JOURNEY scope requires a
/// journey id, STATE scope requires both a journey id and a state name,
/// GLOBAL scope forbids both.
pub struct GuidelineBuilder {
    id: GuidelineId,
    scope: GuidelineScope,
    name: String,
    description: Option<String>,
    condition: Option<String>,
    action: Option<String>,
    keywords: Vec<String>,
    tools: Vec<String>,
    priority: i32,
    enabled: bool,
    journey_id: Option<JourneyId>,
    state_name: Option<String>,
}

impl GuidelineBuilder {
    /// Start building a guideline with the given name and scope.
    pub fn new(name: impl Into<String>, scope: GuidelineScope) -> Self {
        Self {
            id: GuidelineId::new(),
            scope,
            name: name.into(),
            description: None,
            condition: None,
            action: None,
            keywords: Vec::new(),
            tools: Vec::new(),
            priority: 0,
            enabled: true,
            journey_id: None,
            state_name: None,
        }
    }

    pub fn id(mut self, id: GuidelineId) -> Self {
        self.id = id;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords.into_iter().map(|k| k.to_lowercase()).collect();
        self
    }

    pub fn tools(mut self, tools: Vec<String>) -> Self {
        self.tools = tools;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn journey_id(mut self, journey_id: JourneyId) -> Self {
        self.journey_id = Some(journey_id);
        self
    }

    pub fn state_name(mut self, state_name: impl Into<String>) -> Self {
        self.state_name = Some(state_name.into());
        self
    }

    /// Finalize, enforcing the scope/field invariants.
    pub fn build(self) -> Result<Guideline, String> {
        if self.name.trim().is_empty() {
            return Err("guideline name must not be empty".to_string());
        }
        let condition = self
            .condition
            .ok_or_else(|| "guideline condition is required".to_string())?;
        let action = self
            .action
            .ok_or_else(|| "guideline action is required".to_string())?;
        if condition.trim().is_empty() {
            return Err("guideline condition must not be empty".to_string());
        }
        if action.trim().is_empty() {
            return Err("guideline action must not be empty".to_string());
        }

        match self.scope {
            GuidelineScope::Global => {
                if self.journey_id.is_some() || self.state_name.is_some() {
                    return Err("GLOBAL scope must not carry journey_id or state_name".to_string());
                }
            }
            GuidelineScope::Journey => {
                if self.journey_id.is_none() {
                    return Err("JOURNEY scope requires journey_id".to_string());
                }
            }
            GuidelineScope::State => {
                if self.journey_id.is_none() || self.state_name.is_none() {
                    return Err(
                        "STATE scope requires both journey_id and state_name".to_string()
                    );
                }
            }
        }

        let now = Utc::now();
        Ok(Guideline {
            id: self.id,
            scope: self.scope,
            name: self.name,
            description: self.description,
            condition,
            action,
            keywords: self.keywords,
            tools: self.tools,
            priority: self.priority,
            enabled: self.enabled,
            journey_id: self.journey_id,
            state_name: self.state_name,
            created_at: now,
            updated_at: now,
        })
    }
}

/// A guideline judged applicable to the current turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuidelineMatch {
    pub guideline: Guideline,
    /// In `[0, 1]`. Callers discard anything below 0.6.
    pub confidence: f32,
    #[serde(default)]
    pub reasoning: String,
}

impl GuidelineMatch {
    /// Construct a match, rejecting an out-of-range confidence.
    pub fn new(
        guideline: Guideline,
        confidence: f32,
        reasoning: impl Into<String>,
    ) -> Result<Self, GuidelineError> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(GuidelineError::InvalidConfidence(confidence));
        }
        Ok(Self {
            guideline,
            confidence,
            reasoning: reasoning.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_scope_matches_any_context() {
        let g = GuidelineBuilder::new("g", GuidelineScope::Global)
            .condition("x")
            .action("y")
            .build()
            .unwrap();
        assert!(g.matches_scope(Some(JourneyId::new()), Some("any")));
        assert!(g.matches_scope(None, None));
    }

    #[test]
    fn journey_scope_requires_matching_journey_id() {
        let jid = JourneyId::new();
        let g = GuidelineBuilder::new("g", GuidelineScope::Journey)
            .condition("x")
            .action("y")
            .journey_id(jid)
            .build()
            .unwrap();
        assert!(g.matches_scope(Some(jid), Some("any")));
        assert!(!g.matches_scope(Some(JourneyId::new()), Some("any")));
        assert!(!g.matches_scope(None, None));
    }

    #[test]
    fn state_scope_requires_journey_and_state_match() {
        let jid = JourneyId::new();
        let g = GuidelineBuilder::new("g", GuidelineScope::State)
            .condition("x")
            .action("y")
            .journey_id(jid)
            .state_name("verify")
            .build()
            .unwrap();
        assert!(g.matches_scope(Some(jid), Some("verify")));
        assert!(!g.matches_scope(Some(jid), Some("other")));
    }

    #[test]
    fn builder_rejects_journey_scope_without_journey_id() {
        let result = GuidelineBuilder::new("g", GuidelineScope::Journey)
            .condition("x")
            .action("y")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn builder_rejects_global_scope_with_journey_id() {
        let result = GuidelineBuilder::new("g", GuidelineScope::Global)
            .condition("x")
            .action("y")
            .journey_id(JourneyId::new())
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn priority_score_ordering_at_equal_priority() {
        let jid = JourneyId::new();
        let global = GuidelineBuilder::new("g", GuidelineScope::Global)
            .condition("x")
            .action("y")
            .priority(5)
            .build()
            .unwrap();
        let journey = GuidelineBuilder::new("j", GuidelineScope::Journey)
            .condition("x")
            .action("y")
            .journey_id(jid)
            .priority(5)
            .build()
            .unwrap();
        let state = GuidelineBuilder::new("s", GuidelineScope::State)
            .condition("x")
            .action("y")
            .journey_id(jid)
            .state_name("verify")
            .priority(5)
            .build()
            .unwrap();

        let global_score = global.priority_score(Some(jid), Some("verify"));
        let journey_score = journey.priority_score(Some(jid), Some("verify"));
        let state_score = state.priority_score(Some(jid), Some("verify"));

        assert!(state_score > journey_score);
        assert!(journey_score > global_score);
    }

    #[test]
    fn non_matching_scope_scores_zero() {
        let g = GuidelineBuilder::new("g", GuidelineScope::Journey)
            .condition("x")
            .action("y")
            .journey_id(JourneyId::new())
            .priority(100)
            .build()
            .unwrap();
        assert_eq!(g.priority_score(Some(JourneyId::new()), None), 0);
    }

    #[test]
    fn keywords_are_lowercased_on_build() {
        let g = GuidelineBuilder::new("g", GuidelineScope::Global)
            .condition("x")
            .action("y")
            .keywords(vec!["Refund".to_string(), "PAYMENT".to_string()])
            .build()
            .unwrap();
        assert_eq!(g.keywords, vec!["refund", "payment"]);
    }
}
