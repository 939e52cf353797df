//! Journey data model: the state-machine definitions and their runtime
//! instances.
//!
//! Construction goes through fallible constructors so a journey's
//! invariants can never be bypassed — a `Journey` or `JourneyState` that
//! exists at all is already valid.

pub mod engine;
pub mod loader;
pub mod matcher;
pub mod store;

pub use engine::{JourneyEngine, TurnMeta};
pub use loader::JourneyLoader;
pub use matcher::JourneyMatcher;
pub use store::JourneyStore;

use crate::types::{ContextId, JourneyId, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single named state within a journey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JourneyState {
    /// State name; must equal the key it's stored under in `Journey::states`.
    pub name: String,
    /// Prose description of what the agent should do in this state.
    pub action: String,
    /// Tool names permitted while in this state. Not cross-checked against
    /// the tool registry at load time — an unknown name here is not a load
    /// error, only a possible warning when first encountered.
    #[serde(default)]
    pub tools: Vec<String>,
    /// Opaque, loader-passthrough metadata.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl JourneyState {
    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("state name must not be empty".to_string());
        }
        if self.action.trim().is_empty() {
            return Err("state action must not be empty".to_string());
        }
        Ok(())
    }
}

/// A possible move from one state to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JourneyTransition {
    /// Source state name.
    pub from_state: String,
    /// Destination state name.
    pub to_state: String,
    /// Prose condition under which the transition should fire.
    pub condition: String,
    /// Higher fires first among transitions sharing a `from_state`.
    #[serde(default)]
    pub priority: i32,
}

impl JourneyTransition {
    fn validate(&self) -> Result<(), String> {
        if self.from_state.trim().is_empty() || self.to_state.trim().is_empty() {
            return Err("transition from_state/to_state must not be empty".to_string());
        }
        if self.condition.trim().is_empty() {
            return Err("transition condition must not be empty".to_string());
        }
        Ok(())
    }
}

/// A journey definition: a named, directed state machine describing one
/// kind of caller interaction. Immutable once loaded; redeploy replaces it
/// wholesale, nothing mutates it at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Journey {
    /// Unique identifier.
    pub id: JourneyId,
    /// Unique, human-readable name.
    pub name: String,
    /// Optional longer description.
    #[serde(default)]
    pub description: Option<String>,
    /// Prose description of when this journey should activate.
    pub activation_conditions: String,
    /// Name of the state a new context starts in.
    pub initial_state: String,
    /// All declared states, keyed by name.
    pub states: HashMap<String, JourneyState>,
    /// All declared transitions, in file order.
    pub transitions: Vec<JourneyTransition>,
    /// Whether this journey may currently activate. Disabled journeys are
    /// excluded from enumeration and matching but keep their id so
    /// in-flight contexts referencing them stay resolvable.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_enabled() -> bool {
    true
}

impl Journey {
    /// Construct a journey, enforcing every structural invariant.
    /// No cycle detection is performed — a journey legitimately returning
    /// to an earlier state (e.g. "anything unclear" looping back to
    /// "clarify") is normal, not an error.
    pub fn new(
        id: JourneyId,
        name: impl Into<String>,
        description: Option<String>,
        activation_conditions: impl Into<String>,
        initial_state: impl Into<String>,
        states: HashMap<String, JourneyState>,
        transitions: Vec<JourneyTransition>,
        enabled: bool,
    ) -> Result<Self, String> {
        let name = name.into();
        let activation_conditions = activation_conditions.into();
        let initial_state = initial_state.into();

        if name.trim().is_empty() {
            return Err("journey name must not be empty".to_string());
        }
        if activation_conditions.trim().is_empty() {
            return Err("journey activation_conditions must not be empty".to_string());
        }
        if states.is_empty() {
            return Err("journey must declare at least one state".to_string());
        }
        for (key, state) in &states {
            state.validate()?;
            if key != &state.name {
                return Err(format!(
                    "state map key `{key}` does not match state name `{}`",
                    state.name
                ));
            }
        }
        if !states.contains_key(&initial_state) {
            return Err(format!(
                "initial_state `{initial_state}` is not a declared state"
            ));
        }
        for t in &transitions {
            t.validate()?;
            if !states.contains_key(&t.from_state) {
                return Err(format!(
                    "transition references unknown from_state `{}`",
                    t.from_state
                ));
            }
            if !states.contains_key(&t.to_state) {
                return Err(format!(
                    "transition references unknown to_state `{}`",
                    t.to_state
                ));
            }
        }

        let now = Utc::now();
        Ok(Self {
            id,
            name,
            description,
            activation_conditions,
            initial_state,
            states,
            transitions,
            enabled,
            created_at: now,
            updated_at: now,
        })
    }

    /// Look up a state by name.
    pub fn get_state(&self, name: &str) -> Option<&JourneyState> {
        self.states.get(name)
    }

    /// All transitions leaving `state`, ordered highest-priority-first,
    /// ties broken by declaration order (stable sort preserves it).
    pub fn transitions_from(&self, state: &str) -> Vec<&JourneyTransition> {
        let mut out: Vec<&JourneyTransition> = self
            .transitions
            .iter()
            .filter(|t| t.from_state == state)
            .collect();
        out.sort_by(|a, b| b.priority.cmp(&a.priority));
        out
    }
}

/// One entry in a context's append-only history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    /// Event kind, e.g. `"journey_activated"`, `"state_transition"`,
    /// `"journey_completed"`.
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A running instance of a journey, owned exclusively by one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JourneyContext {
    pub id: ContextId,
    pub session_id: SessionId,
    pub journey_id: JourneyId,
    /// Cached at activation time so readers don't need a journey lookup
    /// just to log or render the journey's name.
    pub journey_name: String,
    pub current_state: String,
    #[serde(default)]
    pub variables: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub state_history: Vec<HistoryEvent>,
    pub activated_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JourneyContext {
    /// Start a new context at a journey's initial state.
    pub fn activate(session_id: SessionId, journey: &Journey) -> Self {
        let now = Utc::now();
        let mut ctx = Self {
            id: ContextId::new(),
            session_id,
            journey_id: journey.id,
            journey_name: journey.name.clone(),
            current_state: journey.initial_state.clone(),
            variables: HashMap::new(),
            state_history: Vec::new(),
            activated_at: now,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        ctx.state_history.push(HistoryEvent {
            event: "journey_activated".to_string(),
            from: None,
            to: Some(journey.initial_state.clone()),
            reason: None,
            timestamp: now,
        });
        ctx
    }

    /// Whether this context is still running.
    pub fn is_active(&self) -> bool {
        self.completed_at.is_none()
    }

    /// Move to a new state, recording the transition in history.
    pub fn transition_to(&mut self, new_state: impl Into<String>, reason: Option<String>) {
        let new_state = new_state.into();
        let now = Utc::now();
        self.state_history.push(HistoryEvent {
            event: "state_transition".to_string(),
            from: Some(self.current_state.clone()),
            to: Some(new_state.clone()),
            reason,
            timestamp: now,
        });
        self.current_state = new_state;
        self.updated_at = now;
    }

    /// Mark this context complete. Idempotent: calling it again on an
    /// already-completed context is a no-op (the caller is expected to log
    /// a warning).
    pub fn complete(&mut self) {
        if self.completed_at.is_some() {
            return;
        }
        let now = Utc::now();
        self.completed_at = Some(now);
        self.updated_at = now;
        self.state_history.push(HistoryEvent {
            event: "journey_completed".to_string(),
            from: Some(self.current_state.clone()),
            to: None,
            reason: None,
            timestamp: now,
        });
    }

    /// Set a free-form variable, bumping `updated_at`.
    pub fn set_variable(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.variables.insert(key.into(), value);
        self.updated_at = Utc::now();
    }

    pub fn get_variable(&self, key: &str) -> Option<&serde_json::Value> {
        self.variables.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_states() -> HashMap<String, JourneyState> {
        let mut states = HashMap::new();
        states.insert(
            "greet".to_string(),
            JourneyState {
                name: "greet".to_string(),
                action: "Greet the caller".to_string(),
                tools: vec![],
                metadata: HashMap::new(),
            },
        );
        states.insert(
            "done".to_string(),
            JourneyState {
                name: "done".to_string(),
                action: "Wrap up".to_string(),
                tools: vec![],
                metadata: HashMap::new(),
            },
        );
        states
    }

    #[test]
    fn journey_rejects_unknown_initial_state() {
        let result = Journey::new(
            JourneyId::new(),
            "test",
            None,
            "caller wants help",
            "missing",
            sample_states(),
            vec![],
            true,
        );
        assert!(result.is_err());
    }

    #[test]
    fn journey_rejects_mismatched_state_key() {
        let mut states = sample_states();
        let wrong = states.remove("greet").unwrap();
        states.insert("not-greet".to_string(), wrong);
        let result = Journey::new(
            JourneyId::new(),
            "test",
            None,
            "caller wants help",
            "not-greet",
            states,
            vec![],
            true,
        );
        assert!(result.is_err());
    }

    #[test]
    fn journey_rejects_transition_to_unknown_state() {
        let result = Journey::new(
            JourneyId::new(),
            "test",
            None,
            "caller wants help",
            "greet",
            sample_states(),
            vec![JourneyTransition {
                from_state: "greet".to_string(),
                to_state: "nowhere".to_string(),
                condition: "always".to_string(),
                priority: 0,
            }],
            true,
        );
        assert!(result.is_err());
    }

    #[test]
    fn transitions_from_orders_by_priority_desc() {
        let journey = Journey::new(
            JourneyId::new(),
            "test",
            None,
            "caller wants help",
            "greet",
            sample_states(),
            vec![
                JourneyTransition {
                    from_state: "greet".to_string(),
                    to_state: "done".to_string(),
                    condition: "low".to_string(),
                    priority: 1,
                },
                JourneyTransition {
                    from_state: "greet".to_string(),
                    to_state: "done".to_string(),
                    condition: "high".to_string(),
                    priority: 10,
                },
            ],
            true,
        )
        .unwrap();

        let ordered = journey.transitions_from("greet");
        assert_eq!(ordered[0].condition, "high");
        assert_eq!(ordered[1].condition, "low");
    }

    #[test]
    fn journey_allows_cyclic_transitions() {
        let result = Journey::new(
            JourneyId::new(),
            "test",
            None,
            "caller wants help",
            "greet",
            sample_states(),
            vec![
                JourneyTransition {
                    from_state: "greet".to_string(),
                    to_state: "done".to_string(),
                    condition: "ready".to_string(),
                    priority: 0,
                },
                JourneyTransition {
                    from_state: "done".to_string(),
                    to_state: "greet".to_string(),
                    condition: "restart".to_string(),
                    priority: 0,
                },
            ],
            true,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn context_activate_records_single_history_event() {
        let journey = Journey::new(
            JourneyId::new(),
            "test",
            None,
            "caller wants help",
            "greet",
            sample_states(),
            vec![],
            true,
        )
        .unwrap();

        let ctx = JourneyContext::activate(SessionId::new("s1"), &journey);
        assert!(ctx.is_active());
        assert_eq!(ctx.current_state, "greet");
        assert_eq!(ctx.state_history.len(), 1);
        assert_eq!(ctx.state_history[0].event, "journey_activated");
    }

    #[test]
    fn context_complete_is_idempotent() {
        let journey = Journey::new(
            JourneyId::new(),
            "test",
            None,
            "caller wants help",
            "greet",
            sample_states(),
            vec![],
            true,
        )
        .unwrap();
        let mut ctx = JourneyContext::activate(SessionId::new("s1"), &journey);
        ctx.complete();
        let completed_at = ctx.completed_at;
        ctx.complete();
        assert_eq!(ctx.completed_at, completed_at);
        assert_eq!(
            ctx.state_history
                .iter()
                .filter(|e| e.event == "journey_completed")
                .count(),
            1
        );
    }
}
