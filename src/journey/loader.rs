//! YAML ingestion for journey definitions.
//!
//! Schema validation and parsing are reshaped into a single fallible parse
//! through `serde_yaml` plus the invariant checks `Journey::new` already
//! enforces.

use super::{Journey, JourneyState, JourneyTransition};
use crate::error::ValidationError;
use crate::types::JourneyId;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct RawState {
    name: String,
    action: String,
    #[serde(default)]
    tools: Vec<String>,
    #[serde(default)]
    metadata: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawTransition {
    from_state: String,
    to_state: String,
    condition: String,
    #[serde(default)]
    priority: i32,
}

#[derive(Debug, Deserialize)]
struct RawJourney {
    name: String,
    #[serde(default)]
    description: Option<String>,
    activation_conditions: String,
    initial_state: String,
    states: HashMap<String, RawState>,
    transitions: Vec<RawTransition>,
    #[serde(default = "super::default_enabled")]
    enabled: bool,
}

/// Loads and validates journey YAML files.
pub struct JourneyLoader;

impl JourneyLoader {
    /// Parse a single YAML document's bytes into a validated `Journey`.
    /// `file` is used only to name the source in validation errors.
    pub fn parse(
        file: &str,
        yaml: &str,
        journey_id: Option<JourneyId>,
    ) -> Result<Journey, ValidationError> {
        let raw: RawJourney = serde_yaml::from_str(yaml).map_err(|e| {
            ValidationError::new(file, None, "<document>", format!("invalid YAML: {e}"))
        })?;

        let mut states = HashMap::with_capacity(raw.states.len());
        for (key, raw_state) in raw.states {
            if key != raw_state.name {
                return Err(ValidationError::new(
                    file,
                    Some(format!("states.{key}")),
                    "name",
                    format!(
                        "state map key `{key}` does not match declared name `{}`",
                        raw_state.name
                    ),
                ));
            }
            states.insert(
                key,
                JourneyState {
                    name: raw_state.name,
                    action: raw_state.action,
                    tools: raw_state.tools,
                    metadata: raw_state.metadata,
                },
            );
        }

        let transitions = raw
            .transitions
            .into_iter()
            .map(|t| JourneyTransition {
                from_state: t.from_state,
                to_state: t.to_state,
                condition: t.condition,
                priority: t.priority,
            })
            .collect();

        Journey::new(
            journey_id.unwrap_or_default(),
            raw.name,
            raw.description,
            raw.activation_conditions,
            raw.initial_state,
            states,
            transitions,
            raw.enabled,
        )
        .map_err(|message| ValidationError::new(file, None, "journey", message))
    }

    /// Load every `.yaml`/`.yml` file in a directory, in lexical order.
    /// Accumulates results across files but aborts the whole directory load
    /// on the first failure — a single bad file fails the
    /// entire load rather than skipping it.
    pub fn load_directory(dir: &Path) -> Result<Vec<Journey>, ValidationError> {
        let mut paths: Vec<_> = std::fs::read_dir(dir)
            .map_err(|e| {
                ValidationError::new(
                    dir.to_string_lossy().to_string(),
                    None,
                    "<directory>",
                    format!("cannot read directory: {e}"),
                )
            })?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| {
                matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("yaml") | Some("yml")
                )
            })
            .collect();
        paths.sort();

        let mut journeys = Vec::with_capacity(paths.len());
        let mut seen_names = std::collections::HashSet::new();
        for path in paths {
            let file_name = path.to_string_lossy().to_string();
            let contents = std::fs::read_to_string(&path).map_err(|e| {
                ValidationError::new(&file_name, None, "<file>", format!("cannot read file: {e}"))
            })?;
            let journey = Self::parse(&file_name, &contents, None)?;
            if !seen_names.insert(journey.name.clone()) {
                return Err(ValidationError::new(
                    &file_name,
                    None,
                    "name",
                    format!("duplicate journey name `{}`", journey.name),
                ));
            }
            info!(file = %file_name, journey = %journey.name, "loaded journey definition");
            journeys.push(journey);
        }

        if journeys.is_empty() {
            warn!(dir = %dir.display(), "no journey definitions found");
        }

        Ok(journeys)
    }
}
