//! YAML ingestion for guideline definitions.
//!
//! Guideline YAML declares `journey_name` (a human-readable name), never a
//! raw journey id, so the loader is handed a `journey_id_map` resolved from
//! already-loaded journeys and fails the definition if the name is unknown.

use super::{Guideline, GuidelineBuilder};
use crate::error::ValidationError;
use crate::types::{GuidelineId, GuidelineScope, JourneyId};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
enum RawScope {
    Global,
    Journey,
    State,
}

#[derive(Debug, Deserialize)]
struct RawGuideline {
    name: String,
    scope: RawScope,
    #[serde(default)]
    description: Option<String>,
    condition: String,
    action: String,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    tools: Vec<String>,
    #[serde(default)]
    priority: i32,
    #[serde(default = "super::default_enabled")]
    enabled: bool,
    #[serde(default)]
    journey_name: Option<String>,
    #[serde(default)]
    state_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawGuidelinesFile {
    guidelines: Vec<RawGuideline>,
}

/// Loads and validates guideline YAML files.
pub struct GuidelineLoader;

impl GuidelineLoader {
    /// Parse one YAML document (top-level key `guidelines:` holding a
    /// list) against a map of already-loaded journey name → id.
    pub fn parse(
        file: &str,
        yaml: &str,
        journey_id_map: &HashMap<String, JourneyId>,
    ) -> Result<Vec<Guideline>, ValidationError> {
        let raw: RawGuidelinesFile = serde_yaml::from_str(yaml).map_err(|e| {
            ValidationError::new(file, None, "<document>", format!("invalid YAML: {e}"))
        })?;

        let mut guidelines = Vec::with_capacity(raw.guidelines.len());
        for (index, rg) in raw.guidelines.into_iter().enumerate() {
            let scope = match rg.scope {
                RawScope::Global => GuidelineScope::Global,
                RawScope::Journey => GuidelineScope::Journey,
                RawScope::State => GuidelineScope::State,
            };

            let mut builder = GuidelineBuilder::new(rg.name, scope)
                .condition(rg.condition)
                .action(rg.action)
                .keywords(rg.keywords)
                .tools(rg.tools)
                .priority(rg.priority)
                .enabled(rg.enabled)
                .id(GuidelineId::new());

            if let Some(description) = rg.description {
                builder = builder.description(description);
            }

            if matches!(scope, GuidelineScope::Journey | GuidelineScope::State) {
                let journey_name = rg.journey_name.ok_or_else(|| {
                    ValidationError::new(
                        file,
                        Some(index.to_string()),
                        "journey_name",
                        "required for JOURNEY/STATE scope",
                    )
                })?;
                let journey_id = journey_id_map.get(&journey_name).ok_or_else(|| {
                    ValidationError::new(
                        file,
                        Some(index.to_string()),
                        "journey_name",
                        format!("unknown journey name `{journey_name}`"),
                    )
                })?;
                builder = builder.journey_id(*journey_id);
            }

            if matches!(scope, GuidelineScope::State) {
                let state_name = rg.state_name.ok_or_else(|| {
                    ValidationError::new(
                        file,
                        Some(index.to_string()),
                        "state_name",
                        "required for STATE scope",
                    )
                })?;
                builder = builder.state_name(state_name);
            }

            let guideline = builder.build().map_err(|message| {
                ValidationError::new(file, Some(index.to_string()), "guideline", message)
            })?;
            guidelines.push(guideline);
        }

        Ok(guidelines)
    }

    /// Load every `.yaml`/`.yml` file in a directory, in lexical order,
    /// accumulating guidelines across files. Aborts on the first failure.
    pub fn load_directory(
        dir: &Path,
        journey_id_map: &HashMap<String, JourneyId>,
    ) -> Result<Vec<Guideline>, ValidationError> {
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

        let mut all = Vec::new();
        for path in paths {
            let file_name = path.to_string_lossy().to_string();
            let contents = std::fs::read_to_string(&path).map_err(|e| {
                ValidationError::new(&file_name, None, "<file>", format!("cannot read file: {e}"))
            })?;
            let parsed = Self::parse(&file_name, &contents, journey_id_map)?;
            info!(file = %file_name, count = parsed.len(), "loaded guideline definitions");
            all.extend(parsed);
        }
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
guidelines:
  - name: no_dollar_amounts
    scope: STATE
    condition: the reply is about claim status
    action: never state an exact dollar amount
    journey_name: claim_inquiry
    state_name: provide_status
    priority: 50
  - name: stay_professional
    scope: GLOBAL
    condition: always
    action: remain courteous and professional
    keywords: [refund, payment]
    priority: 10
"#;

    #[test]
    fn resolves_journey_name_to_id() {
        let jid = JourneyId::new();
        let mut map = HashMap::new();
        map.insert("claim_inquiry".to_string(), jid);

        let guidelines = GuidelineLoader::parse("guidelines.yaml", YAML, &map).unwrap();
        assert_eq!(guidelines.len(), 2);
        let state_scoped = guidelines
            .iter()
            .find(|g| g.name == "no_dollar_amounts")
            .unwrap();
        assert_eq!(state_scoped.journey_id, Some(jid));
        assert_eq!(state_scoped.state_name.as_deref(), Some("provide_status"));
    }

    #[test]
    fn fails_on_unknown_journey_name() {
        let map = HashMap::new();
        let result = GuidelineLoader::parse("guidelines.yaml", YAML, &map);
        assert!(result.is_err());
    }

    #[test]
    fn global_scope_does_not_require_journey_name() {
        let map = HashMap::new();
        let yaml = r#"
guidelines:
  - name: g
    scope: GLOBAL
    condition: always
    action: be nice
"#;
        let guidelines = GuidelineLoader::parse("g.yaml", yaml, &map).unwrap();
        assert_eq!(guidelines.len(), 1);
        assert_eq!(guidelines[0].journey_id, None);
    }
}
