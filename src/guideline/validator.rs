//! Post-hoc response validation against the active guideline set.
//!
//! Every invocation writes an audit record regardless of verdict; a failed
//! audit write is logged and swallowed, never propagated, since
//! observability must not block the conversation.

use crate::guideline::GuidelineMatch;
use crate::model::{CompletionParams, Message, ModelClient};
use crate::storage::DurableStore;
use crate::types::{AuditId, GuidelineId, JourneyId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

/// Severity of a guideline violation. Recorded but not branched on by the
/// current core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationSeverity {
    Critical,
    High,
    Medium,
    Low,
}

/// One guideline the reply failed to honor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub guideline_id: GuidelineId,
    pub name: String,
    pub description: String,
    pub severity: ViolationSeverity,
}

/// Outcome of validating one reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    #[serde(default)]
    pub violations: Vec<Violation>,
    pub confidence: f32,
    /// Populated only when `is_valid == false` and an auto-fix call
    /// succeeded.
    #[serde(default)]
    pub fixed_response: Option<String>,
    /// Raw corrective suggestions the model returned alongside the verdict,
    /// independent of whether an auto-fix call was attempted.
    #[serde(default)]
    pub suggested_fixes: Vec<String>,
}

impl ValidationResult {
    fn valid_no_violations() -> Self {
        Self {
            is_valid: true,
            violations: Vec::new(),
            confidence: 1.0,
            fixed_response: None,
            suggested_fixes: Vec::new(),
        }
    }

    /// Degrade-safe default when the validator model call itself fails: an
    /// outage of the model must never gag the agent.
    fn degraded() -> Self {
        Self {
            is_valid: true,
            violations: Vec::new(),
            confidence: 0.0,
            fixed_response: None,
            suggested_fixes: Vec::new(),
        }
    }
}

/// Durable audit trail for every validation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationAuditRecord {
    pub id: AuditId,
    pub session_id: String,
    #[serde(default)]
    pub journey_id: Option<JourneyId>,
    /// Every guideline the matcher put in front of the validator for this
    /// turn, not just the ones that ended up violated.
    #[serde(default)]
    pub considered_guideline_ids: Vec<GuidelineId>,
    pub is_valid: bool,
    #[serde(default)]
    pub violations: Vec<Violation>,
    #[serde(default)]
    pub suggested_fixes: Vec<String>,
    pub confidence: f32,
    pub latency_ms: u64,
    pub original_response: String,
    #[serde(default)]
    pub fixed_response: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct ValidatorResponse {
    is_valid: bool,
    #[serde(default)]
    violations: Vec<Violation>,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    suggested_fixes: Vec<String>,
}

/// Checks a drafted reply against the guidelines active for this turn, and
/// audits the outcome.
pub struct ResponseValidator {
    model: Arc<dyn ModelClient>,
    durable: Arc<dyn DurableStore>,
}

impl ResponseValidator {
    pub fn new(model: Arc<dyn ModelClient>, durable: Arc<dyn DurableStore>) -> Self {
        Self { model, durable }
    }

    /// Validate a reply, auto-correcting and auditing as needed.
    pub async fn validate_response(
        &self,
        reply: &str,
        guidelines: &[GuidelineMatch],
        session_id: &str,
        journey_id: Option<JourneyId>,
    ) -> ValidationResult {
        let started = Instant::now();

        let result = if guidelines.is_empty() {
            ValidationResult::valid_no_violations()
        } else {
            self.run_validation(reply, guidelines).await
        };

        let latency_ms = started.elapsed().as_millis() as u64;
        let record = ValidationAuditRecord {
            id: AuditId::new(),
            session_id: session_id.to_string(),
            journey_id,
            considered_guideline_ids: guidelines.iter().map(|m| m.guideline.id).collect(),
            is_valid: result.is_valid,
            violations: result.violations.clone(),
            suggested_fixes: result.suggested_fixes.clone(),
            confidence: result.confidence,
            latency_ms,
            original_response: reply.to_string(),
            fixed_response: result.fixed_response.clone(),
            created_at: Utc::now(),
        };
        if let Err(e) = self.durable.record_audit(&record).await {
            warn!(error = %e, "failed to persist validation audit record");
        }

        result
    }

    async fn run_validation(&self, reply: &str, guidelines: &[GuidelineMatch]) -> ValidationResult {
        let prompt = Self::validation_prompt(reply, guidelines);
        let raw = match self
            .model
            .complete(prompt, CompletionParams::structured())
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "response validation model call failed");
                return ValidationResult::degraded();
            }
        };

        let parsed: ValidatorResponse = match serde_json::from_str(&raw) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "response validation reply did not parse");
                return ValidationResult::degraded();
            }
        };

        let mut result = ValidationResult {
            is_valid: parsed.is_valid,
            violations: parsed.violations,
            confidence: parsed.confidence,
            fixed_response: None,
            suggested_fixes: parsed.suggested_fixes,
        };

        if !result.is_valid && !result.suggested_fixes.is_empty() {
            result.fixed_response = self
                .attempt_fix(reply, &result.suggested_fixes)
                .await;
        }

        result
    }

    async fn attempt_fix(&self, reply: &str, suggested_fixes: &[String]) -> Option<String> {
        let system = Message::system(
            "You rewrite a drafted reply to address listed issues while preserving its \
             intent and tone. Respond with only the corrected reply text.",
        );
        let user = Message::user(format!(
            "Original reply: {reply}\nIssues to address:\n{}",
            suggested_fixes
                .iter()
                .map(|f| format!("- {f}"))
                .collect::<Vec<_>>()
                .join("\n"),
        ));

        match self
            .model
            .complete(vec![system, user], CompletionParams::free_form_correction())
            .await
        {
            Ok(text) => Some(text.trim().to_string()),
            Err(e) => {
                warn!(error = %e, "auto-fix model call failed");
                None
            }
        }
    }

    fn validation_prompt(reply: &str, guidelines: &[GuidelineMatch]) -> Vec<Message> {
        let listing: Vec<String> = guidelines
            .iter()
            .map(|m| format!("- {} ({}): {}", m.guideline.name, m.guideline.scope, m.guideline.action))
            .collect();
        let system = Message::system(
            "You check a drafted reply against a set of behavioral guidelines. Respond with \
             a JSON object: {\"is_valid\": bool, \"violations\": [{\"guideline_id\": string, \
             \"name\": string, \"description\": string, \"severity\": \
             \"critical\"|\"high\"|\"medium\"|\"low\"}], \"confidence\": number, \
             \"suggested_fixes\": [string]}.",
        );
        let user = Message::user(format!(
            "Reply: {reply}\nActive guidelines:\n{}",
            listing.join("\n"),
        ));
        vec![system, user]
    }
}
