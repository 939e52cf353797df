//! Response validation and auto-fix, exercised through the public
//! `ResponseValidator` against the in-memory durable store.

use async_trait::async_trait;
use flowcore::{
    CompletionParams, GuidelineBuilder, GuidelineMatch, GuidelineScope, InMemoryDurableStore,
    Message, ModelClient, ResponseValidator,
};
use std::sync::Arc;

/// Distinguishes the JSON verdict call from the free-form auto-fix call by
/// `params.json_mode`, the same signal the validator itself branches on.
struct TwoCallModel {
    verdict: String,
    fixed_text: String,
}

#[async_trait]
impl ModelClient for TwoCallModel {
    async fn complete(
        &self,
        _messages: Vec<Message>,
        params: CompletionParams,
    ) -> flowcore::Result<String> {
        if params.json_mode {
            Ok(self.verdict.clone())
        } else {
            Ok(self.fixed_text.clone())
        }
    }

    fn name(&self) -> &str {
        "two-call"
    }
}

#[tokio::test]
async fn reply_quoting_a_dollar_amount_is_auto_fixed_and_audited() {
    let durable = Arc::new(InMemoryDurableStore::new());

    let no_dollar_amounts = GuidelineBuilder::new("no_dollar_amounts", GuidelineScope::State)
        .condition("while discussing a claim's payout")
        .action("never quote an exact dollar amount")
        .journey_id(flowcore::JourneyId::new())
        .state_name("provide_status")
        .build()
        .unwrap();
    let guideline_match = GuidelineMatch::new(no_dollar_amounts.clone(), 0.9, "applies").unwrap();

    let verdict = serde_json::json!({
        "is_valid": false,
        "violations": [{
            "guideline_id": no_dollar_amounts.id,
            "name": "no_dollar_amounts",
            "description": "reply quotes an exact dollar amount",
            "severity": "high"
        }],
        "confidence": 0.9,
        "suggested_fixes": ["omit the specific amount"]
    });
    let model = Arc::new(TwoCallModel {
        verdict: verdict.to_string(),
        fixed_text: "Your claim has been approved.".to_string(),
    });

    let validator = ResponseValidator::new(model, durable.clone());
    let result = validator
        .validate_response(
            "Your claim for $8,500 is approved.",
            &[guideline_match],
            "call-4",
            None,
        )
        .await;

    assert!(!result.is_valid);
    assert_eq!(result.violations.len(), 1);
    assert_eq!(result.suggested_fixes, vec!["omit the specific amount".to_string()]);
    let fixed = result.fixed_response.expect("auto-fix should have run");
    assert!(!fixed.contains("$8,500"));

    let audits = durable.audit_records().await;
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].considered_guideline_ids, vec![no_dollar_amounts.id]);
    assert_eq!(
        audits[0].suggested_fixes,
        vec!["omit the specific amount".to_string()]
    );
}

#[tokio::test]
async fn valid_reply_with_no_guidelines_skips_the_model_entirely() {
    struct PanicModel;
    #[async_trait]
    impl ModelClient for PanicModel {
        async fn complete(
            &self,
            _messages: Vec<Message>,
            _params: CompletionParams,
        ) -> flowcore::Result<String> {
            panic!("should never be called when there are no guidelines to check against");
        }
        fn name(&self) -> &str {
            "panic"
        }
    }

    let durable = Arc::new(InMemoryDurableStore::new());
    let validator = ResponseValidator::new(Arc::new(PanicModel), durable);
    let result = validator
        .validate_response("Thanks for calling.", &[], "call-5", None)
        .await;
    assert!(result.is_valid);
    assert!(result.fixed_response.is_none());
}
