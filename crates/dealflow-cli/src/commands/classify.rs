//! `dealflow classify` — Route a query without running any steps.

use std::sync::Arc;

use dealflow_core::workflow::classifier::keyword_assessment;
use dealflow_core::workflow::{Classifier, ReasoningService};

use super::print_json;

pub async fn classify(query: &str, prompts_dir: Option<&str>) -> Result<(), String> {
    let client = super::reasoning_client(super::load_prompts(prompts_dir)?)?;
    classify_with(Arc::new(client), query).await
}

pub async fn classify_with(
    reasoning: Arc<dyn ReasoningService>,
    query: &str,
) -> Result<(), String> {
    let query = query.trim();
    if query.is_empty() {
        return Err("Query must not be empty".to_string());
    }

    let hint = keyword_assessment(query);
    let classification = Classifier::new(reasoning).classify(query).await;

    print_json(&serde_json::json!({
        "query": query,
        "keywordHint": {
            "workflowType": hint.workflow_type,
            "rationale": hint.rationale,
        },
        "classification": classification,
    }));
    Ok(())
}
