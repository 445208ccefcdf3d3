//! Query classifier — picks the workflow type for a run.
//!
//! A keyword scan produces an initial assessment that is forwarded to the
//! reasoning service as a hint. The reply is scanned for a workflow label;
//! when none is found, or the call fails, the run falls back to
//! `buyer_ma` with low confidence. Classification never fails a run.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::Serialize;

use crate::models::run::{Confidence, WorkflowType};
use crate::workflow::prompts::ORCHESTRATOR_TEMPLATE;
use crate::workflow::reasoning::{ReasoningRequest, ReasoningService};

/// Label used when nothing better is known.
pub const FALLBACK_WORKFLOW: WorkflowType = WorkflowType::BuyerMa;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub workflow_type: WorkflowType,
    pub rationale: String,
    pub confidence: Confidence,
}

/// Deterministic keyword pre-assessment.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordAssessment {
    pub workflow_type: WorkflowType,
    pub rationale: &'static str,
}

const BUYER_KEYWORDS: &[&str] = &[
    "acquire",
    "acquisition",
    "buy",
    "target",
    "merger",
    "m&a",
    "purchase",
];
/// Seller signals inside an M&A query. No "sale" here: "wholesale" and
/// "point of sale" show up in buy-side queries.
const SELL_SIDE_MA_KEYWORDS: &[&str] = &["sell", "selling", "divest", "exit", "buyer"];
const SELLER_KEYWORDS: &[&str] = &["sell", "selling", "divest", "exit", "sale"];
const IPO_KEYWORDS: &[&str] = &["ipo", "public", "listing", "public offering", "go public"];

pub fn keyword_assessment(query: &str) -> KeywordAssessment {
    let q = query.to_lowercase();
    let any = |words: &[&str]| words.iter().any(|w| q.contains(w));

    if any(BUYER_KEYWORDS) {
        // "find a buyer for the acquisition" is sell-side.
        if any(SELL_SIDE_MA_KEYWORDS) {
            KeywordAssessment {
                workflow_type: WorkflowType::SellerMa,
                rationale: "Detected seller-side M&A keywords in query",
            }
        } else {
            KeywordAssessment {
                workflow_type: WorkflowType::BuyerMa,
                rationale: "Detected buyer-side M&A keywords in query",
            }
        }
    } else if any(IPO_KEYWORDS) {
        KeywordAssessment {
            workflow_type: WorkflowType::Ipo,
            rationale: "Detected IPO-related keywords in query",
        }
    } else if any(SELLER_KEYWORDS) {
        KeywordAssessment {
            workflow_type: WorkflowType::SellerMa,
            rationale: "Detected seller-side keywords in query",
        }
    } else {
        KeywordAssessment {
            workflow_type: FALLBACK_WORKFLOW,
            rationale: "No routing keywords found",
        }
    }
}

fn label_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(buyer_ma|seller_ma|ipo)\b").ok())
        .as_ref()
}

/// First workflow label appearing in `reply`, if any.
pub fn parse_label(reply: &str) -> Option<WorkflowType> {
    let m = label_regex()?.find(reply)?;
    WorkflowType::from_str(&m.as_str().to_ascii_lowercase())
}

pub struct Classifier {
    reasoning: Arc<dyn ReasoningService>,
}

impl Classifier {
    pub fn new(reasoning: Arc<dyn ReasoningService>) -> Self {
        Self { reasoning }
    }

    pub async fn classify(&self, query: &str) -> Classification {
        let hint = keyword_assessment(query);
        let request = ReasoningRequest::new(ORCHESTRATOR_TEMPLATE)
            .with_field("query", Some(query))
            .with_field(
                "initial_assessment",
                Some(&format!("{} - {}", hint.workflow_type, hint.rationale)),
            )
            .with_field("labels", Some("buyer_ma, seller_ma, ipo"));

        match self.reasoning.invoke(&request).await {
            Ok(reply) => match parse_label(&reply) {
                Some(workflow_type) => {
                    tracing::info!("[Classifier] Routed to {}", workflow_type);
                    Classification {
                        workflow_type,
                        rationale: reply.trim().to_string(),
                        confidence: Confidence::High,
                    }
                }
                None => {
                    tracing::warn!(
                        "[Classifier] No workflow label in reply, defaulting to {}",
                        FALLBACK_WORKFLOW
                    );
                    Classification {
                        workflow_type: FALLBACK_WORKFLOW,
                        rationale: format!(
                            "Defaulted to {}: no workflow label in classifier reply",
                            FALLBACK_WORKFLOW
                        ),
                        confidence: Confidence::Low,
                    }
                }
            },
            Err(e) => {
                tracing::warn!(
                    "[Classifier] Reasoning call failed ({}), defaulting to {}",
                    e,
                    FALLBACK_WORKFLOW
                );
                Classification {
                    workflow_type: FALLBACK_WORKFLOW,
                    rationale: format!(
                        "Defaulted to {}: classifier call failed ({})",
                        FALLBACK_WORKFLOW, e
                    ),
                    confidence: Confidence::Low,
                }
            }
        }
    }
}
