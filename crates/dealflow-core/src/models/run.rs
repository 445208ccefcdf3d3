use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The three advisory pipelines a query can be routed to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowType {
    BuyerMa,
    SellerMa,
    Ipo,
}

impl WorkflowType {
    pub const ALL: [WorkflowType; 3] = [Self::BuyerMa, Self::SellerMa, Self::Ipo];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BuyerMa => "buyer_ma",
            Self::SellerMa => "seller_ma",
            Self::Ipo => "ipo",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "buyer_ma" => Some(Self::BuyerMa),
            "seller_ma" => Some(Self::SellerMa),
            "ipo" => Some(Self::Ipo),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::BuyerMa => "Buyer-side M&A",
            Self::SellerMa => "Seller-side M&A",
            Self::Ipo => "IPO",
        }
    }
}

impl std::fmt::Display for WorkflowType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a run.
///
/// ```text
/// Pending ──► Routing ──► Executing ──► Completed
///    │           │            ├──────► Failed
///    └───────────┴────────────┴──────► Cancelled
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Routing,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Routing => "routing",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "routing" => Some(Self::Routing),
            "executing" => Some(Self::Executing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether `self → next` is a legal edge of the run state machine.
    ///
    /// Failure is reachable from every non-terminal state because a
    /// persistence error can surface before execution starts.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        use RunStatus::*;
        match (self, next) {
            (Pending, Routing) => true,
            (Routing, Executing) => true,
            (Executing, Completed) => true,
            (from, Failed) | (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the classifier arrived at a workflow type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// A label was parsed from the reasoning service's reply.
    High,
    /// The default label was used because no label could be parsed.
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Low => "low",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "high" => Some(Self::High),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

/// One classification-to-completion execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub id: String,
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_type: Option<WorkflowType>,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deal_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Run {
    pub fn new(id: String, query: String, deal_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            query,
            workflow_type: None,
            status: RunStatus::Pending,
            rationale: None,
            confidence: None,
            deal_id,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        assert!(RunStatus::Pending.can_transition_to(RunStatus::Routing));
        assert!(RunStatus::Routing.can_transition_to(RunStatus::Executing));
        assert!(RunStatus::Executing.can_transition_to(RunStatus::Completed));
        assert!(RunStatus::Executing.can_transition_to(RunStatus::Failed));
        assert!(RunStatus::Pending.can_transition_to(RunStatus::Cancelled));
        assert!(RunStatus::Routing.can_transition_to(RunStatus::Cancelled));
    }

    #[test]
    fn test_no_backward_or_terminal_transitions() {
        assert!(!RunStatus::Executing.can_transition_to(RunStatus::Routing));
        assert!(!RunStatus::Pending.can_transition_to(RunStatus::Completed));
        assert!(!RunStatus::Routing.can_transition_to(RunStatus::Completed));
        for terminal in [RunStatus::Completed, RunStatus::Failed, RunStatus::Cancelled] {
            assert!(!terminal.can_transition_to(RunStatus::Failed));
            assert!(!terminal.can_transition_to(RunStatus::Cancelled));
            assert!(!terminal.can_transition_to(RunStatus::Executing));
        }
    }

    #[test]
    fn test_workflow_type_labels() {
        for wf in WorkflowType::ALL {
            assert_eq!(WorkflowType::from_str(wf.as_str()), Some(wf));
        }
        assert_eq!(WorkflowType::from_str("unknown"), None);
    }
}
