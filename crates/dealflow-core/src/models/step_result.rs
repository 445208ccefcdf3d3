use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::agent::AgentId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Success,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

/// Persisted outcome of one catalog step within a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub run_id: String,
    pub agent: AgentId,
    pub sequence_index: u32,
    pub status: StepStatus,
    /// Opaque payload. `{"content": ...}` on success,
    /// `{"error": ..., "kind": ...}` on failure.
    pub output: serde_json::Value,
    pub duration_ms: u64,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
}

impl StepResult {
    pub fn success(
        run_id: &str,
        agent: AgentId,
        sequence_index: u32,
        content: String,
        duration_ms: u64,
        attempts: u32,
    ) -> Self {
        Self {
            run_id: run_id.to_string(),
            agent,
            sequence_index,
            status: StepStatus::Success,
            output: serde_json::json!({ "content": content }),
            duration_ms,
            attempts,
            created_at: Utc::now(),
        }
    }

    pub fn failed(
        run_id: &str,
        agent: AgentId,
        sequence_index: u32,
        error: String,
        kind: &str,
        duration_ms: u64,
        attempts: u32,
    ) -> Self {
        Self {
            run_id: run_id.to_string(),
            agent,
            sequence_index,
            status: StepStatus::Failed,
            output: serde_json::json!({ "error": error, "kind": kind }),
            duration_ms,
            attempts,
            created_at: Utc::now(),
        }
    }

    /// Text content of a successful step, if any.
    pub fn content(&self) -> Option<&str> {
        self.output.get("content").and_then(|c| c.as_str())
    }

    /// Error description of a failed step, if any.
    pub fn error(&self) -> Option<&str> {
        self.output.get("error").and_then(|e| e.as_str())
    }
}
