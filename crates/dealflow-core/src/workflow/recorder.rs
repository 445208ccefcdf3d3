//! Run recorder — the persistence contract the engine drives at every
//! transition, and its SQLite implementation over the stores.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::Database;
use crate::error::DealflowError;
use crate::models::deal::{CompanyContext, Deal};
use crate::models::message::{Message, MessageRole};
use crate::models::run::{Confidence, Run, RunStatus, WorkflowType};
use crate::models::step_result::StepResult;
use crate::store::{DealStore, MessageStore, RunStore, StepResultStore};

/// Everything persisted about one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
    pub run: Run,
    /// Ordered by sequence index.
    pub steps: Vec<StepResult>,
    /// Ordered by insertion.
    pub messages: Vec<Message>,
}

#[async_trait]
pub trait RunRecorder: Send + Sync {
    /// Create a deal for company details supplied without a deal id.
    async fn create_deal(&self, company: &CompanyContext) -> Result<String, DealflowError>;

    async fn get_deal(&self, deal_id: &str) -> Result<Option<Deal>, DealflowError>;

    /// Persist a new PENDING run and return its id.
    async fn create_run(&self, query: &str, deal_id: Option<&str>)
        -> Result<String, DealflowError>;

    async fn set_workflow_type(
        &self,
        run_id: &str,
        workflow_type: WorkflowType,
        rationale: &str,
        confidence: Confidence,
    ) -> Result<(), DealflowError>;

    async fn append_step_result(
        &self,
        run_id: &str,
        result: &StepResult,
    ) -> Result<(), DealflowError>;

    async fn set_status(&self, run_id: &str, status: RunStatus) -> Result<(), DealflowError>;

    async fn append_message(
        &self,
        run_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<(), DealflowError>;

    async fn get_run(&self, run_id: &str) -> Result<Option<RunSnapshot>, DealflowError>;

    /// Most recent runs first.
    async fn recent_runs(&self, limit: usize) -> Result<Vec<Run>, DealflowError>;
}

#[derive(Debug, Clone)]
pub struct SqliteRunRecorder {
    runs: RunStore,
    steps: StepResultStore,
    messages: MessageStore,
    deals: DealStore,
}

impl SqliteRunRecorder {
    pub fn new(db: Database) -> Self {
        Self {
            runs: RunStore::new(db.clone()),
            steps: StepResultStore::new(db.clone()),
            messages: MessageStore::new(db.clone()),
            deals: DealStore::new(db),
        }
    }
}

#[async_trait]
impl RunRecorder for SqliteRunRecorder {
    async fn create_deal(&self, company: &CompanyContext) -> Result<String, DealflowError> {
        Ok(self.deals.create(company).await?.id)
    }

    async fn get_deal(&self, deal_id: &str) -> Result<Option<Deal>, DealflowError> {
        self.deals.get(deal_id).await
    }

    async fn create_run(
        &self,
        query: &str,
        deal_id: Option<&str>,
    ) -> Result<String, DealflowError> {
        if let Some(deal_id) = deal_id {
            if self.deals.get(deal_id).await?.is_none() {
                return Err(DealflowError::NotFound(format!("Deal {} not found", deal_id)));
            }
        }
        let run = Run::new(
            Uuid::new_v4().to_string(),
            query.to_string(),
            deal_id.map(str::to_string),
        );
        self.runs.create(&run).await?;
        Ok(run.id)
    }

    async fn set_workflow_type(
        &self,
        run_id: &str,
        workflow_type: WorkflowType,
        rationale: &str,
        confidence: Confidence,
    ) -> Result<(), DealflowError> {
        self.runs
            .set_workflow_type(run_id, workflow_type, rationale, confidence)
            .await?;

        let deal_id = self.runs.get(run_id).await?.and_then(|r| r.deal_id);
        if let Some(deal_id) = deal_id {
            self.deals.set_type_if_unset(&deal_id, workflow_type).await?;
        }
        Ok(())
    }

    async fn append_step_result(
        &self,
        run_id: &str,
        result: &StepResult,
    ) -> Result<(), DealflowError> {
        if result.run_id != run_id {
            return Err(DealflowError::BadRequest(format!(
                "Step result belongs to run {}, not {}",
                result.run_id, run_id
            )));
        }
        self.steps.append(result).await
    }

    async fn set_status(&self, run_id: &str, status: RunStatus) -> Result<(), DealflowError> {
        self.runs.set_status(run_id, status).await
    }

    async fn append_message(
        &self,
        run_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<(), DealflowError> {
        self.messages.append(run_id, role, content).await?;
        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<RunSnapshot>, DealflowError> {
        let Some(run) = self.runs.get(run_id).await? else {
            return Ok(None);
        };
        let steps = self.steps.list_by_run(run_id).await?;
        let messages = self.messages.list_by_run(run_id).await?;
        Ok(Some(RunSnapshot {
            run,
            steps,
            messages,
        }))
    }

    async fn recent_runs(&self, limit: usize) -> Result<Vec<Run>, DealflowError> {
        self.runs.list_recent(limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::agent::AgentId;

    fn recorder() -> SqliteRunRecorder {
        SqliteRunRecorder::new(Database::open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn test_snapshot_collects_run_steps_and_messages() {
        let recorder = recorder();
        let run_id = recorder.create_run("Sell the company", None).await.unwrap();
        recorder
            .append_message(&run_id, MessageRole::User, "Sell the company")
            .await
            .unwrap();
        recorder.set_status(&run_id, RunStatus::Routing).await.unwrap();
        recorder
            .set_workflow_type(&run_id, WorkflowType::SellerMa, "sell-side", Confidence::High)
            .await
            .unwrap();
        recorder.set_status(&run_id, RunStatus::Executing).await.unwrap();
        let step = StepResult::success(&run_id, AgentId::SellerPrep, 0, "prep".into(), 3, 1);
        recorder.append_step_result(&run_id, &step).await.unwrap();

        let snapshot = recorder.get_run(&run_id).await.unwrap().unwrap();
        assert_eq!(snapshot.run.status, RunStatus::Executing);
        assert_eq!(snapshot.run.workflow_type, Some(WorkflowType::SellerMa));
        assert_eq!(snapshot.steps.len(), 1);
        assert_eq!(snapshot.messages.len(), 1);
        assert!(recorder.get_run("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_classification_fills_deal_type() {
        let recorder = recorder();
        let deal_id = recorder
            .create_deal(&CompanyContext {
                company_name: Some("Orbit Labs".to_string()),
                ..CompanyContext::default()
            })
            .await
            .unwrap();
        let run_id = recorder.create_run("Take Orbit public", Some(&deal_id)).await.unwrap();
        recorder
            .set_workflow_type(&run_id, WorkflowType::Ipo, "listing", Confidence::High)
            .await
            .unwrap();

        let deal = recorder.get_deal(&deal_id).await.unwrap().unwrap();
        assert_eq!(deal.deal_type, Some(WorkflowType::Ipo));
        assert_eq!(
            deal.company_context().company_name.as_deref(),
            Some("Orbit Labs")
        );
        assert_eq!(deal.company_context().deal_id, Some(deal_id));
    }

    #[tokio::test]
    async fn test_unknown_deal_is_not_found() {
        let err = recorder().create_run("q", Some("ghost")).await.unwrap_err();
        assert!(matches!(err, DealflowError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_step_result_for_other_run_is_rejected() {
        let recorder = recorder();
        let run_id = recorder.create_run("q", None).await.unwrap();
        let step = StepResult::success("other", AgentId::Valuer, 0, "x".into(), 1, 1);
        let err = recorder.append_step_result(&run_id, &step).await.unwrap_err();
        assert!(matches!(err, DealflowError::BadRequest(_)));
    }
}
