//! Run service — the inbound surface over the engine.
//!
//! Each started run gets its own tokio task and its own context. The
//! service keeps a handle only while a run is being driven; once the
//! outcome is published the store's status is the record, and a second
//! `start` is rejected because the run is no longer PENDING.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{watch, RwLock};

use crate::config::EngineConfig;
use crate::error::DealflowError;
use crate::models::deal::CompanyContext;
use crate::models::message::MessageRole;
use crate::models::run::{Run, RunStatus};
use crate::workflow::catalog::WorkflowCatalog;
use crate::workflow::engine::{CancelHandle, ExecutionEngine, RunOutcome};
use crate::workflow::reasoning::ReasoningService;
use crate::workflow::recorder::{RunRecorder, RunSnapshot};

struct RunHandle {
    cancel: CancelHandle,
    outcome: watch::Receiver<Option<RunOutcome>>,
}

/// A run that has been persisted but not started yet.
struct StagedRun {
    query: String,
    company: CompanyContext,
}

struct RunServiceInner {
    engine: Arc<ExecutionEngine>,
    recorder: Arc<dyn RunRecorder>,
    runs: RwLock<HashMap<String, RunHandle>>,
    staged: RwLock<HashMap<String, StagedRun>>,
}

#[derive(Clone)]
pub struct RunService {
    inner: Arc<RunServiceInner>,
}

impl RunService {
    pub fn new(
        recorder: Arc<dyn RunRecorder>,
        reasoning: Arc<dyn ReasoningService>,
        catalog: Arc<WorkflowCatalog>,
        config: EngineConfig,
    ) -> Self {
        let engine = ExecutionEngine::new(recorder.clone(), reasoning, catalog, config);
        Self {
            inner: Arc::new(RunServiceInner {
                engine: Arc::new(engine),
                recorder,
                runs: RwLock::new(HashMap::new()),
                staged: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn catalog(&self) -> &WorkflowCatalog {
        self.inner.engine.catalog()
    }

    /// Persist a PENDING run and spawn its driver. Returns once both are done.
    pub async fn submit_query(
        &self,
        query: &str,
        company: Option<CompanyContext>,
    ) -> Result<String, DealflowError> {
        let run_id = self.create_run(query, company).await?;
        self.start(&run_id).await?;
        Ok(run_id)
    }

    /// Persist a PENDING run without starting it.
    pub async fn create_run(
        &self,
        query: &str,
        company: Option<CompanyContext>,
    ) -> Result<String, DealflowError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(DealflowError::BadRequest("Query must not be empty".to_string()));
        }
        let company = company.unwrap_or_default();

        let deal_id = match (&company.deal_id, &company.company_name) {
            (Some(id), _) => Some(id.clone()),
            (None, Some(_)) => Some(self.inner.recorder.create_deal(&company).await?),
            (None, None) => None,
        };

        let recorder = &self.inner.recorder;
        let run_id = recorder.create_run(query, deal_id.as_deref()).await?;
        recorder
            .append_message(&run_id, MessageRole::User, query)
            .await?;

        self.inner.staged.write().await.insert(
            run_id.clone(),
            StagedRun {
                query: query.to_string(),
                company,
            },
        );
        tracing::info!("[Service] Created run {}", run_id);
        Ok(run_id)
    }

    /// Spawn the driver for a PENDING run. A run that is already being
    /// driven, or has already finished, is a conflict.
    pub async fn start(&self, run_id: &str) -> Result<(), DealflowError> {
        let mut runs = self.inner.runs.write().await;
        if runs.contains_key(run_id) {
            return Err(DealflowError::Conflict(format!(
                "Run {} has already been started",
                run_id
            )));
        }

        let snapshot = self
            .inner
            .recorder
            .get_run(run_id)
            .await?
            .ok_or_else(|| DealflowError::NotFound(format!("Run {} not found", run_id)))?;
        if snapshot.run.status != RunStatus::Pending {
            return Err(DealflowError::Conflict(format!(
                "Run {} is {}, only pending runs can be started",
                run_id, snapshot.run.status
            )));
        }

        let staged = self.inner.staged.write().await.remove(run_id);
        let (query, company) = match staged {
            Some(s) => (s.query, s.company),
            None => {
                let company = self.company_for(snapshot.run.deal_id.as_deref()).await?;
                (snapshot.run.query.clone(), company)
            }
        };

        let cancel = CancelHandle::new();
        let (tx, rx) = watch::channel(None);
        runs.insert(
            run_id.to_string(),
            RunHandle {
                cancel: cancel.clone(),
                outcome: rx,
            },
        );
        drop(runs);

        let inner = self.inner.clone();
        let id = run_id.to_string();
        tokio::spawn(async move {
            let outcome = inner.engine.execute(&id, &query, &company, &cancel).await;
            // Receivers already handed out still see the outcome.
            inner.runs.write().await.remove(&id);
            tx.send_replace(Some(outcome));
            tracing::debug!("[Service] Released run {}", id);
        });
        tracing::info!("[Service] Started run {}", run_id);
        Ok(())
    }

    /// Company details for a run this service did not stage, read back
    /// from its deal.
    async fn company_for(&self, deal_id: Option<&str>) -> Result<CompanyContext, DealflowError> {
        let Some(deal_id) = deal_id else {
            return Ok(CompanyContext::default());
        };
        match self.inner.recorder.get_deal(deal_id).await? {
            Some(deal) => Ok(deal.company_context()),
            None => {
                tracing::warn!("[Service] Deal {} not found, starting without it", deal_id);
                Ok(CompanyContext {
                    deal_id: Some(deal_id.to_string()),
                    ..CompanyContext::default()
                })
            }
        }
    }

    pub async fn get_run(&self, run_id: &str) -> Result<RunSnapshot, DealflowError> {
        self.inner
            .recorder
            .get_run(run_id)
            .await?
            .ok_or_else(|| DealflowError::NotFound(format!("Run {} not found", run_id)))
    }

    /// Request cancellation. A running run stops at its next step
    /// boundary; a run that was never started is cancelled immediately.
    pub async fn cancel(&self, run_id: &str) -> Result<(), DealflowError> {
        // Held until the staged run is cancelled so `start` cannot slip in.
        let runs = self.inner.runs.write().await;
        // A handle is dropped before its outcome is published, so any handle
        // still here belongs to a run in flight.
        if let Some(handle) = runs.get(run_id) {
            handle.cancel.cancel();
            tracing::info!("[Service] Cancellation requested for run {}", run_id);
            return Ok(());
        }

        let snapshot = self.get_run(run_id).await?;
        if snapshot.run.status != RunStatus::Pending {
            return Err(DealflowError::Conflict(format!(
                "Run {} is {} and not driven by this service",
                run_id, snapshot.run.status
            )));
        }
        let recorder = &self.inner.recorder;
        recorder.set_status(run_id, RunStatus::Cancelled).await?;
        recorder
            .append_message(run_id, MessageRole::System, "Run cancelled before it started.")
            .await?;
        self.inner.staged.write().await.remove(run_id);
        drop(runs);
        tracing::info!("[Service] Cancelled staged run {}", run_id);
        Ok(())
    }

    /// Wait for a run to reach a terminal state.
    pub async fn wait(&self, run_id: &str) -> Result<RunOutcome, DealflowError> {
        let receiver = {
            let runs = self.inner.runs.read().await;
            runs.get(run_id).map(|h| h.outcome.clone())
        };

        let Some(mut rx) = receiver else {
            let snapshot = self.get_run(run_id).await?;
            if snapshot.run.status.is_terminal() {
                return Ok(RunOutcome::from_snapshot(snapshot));
            }
            return Err(DealflowError::Conflict(format!(
                "Run {} is {} and not driven by this service",
                run_id, snapshot.run.status
            )));
        };

        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(outcome) = current {
                return Ok(outcome);
            }
            if rx.changed().await.is_err() {
                let last = rx.borrow().clone();
                return last.ok_or_else(|| {
                    DealflowError::Internal(format!(
                        "Run {} driver exited without an outcome",
                        run_id
                    ))
                });
            }
        }
    }

    pub async fn recent_runs(&self, limit: usize) -> Result<Vec<Run>, DealflowError> {
        self.inner.recorder.recent_runs(limit).await
    }
}
