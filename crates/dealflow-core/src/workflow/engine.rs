//! Execution engine — drives one run through its state machine.
//!
//! ```text
//! PENDING ──► ROUTING ──► EXECUTING ──► COMPLETED
//!                              └──────► FAILED
//! (any non-terminal) ─────────────────► CANCELLED
//! ```
//!
//! Every transition is written through the [`RunRecorder`] and awaited
//! before the engine moves on. Step *i+1* never starts before step *i*'s
//! result is persisted. A failing step halts the run; earlier results are
//! kept. Cancellation is checked at step boundaries only.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::config::EngineConfig;
use crate::error::DealflowError;
use crate::models::agent::AgentId;
use crate::models::deal::CompanyContext;
use crate::models::message::MessageRole;
use crate::models::run::{RunStatus, WorkflowType};
use crate::models::step_result::{StepResult, StepStatus};
use crate::workflow::catalog::WorkflowCatalog;
use crate::workflow::classifier::{Classification, Classifier};
use crate::workflow::context::DealContext;
use crate::workflow::invoker::StepInvoker;
use crate::workflow::reasoning::ReasoningService;
use crate::workflow::recorder::{RunRecorder, RunSnapshot};

/// Step output shown in chat history is cut to this many characters.
pub const PREVIEW_CHARS: usize = 500;

/// Cooperative cancellation flag shared between a run's driver and its
/// callers.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why a run ended FAILED.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum FailureCause {
    Step {
        agent: AgentId,
        kind: String,
        error: String,
    },
    Persistence {
        operation: String,
        error: String,
    },
}

/// Terminal summary of a run, as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    pub run_id: String,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
    pub steps: Vec<StepResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureCause>,
}

impl RunOutcome {
    pub fn workflow_type(&self) -> Option<WorkflowType> {
        self.classification.as_ref().map(|c| c.workflow_type)
    }

    /// Rebuild an outcome from persisted records, for runs finished by an
    /// earlier process.
    pub fn from_snapshot(snapshot: RunSnapshot) -> Self {
        let classification = match (snapshot.run.workflow_type, snapshot.run.confidence) {
            (Some(workflow_type), Some(confidence)) => Some(Classification {
                workflow_type,
                rationale: snapshot.run.rationale.clone().unwrap_or_default(),
                confidence,
            }),
            _ => None,
        };
        let failure = snapshot
            .steps
            .iter()
            .find(|s| s.status == StepStatus::Failed)
            .map(|s| FailureCause::Step {
                agent: s.agent,
                kind: s.output["kind"].as_str().unwrap_or("unknown").to_string(),
                error: s.error().unwrap_or_default().to_string(),
            });
        Self {
            run_id: snapshot.run.id,
            status: snapshot.run.status,
            classification,
            steps: snapshot.steps,
            failure,
        }
    }
}

/// A persistence call that kept failing after its retry budget.
#[derive(Debug)]
struct PersistenceHalt {
    operation: &'static str,
    error: DealflowError,
}

/// In-memory view of the run being driven.
struct RunState {
    status: RunStatus,
    classification: Option<Classification>,
    steps: Vec<StepResult>,
    failure: Option<FailureCause>,
}

pub struct ExecutionEngine {
    recorder: Arc<dyn RunRecorder>,
    classifier: Classifier,
    invoker: StepInvoker,
    catalog: Arc<WorkflowCatalog>,
    config: EngineConfig,
}

impl ExecutionEngine {
    pub fn new(
        recorder: Arc<dyn RunRecorder>,
        reasoning: Arc<dyn ReasoningService>,
        catalog: Arc<WorkflowCatalog>,
        config: EngineConfig,
    ) -> Self {
        let config = config.normalized();
        Self {
            recorder,
            classifier: Classifier::new(reasoning.clone()),
            invoker: StepInvoker::new(reasoning, &config),
            catalog,
            config,
        }
    }

    pub fn catalog(&self) -> &WorkflowCatalog {
        &self.catalog
    }

    /// Drive a persisted PENDING run to a terminal state.
    pub async fn execute(
        &self,
        run_id: &str,
        query: &str,
        company: &CompanyContext,
        cancel: &CancelHandle,
    ) -> RunOutcome {
        let mut state = RunState {
            status: RunStatus::Pending,
            classification: None,
            steps: Vec::new(),
            failure: None,
        };

        match self.drive(run_id, query, company, cancel, &mut state).await {
            Ok(()) => {}
            // The terminal status is already stored; only a closing write failed.
            Err(halt) if state.status.is_terminal() => {
                tracing::warn!(
                    "[Engine] Run {} is {} but {} failed after retries: {}",
                    run_id,
                    state.status,
                    halt.operation,
                    halt.error
                );
            }
            Err(halt) => self.fail_run(run_id, halt, &mut state).await,
        }

        tracing::info!("[Engine] Run {} finished: {}", run_id, state.status);
        RunOutcome {
            run_id: run_id.to_string(),
            status: state.status,
            classification: state.classification,
            steps: state.steps,
            failure: state.failure,
        }
    }

    /// Halt a run that has not reached a terminal state yet.
    async fn fail_run(&self, run_id: &str, halt: PersistenceHalt, state: &mut RunState) {
        tracing::error!(
            "[Engine] Run {} failed: {} exhausted retries: {}",
            run_id,
            halt.operation,
            halt.error
        );
        // Best effort; the store may be the thing that is broken.
        if let Err(e) = self.recorder.set_status(run_id, RunStatus::Failed).await {
            tracing::warn!("[Engine] Could not record FAILED for run {}: {}", run_id, e);
        }
        state.status = RunStatus::Failed;
        state.failure = Some(FailureCause::Persistence {
            operation: halt.operation.to_string(),
            error: halt.error.to_string(),
        });
    }

    async fn drive(
        &self,
        run_id: &str,
        query: &str,
        company: &CompanyContext,
        cancel: &CancelHandle,
        state: &mut RunState,
    ) -> Result<(), PersistenceHalt> {
        if cancel.is_cancelled() {
            return self
                .cancel_run(run_id, state, "Run cancelled before routing.")
                .await;
        }

        // ── Routing ─────────────────────────────────────────────────────
        self.transition(run_id, state, RunStatus::Routing).await?;
        let classification = self.classifier.classify(query).await;
        let workflow_type = classification.workflow_type;
        self.persist("set_workflow_type", || {
            self.recorder.set_workflow_type(
                run_id,
                workflow_type,
                &classification.rationale,
                classification.confidence,
            )
        })
        .await?;
        let routing_message = format!(
            "Workflow routing: {} ({})\n\n{}",
            workflow_type.display_name(),
            workflow_type,
            classification.rationale
        );
        state.classification = Some(classification);
        self.message(run_id, MessageRole::Assistant, &routing_message)
            .await?;

        if cancel.is_cancelled() {
            return self
                .cancel_run(run_id, state, "Run cancelled before execution.")
                .await;
        }

        // ── Executing ───────────────────────────────────────────────────
        self.transition(run_id, state, RunStatus::Executing).await?;
        let steps = self.catalog.steps_for(workflow_type);
        let mut ctx = DealContext::new(query, company);
        tracing::info!(
            "[Engine] Run {} executing {} ({} steps)",
            run_id,
            workflow_type,
            steps.len()
        );

        for (index, step) in steps.iter().enumerate() {
            if cancel.is_cancelled() {
                let note = format!("Run cancelled after {} of {} steps.", index, steps.len());
                return self.cancel_run(run_id, state, &note).await;
            }

            let result = self.invoker.invoke(run_id, index as u32, step, &ctx).await;
            self.persist("append_step_result", || {
                self.recorder.append_step_result(run_id, &result)
            })
            .await?;
            state.steps.push(result.clone());

            match result.status {
                StepStatus::Success => {
                    let content = result.content().unwrap_or_default();
                    ctx.record_output(step.agent, content);
                    let note = format!(
                        "{} completed.\n\n{}",
                        step.agent.display_name(),
                        preview(content)
                    );
                    self.message(run_id, MessageRole::Assistant, &note).await?;
                }
                _ => {
                    let error = result.error().unwrap_or("unknown error").to_string();
                    let kind = result.output["kind"]
                        .as_str()
                        .unwrap_or("unknown")
                        .to_string();
                    let note = format!("{} failed: {}", step.agent.display_name(), error);
                    self.message(run_id, MessageRole::Assistant, &note).await?;

                    self.transition(run_id, state, RunStatus::Failed).await?;
                    state.failure = Some(FailureCause::Step {
                        agent: step.agent,
                        kind,
                        error,
                    });
                    let closing = format!(
                        "Workflow failed at step {} of {} ({}).",
                        index + 1,
                        steps.len(),
                        step.agent.display_name()
                    );
                    return self.message(run_id, MessageRole::System, &closing).await;
                }
            }
        }

        self.transition(run_id, state, RunStatus::Completed).await?;
        let closing = format!(
            "{} workflow completed: {} steps.",
            workflow_type.display_name(),
            steps.len()
        );
        self.message(run_id, MessageRole::System, &closing).await
    }

    async fn cancel_run(
        &self,
        run_id: &str,
        state: &mut RunState,
        note: &str,
    ) -> Result<(), PersistenceHalt> {
        tracing::info!("[Engine] Run {} cancelled", run_id);
        self.transition(run_id, state, RunStatus::Cancelled).await?;
        self.message(run_id, MessageRole::System, note).await
    }

    async fn transition(
        &self,
        run_id: &str,
        state: &mut RunState,
        next: RunStatus,
    ) -> Result<(), PersistenceHalt> {
        if !state.status.can_transition_to(next) {
            return Err(PersistenceHalt {
                operation: "set_status",
                error: DealflowError::Internal(format!(
                    "illegal transition {} -> {}",
                    state.status, next
                )),
            });
        }
        self.persist("set_status", || self.recorder.set_status(run_id, next))
            .await?;
        tracing::debug!("[Engine] Run {}: {} -> {}", run_id, state.status, next);
        state.status = next;
        Ok(())
    }

    async fn message(
        &self,
        run_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<(), PersistenceHalt> {
        self.persist("append_message", || {
            self.recorder.append_message(run_id, role, content)
        })
        .await
    }

    /// Run a recorder call with the configured retry budget. Only database
    /// and internal errors are retried; the rest cannot succeed on replay.
    async fn persist<F, Fut>(
        &self,
        operation: &'static str,
        mut call: F,
    ) -> Result<(), PersistenceHalt>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), DealflowError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match call().await {
                Ok(()) => return Ok(()),
                Err(e)
                    if attempt < self.config.persistence_attempts
                        && matches!(e, DealflowError::Database(_) | DealflowError::Internal(_)) =>
                {
                    tracing::warn!(
                        "[Engine] {} attempt {} failed: {}, retrying",
                        operation,
                        attempt,
                        e
                    );
                    tokio::time::sleep(self.config.persistence_retry_delay).await;
                }
                Err(error) => return Err(PersistenceHalt { operation, error }),
            }
        }
    }
}

fn preview(content: &str) -> String {
    if content.chars().count() <= PREVIEW_CHARS {
        content.to_string()
    } else {
        let cut: String = content.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::workflow::reasoning::{ReasoningError, ReasoningRequest};
    use crate::workflow::recorder::SqliteRunRecorder;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Answers the classifier with a fixed label and every step with its
    /// template id. Steps listed in `fail` return a terminal error.
    struct Echo {
        label: &'static str,
        fail: Vec<&'static str>,
        cancel_after: Option<(&'static str, CancelHandle)>,
        calls: Mutex<Vec<String>>,
    }

    impl Echo {
        fn new(label: &'static str) -> Self {
            Self {
                label,
                fail: Vec::new(),
                cancel_after: None,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ReasoningService for Echo {
        async fn invoke(&self, request: &ReasoningRequest) -> Result<String, ReasoningError> {
            self.calls.lock().unwrap().push(request.template_id.clone());
            if request.template_id == "orchestrator" {
                return Ok(self.label.to_string());
            }
            if let Some((template, handle)) = &self.cancel_after {
                if request.template_id == *template {
                    handle.cancel();
                }
            }
            if self.fail.iter().any(|f| *f == request.template_id) {
                return Err(ReasoningError::InvalidInput("rejected".into()));
            }
            Ok(format!("{} output", request.template_id))
        }
    }

    async fn setup(service: Echo) -> (ExecutionEngine, Arc<SqliteRunRecorder>, Arc<Echo>, String) {
        let recorder = Arc::new(SqliteRunRecorder::new(Database::open_in_memory().unwrap()));
        let service = Arc::new(service);
        let engine = ExecutionEngine::new(
            recorder.clone(),
            service.clone(),
            Arc::new(WorkflowCatalog::builtin()),
            EngineConfig::default(),
        );
        let run_id = recorder.create_run("query", None).await.unwrap();
        (engine, recorder, service, run_id)
    }

    #[tokio::test]
    async fn test_seller_run_completes() {
        let (engine, recorder, service, run_id) = setup(Echo::new("seller_ma")).await;
        let outcome = engine
            .execute(&run_id, "Sell us", &CompanyContext::default(), &CancelHandle::new())
            .await;

        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.workflow_type(), Some(WorkflowType::SellerMa));
        assert_eq!(outcome.steps.len(), 2);
        assert_eq!(
            *service.calls.lock().unwrap(),
            vec!["orchestrator", "seller_prep", "market_outreach"]
        );

        let snapshot = recorder.get_run(&run_id).await.unwrap().unwrap();
        assert_eq!(snapshot.run.status, RunStatus::Completed);
        assert_eq!(snapshot.steps, outcome.steps);
        assert!(snapshot.messages[0].content.starts_with("Workflow routing: Seller-side M&A"));
    }

    #[tokio::test]
    async fn test_failed_step_halts_run() {
        let mut service = Echo::new("buyer_ma");
        service.fail.push("synergy_analyst");
        let (engine, recorder, service, run_id) = setup(service).await;
        let outcome = engine
            .execute(&run_id, "Buy", &CompanyContext::default(), &CancelHandle::new())
            .await;

        assert_eq!(outcome.status, RunStatus::Failed);
        let agents: Vec<_> = outcome.steps.iter().map(|s| s.agent).collect();
        assert_eq!(
            agents,
            vec![AgentId::TargetFinder, AgentId::Valuer, AgentId::SynergyAnalyst]
        );
        assert_eq!(outcome.steps[2].status, StepStatus::Failed);
        assert!(matches!(
            outcome.failure,
            Some(FailureCause::Step { agent: AgentId::SynergyAnalyst, .. })
        ));
        assert!(!service.calls.lock().unwrap().contains(&"bid_strategist".to_string()));

        let snapshot = recorder.get_run(&run_id).await.unwrap().unwrap();
        assert_eq!(snapshot.run.status, RunStatus::Failed);
        assert_eq!(snapshot.steps.len(), 3);
    }

    #[tokio::test]
    async fn test_cancel_between_steps() {
        let handle = CancelHandle::new();
        let mut service = Echo::new("buyer_ma");
        service.cancel_after = Some(("target_finder", handle.clone()));
        let (engine, recorder, _service, run_id) = setup(service).await;
        let outcome = engine
            .execute(&run_id, "Buy", &CompanyContext::default(), &handle)
            .await;

        assert_eq!(outcome.status, RunStatus::Cancelled);
        assert_eq!(outcome.steps.len(), 1);
        let snapshot = recorder.get_run(&run_id).await.unwrap().unwrap();
        assert_eq!(snapshot.run.status, RunStatus::Cancelled);
        assert_eq!(
            snapshot.messages.last().unwrap().content,
            "Run cancelled after 1 of 4 steps."
        );
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let handle = CancelHandle::new();
        handle.cancel();
        let (engine, _recorder, service, run_id) = setup(Echo::new("ipo")).await;
        let outcome = engine
            .execute(&run_id, "IPO", &CompanyContext::default(), &handle)
            .await;
        assert_eq!(outcome.status, RunStatus::Cancelled);
        assert!(outcome.classification.is_none());
        assert!(service.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_preview_truncates() {
        let long = "x".repeat(PREVIEW_CHARS + 10);
        let p = preview(&long);
        assert_eq!(p.chars().count(), PREVIEW_CHARS + 3);
        assert!(p.ends_with("..."));
        assert_eq!(preview("short"), "short");
    }
}
