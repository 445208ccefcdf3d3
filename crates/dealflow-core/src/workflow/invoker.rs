//! Step invoker — runs one catalog step against the reasoning service.
//!
//! The invoker never returns an error: every outcome, including timeouts
//! and empty replies, becomes a `StepResult` with status success or failed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::EngineConfig;
use crate::models::step_result::StepResult;
use crate::workflow::catalog::StepSpec;
use crate::workflow::context::DealContext;
use crate::workflow::reasoning::{ReasoningError, ReasoningRequest, ReasoningService};

pub struct StepInvoker {
    reasoning: Arc<dyn ReasoningService>,
    timeout: Duration,
    max_attempts: u32,
    retry_delay: Duration,
}

impl StepInvoker {
    pub fn new(reasoning: Arc<dyn ReasoningService>, config: &EngineConfig) -> Self {
        let config = config.clone().normalized();
        Self {
            reasoning,
            timeout: config.step_timeout,
            max_attempts: config.max_step_attempts,
            retry_delay: config.step_retry_delay,
        }
    }

    /// Input for a step: exactly the fields it declares, in declaration
    /// order. Anything the context does not hold yet is `NotAvailable`.
    pub fn build_request(step: &StepSpec, ctx: &DealContext) -> ReasoningRequest {
        step.requires
            .iter()
            .fold(ReasoningRequest::new(step.template_id()), |req, field| {
                req.with_field(field.name(), ctx.get(*field))
            })
    }

    pub async fn invoke(
        &self,
        run_id: &str,
        sequence_index: u32,
        step: &StepSpec,
        ctx: &DealContext,
    ) -> StepResult {
        let request = Self::build_request(step, ctx);
        let started = Instant::now();
        let mut attempts = 0u32;

        let outcome = loop {
            attempts += 1;
            match self.attempt(&request).await {
                Err(e) if e.is_transient() && attempts < self.max_attempts => {
                    tracing::warn!(
                        "[Invoker] {} attempt {} failed ({}), retrying",
                        step.agent,
                        attempts,
                        e
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                other => break other,
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(content) => {
                tracing::info!(
                    "[Invoker] {} succeeded in {} ms ({} attempt(s))",
                    step.agent,
                    duration_ms,
                    attempts
                );
                StepResult::success(
                    run_id,
                    step.agent,
                    sequence_index,
                    content,
                    duration_ms,
                    attempts,
                )
            }
            Err(e) => {
                tracing::warn!(
                    "[Invoker] {} failed after {} attempt(s): {}",
                    step.agent,
                    attempts,
                    e
                );
                StepResult::failed(
                    run_id,
                    step.agent,
                    sequence_index,
                    e.to_string(),
                    e.kind(),
                    duration_ms,
                    attempts,
                )
            }
        }
    }

    async fn attempt(&self, request: &ReasoningRequest) -> Result<String, ReasoningError> {
        match tokio::time::timeout(self.timeout, self.reasoning.invoke(request)).await {
            Ok(Ok(reply)) => {
                let reply = reply.trim();
                if reply.is_empty() {
                    Err(ReasoningError::MalformedOutput("empty reply".to_string()))
                } else {
                    Ok(reply.to_string())
                }
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ReasoningError::Timeout(self.timeout.as_millis() as u64)),
        }
    }
}
