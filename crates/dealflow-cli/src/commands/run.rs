//! `dealflow run` — Submit a query and wait for the run to finish.

use std::fmt::Write;
use std::sync::Arc;

use console::style;
use dealflow_core::models::{CompanyContext, RunStatus, StepStatus};
use dealflow_core::state::AppState;
use dealflow_core::workflow::{FailureCause, RunOutcome};
use dealflow_core::{EngineConfig, RunService};

use super::styled_status;

pub async fn run(
    state: &AppState,
    query: &str,
    company: CompanyContext,
    prompts_dir: Option<&str>,
) -> Result<(), String> {
    let prompts = super::checked_prompts(&state.catalog, prompts_dir)?;
    let client = super::reasoning_client(prompts)?;
    let config = EngineConfig::from_env()?;
    let service = state.run_service(Arc::new(client), config);
    run_with(&service, query, company).await
}

/// Drive one run to completion. Ctrl-C requests cancellation, which takes
/// effect at the next step boundary.
pub async fn run_with(
    service: &RunService,
    query: &str,
    company: CompanyContext,
) -> Result<(), String> {
    let run_id = service
        .submit_query(query, Some(company))
        .await
        .map_err(|e| e.to_string())?;
    println!("📄 Run {} started", style(&run_id).bold());

    let outcome = tokio::select! {
        outcome = service.wait(&run_id) => outcome,
        _ = tokio::signal::ctrl_c() => {
            println!("Cancelling after the current step...");
            service.cancel(&run_id).await.map_err(|e| e.to_string())?;
            service.wait(&run_id).await
        }
    }
    .map_err(|e| e.to_string())?;

    print!("{}", render_outcome(&outcome));

    if outcome.status == RunStatus::Completed {
        println!("\n🎉 Run completed successfully!");
        Ok(())
    } else {
        Err(format!("Run {} ended {}", outcome.run_id, outcome.status))
    }
}

pub fn render_outcome(outcome: &RunOutcome) -> String {
    let mut out = String::new();

    if let Some(c) = &outcome.classification {
        let _ = writeln!(
            out,
            "Workflow: {} ({}, {} confidence)",
            c.workflow_type.display_name(),
            c.workflow_type,
            c.confidence.as_str()
        );
    }
    let _ = writeln!(out, "Status:   {}", styled_status(outcome.status));

    for step in &outcome.steps {
        let _ = writeln!(out);
        match step.status {
            StepStatus::Success => {
                let _ = writeln!(
                    out,
                    "{} {}",
                    style("##").green(),
                    style(step.agent.display_name()).bold()
                );
                let _ = writeln!(out, "{}", step.content().unwrap_or(""));
            }
            _ => {
                let _ = writeln!(
                    out,
                    "{} {} failed after {} attempt(s): {}",
                    style("##").red(),
                    style(step.agent.display_name()).bold(),
                    step.attempts,
                    step.error().unwrap_or("unknown error")
                );
            }
        }
    }

    if let Some(FailureCause::Persistence { operation, error }) = &outcome.failure {
        let _ = writeln!(out);
        let _ = writeln!(out, "Storage failure during {}: {}", operation, error);
    }
    out
}

