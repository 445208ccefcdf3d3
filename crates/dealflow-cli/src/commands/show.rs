//! `dealflow show` — Print a persisted run with its step results and
//! conversation.

use std::fmt::Write;

use console::style;
use dealflow_core::models::StepStatus;
use dealflow_core::state::AppState;
use dealflow_core::workflow::{RunRecorder, RunSnapshot};

use super::{print_json, styled_status};

pub async fn show(state: &AppState, run_id: &str, json: bool) -> Result<(), String> {
    let snapshot = state
        .recorder
        .get_run(run_id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("Run {} not found", run_id))?;

    if json {
        let value = serde_json::to_value(&snapshot).map_err(|e| e.to_string())?;
        print_json(&value);
    } else {
        print!("{}", render_snapshot(&snapshot));
    }
    Ok(())
}

/// Human-readable report of a run.
pub fn render_snapshot(snapshot: &RunSnapshot) -> String {
    let run = &snapshot.run;
    let mut out = String::new();

    let _ = writeln!(out, "Run {}", style(&run.id).bold());
    let _ = writeln!(out, "  Status:   {}", styled_status(run.status));
    let _ = writeln!(out, "  Query:    {}", run.query);
    match run.workflow_type {
        Some(wt) => {
            let confidence = run.confidence.map(|c| c.as_str()).unwrap_or("unknown");
            let _ = writeln!(
                out,
                "  Workflow: {} ({}, {} confidence)",
                wt.display_name(),
                wt,
                confidence
            );
        }
        None => {
            let _ = writeln!(out, "  Workflow: not classified");
        }
    }
    if let Some(deal_id) = &run.deal_id {
        let _ = writeln!(out, "  Deal:     {}", deal_id);
    }
    let _ = writeln!(out, "  Created:  {}", run.created_at.to_rfc3339());

    let _ = writeln!(out);
    let _ = writeln!(out, "Steps ({}):", snapshot.steps.len());
    for step in &snapshot.steps {
        let marker = match step.status {
            StepStatus::Success => style("✓").green(),
            StepStatus::Failed => style("✗").red(),
            _ => style("·").dim(),
        };
        let _ = writeln!(
            out,
            "  {} {}. {} [{}ms, {} attempt(s)]",
            marker,
            step.sequence_index + 1,
            step.agent.display_name(),
            step.duration_ms,
            step.attempts
        );
        if let Some(error) = step.error() {
            let _ = writeln!(out, "      error: {}", error);
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Messages ({}):", snapshot.messages.len());
    for message in &snapshot.messages {
        let first_line = message.content.lines().next().unwrap_or("");
        let _ = writeln!(
            out,
            "  [{}] {}",
            message.role.as_str(),
            super::truncate(first_line, 100)
        );
    }
    out
}
