//! `dealflow list` — Recent runs, newest first.

use dealflow_core::models::Run;
use dealflow_core::state::AppState;
use dealflow_core::workflow::RunRecorder;

use super::{styled_status, truncate};

pub async fn list(state: &AppState, limit: usize) -> Result<(), String> {
    let runs = state
        .recorder
        .recent_runs(limit)
        .await
        .map_err(|e| e.to_string())?;

    if runs.is_empty() {
        println!("No runs yet.");
        return Ok(());
    }
    print!("{}", render_runs(&runs));
    Ok(())
}

pub fn render_runs(runs: &[Run]) -> String {
    let mut out = String::new();
    out.push_str("┌──────────────────────────────────────┬────────────┬───────────┬──────────────────────────────┐\n");
    out.push_str("│ Run ID                               │ Workflow   │ Status    │ Query                        │\n");
    out.push_str("├──────────────────────────────────────┼────────────┼───────────┼──────────────────────────────┤\n");
    for run in runs {
        let workflow = run.workflow_type.map(|w| w.as_str()).unwrap_or("-");
        // Pad before styling so escape codes don't break alignment.
        let status = format!("{:<9}", run.status.as_str());
        let status = status.replacen(run.status.as_str(), &styled_status(run.status), 1);
        out.push_str(&format!(
            "│ {:<36} │ {:<10} │ {} │ {:<28} │\n",
            truncate(&run.id, 36),
            workflow,
            status,
            truncate(&run.query, 28)
        ));
    }
    out.push_str("└──────────────────────────────────────┴────────────┴───────────┴──────────────────────────────┘\n");
    out
}
