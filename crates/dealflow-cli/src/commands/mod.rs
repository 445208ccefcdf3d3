//! CLI command implementations.
//!
//! Each submodule corresponds to a top-level CLI command and reuses
//! the dealflow-core domain logic through `AppState`.

pub mod catalog;
pub mod classify;
pub mod list;
pub mod run;
pub mod show;

use std::sync::Arc;

use console::style;
use dealflow_core::models::RunStatus;
use dealflow_core::state::{AppState, AppStateInner};
use dealflow_core::workflow::{HttpReasoningClient, PromptLibrary, ReasoningConfig, WorkflowCatalog};
use dealflow_core::Database;

/// Open the database and load the catalog (built-in unless a YAML file
/// is given).
pub fn open_state(db_path: &str, catalog_file: Option<&str>) -> Result<AppState, String> {
    let db = Database::open(db_path)
        .map_err(|e| format!("Failed to open database '{}': {}", db_path, e))?;
    let catalog = match catalog_file {
        Some(path) => WorkflowCatalog::from_file(path).map_err(|e| e.to_string())?,
        None => WorkflowCatalog::builtin(),
    };
    Ok(Arc::new(AppStateInner::new(db, catalog)))
}

/// Like [`open_state`], but exits the process on failure.
pub fn init_state(db_path: &str, catalog_file: Option<&str>) -> AppState {
    open_state(db_path, catalog_file).unwrap_or_else(|e| {
        eprintln!("{}", e);
        std::process::exit(1);
    })
}

/// Load the instruction templates: built-ins plus `prompts_dir`, or the
/// default override directories when none is given.
pub fn load_prompts(prompts_dir: Option<&str>) -> Result<PromptLibrary, String> {
    match prompts_dir {
        Some(dir) => PromptLibrary::with_overrides(dir),
        None => Ok(PromptLibrary::load_default()),
    }
}

/// Load the templates and check that every step of `catalog` has one.
pub fn checked_prompts(
    catalog: &WorkflowCatalog,
    prompts_dir: Option<&str>,
) -> Result<PromptLibrary, String> {
    let prompts = load_prompts(prompts_dir)?;
    catalog.check_templates(&prompts).map_err(|e| e.to_string())?;
    Ok(prompts)
}

/// Build the HTTP reasoning client from the environment.
pub fn reasoning_client(prompts: PromptLibrary) -> Result<HttpReasoningClient, String> {
    let config = ReasoningConfig::from_env()?;
    tracing::info!(
        "[CLI] Reasoning provider {:?}, model {}",
        config.provider,
        config.model
    );
    Ok(HttpReasoningClient::new(config, prompts))
}

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}

pub fn styled_status(status: RunStatus) -> String {
    let label = status.as_str();
    match status {
        RunStatus::Completed => style(label).green().to_string(),
        RunStatus::Failed => style(label).red().to_string(),
        RunStatus::Cancelled => style(label).yellow().to_string(),
        _ => style(label).cyan().to_string(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}
