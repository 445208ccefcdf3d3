//! `dealflow catalog` — Print the workflow catalog in use.
//!
//! When `--catalog FILE` is given the file has already been validated by
//! the time this runs; a broken file fails in `init_state`. Template ids
//! are checked here against the prompt library.

use std::fmt::Write;

use console::style;
use dealflow_core::models::WorkflowType;
use dealflow_core::workflow::WorkflowCatalog;

pub fn show(
    catalog: &WorkflowCatalog,
    prompts_dir: Option<&str>,
    yaml: bool,
) -> Result<(), String> {
    super::checked_prompts(catalog, prompts_dir)?;
    if yaml {
        print!("{}", catalog.to_yaml().map_err(|e| e.to_string())?);
    } else {
        print!("{}", render_catalog(catalog));
    }
    Ok(())
}

pub fn render_catalog(catalog: &WorkflowCatalog) -> String {
    let mut out = String::new();
    for workflow in WorkflowType::ALL {
        let steps = catalog.steps_for(workflow);
        let _ = writeln!(
            out,
            "{} ({}): {} step(s)",
            style(workflow.display_name()).bold(),
            workflow,
            steps.len()
        );
        for (i, step) in steps.iter().enumerate() {
            let requires: Vec<&str> = step.requires.iter().map(|f| f.name()).collect();
            let _ = writeln!(
                out,
                "  {}. {:<24} template: {:<24} requires: {}",
                i + 1,
                step.agent.as_str(),
                step.template_id(),
                requires.join(", ")
            );
        }
        let _ = writeln!(out);
    }
    out
}
