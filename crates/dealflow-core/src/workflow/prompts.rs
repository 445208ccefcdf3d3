//! Instruction templates — the system prompts behind each template id.
//!
//! Built-in templates cover the classifier (`orchestrator`) and every
//! catalog agent. A directory of Markdown files can override or extend
//! them; the file stem is the template id and optional YAML frontmatter
//! supplies a display name:
//!
//! ```markdown
//! ---
//! name: "Valuer"
//! description: "DCF and comparables"
//! ---
//! You are a valuation specialist...
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::models::agent::AgentId;

/// Template id used by the classifier.
pub const ORCHESTRATOR_TEMPLATE: &str = "orchestrator";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub system_prompt: String,
}

impl PromptTemplate {
    fn builtin(id: &str, name: &str, system_prompt: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
            system_prompt: system_prompt.to_string(),
        }
    }

    /// Parse a template from a Markdown file with optional YAML frontmatter.
    pub fn from_markdown(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read prompt '{}': {}", path.display(), e))?;

        let id = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .ok_or_else(|| format!("Prompt path '{}' has no file name", path.display()))?;

        #[derive(Deserialize)]
        struct FrontMatter {
            name: Option<String>,
            description: Option<String>,
        }

        let (front, body) = match split_frontmatter(&content) {
            Some((front, body)) => {
                let fm: FrontMatter = serde_yaml::from_str(front).map_err(|e| {
                    format!("Failed to parse frontmatter in '{}': {}", path.display(), e)
                })?;
                (Some(fm), body)
            }
            None => (None, content.as_str()),
        };

        let body = body.trim();
        if body.is_empty() {
            return Err(format!("Prompt '{}' is empty", path.display()));
        }

        let (name, description) = match front {
            Some(fm) => (fm.name, fm.description),
            None => (None, None),
        };

        Ok(Self {
            name: name.unwrap_or_else(|| id.clone()),
            id,
            description,
            system_prompt: body.to_string(),
        })
    }
}

fn split_frontmatter(content: &str) -> Option<(&str, &str)> {
    let rest = content.trim_start().strip_prefix("---")?;
    let end = rest.find("\n---")?;
    let front = &rest[..end];
    let body = &rest[end + 4..];
    Some((front, body))
}

/// Immutable set of instruction templates, loaded once at start-up.
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    templates: HashMap<String, PromptTemplate>,
}

impl PromptLibrary {
    pub fn builtin() -> Self {
        let templates = builtin_templates()
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect();
        Self { templates }
    }

    /// Built-in templates, overridden by any `*.md` files in `dir`.
    pub fn with_overrides(dir: &str) -> Result<Self, String> {
        let mut library = Self::builtin();
        let n = library.load_dir(dir)?;
        tracing::info!("[Prompts] Loaded {} prompt overrides from '{}'", n, dir);
        Ok(library)
    }

    /// Built-in templates, overridden by `./prompts/` and then
    /// `~/.dealflow/prompts/` when those directories exist.
    pub fn load_default() -> Self {
        let mut library = Self::builtin();
        for dir in default_dirs() {
            let Some(dir) = dir.to_str() else { continue };
            if !Path::new(dir).is_dir() {
                continue;
            }
            match library.load_dir(dir) {
                Ok(n) => tracing::info!("[Prompts] Loaded {} prompt overrides from '{}'", n, dir),
                Err(e) => tracing::warn!("[Prompts] Skipping '{}': {}", dir, e),
            }
        }
        library
    }

    fn load_dir(&mut self, dir: &str) -> Result<usize, String> {
        let dir_path = Path::new(dir);
        if !dir_path.is_dir() {
            return Err(format!("Prompt directory '{}' does not exist", dir));
        }

        let mut count = 0;
        for entry in std::fs::read_dir(dir_path)
            .map_err(|e| format!("Failed to read directory '{}': {}", dir, e))?
        {
            let path = entry
                .map_err(|e| format!("Directory entry error: {}", e))?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let template = PromptTemplate::from_markdown(&path)?;
            tracing::debug!("[Prompts] Loaded template: {} ({})", template.id, template.name);
            self.templates.insert(template.id.clone(), template);
            count += 1;
        }
        Ok(count)
    }

    pub fn get(&self, id: &str) -> Option<&PromptTemplate> {
        self.templates.get(id)
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.templates.keys().map(|k| k.as_str()).collect();
        ids.sort_unstable();
        ids
    }
}

/// Override directories searched by [`PromptLibrary::load_default`], in
/// load order.
pub fn default_dirs() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("prompts")];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".dealflow").join("prompts"));
    }
    paths
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}

fn builtin_templates() -> Vec<PromptTemplate> {
    let mut templates = vec![PromptTemplate::builtin(
        ORCHESTRATOR_TEMPLATE,
        "Orchestrator",
        "You route investment-banking requests to the right advisory workflow. \
         Classify the query as exactly one of: buyer_ma (the client wants to acquire \
         or merge with a company), seller_ma (the client wants to sell, divest or exit), \
         or ipo (the client wants to take a company public).\n\
         An initial keyword assessment is provided as a hint; override it when the query \
         says otherwise. Reply with the label first, then a one-paragraph rationale.",
    )];

    for agent in AgentId::ALL {
        templates.push(PromptTemplate::builtin(
            agent.as_str(),
            agent.display_name(),
            agent_prompt(agent),
        ));
    }
    templates
}

fn agent_prompt(agent: AgentId) -> &'static str {
    match agent {
        AgentId::TargetFinder => {
            "You are an M&A origination analyst. Based on the buyer's criteria, identify \
             8-12 realistic acquisition targets. Present them as a table with columns: \
             Company Name | Location | Est. Revenue (USD M) | Est. EBITDA Margin | \
             Strategic Fit Score (1-5) | Key Investment Highlights | Source/Rationale. \
             Treat any input marked 'Not available' as unknown."
        }
        AgentId::Valuer => {
            "You are a valuation specialist. For the most promising target from the \
             previous analysis provide: 1. DCF valuation with 5-year projections \
             2. Comparable company analysis 3. Precedent transaction analysis \
             4. Sensitivity analysis on key assumptions 5. Valuation summary and \
             recommendation. Structure the response with clear sections."
        }
        AgentId::SynergyAnalyst => {
            "You are a post-merger integration analyst. Using the target list and \
             valuation, quantify revenue and cost synergies, integration costs, timing \
             of realisation and the key risks to delivery."
        }
        AgentId::BidStrategist => {
            "You are an M&A bid strategist. Using the targets, valuation and synergy \
             analysis, recommend an opening bid, walk-away price, deal structure \
             (cash, stock, earn-out), negotiation tactics and the main deal risks."
        }
        AgentId::SellerPrep => {
            "You are a sell-side advisor. Assess the company's readiness for sale: \
             financial normalisation, key value drivers, issues to fix before launch, \
             a preliminary valuation range and the contents of the information memorandum."
        }
        AgentId::MarketOutreach => {
            "You are a sell-side coverage banker. Using the sale preparation, build a \
             buyer universe split into strategic and financial buyers, explain each \
             buyer's rationale and propose a staged outreach and process timeline."
        }
        AgentId::IpoReadinessAssessor => {
            "You are an equity capital markets advisor. Assess the company's readiness \
             for an IPO: financial track record, governance, reporting systems, equity \
             story and market conditions. Finish with a readiness score and gap list."
        }
        AgentId::UnderwriterSelector => {
            "You are an ECM advisor selecting an underwriting syndicate. Using the \
             readiness assessment, recommend lead and co-managers with sector \
             credentials, distribution strength, research coverage and fee expectations."
        }
        AgentId::S1Preparer => {
            "You are a securities lawyer drafting an S-1 registration statement outline. \
             Using the readiness assessment and underwriter plan, outline the business \
             section, risk factors, MD&A themes, use of proceeds and offering terms."
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_dirs_start_with_local_prompts() {
        let dirs = default_dirs();
        assert_eq!(dirs[0], PathBuf::from("prompts"));
        assert!(dirs.iter().skip(1).all(|d| d.ends_with(".dealflow/prompts")));
    }

    #[test]
    fn test_builtin_covers_every_agent() {
        let library = PromptLibrary::builtin();
        assert!(library.get(ORCHESTRATOR_TEMPLATE).is_some());
        for agent in AgentId::ALL {
            let template = library.get(agent.as_str()).unwrap();
            assert_eq!(template.name, agent.display_name());
            assert!(!template.system_prompt.is_empty());
        }
        assert_eq!(library.ids().len(), AgentId::ALL.len() + 1);
    }

    #[test]
    fn test_markdown_overrides_builtin() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("valuer.md"),
            "---\nname: \"House Valuer\"\n---\nUse only trading comparables.\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("esg_review.md"), "Review ESG exposure.").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let library = PromptLibrary::with_overrides(dir.path().to_str().unwrap()).unwrap();
        let valuer = library.get("valuer").unwrap();
        assert_eq!(valuer.name, "House Valuer");
        assert_eq!(valuer.system_prompt, "Use only trading comparables.");

        let esg = library.get("esg_review").unwrap();
        assert_eq!(esg.name, "esg_review");
        assert!(library.get("notes").is_none());
        assert!(library.get("target_finder").is_some());
    }

    #[test]
    fn test_empty_prompt_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("valuer.md"), "---\nname: x\n---\n   \n").unwrap();
        assert!(PromptLibrary::with_overrides(dir.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn test_missing_dir_is_error() {
        assert!(PromptLibrary::with_overrides("/nonexistent/prompts").is_err());
    }
}
