//! Workflow catalog — which agents run, in which order, for each workflow type.
//!
//! The catalog is data. The built-in table can be replaced by a YAML document:
//!
//! ```yaml
//! workflows:
//!   buyer_ma:
//!     - agent: target_finder
//!       requires: [query, company_name, industry, deal_size]
//!     - agent: valuer
//!       requires: [query, company_name, industry, target_finder]
//!       template: valuer_v2
//!   seller_ma:
//!     - agent: seller_prep
//!       requires: [query, company_name]
//!     - agent: market_outreach
//!       requires: [query, seller_prep]
//!   ipo:
//!     - agent: ipo_readiness_assessor
//!       requires: [query, company_name]
//! ```
//!
//! `requires` entries name either a base field (`query`, `company_name`,
//! `industry`, `deal_size`) or an agent whose output the step consumes.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::models::agent::AgentId;
use crate::models::run::WorkflowType;
use crate::workflow::prompts::PromptLibrary;

/// A field of the per-run context a step can declare as input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ContextField {
    Query,
    CompanyName,
    Industry,
    DealSize,
    /// The output of an earlier step.
    Output(AgentId),
}

impl ContextField {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::CompanyName => "company_name",
            Self::Industry => "industry",
            Self::DealSize => "deal_size",
            Self::Output(agent) => agent.as_str(),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "query" => Some(Self::Query),
            "company_name" => Some(Self::CompanyName),
            "industry" => Some(Self::Industry),
            "deal_size" => Some(Self::DealSize),
            other => AgentId::from_str(other).map(Self::Output),
        }
    }
}

impl TryFrom<String> for ContextField {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("unknown context field '{}'", value))
    }
}

impl From<ContextField> for String {
    fn from(field: ContextField) -> Self {
        field.name().to_string()
    }
}

/// One step of a workflow: the agent, the context it reads, and the
/// instruction template forwarded to the reasoning service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    pub agent: AgentId,

    #[serde(default)]
    pub requires: Vec<ContextField>,

    /// Instruction template id; defaults to the agent id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

impl StepSpec {
    pub fn new(agent: AgentId, requires: &[ContextField]) -> Self {
        Self {
            agent,
            requires: requires.to_vec(),
            template: None,
        }
    }

    pub fn template_id(&self) -> &str {
        self.template.as_deref().unwrap_or(self.agent.as_str())
    }

    /// Every step produces exactly its own output slot.
    pub fn produces(&self) -> ContextField {
        ContextField::Output(self.agent)
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CatalogError {
    #[error("Failed to read catalog file '{path}': {message}")]
    Io { path: String, message: String },

    #[error("Failed to parse catalog YAML: {0}")]
    Parse(String),

    #[error("Workflow '{0}' is missing from the catalog")]
    MissingWorkflow(WorkflowType),

    #[error("Workflow '{0}' has no steps")]
    EmptyWorkflow(WorkflowType),

    #[error("Workflow '{workflow}' lists agent '{agent}' more than once")]
    DuplicateAgent { workflow: WorkflowType, agent: AgentId },

    #[error("Step '{agent}' in workflow '{workflow}' requires '{field}', which no earlier step produces")]
    UnsatisfiedInput {
        workflow: WorkflowType,
        agent: AgentId,
        field: &'static str,
    },

    #[error("Step '{agent}' in workflow '{workflow}' uses template '{template}', which the prompt library does not have")]
    UnknownTemplate {
        workflow: WorkflowType,
        agent: AgentId,
        template: String,
    },
}

/// Immutable mapping from workflow type to its ordered steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowCatalog {
    workflows: BTreeMap<WorkflowType, Vec<StepSpec>>,
}

impl WorkflowCatalog {
    /// The built-in advisory pipelines.
    pub fn builtin() -> Self {
        use AgentId::*;
        use ContextField::*;

        let mut workflows = BTreeMap::new();
        workflows.insert(
            WorkflowType::BuyerMa,
            vec![
                StepSpec::new(TargetFinder, &[Query, CompanyName, Industry, DealSize]),
                StepSpec::new(
                    Valuer,
                    &[Query, CompanyName, Industry, DealSize, Output(TargetFinder)],
                ),
                StepSpec::new(
                    SynergyAnalyst,
                    &[Query, CompanyName, Industry, Output(TargetFinder), Output(Valuer)],
                ),
                StepSpec::new(
                    BidStrategist,
                    &[
                        Query,
                        CompanyName,
                        DealSize,
                        Output(TargetFinder),
                        Output(Valuer),
                        Output(SynergyAnalyst),
                    ],
                ),
            ],
        );
        workflows.insert(
            WorkflowType::SellerMa,
            vec![
                StepSpec::new(SellerPrep, &[Query, CompanyName, Industry, DealSize]),
                StepSpec::new(
                    MarketOutreach,
                    &[Query, CompanyName, Industry, Output(SellerPrep)],
                ),
            ],
        );
        workflows.insert(
            WorkflowType::Ipo,
            vec![
                StepSpec::new(IpoReadinessAssessor, &[Query, CompanyName, Industry, DealSize]),
                StepSpec::new(
                    UnderwriterSelector,
                    &[Query, CompanyName, Industry, DealSize, Output(IpoReadinessAssessor)],
                ),
                StepSpec::new(
                    S1Preparer,
                    &[
                        Query,
                        CompanyName,
                        Industry,
                        Output(IpoReadinessAssessor),
                        Output(UnderwriterSelector),
                    ],
                ),
            ],
        );

        Self { workflows }
    }

    /// Parse and validate a catalog from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, CatalogError> {
        let catalog: Self =
            serde_yaml::from_str(yaml).map_err(|e| CatalogError::Parse(e.to_string()))?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load and validate a catalog from a YAML file.
    pub fn from_file(path: &str) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path).map_err(|e| CatalogError::Io {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        Self::from_yaml(&content)
    }

    pub fn to_yaml(&self) -> Result<String, CatalogError> {
        serde_yaml::to_string(self).map_err(|e| CatalogError::Parse(e.to_string()))
    }

    /// Check that every workflow exists, is non-empty, has no repeated
    /// agent, and only consumes outputs of earlier steps.
    pub fn validate(&self) -> Result<(), CatalogError> {
        for workflow in WorkflowType::ALL {
            let steps = self
                .workflows
                .get(&workflow)
                .ok_or(CatalogError::MissingWorkflow(workflow))?;
            if steps.is_empty() {
                return Err(CatalogError::EmptyWorkflow(workflow));
            }

            let mut produced: HashSet<AgentId> = HashSet::new();
            for step in steps {
                for field in &step.requires {
                    if let ContextField::Output(upstream) = field {
                        if !produced.contains(upstream) {
                            return Err(CatalogError::UnsatisfiedInput {
                                workflow,
                                agent: step.agent,
                                field: field.name(),
                            });
                        }
                    }
                }
                if !produced.insert(step.agent) {
                    return Err(CatalogError::DuplicateAgent {
                        workflow,
                        agent: step.agent,
                    });
                }
            }
        }
        Ok(())
    }

    /// Check that every step's template exists in `prompts`.
    pub fn check_templates(&self, prompts: &PromptLibrary) -> Result<(), CatalogError> {
        for (workflow, steps) in &self.workflows {
            if let Some(step) = steps.iter().find(|s| prompts.get(s.template_id()).is_none()) {
                return Err(CatalogError::UnknownTemplate {
                    workflow: *workflow,
                    agent: step.agent,
                    template: step.template_id().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Ordered steps for a workflow type.
    pub fn steps_for(&self, workflow: WorkflowType) -> &[StepSpec] {
        self.workflows
            .get(&workflow)
            .map(|s| s.as_slice())
            .unwrap_or(&[])
    }

    pub fn agents_for(&self, workflow: WorkflowType) -> Vec<AgentId> {
        self.steps_for(workflow).iter().map(|s| s.agent).collect()
    }
}

impl Default for WorkflowCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
