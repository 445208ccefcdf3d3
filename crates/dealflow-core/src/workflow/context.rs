//! Per-run context threaded between steps.
//!
//! Each agent owns one output slot. A slot is written once, by its own step,
//! before the next step starts; later steps read only the fields their
//! `StepSpec` declares.

use std::collections::BTreeMap;

use crate::models::agent::AgentId;
use crate::models::deal::CompanyContext;
use crate::workflow::catalog::ContextField;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DealContext {
    pub query: String,
    pub company_name: Option<String>,
    pub industry: Option<String>,
    pub deal_size: Option<String>,
    outputs: BTreeMap<AgentId, String>,
    completed: Vec<AgentId>,
}

impl DealContext {
    pub fn new(query: impl Into<String>, company: &CompanyContext) -> Self {
        Self {
            query: query.into(),
            company_name: non_blank(&company.company_name),
            industry: non_blank(&company.industry),
            deal_size: non_blank(&company.deal_size),
            outputs: BTreeMap::new(),
            completed: Vec::new(),
        }
    }

    /// Value of a context field, or `None` when it has not been supplied or
    /// produced yet.
    pub fn get(&self, field: ContextField) -> Option<&str> {
        match field {
            ContextField::Query => Some(self.query.as_str()),
            ContextField::CompanyName => self.company_name.as_deref(),
            ContextField::Industry => self.industry.as_deref(),
            ContextField::DealSize => self.deal_size.as_deref(),
            ContextField::Output(agent) => self.outputs.get(&agent).map(|s| s.as_str()),
        }
    }

    pub fn output(&self, agent: AgentId) -> Option<&str> {
        self.outputs.get(&agent).map(|s| s.as_str())
    }

    /// Fill an agent's slot. Returns `false` and leaves the context untouched
    /// if the slot is already filled.
    pub fn record_output(&mut self, agent: AgentId, output: impl Into<String>) -> bool {
        if self.outputs.contains_key(&agent) {
            return false;
        }
        self.outputs.insert(agent, output.into());
        self.completed.push(agent);
        true
    }

    /// Agents whose output has been recorded, in completion order.
    pub fn completed(&self) -> &[AgentId] {
        &self.completed
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_fields() {
        let ctx = DealContext::new(
            "Find targets",
            &CompanyContext {
                company_name: Some("Acme".to_string()),
                industry: Some("  ".to_string()),
                deal_size: None,
                deal_id: None,
            },
        );
        assert_eq!(ctx.get(ContextField::Query), Some("Find targets"));
        assert_eq!(ctx.get(ContextField::CompanyName), Some("Acme"));
        assert_eq!(ctx.get(ContextField::Industry), None);
        assert_eq!(ctx.get(ContextField::DealSize), None);
    }

    #[test]
    fn test_slots_fill_once_in_order() {
        let mut ctx = DealContext::new("q", &CompanyContext::default());
        assert!(ctx.get(ContextField::Output(AgentId::TargetFinder)).is_none());

        assert!(ctx.record_output(AgentId::TargetFinder, "targets"));
        assert!(ctx.record_output(AgentId::Valuer, "valuation"));
        assert!(!ctx.record_output(AgentId::TargetFinder, "overwrite"));

        assert_eq!(ctx.output(AgentId::TargetFinder), Some("targets"));
        assert_eq!(ctx.completed(), &[AgentId::TargetFinder, AgentId::Valuer]);
    }
}
