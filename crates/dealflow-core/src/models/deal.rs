use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::run::WorkflowType;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DealStatus {
    Active,
    Closed,
}

impl DealStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "closed" => Self::Closed,
            _ => Self::Active,
        }
    }
}

/// The company/transaction a run is about.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Deal {
    pub id: String,
    /// Filled in when the first linked run is classified.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deal_type: Option<WorkflowType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deal_size: Option<String>,
    pub status: DealStatus,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deal {
    /// The company details a run linked to this deal starts with.
    pub fn company_context(&self) -> CompanyContext {
        CompanyContext {
            company_name: self.company_name.clone(),
            industry: self.industry.clone(),
            deal_size: self.deal_size.clone(),
            deal_id: Some(self.id.clone()),
        }
    }
}

/// Optional company details supplied alongside a query.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompanyContext {
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub deal_size: Option<String>,
    /// Link the run to an existing deal instead of creating one.
    #[serde(default)]
    pub deal_id: Option<String>,
}

impl CompanyContext {
    pub fn is_empty(&self) -> bool {
        self.company_name.is_none()
            && self.industry.is_none()
            && self.deal_size.is_none()
            && self.deal_id.is_none()
    }
}
