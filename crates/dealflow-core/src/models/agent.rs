use serde::{Deserialize, Serialize};

/// Closed set of advisory agents a workflow step can be bound to.
///
/// Adding a step means adding a variant here and an entry in the
/// workflow catalog; the execution engine never branches on it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AgentId {
    TargetFinder,
    Valuer,
    SynergyAnalyst,
    BidStrategist,
    SellerPrep,
    MarketOutreach,
    IpoReadinessAssessor,
    UnderwriterSelector,
    S1Preparer,
}

impl AgentId {
    pub const ALL: [AgentId; 9] = [
        Self::TargetFinder,
        Self::Valuer,
        Self::SynergyAnalyst,
        Self::BidStrategist,
        Self::SellerPrep,
        Self::MarketOutreach,
        Self::IpoReadinessAssessor,
        Self::UnderwriterSelector,
        Self::S1Preparer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TargetFinder => "target_finder",
            Self::Valuer => "valuer",
            Self::SynergyAnalyst => "synergy_analyst",
            Self::BidStrategist => "bid_strategist",
            Self::SellerPrep => "seller_prep",
            Self::MarketOutreach => "market_outreach",
            Self::IpoReadinessAssessor => "ipo_readiness_assessor",
            Self::UnderwriterSelector => "underwriter_selector",
            Self::S1Preparer => "s1_preparer",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == s)
    }

    /// Human-readable name used in chat history messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::TargetFinder => "Target Finder",
            Self::Valuer => "Valuer",
            Self::SynergyAnalyst => "Synergy Analyst",
            Self::BidStrategist => "Bid Strategist",
            Self::SellerPrep => "Seller Prep",
            Self::MarketOutreach => "Market Outreach",
            Self::IpoReadinessAssessor => "IPO Readiness Assessor",
            Self::UnderwriterSelector => "Underwriter Selector",
            Self::S1Preparer => "S-1 Preparer",
        }
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
