//! Filter check and decision card types

use serde::{Deserialize, Serialize};

use crate::features::FeatureSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckStatus {
    Pass,
    Fail,
}

/// Result of one filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCheck {
    pub name: String,
    pub status: CheckStatus,
    pub observed: String,
    pub threshold: String,
    pub reason: String,
}

impl FilterCheck {
    pub fn pass(name: &str, observed: impl ToString, threshold: impl ToString, reason: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Pass,
            observed: observed.to_string(),
            threshold: threshold.to_string(),
            reason: reason.into(),
        }
    }

    pub fn fail(name: &str, observed: impl ToString, threshold: impl ToString, reason: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Fail,
            observed: observed.to_string(),
            threshold: threshold.to_string(),
            reason: reason.into(),
        }
    }

    /// PASS when `ok`, FAIL otherwise, sharing observed/threshold
    pub fn from_bool(
        name: &str,
        ok: bool,
        observed: impl ToString,
        threshold: impl ToString,
        pass_reason: impl Into<String>,
        fail_reason: impl Into<String>,
    ) -> Self {
        if ok {
            Self::pass(name, observed, threshold, pass_reason)
        } else {
            Self::fail(name, observed, threshold, fail_reason)
        }
    }

    pub fn passed(&self) -> bool {
        self.status == CheckStatus::Pass
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Trade,
    Skip,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Trade => write!(f, "TRADE"),
            Verdict::Skip => write!(f, "SKIP"),
        }
    }
}

/// Venue an entry is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Route {
    BondingCurve,
    Pool,
}

/// How a TRADE verdict is executed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPlan {
    pub asset_id: String,
    pub route: Route,
    /// Total quote units to spend
    pub order_size: f64,
    /// Per-order sizes; two when the order is split
    pub slices: Vec<f64>,
    /// Price used to value the fill
    pub reference_price: f64,
    pub estimated_slippage_bps: f64,
    pub max_slippage_bps: f64,
}

/// Estimated portfolio effect of a TRADE
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskImpact {
    /// order size x stop-loss %
    pub max_loss: f64,
    pub max_loss_pct_of_equity: f64,
    pub new_exposure: f64,
    pub new_exposure_pct: f64,
}

/// Immutable audit record of one evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionCard {
    pub id: String,
    pub asset_id: String,
    pub timestamp: i64,
    pub verdict: Verdict,
    pub summary: Vec<String>,
    pub checks: Vec<FilterCheck>,
    pub features: FeatureSnapshot,
    pub execution_plan: Option<ExecutionPlan>,
    pub risk_impact: Option<RiskImpact>,
}

impl DecisionCard {
    pub fn failed_checks(&self) -> impl Iterator<Item = &FilterCheck> {
        self.checks.iter().filter(|c| !c.passed())
    }

    pub fn is_trade(&self) -> bool {
        self.verdict == Verdict::Trade
    }
}
