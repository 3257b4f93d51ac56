//! Feature snapshot types and the scoring functions behind them

use serde::{Deserialize, Serialize};

/// Market-wide activity classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Regime {
    Mania,
    Normal,
    Cold,
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Regime::Mania => write!(f, "MANIA"),
            Regime::Normal => write!(f, "NORMAL"),
            Regime::Cold => write!(f, "COLD"),
        }
    }
}

/// Holder concentration risk
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConcentrationRisk {
    Low,
    Medium,
    High,
    Extreme,
}

/// Execution quality risk
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionRisk {
    Low,
    Medium,
    High,
}

/// Regime score at or above which the market is MANIA
pub const MANIA_SCORE: u32 = 70;

/// Composite regime score in [0, 100].
///
/// Each component is scaled, capped at 1.0, then weighted:
/// launches / 20 x 30, volume / 500 x 40, graduations / 5 x 30.
pub fn regime_score(launches: u32, volume: f64, graduations: u32) -> u32 {
    let volume = if volume.is_finite() { volume.max(0.0) } else { 0.0 };
    let launch_score = (launches as f64 / 20.0).min(1.0) * 30.0;
    let volume_score = (volume / 500.0).min(1.0) * 40.0;
    let graduation_score = (graduations as f64 / 5.0).min(1.0) * 30.0;

    (launch_score + volume_score + graduation_score).round().clamp(0.0, 100.0) as u32
}

/// Map a regime score to a category
pub fn classify_regime(score: u32, normal_threshold: u32) -> Regime {
    if score >= MANIA_SCORE {
        Regime::Mania
    } else if score >= normal_threshold {
        Regime::Normal
    } else {
        Regime::Cold
    }
}

/// Share of buys coming from small and medium sized buyers
pub fn breadth_score(small: u32, medium: u32, large: u32) -> f64 {
    let total = small + medium + large;
    (small + medium) as f64 / total.max(1) as f64
}

/// Categorize concentration from the top-10 share and creator behavior
pub fn concentration_risk(top10_pct: f64, suspicious_creator: bool) -> ConcentrationRisk {
    if top10_pct > 80.0 || suspicious_creator {
        ConcentrationRisk::Extreme
    } else if top10_pct > 60.0 {
        ConcentrationRisk::High
    } else if top10_pct > 40.0 {
        ConcentrationRisk::Medium
    } else {
        ConcentrationRisk::Low
    }
}

/// Estimated slippage in basis points for an order against a liquidity depth
pub fn estimate_slippage_bps(order_size: f64, liquidity: f64) -> f64 {
    if order_size <= 0.0 {
        return 0.0;
    }
    (1000.0 * order_size / liquidity.max(f64::EPSILON)).round()
}

/// Spread estimate, inversely proportional to depth
pub fn estimate_spread_bps(liquidity: f64) -> f64 {
    (1000.0 / liquidity.max(f64::EPSILON)).clamp(50.0, 1000.0)
}

/// Categorize execution quality
pub fn classify_execution_risk(slippage_bps: f64, avg_latency_ms: f64, failure_rate: f64) -> ExecutionRisk {
    if slippage_bps > 500.0 || avg_latency_ms > 2000.0 || failure_rate > 0.2 {
        ExecutionRisk::High
    } else if slippage_bps > 200.0 || avg_latency_ms > 1000.0 || failure_rate > 0.1 {
        ExecutionRisk::Medium
    } else {
        ExecutionRisk::Low
    }
}

/// Market-wide activity over the trailing window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegimeFeatures {
    pub launch_count: u32,
    /// Launches per minute
    pub launch_rate: f64,
    /// Summed buy volume
    pub volume_proxy: f64,
    pub graduation_count: u32,
    /// Coefficient of variation of trade sizes
    pub volatility_proxy: f64,
    pub score: u32,
    pub regime: Regime,
    pub reason: String,
}

/// Buy size histogram
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyHistogram {
    /// < 0.1 units
    pub small: u32,
    /// 0.1 to 1 units
    pub medium: u32,
    /// >= 1 unit
    pub large: u32,
}

impl BuyHistogram {
    pub fn record(&mut self, amount: f64) {
        if amount < 0.1 {
            self.small += 1;
        } else if amount < 1.0 {
            self.medium += 1;
        } else {
            self.large += 1;
        }
    }

    pub fn total(&self) -> u32 {
        self.small + self.medium + self.large
    }
}

/// Per-asset demand over the trailing window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TractionFeatures {
    pub unique_buyers: u32,
    pub unique_buyers_per_min: f64,
    pub buy_count: u32,
    pub sell_count: u32,
    /// (buys - sells) / (buys + sells), in [-1, 1]
    pub net_buy_pressure: f64,
    pub buy_histogram: BuyHistogram,
    pub breadth_score: f64,
    /// Second-half minus first-half buy volume
    pub velocity: f64,
    /// Change of the per-quarter volume trend
    pub acceleration: f64,
    pub time_since_launch_secs: Option<f64>,
    pub time_since_graduation_secs: Option<f64>,
    pub last_price: Option<f64>,
}

/// Estimated holder concentration from observed buy volume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConcentrationFeatures {
    pub unique_holders: u32,
    pub top10_pct: f64,
    pub top20_pct: f64,
    pub creator_holding_pct: f64,
    pub creator_sold_pct: f64,
    pub suspicious_creator: bool,
    pub mint_authority_revoked: bool,
    pub freeze_authority_revoked: bool,
    pub risk: ConcentrationRisk,
}

/// Estimated execution quality for an intended order size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRiskFeatures {
    pub order_size: f64,
    pub liquidity: f64,
    pub spread_bps: f64,
    pub slippage_bps: f64,
    pub avg_latency_ms: f64,
    pub failure_rate: f64,
    pub risk: ExecutionRisk,
}

/// All features for one evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSnapshot {
    pub asset_id: String,
    pub computed_at: i64,
    pub regime: RegimeFeatures,
    pub traction: TractionFeatures,
    pub concentration: ConcentrationFeatures,
    pub execution: ExecutionRiskFeatures,
}
