//! Feature aggregation
//!
//! Bounded event windows and the regime, traction, concentration and
//! execution-risk snapshots computed from them.

pub mod aggregator;
pub mod types;
pub mod window;

pub use aggregator::FeatureAggregator;
pub use types::{
    breadth_score, classify_execution_risk, classify_regime, concentration_risk, estimate_slippage_bps,
    estimate_spread_bps, regime_score, BuyHistogram, ConcentrationFeatures, ConcentrationRisk, ExecutionRisk,
    ExecutionRiskFeatures, FeatureSnapshot, Regime, RegimeFeatures, TractionFeatures,
};
pub use window::EventWindow;
