//! Decision Card Builder
//!
//! Runs the filter pipeline over a fresh feature snapshot, renders the
//! AND-verdict, and for a TRADE attaches the execution plan and risk impact.

use std::sync::Arc;
use tracing::info;

use super::checks::{run_filters, FilterContext};
use super::types::{DecisionCard, ExecutionPlan, FilterCheck, RiskImpact, Route, Verdict};
use crate::config::{ExitConfig, FilterConfig, RegimeConfig, RiskConfig};
use crate::error::Result;
use crate::features::{FeatureAggregator, FeatureSnapshot};
use crate::position::Position;
use crate::risk::RiskState;
use crate::store::Store;
use crate::stream::AssetInfo;

/// Orders above this size are split in two
pub const LARGE_ORDER_THRESHOLD: f64 = 1.0;
/// Failing reasons quoted in a SKIP summary
const MAX_SUMMARY_REASONS: usize = 3;

/// Builds and persists decision cards
pub struct DecisionCardBuilder {
    filters: FilterConfig,
    regime: RegimeConfig,
    risk: RiskConfig,
    exits: ExitConfig,
    store: Arc<dyn Store>,
}

impl DecisionCardBuilder {
    pub fn new(
        filters: FilterConfig,
        regime: RegimeConfig,
        risk: RiskConfig,
        exits: ExitConfig,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            filters,
            regime,
            risk,
            exits,
            store,
        }
    }

    /// Entry size for the current equity
    pub fn order_size(&self, equity: f64) -> f64 {
        (self.risk.max_risk_per_trade_pct / 100.0 * equity).max(0.0)
    }

    /// Evaluate an asset and persist the card
    pub async fn evaluate(
        &self,
        aggregator: &FeatureAggregator,
        asset: &AssetInfo,
        risk_state: &RiskState,
        open_positions: &[Position],
    ) -> Result<DecisionCard> {
        let card = self.build(aggregator, asset, risk_state, open_positions);
        self.store.insert_decision(&card).await?;
        Ok(card)
    }

    /// Evaluate an asset without persisting
    pub fn build(
        &self,
        aggregator: &FeatureAggregator,
        asset: &AssetInfo,
        risk_state: &RiskState,
        open_positions: &[Position],
    ) -> DecisionCard {
        let order_size = self.order_size(risk_state.equity);
        let features = aggregator.snapshot(&asset.asset_id, asset, order_size, &self.regime);
        self.build_from_features(features, asset, risk_state, open_positions, order_size)
    }

    fn build_from_features(
        &self,
        features: FeatureSnapshot,
        asset: &AssetInfo,
        risk_state: &RiskState,
        open_positions: &[Position],
        order_size: f64,
    ) -> DecisionCard {
        let checks = run_filters(&FilterContext {
            features: &features,
            config: &self.filters,
            asset,
            risk: risk_state,
            open_positions,
            order_size,
            regime_threshold: self.regime.score_threshold,
        });

        let verdict = if checks.iter().all(FilterCheck::passed) {
            Verdict::Trade
        } else {
            Verdict::Skip
        };

        let (execution_plan, risk_impact) = match (verdict, features.traction.last_price) {
            (Verdict::Trade, Some(price)) => (
                Some(self.execution_plan(asset, &features, order_size, price)),
                Some(self.risk_impact(risk_state, order_size)),
            ),
            _ => (None, None),
        };

        let summary = summarize(verdict, &checks, &features);
        let card = DecisionCard {
            id: uuid::Uuid::new_v4().to_string(),
            asset_id: asset.asset_id.clone(),
            timestamp: features.computed_at,
            verdict,
            summary,
            checks,
            features,
            execution_plan,
            risk_impact,
        };

        let failed = card.failed_checks().count();
        match verdict {
            Verdict::Trade => info!(
                asset = %card.asset_id,
                decision = %card.id,
                size = order_size,
                "Decision TRADE: {}",
                card.summary.join(" ")
            ),
            Verdict::Skip => info!(
                asset = %card.asset_id,
                decision = %card.id,
                failed,
                "Decision SKIP: {}",
                card.summary.join(" ")
            ),
        }

        card
    }

    fn execution_plan(&self, asset: &AssetInfo, features: &FeatureSnapshot, order_size: f64, price: f64) -> ExecutionPlan {
        let route = if asset.has_pool { Route::Pool } else { Route::BondingCurve };
        let slices = if order_size > LARGE_ORDER_THRESHOLD {
            vec![order_size / 2.0, order_size / 2.0]
        } else {
            vec![order_size]
        };

        ExecutionPlan {
            asset_id: asset.asset_id.clone(),
            route,
            order_size,
            slices,
            reference_price: price,
            estimated_slippage_bps: features.execution.slippage_bps,
            max_slippage_bps: self.filters.max_slippage_bps,
        }
    }

    fn risk_impact(&self, risk_state: &RiskState, order_size: f64) -> RiskImpact {
        let max_loss = order_size * self.exits.stop_loss_pct / 100.0;
        let new_exposure = risk_state.current_exposure + order_size;
        let pct = |v: f64| {
            if risk_state.equity > 0.0 {
                v / risk_state.equity * 100.0
            } else {
                0.0
            }
        };

        RiskImpact {
            max_loss,
            max_loss_pct_of_equity: pct(max_loss),
            new_exposure,
            new_exposure_pct: pct(new_exposure),
        }
    }
}

/// One to three sentences explaining the verdict
fn summarize(verdict: Verdict, checks: &[FilterCheck], features: &FeatureSnapshot) -> Vec<String> {
    match verdict {
        Verdict::Skip => checks
            .iter()
            .filter(|c| !c.passed())
            .take(MAX_SUMMARY_REASONS)
            .map(|c| format!("{}.", c.reason))
            .collect(),
        Verdict::Trade => vec![
            format!(
                "{} market (score {}, {:.1} launches/min).",
                features.regime.regime, features.regime.score, features.regime.launch_rate
            ),
            format!(
                "{:.1} unique buyers/min with net buy pressure {:+.2}.",
                features.traction.unique_buyers_per_min, features.traction.net_buy_pressure
            ),
            format!(
                "Execution {:?}: ~{:.0}bps slippage, {:.0}bps spread.",
                features.execution.risk, features.execution.slippage_bps, features.execution.spread_bps
            ),
        ],
    }
}
