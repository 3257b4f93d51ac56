//! Entry filters
//!
//! Fourteen independent predicates over the feature snapshot, asset
//! descriptor, risk state and open positions. A check never errors out of
//! the pipeline: a fault or a non-finite input becomes a FAIL carrying the
//! cause.

use tracing::debug;

use super::types::FilterCheck;
use crate::config::FilterConfig;
use crate::features::{ExecutionRisk, FeatureSnapshot, Regime};
use crate::position::Position;
use crate::risk::RiskState;
use crate::stream::AssetInfo;

/// Everything a filter may look at
#[derive(Debug, Clone, Copy)]
pub struct FilterContext<'a> {
    pub features: &'a FeatureSnapshot,
    pub config: &'a FilterConfig,
    pub asset: &'a AssetInfo,
    pub risk: &'a RiskState,
    pub open_positions: &'a [Position],
    pub order_size: f64,
    pub regime_threshold: u32,
}

type CheckResult = std::result::Result<FilterCheck, String>;
type CheckFn = fn(&FilterContext<'_>) -> CheckResult;

/// Filters in reporting order
pub const FILTERS: [(&str, CheckFn); 14] = [
    ("regime_gate", regime_gate),
    ("min_liquidity", min_liquidity),
    ("holder_concentration", holder_concentration),
    ("creator_behavior", creator_behavior),
    ("token_permissions", token_permissions),
    ("buyer_breadth", buyer_breadth),
    ("buy_distribution", buy_distribution),
    ("execution_risk", execution_risk),
    ("spread", spread),
    ("graduation_timing", graduation_timing),
    ("net_buy_pressure", net_buy_pressure),
    ("risk_limits", risk_limits),
    ("infrastructure_health", infrastructure_health),
    ("duplicate_position", duplicate_position),
];

/// Run every filter. Always returns one check per filter.
pub fn run_filters(ctx: &FilterContext<'_>) -> Vec<FilterCheck> {
    FILTERS
        .iter()
        .map(|(name, check)| {
            let result = match check(ctx) {
                Ok(result) => result,
                Err(fault) => FilterCheck::fail(name, "n/a", "n/a", format!("{} could not be evaluated: {}", name, fault)),
            };
            debug!(
                asset = %ctx.asset.asset_id,
                filter = %result.name,
                status = ?result.status,
                observed = %result.observed,
                "{}",
                result.reason
            );
            result
        })
        .collect()
}

fn finite(label: &str, value: f64) -> std::result::Result<f64, String> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(format!("{} is not a finite number ({})", label, value))
    }
}

fn regime_gate(ctx: &FilterContext<'_>) -> CheckResult {
    let regime = &ctx.features.regime;
    let observed = format!("{} ({})", regime.regime, regime.score);
    let threshold = format!(">= {}", ctx.regime_threshold);
    Ok(FilterCheck::from_bool(
        "regime_gate",
        regime.regime != Regime::Cold,
        observed,
        threshold,
        format!("Market is {} (score {})", regime.regime, regime.score),
        format!(
            "Market is COLD (score {} below {}), no entries",
            regime.score, ctx.regime_threshold
        ),
    ))
}

fn min_liquidity(ctx: &FilterContext<'_>) -> CheckResult {
    let liquidity = finite("liquidity", ctx.features.execution.liquidity)?;
    let min = ctx.config.min_liquidity;
    Ok(FilterCheck::from_bool(
        "min_liquidity",
        liquidity >= min,
        format!("{:.2}", liquidity),
        format!(">= {:.2}", min),
        format!("Liquidity {:.2} meets minimum {:.2}", liquidity, min),
        format!("Liquidity {:.2} below minimum {:.2}", liquidity, min),
    ))
}

fn holder_concentration(ctx: &FilterContext<'_>) -> CheckResult {
    let top10 = finite("top-10 share", ctx.features.concentration.top10_pct)?;
    let max = ctx.config.max_top10_pct;
    Ok(FilterCheck::from_bool(
        "holder_concentration",
        top10 <= max,
        format!("{:.1}%", top10),
        format!("<= {:.1}%", max),
        format!("Top 10 wallets hold {:.1}% of observed volume", top10),
        format!("Top 10 wallets hold {:.1}% of observed volume, above {:.1}%", top10, max),
    ))
}

fn creator_behavior(ctx: &FilterContext<'_>) -> CheckResult {
    let c = &ctx.features.concentration;
    let holding = finite("creator holding", c.creator_holding_pct)?;
    let max = ctx.config.max_creator_holding_pct;
    let observed = format!("holding {:.1}%, sold {:.1}%", holding, c.creator_sold_pct);
    let threshold = format!("holding <= {:.1}%, not dumping", max);

    if c.suspicious_creator {
        return Ok(FilterCheck::fail(
            "creator_behavior",
            observed,
            threshold,
            format!("Creator sold {:.0}% of their buys", c.creator_sold_pct),
        ));
    }
    Ok(FilterCheck::from_bool(
        "creator_behavior",
        holding <= max,
        observed,
        threshold,
        "Creator is not selling into demand",
        format!("Creator holds {:.1}%, above {:.1}%", holding, max),
    ))
}

fn token_permissions(ctx: &FilterContext<'_>) -> CheckResult {
    let c = &ctx.features.concentration;
    let observed = format!(
        "mint {}, freeze {}",
        if c.mint_authority_revoked { "revoked" } else { "live" },
        if c.freeze_authority_revoked { "revoked" } else { "live" }
    );
    if !ctx.config.require_authorities_revoked {
        return Ok(FilterCheck::pass("token_permissions", observed, "not required", "Authority check disabled"));
    }
    Ok(FilterCheck::from_bool(
        "token_permissions",
        c.mint_authority_revoked && c.freeze_authority_revoked,
        observed,
        "both revoked",
        "Mint and freeze authority revoked",
        "Token still has a live mint or freeze authority",
    ))
}

fn buyer_breadth(ctx: &FilterContext<'_>) -> CheckResult {
    let rate = finite("unique buyers per minute", ctx.features.traction.unique_buyers_per_min)?;
    let min = ctx.config.min_unique_buyers_per_min;
    Ok(FilterCheck::from_bool(
        "buyer_breadth",
        rate >= min,
        format!("{:.2}/min", rate),
        format!(">= {:.2}/min", min),
        format!("{:.1} unique buyers per minute", rate),
        format!("Only {:.1} unique buyers per minute, need {:.1}", rate, min),
    ))
}

fn buy_distribution(ctx: &FilterContext<'_>) -> CheckResult {
    let t = &ctx.features.traction;
    let breadth = finite("breadth score", t.breadth_score)?;
    let min = ctx.config.min_breadth_score;
    let h = t.buy_histogram;
    Ok(FilterCheck::from_bool(
        "buy_distribution",
        breadth >= min,
        format!("{:.2} ({}/{}/{})", breadth, h.small, h.medium, h.large),
        format!(">= {:.2}", min),
        format!("{:.0}% of buys are small or medium", breadth * 100.0),
        format!("Buying is whale-driven: breadth {:.2} below {:.2}", breadth, min),
    ))
}

fn execution_risk(ctx: &FilterContext<'_>) -> CheckResult {
    let e = &ctx.features.execution;
    let slippage = finite("slippage estimate", e.slippage_bps)?;
    let max = ctx.config.max_slippage_bps;
    let observed = format!("{:.0}bps ({:?})", slippage, e.risk);
    let threshold = format!("<= {:.0}bps, not HIGH", max);

    if ctx.features.traction.last_price.is_none() {
        return Ok(FilterCheck::fail("execution_risk", observed, threshold, "No traded price observed to size against"));
    }
    if e.risk == ExecutionRisk::High {
        return Ok(FilterCheck::fail("execution_risk", observed, threshold, "Execution risk is HIGH"));
    }
    Ok(FilterCheck::from_bool(
        "execution_risk",
        slippage <= max,
        observed,
        threshold,
        format!("Estimated slippage {:.0}bps", slippage),
        format!("Estimated slippage {:.0}bps exceeds {:.0}bps", slippage, max),
    ))
}

fn spread(ctx: &FilterContext<'_>) -> CheckResult {
    let spread = finite("spread estimate", ctx.features.execution.spread_bps)?;
    let max = ctx.config.max_spread_bps;
    Ok(FilterCheck::from_bool(
        "spread",
        spread <= max,
        format!("{:.0}bps", spread),
        format!("<= {:.0}bps", max),
        format!("Spread {:.0}bps", spread),
        format!("Spread {:.0}bps wider than {:.0}bps", spread, max),
    ))
}

fn graduation_timing(ctx: &FilterContext<'_>) -> CheckResult {
    let min = ctx.config.graduation_min_secs as f64;
    let max = ctx.config.graduation_max_secs as f64;
    let threshold = format!("{:.0}s-{:.0}s after graduation", min, max);

    let Some(elapsed) = ctx.features.traction.time_since_graduation_secs else {
        return Ok(FilterCheck::pass(
            "graduation_timing",
            "not graduated",
            threshold,
            "Still on the bonding curve, graduation window not applicable",
        ));
    };
    let elapsed = finite("time since graduation", elapsed)?;

    if elapsed < min {
        return Ok(FilterCheck::fail(
            "graduation_timing",
            format!("{:.0}s", elapsed),
            threshold,
            format!("Graduated {:.0}s ago, waiting for {:.0}s to let migration settle", elapsed, min),
        ));
    }
    Ok(FilterCheck::from_bool(
        "graduation_timing",
        elapsed <= max,
        format!("{:.0}s", elapsed),
        threshold,
        format!("Graduated {:.0}s ago, inside the entry window", elapsed),
        format!("Graduated {:.0}s ago, entry window closed at {:.0}s", elapsed, max),
    ))
}

fn net_buy_pressure(ctx: &FilterContext<'_>) -> CheckResult {
    let pressure = finite("net buy pressure", ctx.features.traction.net_buy_pressure)?;
    let min = ctx.config.min_net_buy_pressure;
    Ok(FilterCheck::from_bool(
        "net_buy_pressure",
        pressure >= min,
        format!("{:+.2}", pressure),
        format!(">= {:+.2}", min),
        format!("Net buy pressure {:+.2}", pressure),
        format!("Net buy pressure {:+.2} below {:+.2}", pressure, min),
    ))
}

fn risk_limits(ctx: &FilterContext<'_>) -> CheckResult {
    let size = finite("order size", ctx.order_size)?;
    let gate = ctx.risk.check_pre_trade(size);
    let observed = if gate.allowed {
        "all clear".to_string()
    } else {
        gate.failed_names().join(", ")
    };
    Ok(FilterCheck::from_bool(
        "risk_limits",
        gate.allowed,
        observed,
        "7/7 gate conditions",
        "Within all portfolio risk limits",
        format!("Risk limits: {}", gate.reason),
    ))
}

fn infrastructure_health(ctx: &FilterContext<'_>) -> CheckResult {
    let e = &ctx.features.execution;
    let latency = finite("average latency", e.avg_latency_ms)?;
    let failure_rate = finite("failure rate", e.failure_rate)?;
    let max_latency = ctx.config.max_latency_ms;
    let max_failures = ctx.config.max_failure_rate;
    Ok(FilterCheck::from_bool(
        "infrastructure_health",
        latency <= max_latency && failure_rate <= max_failures,
        format!("{:.0}ms, {:.0}% failures", latency, failure_rate * 100.0),
        format!("<= {:.0}ms, <= {:.0}%", max_latency, max_failures * 100.0),
        "Execution path healthy",
        format!(
            "Execution path degraded: {:.0}ms latency, {:.0}% failures",
            latency,
            failure_rate * 100.0
        ),
    ))
}

fn duplicate_position(ctx: &FilterContext<'_>) -> CheckResult {
    let existing = ctx
        .open_positions
        .iter()
        .find(|p| p.is_active() && p.asset_id == ctx.asset.asset_id);
    Ok(match existing {
        Some(p) => FilterCheck::fail(
            "duplicate_position",
            format!("position {}", p.id),
            "no open position",
            "Already holding this asset",
        ),
        None => FilterCheck::pass("duplicate_position", "none", "no open position", "No existing position"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExitConfig;
    use crate::features::*;
    use crate::filter::CheckStatus;

    fn healthy_snapshot() -> FeatureSnapshot {
        FeatureSnapshot {
            asset_id: "mint1".to_string(),
            computed_at: 1_000_000,
            regime: RegimeFeatures {
                launch_count: 12,
                launch_rate: 2.4,
                volume_proxy: 300.0,
                graduation_count: 3,
                volatility_proxy: 0.8,
                score: 60,
                regime: Regime::Normal,
                reason: "NORMAL".to_string(),
            },
            traction: TractionFeatures {
                unique_buyers: 25,
                unique_buyers_per_min: 5.0,
                buy_count: 40,
                sell_count: 10,
                net_buy_pressure: 0.6,
                buy_histogram: BuyHistogram { small: 20, medium: 15, large: 5 },
                breadth_score: 0.875,
                velocity: 3.0,
                acceleration: 0.5,
                time_since_launch_secs: Some(240.0),
                time_since_graduation_secs: None,
                last_price: Some(0.0001),
            },
            concentration: ConcentrationFeatures {
                unique_holders: 25,
                top10_pct: 45.0,
                top20_pct: 70.0,
                creator_holding_pct: 5.0,
                creator_sold_pct: 0.0,
                suspicious_creator: false,
                mint_authority_revoked: true,
                freeze_authority_revoked: true,
                risk: ConcentrationRisk::Medium,
            },
            execution: ExecutionRiskFeatures {
                order_size: 0.05,
                liquidity: 40.0,
                spread_bps: 50.0,
                slippage_bps: 1.0,
                avg_latency_ms: 400.0,
                failure_rate: 0.05,
                risk: ExecutionRisk::Low,
            },
        }
    }

    fn run(features: &FeatureSnapshot, risk: &RiskState, positions: &[Position]) -> Vec<FilterCheck> {
        let config = FilterConfig::default();
        let asset = AssetInfo::new("mint1");
        run_filters(&FilterContext {
            features,
            config: &config,
            asset: &asset,
            risk,
            open_positions: positions,
            order_size: 0.05,
            regime_threshold: 40,
        })
    }

    fn status_of(checks: &[FilterCheck], name: &str) -> CheckStatus {
        checks.iter().find(|c| c.name == name).map(|c| c.status).unwrap()
    }

    #[test]
    fn test_healthy_asset_passes_all() {
        let checks = run(&healthy_snapshot(), &RiskState::default(), &[]);
        assert_eq!(checks.len(), 14);
        let failed: Vec<_> = checks.iter().filter(|c| !c.passed()).collect();
        assert!(failed.is_empty(), "{:?}", failed);
    }

    #[test]
    fn test_order_matches_filter_table() {
        let checks = run(&healthy_snapshot(), &RiskState::default(), &[]);
        let names: Vec<&str> = checks.iter().map(|c| c.name.as_str()).collect();
        let expected: Vec<&str> = FILTERS.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_cold_regime_fails_gate() {
        let mut f = healthy_snapshot();
        f.regime.regime = Regime::Cold;
        f.regime.score = 10;
        let checks = run(&f, &RiskState::default(), &[]);
        assert_eq!(status_of(&checks, "regime_gate"), CheckStatus::Fail);
    }

    #[test]
    fn test_non_finite_input_degrades_to_fail() {
        let mut f = healthy_snapshot();
        f.execution.liquidity = f64::NAN;
        f.traction.net_buy_pressure = f64::INFINITY;
        let checks = run(&f, &RiskState::default(), &[]);

        assert_eq!(checks.len(), 14);
        let liquidity = checks.iter().find(|c| c.name == "min_liquidity").unwrap();
        assert_eq!(liquidity.status, CheckStatus::Fail);
        assert!(liquidity.reason.contains("could not be evaluated"));
        assert_eq!(status_of(&checks, "net_buy_pressure"), CheckStatus::Fail);
    }

    #[test]
    fn test_suspicious_creator_fails() {
        let mut f = healthy_snapshot();
        f.concentration.suspicious_creator = true;
        f.concentration.creator_sold_pct = 80.0;
        let checks = run(&f, &RiskState::default(), &[]);
        assert_eq!(status_of(&checks, "creator_behavior"), CheckStatus::Fail);
    }

    #[test]
    fn test_live_authority_fails() {
        let mut f = healthy_snapshot();
        f.concentration.freeze_authority_revoked = false;
        let checks = run(&f, &RiskState::default(), &[]);
        assert_eq!(status_of(&checks, "token_permissions"), CheckStatus::Fail);
    }

    #[test]
    fn test_graduation_window() {
        let mut f = healthy_snapshot();

        f.traction.time_since_graduation_secs = Some(10.0);
        assert_eq!(status_of(&run(&f, &RiskState::default(), &[]), "graduation_timing"), CheckStatus::Fail);

        f.traction.time_since_graduation_secs = Some(120.0);
        assert_eq!(status_of(&run(&f, &RiskState::default(), &[]), "graduation_timing"), CheckStatus::Pass);

        f.traction.time_since_graduation_secs = Some(4_000.0);
        assert_eq!(status_of(&run(&f, &RiskState::default(), &[]), "graduation_timing"), CheckStatus::Fail);
    }

    #[test]
    fn test_missing_price_fails_execution_risk() {
        let mut f = healthy_snapshot();
        f.traction.last_price = None;
        let checks = run(&f, &RiskState::default(), &[]);
        assert_eq!(status_of(&checks, "execution_risk"), CheckStatus::Fail);
    }

    #[test]
    fn test_halted_risk_state_fails_risk_limits() {
        let mut risk = RiskState::default();
        risk.is_halted = true;
        let checks = run(&healthy_snapshot(), &risk, &[]);
        let check = checks.iter().find(|c| c.name == "risk_limits").unwrap();
        assert_eq!(check.status, CheckStatus::Fail);
        assert!(check.observed.contains("kill_switch"));
    }

    #[test]
    fn test_degraded_infrastructure_fails() {
        let mut f = healthy_snapshot();
        f.execution.failure_rate = 0.5;
        let checks = run(&f, &RiskState::default(), &[]);
        assert_eq!(status_of(&checks, "infrastructure_health"), CheckStatus::Fail);
    }

    #[test]
    fn test_existing_position_is_duplicate() {
        let position = Position::open("mint1", 0.0001, 0.05, 0.0, 500.0, &ExitConfig::default(), None, 0);
        let checks = run(&healthy_snapshot(), &RiskState::default(), &[position]);
        assert_eq!(status_of(&checks, "duplicate_position"), CheckStatus::Fail);
    }
}
