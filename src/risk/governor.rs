//! Risk Governor
//!
//! Owns the portfolio risk state: cash equity, exposure, trade counters,
//! loss streak and the kill switch. Exposes the pre-trade gate and the
//! auto-halt evaluator. Constructed once and shared behind a single mutex;
//! every equity or exposure mutation goes through it.
//!
//! `equity` is cash. Buys move cost plus fee from cash into exposure, sells
//! move net proceeds back. Daily P&L is measured on NAV (cash + open cost
//! basis + unrealized), so opening a position does not register as a loss.

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::incident::{Incident, IncidentCategory, Severity};
use crate::config::RiskConfig;
use crate::error::Result;
use crate::store::Store;

/// Tolerance for the percentage comparisons of the gate
const GATE_EPSILON: f64 = 1e-9;
/// Auto-resume delay after a drawdown halt
pub const DRAWDOWN_RESUME_MS: i64 = 24 * 60 * 60 * 1000;
const HOUR_MS: i64 = 60 * 60 * 1000;

/// Hard limits enforced by the gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskLimits {
    pub max_risk_per_trade_pct: f64,
    pub max_exposure_pct: f64,
    pub daily_drawdown_limit_pct: f64,
    pub max_trades_per_hour: u32,
    pub max_trades_per_day: u32,
    pub max_consecutive_losses: u32,
}

impl From<&RiskConfig> for RiskLimits {
    fn from(config: &RiskConfig) -> Self {
        Self {
            max_risk_per_trade_pct: config.max_risk_per_trade_pct,
            max_exposure_pct: config.max_exposure_pct,
            daily_drawdown_limit_pct: config.daily_drawdown_limit_pct,
            max_trades_per_hour: config.max_trades_per_hour,
            max_trades_per_day: config.max_trades_per_day,
            max_consecutive_losses: config.max_consecutive_losses,
        }
    }
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self::from(&RiskConfig::default())
    }
}

/// Portfolio risk state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskState {
    /// Cash
    pub equity: f64,
    /// NAV at the last daily reset
    pub start_of_day_equity: f64,
    pub today_pnl: f64,
    pub today_pnl_pct: f64,
    /// Most negative P&L % since the last reset
    pub today_drawdown_pct: f64,
    /// Cost basis of open positions
    pub current_exposure: f64,
    pub current_exposure_pct: f64,
    pub unrealized_pnl: f64,
    pub open_position_count: u32,
    pub today_trade_count: u32,
    pub hour_trade_count: u32,
    pub consecutive_losses: u32,
    pub is_halted: bool,
    pub halt_reason: Option<String>,
    pub halted_at: Option<i64>,
    pub resume_at: Option<i64>,
    pub day_started_at: i64,
    pub limits: RiskLimits,
}

impl Default for RiskState {
    fn default() -> Self {
        Self::new(10.0, RiskLimits::default(), 0)
    }
}

/// One condition of the pre-trade gate
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GateCondition {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

/// Pre-trade gate outcome
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreTradeCheck {
    pub allowed: bool,
    pub conditions: Vec<GateCondition>,
    pub reason: String,
}

impl PreTradeCheck {
    pub fn failed_names(&self) -> Vec<&'static str> {
        self.conditions.iter().filter(|c| !c.passed).map(|c| c.name).collect()
    }
}

impl RiskState {
    pub fn new(equity: f64, limits: RiskLimits, now: i64) -> Self {
        Self {
            equity,
            start_of_day_equity: equity,
            today_pnl: 0.0,
            today_pnl_pct: 0.0,
            today_drawdown_pct: 0.0,
            current_exposure: 0.0,
            current_exposure_pct: 0.0,
            unrealized_pnl: 0.0,
            open_position_count: 0,
            today_trade_count: 0,
            hour_trade_count: 0,
            consecutive_losses: 0,
            is_halted: false,
            halt_reason: None,
            halted_at: None,
            resume_at: None,
            day_started_at: now,
            limits,
        }
    }

    /// Cash plus open cost basis plus unrealized P&L
    pub fn nav(&self) -> f64 {
        self.equity + self.current_exposure + self.unrealized_pnl
    }

    fn exposure_pct(&self, exposure: f64) -> f64 {
        if self.equity > 0.0 {
            exposure / self.equity * 100.0
        } else if exposure > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    }

    /// Recompute P&L, drawdown and exposure percentages
    pub fn recompute(&mut self) {
        self.today_pnl = self.nav() - self.start_of_day_equity;
        self.today_pnl_pct = if self.start_of_day_equity > 0.0 {
            self.today_pnl / self.start_of_day_equity * 100.0
        } else {
            0.0
        };
        self.today_drawdown_pct = self.today_drawdown_pct.min(self.today_pnl_pct).min(0.0);
        self.current_exposure_pct = self.exposure_pct(self.current_exposure);
    }

    /// Evaluate the seven gate conditions for a trade of `trade_size`
    pub fn check_pre_trade(&self, trade_size: f64) -> PreTradeCheck {
        let limits = &self.limits;
        let new_exposure_pct = self.exposure_pct(self.current_exposure + trade_size);
        let trade_pct = self.exposure_pct(trade_size);

        let conditions = vec![
            GateCondition {
                name: "kill_switch",
                passed: !self.is_halted,
                detail: match &self.halt_reason {
                    Some(reason) if self.is_halted => format!("trading halted: {}", reason),
                    _ if self.is_halted => "trading halted".to_string(),
                    _ => "active".to_string(),
                },
            },
            GateCondition {
                name: "daily_drawdown",
                passed: self.today_drawdown_pct.abs() < limits.daily_drawdown_limit_pct,
                detail: format!(
                    "drawdown {:.2}% vs limit {:.2}%",
                    self.today_drawdown_pct, limits.daily_drawdown_limit_pct
                ),
            },
            GateCondition {
                name: "max_exposure",
                passed: new_exposure_pct <= limits.max_exposure_pct + GATE_EPSILON,
                detail: format!(
                    "exposure after trade {:.2}% vs max {:.2}%",
                    new_exposure_pct, limits.max_exposure_pct
                ),
            },
            GateCondition {
                name: "per_trade_risk",
                passed: trade_size.is_finite() && trade_pct <= limits.max_risk_per_trade_pct + GATE_EPSILON,
                detail: format!(
                    "trade {:.2}% of equity vs max {:.2}%",
                    trade_pct, limits.max_risk_per_trade_pct
                ),
            },
            GateCondition {
                name: "hourly_trades",
                passed: self.hour_trade_count < limits.max_trades_per_hour,
                detail: format!("{}/{} trades this hour", self.hour_trade_count, limits.max_trades_per_hour),
            },
            GateCondition {
                name: "daily_trades",
                passed: self.today_trade_count < limits.max_trades_per_day,
                detail: format!("{}/{} trades today", self.today_trade_count, limits.max_trades_per_day),
            },
            GateCondition {
                name: "consecutive_losses",
                passed: self.consecutive_losses < limits.max_consecutive_losses,
                detail: format!(
                    "{}/{} consecutive losses",
                    self.consecutive_losses, limits.max_consecutive_losses
                ),
            },
        ];

        let failed: Vec<&GateCondition> = conditions.iter().filter(|c| !c.passed).collect();
        let allowed = failed.is_empty();
        let reason = if allowed {
            "all risk checks passed".to_string()
        } else {
            format!(
                "blocked by {}",
                failed
                    .iter()
                    .map(|c| format!("{} ({})", c.name, c.detail))
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        };

        PreTradeCheck {
            allowed,
            conditions,
            reason,
        }
    }
}

/// Risk state owner
pub struct RiskGovernor {
    state: RiskState,
    store: Arc<dyn Store>,
}

impl RiskGovernor {
    pub fn new(starting_equity: f64, limits: RiskLimits, store: Arc<dyn Store>, now: i64) -> Self {
        info!(
            equity = starting_equity,
            max_exposure_pct = limits.max_exposure_pct,
            daily_drawdown_limit_pct = limits.daily_drawdown_limit_pct,
            "Risk governor initialized"
        );
        Self {
            state: RiskState::new(starting_equity, limits, now),
            store,
        }
    }

    pub fn state(&self) -> &RiskState {
        &self.state
    }

    pub fn is_halted(&self) -> bool {
        self.state.is_halted
    }

    /// Reload trade counts, loss streak and open-position totals from the store
    pub async fn refresh_counters(&mut self, now: i64) -> Result<()> {
        let today = self.store.confirmed_buy_count_since(self.state.day_started_at).await?;
        let hour = self.store.confirmed_buy_count_since(now - HOUR_MS).await?;
        let losses = self.store.consecutive_losses().await?;
        let open = self.store.open_positions().await?;

        self.state.today_trade_count = today;
        self.state.hour_trade_count = hour;
        self.state.consecutive_losses = losses;
        self.state.open_position_count = open.len() as u32;
        self.state.current_exposure = open.iter().map(|p| p.cost_basis()).sum();
        self.state.unrealized_pnl = open.iter().map(|p| p.unrealized_pnl).sum();
        self.state.recompute();
        Ok(())
    }

    /// Refresh counters, then run the gate
    pub async fn pre_trade_check(&mut self, trade_size: f64, now: i64) -> Result<PreTradeCheck> {
        self.refresh_counters(now).await?;
        let check = self.state.check_pre_trade(trade_size);
        if !check.allowed {
            info!(trade_size, reason = %check.reason, "Pre-trade gate blocked");
        }
        Ok(check)
    }

    /// Book a confirmed buy
    pub fn record_buy(&mut self, cost: f64, fee: f64) {
        self.state.equity -= cost + fee;
        self.state.current_exposure += cost + fee;
        self.state.open_position_count += 1;
        self.state.today_trade_count += 1;
        self.state.hour_trade_count += 1;
        self.state.recompute();
    }

    /// Book a confirmed sell releasing `cost_basis` of exposure
    pub fn record_sell(&mut self, cost_basis: f64, net_proceeds: f64, closed: bool) {
        self.state.equity += net_proceeds;
        self.state.current_exposure = (self.state.current_exposure - cost_basis).max(0.0);
        if closed {
            self.state.open_position_count = self.state.open_position_count.saturating_sub(1);
        }
        self.state.recompute();
    }

    /// Mark open positions to market
    pub fn update_unrealized(&mut self, unrealized: f64) {
        self.state.unrealized_pnl = unrealized;
        self.state.recompute();
    }

    /// Halt all new trading. Always yields a CRITICAL incident.
    pub fn activate_kill_switch(&mut self, reason: &str, now: i64, resume_at: Option<i64>) -> Incident {
        self.halt(reason, now, resume_at);
        error!(reason, resume_at = ?resume_at, "KILL SWITCH ACTIVATED");

        let mut incident = Incident::new(
            Severity::Critical,
            IncidentCategory::KillSwitch,
            format!("Kill switch activated: {}", reason),
            now,
        );
        incident = match resume_at {
            Some(ts) => incident.with_auto_action(format!("halted until {}", format_ts(ts))),
            None => incident.with_auto_action("halted until manual deactivation"),
        };
        incident
    }

    /// Resume trading. Returns an INFO incident if the switch was active.
    pub fn deactivate_kill_switch(&mut self, now: i64) -> Option<Incident> {
        if !self.state.is_halted {
            return None;
        }
        let reason = self.state.halt_reason.take().unwrap_or_default();
        self.state.is_halted = false;
        self.state.halted_at = None;
        self.state.resume_at = None;
        info!(previous_reason = %reason, "Kill switch deactivated");

        Some(
            Incident::new(
                Severity::Info,
                IncidentCategory::KillSwitch,
                format!("Kill switch deactivated (was: {})", reason),
                now,
            )
            .resolved(),
        )
    }

    fn halt(&mut self, reason: &str, now: i64, resume_at: Option<i64>) {
        self.state.is_halted = true;
        self.state.halt_reason = Some(reason.to_string());
        self.state.halted_at = Some(now);
        self.state.resume_at = resume_at;
    }

    /// Halt on drawdown or loss streak. Open positions are left to their exits.
    pub fn run_auto_halt_checks(&mut self, now: i64) -> Option<Incident> {
        if self.state.is_halted {
            return None;
        }
        let limits = self.state.limits.clone();

        if self.state.today_drawdown_pct.abs() >= limits.daily_drawdown_limit_pct {
            let reason = format!(
                "daily drawdown {:.2}% reached limit {:.2}%",
                self.state.today_drawdown_pct, limits.daily_drawdown_limit_pct
            );
            let mut incident = self.activate_kill_switch(&reason, now, Some(now + DRAWDOWN_RESUME_MS));
            incident.category = IncidentCategory::DailyDrawdown;
            return Some(incident);
        }

        if self.state.consecutive_losses >= limits.max_consecutive_losses {
            let reason = format!(
                "{} consecutive losses reached limit {}",
                self.state.consecutive_losses, limits.max_consecutive_losses
            );
            self.halt(&reason, now, None);
            warn!(%reason, "Trading halted on loss streak");
            return Some(
                Incident::new(Severity::Warning, IncidentCategory::ConsecutiveLosses, reason, now)
                    .with_auto_action("halted until manual deactivation"),
            );
        }

        None
    }

    /// True when `now` falls on a later UTC day than the current trading day
    pub fn is_new_day(&self, now: i64) -> bool {
        day_of(now) > day_of(self.state.day_started_at)
    }

    /// Start a new trading day. Auto-resumes an expired halt.
    pub fn reset_daily_counters(&mut self, now: i64) -> Option<Incident> {
        self.state.start_of_day_equity = self.state.nav();
        self.state.today_pnl = 0.0;
        self.state.today_pnl_pct = 0.0;
        self.state.today_drawdown_pct = 0.0;
        self.state.today_trade_count = 0;
        self.state.hour_trade_count = 0;
        self.state.day_started_at = now;
        self.state.recompute();
        info!(start_of_day_equity = self.state.start_of_day_equity, "Daily risk counters reset");

        self.resume_if_due(now)
    }

    /// Deactivate a halt whose resume time has passed
    pub fn resume_if_due(&mut self, now: i64) -> Option<Incident> {
        match self.state.resume_at {
            Some(resume_at) if self.state.is_halted && now >= resume_at => self.deactivate_kill_switch(now),
            _ => None,
        }
    }
}

fn day_of(ts: i64) -> i64 {
    ts.div_euclid(24 * HOUR_MS)
}

fn format_ts(ts: i64) -> String {
    Utc.timestamp_millis_opt(ts)
        .single()
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExitConfig;
    use crate::position::{ExitReason, Position};
    use crate::store::MemoryStore;
    use crate::trading::{Order, OrderSide, OrderSource};

    fn governor() -> (RiskGovernor, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let gov = RiskGovernor::new(10.0, RiskLimits::default(), store.clone(), 0);
        (gov, store)
    }

    #[test]
    fn test_default_state_allows_small_trade() {
        let state = RiskState::default();
        let check = state.check_pre_trade(0.02);
        assert!(check.allowed, "{}", check.reason);
        assert_eq!(check.conditions.len(), 7);
    }

    #[test]
    fn test_halted_state_blocks() {
        let mut state = RiskState::default();
        state.is_halted = true;
        state.halt_reason = Some("manual".to_string());

        let check = state.check_pre_trade(0.02);
        assert!(!check.allowed);
        assert!(check.reason.contains("halted"));
        assert_eq!(check.failed_names(), vec!["kill_switch"]);
    }

    #[test]
    fn test_drawdown_beyond_limit_blocks() {
        let mut state = RiskState::default();
        state.today_drawdown_pct = -2.5;
        let check = state.check_pre_trade(0.02);
        assert!(!check.allowed);
        assert!(check.failed_names().contains(&"daily_drawdown"));
    }

    #[test]
    fn test_hourly_cap_blocks() {
        let mut state = RiskState::default();
        state.hour_trade_count = 3;
        let check = state.check_pre_trade(0.02);
        assert!(!check.allowed);
        assert_eq!(check.failed_names(), vec!["hourly_trades"]);
    }

    #[test]
    fn test_reason_lists_every_failure() {
        let mut state = RiskState::default();
        state.consecutive_losses = 3;
        state.today_trade_count = 10;
        let check = state.check_pre_trade(1.0);
        let failed = check.failed_names();
        assert!(failed.contains(&"consecutive_losses"));
        assert!(failed.contains(&"daily_trades"));
        assert!(failed.contains(&"per_trade_risk"));
        for name in failed {
            assert!(check.reason.contains(name));
        }
    }

    #[test]
    fn test_exact_risk_budget_passes() {
        let state = RiskState::default();
        // 0.5% of 10
        assert!(state.check_pre_trade(0.05).allowed);
        assert!(!state.check_pre_trade(0.0501).allowed);
    }

    #[test]
    fn test_drawdown_is_monotone_until_reset() {
        let (mut gov, _) = governor();
        gov.update_unrealized(-0.1);
        assert!((gov.state().today_drawdown_pct + 1.0).abs() < 1e-9);
        gov.update_unrealized(0.05);
        assert!((gov.state().today_drawdown_pct + 1.0).abs() < 1e-9);
        assert!(gov.state().today_pnl_pct > 0.0);

        gov.reset_daily_counters(1);
        assert_eq!(gov.state().today_drawdown_pct, 0.0);
    }

    #[test]
    fn test_buy_does_not_register_loss() {
        let (mut gov, _) = governor();
        gov.record_buy(0.05, 0.0);
        assert!((gov.state().equity - 9.95).abs() < 1e-12);
        assert!((gov.state().current_exposure - 0.05).abs() < 1e-12);
        assert!(gov.state().today_pnl.abs() < 1e-12);
        assert_eq!(gov.state().today_trade_count, 1);
    }

    #[test]
    fn test_kill_switch_cycle() {
        let (mut gov, _) = governor();
        let incident = gov.activate_kill_switch("operator", 100, None);
        assert_eq!(incident.severity, Severity::Critical);
        assert!(gov.is_halted());
        assert!(!gov.state().check_pre_trade(0.01).allowed);

        let resumed = gov.deactivate_kill_switch(200).unwrap();
        assert_eq!(resumed.severity, Severity::Info);
        assert!(!gov.is_halted());
        assert!(gov.deactivate_kill_switch(300).is_none());
    }

    #[test]
    fn test_auto_halt_on_drawdown() {
        let (mut gov, _) = governor();
        gov.update_unrealized(-0.25);

        let incident = gov.run_auto_halt_checks(1_000).unwrap();
        assert_eq!(incident.severity, Severity::Critical);
        assert_eq!(incident.category, IncidentCategory::DailyDrawdown);
        assert_eq!(gov.state().resume_at, Some(1_000 + DRAWDOWN_RESUME_MS));

        // Already halted: no second incident
        assert!(gov.run_auto_halt_checks(2_000).is_none());
    }

    #[test]
    fn test_auto_halt_on_loss_streak() {
        let (mut gov, _) = governor();
        gov.state.consecutive_losses = 3;

        let incident = gov.run_auto_halt_checks(1_000).unwrap();
        assert_eq!(incident.severity, Severity::Warning);
        assert!(gov.state().resume_at.is_none());
        assert!(gov.is_halted());
    }

    #[test]
    fn test_daily_reset_resumes_expired_halt() {
        let (mut gov, _) = governor();
        gov.update_unrealized(-0.3);
        gov.run_auto_halt_checks(0);
        gov.update_unrealized(0.0);

        // Before the resume time: still halted
        assert!(gov.reset_daily_counters(DRAWDOWN_RESUME_MS - 1).is_none());
        assert!(gov.is_halted());

        let incident = gov.reset_daily_counters(DRAWDOWN_RESUME_MS).unwrap();
        assert_eq!(incident.severity, Severity::Info);
        assert!(!gov.is_halted());
        assert!(gov.state().check_pre_trade(0.02).allowed);
    }

    #[test]
    fn test_new_day_detection() {
        let (gov, _) = governor();
        assert!(!gov.is_new_day(HOUR_MS));
        assert!(gov.is_new_day(24 * HOUR_MS + 1));
    }

    #[tokio::test]
    async fn test_refresh_counters_from_store() {
        let (mut gov, store) = governor();
        let now = 10 * HOUR_MS;

        let mut order = Order::new(OrderSide::Buy, OrderSource::Entry, "mint1", "d1:0", 0.05, 1.0, now - 1_000)
            .with_decision("d1");
        order.confirm(0.05, 1.0, 0.0, 0.0, now - 900);
        store.insert_order(&order).await.unwrap();

        let open = Position::open("mint1", 1.0, 0.05, 0.0, 0.05, &ExitConfig::default(), None, now);
        store.upsert_position(&open).await.unwrap();

        let mut lost = Position::open("mint0", 1.0, 0.05, 0.0, 0.05, &ExitConfig::default(), None, 0);
        lost.apply_sell(0.05, 0.01, ExitReason::StopLoss, now - 500);
        store.upsert_position(&lost).await.unwrap();

        let check = gov.pre_trade_check(0.02, now).await.unwrap();
        assert!(check.allowed, "{}", check.reason);
        assert_eq!(gov.state().hour_trade_count, 1);
        assert_eq!(gov.state().today_trade_count, 1);
        assert_eq!(gov.state().consecutive_losses, 1);
        assert_eq!(gov.state().open_position_count, 1);
        assert!((gov.state().current_exposure - 0.05).abs() < 1e-12);
    }
}
