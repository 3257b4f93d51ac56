//! Position model

use serde::{Deserialize, Serialize};

use crate::config::ExitConfig;

/// Share of the bought tokens below which a remainder counts as dust
pub const DUST_FRACTION: f64 = 1e-6;

/// Position lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionStatus {
    Open,
    PartiallyClosed,
    Closed,
}

impl PositionStatus {
    pub fn is_active(&self) -> bool {
        !matches!(self, PositionStatus::Closed)
    }
}

/// Why a position (or part of it) was exited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    TrailingStop,
    TimeStop,
    Manual,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExitReason::StopLoss => "STOP_LOSS",
            ExitReason::TakeProfit => "TAKE_PROFIT",
            ExitReason::TrailingStop => "TRAILING_STOP",
            ExitReason::TimeStop => "TIME_STOP",
            ExitReason::Manual => "MANUAL",
        };
        write!(f, "{}", s)
    }
}

/// One rung of a position's take-profit ladder
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TakeProfitLevel {
    pub gain_pct: f64,
    pub sell_pct: f64,
    pub triggered: bool,
}

/// A paper or live position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub id: String,
    pub asset_id: String,
    pub status: PositionStatus,
    pub entry_price: f64,
    pub current_price: f64,
    /// Quote units spent on the fill, fee excluded
    pub entry_size: f64,
    pub entry_fee: f64,
    pub tokens_bought: f64,
    pub tokens_sold: f64,
    pub tokens_remaining: f64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub stop_loss_price: f64,
    pub take_profit_levels: Vec<TakeProfitLevel>,
    pub trailing_stop_pct: f64,
    pub trailing_stop_price: f64,
    pub high_water_mark: f64,
    pub time_stop_minutes: u64,
    pub opened_at: i64,
    pub updated_at: i64,
    pub closed_at: Option<i64>,
    pub decision_id: Option<String>,
    pub exit_reason: Option<ExitReason>,
    /// Sell orders submitted against this position, used in idempotency keys
    #[serde(default)]
    pub sell_attempts: u32,
}

impl Position {
    /// Open a position from a confirmed fill, seeding exit parameters
    pub fn open(
        asset_id: &str,
        entry_price: f64,
        entry_size: f64,
        entry_fee: f64,
        tokens: f64,
        exits: &ExitConfig,
        decision_id: Option<String>,
        now: i64,
    ) -> Self {
        let take_profit_levels = exits
            .take_profit_levels
            .iter()
            .map(|t| TakeProfitLevel {
                gain_pct: t.gain_pct,
                sell_pct: t.sell_pct,
                triggered: false,
            })
            .collect();

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            asset_id: asset_id.to_string(),
            status: PositionStatus::Open,
            entry_price,
            current_price: entry_price,
            entry_size,
            entry_fee,
            tokens_bought: tokens,
            tokens_sold: 0.0,
            tokens_remaining: tokens,
            realized_pnl: 0.0,
            unrealized_pnl: -entry_fee,
            stop_loss_price: entry_price * (1.0 - exits.stop_loss_pct / 100.0),
            take_profit_levels,
            trailing_stop_pct: exits.trailing_stop_pct,
            trailing_stop_price: entry_price * (1.0 - exits.trailing_stop_pct / 100.0),
            high_water_mark: entry_price,
            time_stop_minutes: exits.time_stop_minutes,
            opened_at: now,
            updated_at: now,
            closed_at: None,
            decision_id,
            exit_reason: None,
            sell_attempts: 0,
        }
    }

    /// P&L percent at a price, relative to entry
    pub fn pnl_pct(&self, price: f64) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        (price - self.entry_price) / self.entry_price * 100.0
    }

    /// Entry cost (fee included) still attributed to the remaining tokens
    pub fn cost_basis(&self) -> f64 {
        if self.tokens_bought <= 0.0 {
            return 0.0;
        }
        (self.entry_size + self.entry_fee) * (self.tokens_remaining / self.tokens_bought)
    }

    /// Mark the position to a new price, raising the high-water mark
    pub fn mark_price(&mut self, price: f64, now: i64) {
        if !price.is_finite() || price <= 0.0 {
            return;
        }
        self.current_price = price;
        if price > self.high_water_mark {
            self.high_water_mark = price;
        }
        self.trailing_stop_price = self.high_water_mark * (1.0 - self.trailing_stop_pct / 100.0);
        self.unrealized_pnl = self.tokens_remaining * price - self.cost_basis();
        self.updated_at = now;
    }

    pub fn minutes_held(&self, now: i64) -> f64 {
        ((now - self.opened_at) as f64 / 60_000.0).max(0.0)
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Remove sold tokens and book their P&L. Returns the cost basis released.
    pub fn apply_sell(&mut self, tokens: f64, net_proceeds: f64, reason: ExitReason, now: i64) -> f64 {
        let tokens = tokens.min(self.tokens_remaining).max(0.0);
        let basis_before = self.cost_basis();

        self.tokens_sold += tokens;
        self.tokens_remaining = (self.tokens_bought - self.tokens_sold).max(0.0);
        let is_dust = self.tokens_remaining <= self.tokens_bought * DUST_FRACTION;
        if is_dust {
            // Dust goes out with the final sell
            self.tokens_sold = self.tokens_bought;
            self.tokens_remaining = 0.0;
        }

        let released = basis_before - self.cost_basis();
        self.realized_pnl += net_proceeds - released;
        self.exit_reason = Some(reason);
        self.updated_at = now;

        if is_dust {
            self.status = PositionStatus::Closed;
            self.closed_at = Some(now);
            self.unrealized_pnl = 0.0;
        } else {
            self.status = PositionStatus::PartiallyClosed;
            self.unrealized_pnl = self.tokens_remaining * self.current_price - self.cost_basis();
        }

        released
    }

    /// Mark the first untriggered take-profit rung at or below a gain as hit
    pub fn mark_level_triggered(&mut self, gain_pct: f64) {
        if let Some(level) = self
            .take_profit_levels
            .iter_mut()
            .find(|l| !l.triggered && (l.gain_pct - gain_pct).abs() < 1e-9)
        {
            level.triggered = true;
        }
    }
}
