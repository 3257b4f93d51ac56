//! Exit Evaluator
//!
//! Given a position and a current price, decide whether a stop-loss,
//! take-profit rung, trailing stop or time stop fires. Strict priority,
//! first match wins. The caller raises the high-water mark before calling
//! and persists the triggered rung afterwards.

use serde::{Deserialize, Serialize};

use super::types::{ExitReason, Position};
use crate::config::ExitConfig;

/// Time stop only fires while the gain is below this
pub const TIME_STOP_MAX_GAIN_PCT: f64 = 10.0;

/// An exit the position should take now
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitSignal {
    pub reason: ExitReason,
    /// Share of remaining tokens to sell
    pub sell_pct: f64,
    pub pnl_pct: f64,
    /// Take-profit rung that fired, if any
    pub level_gain_pct: Option<f64>,
    pub detail: String,
}

/// Evaluate exits for a position at `current_price`
pub fn check_exit(position: &Position, current_price: f64, config: &ExitConfig, now: i64) -> Option<ExitSignal> {
    if !position.is_active() || !current_price.is_finite() || current_price <= 0.0 {
        return None;
    }

    let pnl_pct = position.pnl_pct(current_price);

    // 1. Stop-loss
    if pnl_pct <= -config.stop_loss_pct {
        return Some(ExitSignal {
            reason: ExitReason::StopLoss,
            sell_pct: 100.0,
            pnl_pct,
            level_gain_pct: None,
            detail: format!("P&L {:.1}% at or below -{:.1}% stop", pnl_pct, config.stop_loss_pct),
        });
    }

    // 2. Take-profit ladder, first untriggered rung in order
    if let Some(level) = position.take_profit_levels.iter().find(|l| !l.triggered) {
        if pnl_pct >= level.gain_pct {
            return Some(ExitSignal {
                reason: ExitReason::TakeProfit,
                sell_pct: level.sell_pct,
                pnl_pct,
                level_gain_pct: Some(level.gain_pct),
                detail: format!("P&L {:.1}% reached +{:.0}% rung, selling {:.0}%", pnl_pct, level.gain_pct, level.sell_pct),
            });
        }
    }

    // 3. Trailing stop, only while in profit
    let trailing_price = position.high_water_mark * (1.0 - position.trailing_stop_pct / 100.0);
    if current_price <= trailing_price && pnl_pct > 0.0 {
        return Some(ExitSignal {
            reason: ExitReason::TrailingStop,
            sell_pct: 100.0,
            pnl_pct,
            level_gain_pct: None,
            detail: format!(
                "price {:.3e} at or below trailing {:.3e} ({:.0}% off high {:.3e})",
                current_price, trailing_price, position.trailing_stop_pct, position.high_water_mark
            ),
        });
    }

    // 4. Time stop
    let held = position.minutes_held(now);
    if held >= position.time_stop_minutes as f64 && pnl_pct < TIME_STOP_MAX_GAIN_PCT {
        return Some(ExitSignal {
            reason: ExitReason::TimeStop,
            sell_pct: 100.0,
            pnl_pct,
            level_gain_pct: None,
            detail: format!("held {:.0}min with P&L {:.1}%", held, pnl_pct),
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: i64 = 60_000;

    fn position_at(entry: f64) -> Position {
        Position::open("mint1", entry, 1.0, 0.0, 1.0 / entry, &ExitConfig::default(), None, 0)
    }

    #[test]
    fn test_stop_loss() {
        let config = ExitConfig::default();
        let p = position_at(100.0);

        let signal = check_exit(&p, 74.0, &config, MINUTE).unwrap();
        assert_eq!(signal.reason, ExitReason::StopLoss);
        assert_eq!(signal.sell_pct, 100.0);

        assert!(check_exit(&p, 80.0, &config, MINUTE).is_none());
    }

    #[test]
    fn test_take_profit_first_rung() {
        let config = ExitConfig::default();
        let p = position_at(100.0);

        let signal = check_exit(&p, 150.0, &config, MINUTE).unwrap();
        assert_eq!(signal.reason, ExitReason::TakeProfit);
        assert_eq!(signal.level_gain_pct, Some(50.0));
        assert_eq!(signal.sell_pct, 50.0);
    }

    #[test]
    fn test_take_profit_skips_triggered_rungs() {
        let config = ExitConfig::default();
        let mut p = position_at(100.0);
        p.mark_level_triggered(50.0);

        // +60% does not reach the next rung
        p.mark_price(160.0, MINUTE);
        assert!(check_exit(&p, 160.0, &config, MINUTE).is_none());

        p.mark_price(210.0, MINUTE);
        let signal = check_exit(&p, 210.0, &config, MINUTE).unwrap();
        assert_eq!(signal.level_gain_pct, Some(100.0));
    }

    #[test]
    fn test_trailing_stop() {
        let config = ExitConfig::default();
        let mut p = position_at(100.0);
        for level in p.take_profit_levels.iter_mut() {
            level.triggered = true;
        }
        p.mark_price(200.0, MINUTE);
        assert!((p.trailing_stop_price - 170.0).abs() < 1e-9);

        let signal = check_exit(&p, 165.0, &config, MINUTE).unwrap();
        assert_eq!(signal.reason, ExitReason::TrailingStop);

        assert!(check_exit(&p, 175.0, &config, MINUTE).is_none());
    }

    #[test]
    fn test_trailing_stop_requires_profit() {
        let config = ExitConfig::default();
        let mut p = position_at(100.0);
        p.mark_price(105.0, MINUTE);
        // Below trailing (89.25) but in loss and above the stop-loss
        assert!(check_exit(&p, 85.0, &config, MINUTE).is_none());
    }

    #[test]
    fn test_stop_loss_wins_over_trailing() {
        let config = ExitConfig::default();
        let mut p = position_at(100.0);
        p.mark_price(130.0, MINUTE);
        let signal = check_exit(&p, 70.0, &config, MINUTE).unwrap();
        assert_eq!(signal.reason, ExitReason::StopLoss);
    }

    #[test]
    fn test_time_stop() {
        let config = ExitConfig::default();
        let p = position_at(100.0);

        let signal = check_exit(&p, 105.0, &config, 61 * MINUTE).unwrap();
        assert_eq!(signal.reason, ExitReason::TimeStop);

        assert!(check_exit(&p, 105.0, &config, 59 * MINUTE).is_none());
        // Gains of 10% or more are left to run
        assert!(check_exit(&p, 120.0, &config, 61 * MINUTE).is_none());
    }

    #[test]
    fn test_closed_position_never_signals() {
        let config = ExitConfig::default();
        let mut p = position_at(100.0);
        p.apply_sell(p.tokens_remaining, 0.5, ExitReason::Manual, MINUTE);
        assert!(check_exit(&p, 10.0, &config, MINUTE).is_none());
    }
}
