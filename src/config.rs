//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

// Re-export synthetic source config
pub use crate::stream::synthetic::SyntheticSourceConfig;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub regime: RegimeConfig,
    #[serde(default)]
    pub filters: FilterConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub exits: ExitConfig,
    #[serde(default)]
    pub paper: PaperConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub source: SyntheticSourceConfig,
}

/// Market regime classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeConfig {
    /// Minimum composite score for a NORMAL regime (MANIA is fixed at 70)
    #[serde(default = "default_regime_threshold")]
    pub score_threshold: u32,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            score_threshold: default_regime_threshold(),
        }
    }
}

/// Entry filter thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Minimum estimated liquidity depth (quote units)
    #[serde(default = "default_min_liquidity")]
    pub min_liquidity: f64,
    /// Maximum share of observed buy volume held by the top 10 wallets
    #[serde(default = "default_max_top10_pct")]
    pub max_top10_pct: f64,
    /// Maximum creator net holding of observed volume
    #[serde(default = "default_max_creator_holding_pct")]
    pub max_creator_holding_pct: f64,
    /// Require mint and freeze authority to be revoked
    #[serde(default = "default_true")]
    pub require_authorities_revoked: bool,
    /// Minimum unique buyers per minute over the trailing window
    #[serde(default = "default_min_buyers_per_min")]
    pub min_unique_buyers_per_min: f64,
    /// Minimum breadth score (share of small/medium buys)
    #[serde(default = "default_min_breadth_score")]
    pub min_breadth_score: f64,
    /// Maximum estimated slippage for the intended order
    #[serde(default = "default_max_slippage_bps")]
    pub max_slippage_bps: f64,
    /// Maximum estimated spread
    #[serde(default = "default_max_spread_bps")]
    pub max_spread_bps: f64,
    /// Earliest entry after graduation
    #[serde(default = "default_graduation_min_secs")]
    pub graduation_min_secs: u64,
    /// Latest entry after graduation
    #[serde(default = "default_graduation_max_secs")]
    pub graduation_max_secs: u64,
    /// Minimum net buy pressure in [-1, 1]
    #[serde(default = "default_min_net_buy_pressure")]
    pub min_net_buy_pressure: f64,
    /// Infrastructure health: maximum average execution latency
    #[serde(default = "default_max_latency_ms")]
    pub max_latency_ms: f64,
    /// Infrastructure health: maximum recent failure rate in [0, 1]
    #[serde(default = "default_max_failure_rate")]
    pub max_failure_rate: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_liquidity: default_min_liquidity(),
            max_top10_pct: default_max_top10_pct(),
            max_creator_holding_pct: default_max_creator_holding_pct(),
            require_authorities_revoked: true,
            min_unique_buyers_per_min: default_min_buyers_per_min(),
            min_breadth_score: default_min_breadth_score(),
            max_slippage_bps: default_max_slippage_bps(),
            max_spread_bps: default_max_spread_bps(),
            graduation_min_secs: default_graduation_min_secs(),
            graduation_max_secs: default_graduation_max_secs(),
            min_net_buy_pressure: default_min_net_buy_pressure(),
            max_latency_ms: default_max_latency_ms(),
            max_failure_rate: default_max_failure_rate(),
        }
    }
}

/// Portfolio risk limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Order size as % of equity; also the per-trade cap enforced by the gate
    #[serde(default = "default_max_risk_per_trade_pct")]
    pub max_risk_per_trade_pct: f64,
    /// Maximum open exposure as % of equity
    #[serde(default = "default_max_exposure_pct")]
    pub max_exposure_pct: f64,
    /// Daily drawdown that trips the kill switch
    #[serde(default = "default_daily_drawdown_limit_pct")]
    pub daily_drawdown_limit_pct: f64,
    #[serde(default = "default_max_trades_per_hour")]
    pub max_trades_per_hour: u32,
    #[serde(default = "default_max_trades_per_day")]
    pub max_trades_per_day: u32,
    #[serde(default = "default_max_consecutive_losses")]
    pub max_consecutive_losses: u32,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_risk_per_trade_pct: default_max_risk_per_trade_pct(),
            max_exposure_pct: default_max_exposure_pct(),
            daily_drawdown_limit_pct: default_daily_drawdown_limit_pct(),
            max_trades_per_hour: default_max_trades_per_hour(),
            max_trades_per_day: default_max_trades_per_day(),
            max_consecutive_losses: default_max_consecutive_losses(),
        }
    }
}

/// One rung of the take-profit ladder
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TakeProfitTarget {
    /// Gain from entry that fires this rung
    pub gain_pct: f64,
    /// Share of remaining tokens to sell
    pub sell_pct: f64,
}

/// Exit lifecycle parameters seeded into every new position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitConfig {
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: f64,
    #[serde(default = "default_take_profit_levels")]
    pub take_profit_levels: Vec<TakeProfitTarget>,
    #[serde(default = "default_trailing_stop_pct")]
    pub trailing_stop_pct: f64,
    #[serde(default = "default_time_stop_minutes")]
    pub time_stop_minutes: u64,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            stop_loss_pct: default_stop_loss_pct(),
            take_profit_levels: default_take_profit_levels(),
            trailing_stop_pct: default_trailing_stop_pct(),
            time_stop_minutes: default_time_stop_minutes(),
        }
    }
}

/// Paper execution model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperConfig {
    #[serde(default = "default_starting_equity")]
    pub starting_equity: f64,
    /// Realized slippage = estimate x multiplier x jitter
    #[serde(default = "default_slippage_multiplier")]
    pub slippage_multiplier: f64,
    /// Probability that a simulated buy fails (sells fail at half this rate)
    #[serde(default = "default_failure_rate")]
    pub failure_rate: f64,
    /// Base simulated latency, jittered by [0.5, 1.5)
    #[serde(default = "default_latency_ms")]
    pub latency_ms: u64,
    /// Flat proportional fee on every fill
    #[serde(default = "default_fee_pct")]
    pub fee_pct: f64,
    /// Base slippage applied to sells before the multiplier
    #[serde(default = "default_sell_slippage_bps")]
    pub sell_slippage_bps: f64,
    /// Seed for the simulator RNG (entropy when unset)
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            starting_equity: default_starting_equity(),
            slippage_multiplier: default_slippage_multiplier(),
            failure_rate: default_failure_rate(),
            latency_ms: default_latency_ms(),
            fee_pct: default_fee_pct(),
            sell_slippage_bps: default_sell_slippage_bps(),
            seed: None,
        }
    }
}

/// When assets get evaluated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Observed buys after which an asset is queued for its first evaluation
    #[serde(default = "default_trigger_buy_count")]
    pub trigger_buy_count: u32,
    /// Re-evaluate assets when they graduate
    #[serde(default = "default_true")]
    pub evaluate_on_graduation: bool,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            trigger_buy_count: default_trigger_buy_count(),
            evaluate_on_graduation: true,
        }
    }
}

/// Periods of the background tasks, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_position_monitor_secs")]
    pub position_monitor_secs: u64,
    #[serde(default = "default_auto_halt_secs")]
    pub auto_halt_secs: u64,
    #[serde(default = "default_regime_broadcast_secs")]
    pub regime_broadcast_secs: u64,
    #[serde(default = "default_equity_snapshot_secs")]
    pub equity_snapshot_secs: u64,
    #[serde(default = "default_daily_reset_secs")]
    pub daily_reset_secs: u64,
    #[serde(default = "default_risk_refresh_secs")]
    pub risk_refresh_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            position_monitor_secs: default_position_monitor_secs(),
            auto_halt_secs: default_auto_halt_secs(),
            regime_broadcast_secs: default_regime_broadcast_secs(),
            equity_snapshot_secs: default_equity_snapshot_secs(),
            daily_reset_secs: default_daily_reset_secs(),
            risk_refresh_secs: default_risk_refresh_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// JSON snapshot written when a run ends and read by `agent status`
    #[serde(default)]
    pub snapshot_path: Option<String>,
}

/// A conservative-policy advisory. Not fatal; logged at load time.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigIssue {
    pub field: &'static str,
    pub message: String,
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

// Default value functions
fn default_regime_threshold() -> u32 {
    40
}

fn default_min_liquidity() -> f64 {
    2.0
}

fn default_max_top10_pct() -> f64 {
    60.0
}

fn default_max_creator_holding_pct() -> f64 {
    20.0
}

fn default_min_buyers_per_min() -> f64 {
    1.0
}

fn default_min_breadth_score() -> f64 {
    0.5
}

fn default_max_slippage_bps() -> f64 {
    300.0
}

fn default_max_spread_bps() -> f64 {
    500.0
}

fn default_graduation_min_secs() -> u64 {
    30
}

fn default_graduation_max_secs() -> u64 {
    1800
}

fn default_min_net_buy_pressure() -> f64 {
    0.1
}

fn default_max_latency_ms() -> f64 {
    2000.0
}

fn default_max_failure_rate() -> f64 {
    0.2
}

fn default_max_risk_per_trade_pct() -> f64 {
    0.5
}

fn default_max_exposure_pct() -> f64 {
    5.0
}

fn default_daily_drawdown_limit_pct() -> f64 {
    2.0
}

fn default_max_trades_per_hour() -> u32 {
    3
}

fn default_max_trades_per_day() -> u32 {
    10
}

fn default_max_consecutive_losses() -> u32 {
    3
}

fn default_stop_loss_pct() -> f64 {
    25.0
}

fn default_take_profit_levels() -> Vec<TakeProfitTarget> {
    vec![
        TakeProfitTarget { gain_pct: 50.0, sell_pct: 50.0 },
        TakeProfitTarget { gain_pct: 100.0, sell_pct: 25.0 },
        TakeProfitTarget { gain_pct: 200.0, sell_pct: 100.0 },
    ]
}

fn default_trailing_stop_pct() -> f64 {
    15.0
}

fn default_time_stop_minutes() -> u64 {
    60
}

fn default_starting_equity() -> f64 {
    10.0
}

fn default_slippage_multiplier() -> f64 {
    1.5
}

fn default_failure_rate() -> f64 {
    0.05
}

fn default_latency_ms() -> u64 {
    400
}

fn default_fee_pct() -> f64 {
    1.0
}

fn default_sell_slippage_bps() -> f64 {
    100.0
}

fn default_trigger_buy_count() -> u32 {
    8
}

fn default_position_monitor_secs() -> u64 {
    5
}

fn default_auto_halt_secs() -> u64 {
    10
}

fn default_regime_broadcast_secs() -> u64 {
    15
}

fn default_equity_snapshot_secs() -> u64 {
    30
}

fn default_daily_reset_secs() -> u64 {
    60
}

fn default_risk_refresh_secs() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix AGENT_)
            .add_source(
                config::Environment::with_prefix("AGENT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        config.validate()?;

        for issue in config.issues() {
            tracing::warn!("Configuration issue: {}", issue);
        }

        Ok(config)
    }

    /// Validate configuration values that make the agent unable to run
    pub fn validate(&self) -> Result<()> {
        if self.paper.starting_equity <= 0.0 {
            anyhow::bail!("paper.starting_equity must be positive");
        }

        if !(0.0..=1.0).contains(&self.paper.failure_rate) {
            anyhow::bail!("paper.failure_rate must be between 0 and 1");
        }

        if self.paper.slippage_multiplier <= 0.0 {
            anyhow::bail!("paper.slippage_multiplier must be positive");
        }

        if self.exits.stop_loss_pct <= 0.0 || self.exits.stop_loss_pct >= 100.0 {
            anyhow::bail!("exits.stop_loss_pct must be between 0 and 100");
        }

        if self.exits.trailing_stop_pct <= 0.0 || self.exits.trailing_stop_pct >= 100.0 {
            anyhow::bail!("exits.trailing_stop_pct must be between 0 and 100");
        }

        for level in &self.exits.take_profit_levels {
            if level.gain_pct <= 0.0 {
                anyhow::bail!("take-profit gain_pct must be positive, got {}", level.gain_pct);
            }
            if level.sell_pct <= 0.0 || level.sell_pct > 100.0 {
                anyhow::bail!("take-profit sell_pct must be in (0, 100], got {}", level.sell_pct);
            }
        }

        if self.filters.graduation_min_secs > self.filters.graduation_max_secs {
            anyhow::bail!(
                "filters.graduation_min_secs ({}) exceeds graduation_max_secs ({})",
                self.filters.graduation_min_secs,
                self.filters.graduation_max_secs
            );
        }

        if self.risk.max_risk_per_trade_pct <= 0.0 {
            anyhow::bail!("risk.max_risk_per_trade_pct must be positive");
        }

        let periods = [
            self.scheduler.position_monitor_secs,
            self.scheduler.auto_halt_secs,
            self.scheduler.regime_broadcast_secs,
            self.scheduler.equity_snapshot_secs,
            self.scheduler.daily_reset_secs,
            self.scheduler.risk_refresh_secs,
        ];
        if periods.iter().any(|p| *p == 0) {
            anyhow::bail!("scheduler periods must be at least 1 second");
        }

        Ok(())
    }

    /// Flag settings that are looser than the conservative policy
    pub fn issues(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.risk.max_risk_per_trade_pct > 1.0 {
            issues.push(ConfigIssue {
                field: "risk.max_risk_per_trade_pct",
                message: format!(
                    "{:.2}% of equity per trade exceeds the 1% ceiling",
                    self.risk.max_risk_per_trade_pct
                ),
            });
        }

        if self.risk.max_exposure_pct > 10.0 {
            issues.push(ConfigIssue {
                field: "risk.max_exposure_pct",
                message: format!("{:.1}% total exposure exceeds 10%", self.risk.max_exposure_pct),
            });
        }

        if self.risk.daily_drawdown_limit_pct > 5.0 {
            issues.push(ConfigIssue {
                field: "risk.daily_drawdown_limit_pct",
                message: format!(
                    "{:.1}% daily drawdown limit exceeds 5%",
                    self.risk.daily_drawdown_limit_pct
                ),
            });
        }

        if self.risk.max_trades_per_hour > 10 {
            issues.push(ConfigIssue {
                field: "risk.max_trades_per_hour",
                message: format!("{} trades/hour exceeds 10", self.risk.max_trades_per_hour),
            });
        }

        if self.risk.max_trades_per_day < self.risk.max_trades_per_hour {
            issues.push(ConfigIssue {
                field: "risk.max_trades_per_day",
                message: "daily cap is below the hourly cap".to_string(),
            });
        }

        if self.risk.max_consecutive_losses > 5 {
            issues.push(ConfigIssue {
                field: "risk.max_consecutive_losses",
                message: format!(
                    "halting only after {} losses in a row",
                    self.risk.max_consecutive_losses
                ),
            });
        }

        if self.exits.stop_loss_pct > 50.0 {
            issues.push(ConfigIssue {
                field: "exits.stop_loss_pct",
                message: format!("{:.0}% stop-loss is wider than 50%", self.exits.stop_loss_pct),
            });
        }

        if self.exits.trailing_stop_pct >= self.exits.stop_loss_pct {
            issues.push(ConfigIssue {
                field: "exits.trailing_stop_pct",
                message: format!(
                    "{:.0}% trailing stop is not tighter than the {:.0}% stop-loss",
                    self.exits.trailing_stop_pct, self.exits.stop_loss_pct
                ),
            });
        }

        if self.exits.take_profit_levels.is_empty() {
            issues.push(ConfigIssue {
                field: "exits.take_profit_levels",
                message: "no take-profit ladder configured".to_string(),
            });
        }

        if self
            .exits
            .take_profit_levels
            .windows(2)
            .any(|w| w[1].gain_pct <= w[0].gain_pct)
        {
            issues.push(ConfigIssue {
                field: "exits.take_profit_levels",
                message: "take-profit gains are not strictly increasing".to_string(),
            });
        }

        if self.paper.slippage_multiplier < 1.0 {
            issues.push(ConfigIssue {
                field: "paper.slippage_multiplier",
                message: "paper fills better than the estimate are optimistic".to_string(),
            });
        }

        if self.filters.max_slippage_bps > 1000.0 {
            issues.push(ConfigIssue {
                field: "filters.max_slippage_bps",
                message: format!("{:.0}bps tolerated slippage exceeds 10%", self.filters.max_slippage_bps),
            });
        }

        if !self.filters.require_authorities_revoked {
            issues.push(ConfigIssue {
                field: "filters.require_authorities_revoked",
                message: "tokens with live mint/freeze authority can be traded".to_string(),
            });
        }

        issues
    }

    /// Render the effective configuration for display
    pub fn display_summary(&self) -> String {
        let ladder = self
            .exits
            .take_profit_levels
            .iter()
            .map(|l| format!("+{:.0}%→{:.0}%", l.gain_pct, l.sell_pct))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            r#"Configuration:
  Regime:
    normal threshold: {}
  Filters:
    min_liquidity: {}
    max_top10: {}%
    max_slippage: {}bps
    max_spread: {}bps
    graduation window: {}s-{}s
  Risk:
    per_trade: {}%
    max_exposure: {}%
    daily_drawdown: {}%
    trades: {}/hour, {}/day
    consecutive_losses: {}
  Exits:
    stop_loss: {}%
    take_profit: [{}]
    trailing_stop: {}%
    time_stop: {}min
  Paper:
    starting_equity: {}
    slippage_multiplier: {}x
    failure_rate: {}
    latency: {}ms
    seed: {}
"#,
            self.regime.score_threshold,
            self.filters.min_liquidity,
            self.filters.max_top10_pct,
            self.filters.max_slippage_bps,
            self.filters.max_spread_bps,
            self.filters.graduation_min_secs,
            self.filters.graduation_max_secs,
            self.risk.max_risk_per_trade_pct,
            self.risk.max_exposure_pct,
            self.risk.daily_drawdown_limit_pct,
            self.risk.max_trades_per_hour,
            self.risk.max_trades_per_day,
            self.risk.max_consecutive_losses,
            self.exits.stop_loss_pct,
            ladder,
            self.exits.trailing_stop_pct,
            self.exits.time_stop_minutes,
            self.paper.starting_equity,
            self.paper.slippage_multiplier,
            self.paper.failure_rate,
            self.paper.latency_ms,
            self.paper
                .seed
                .map(|s| s.to_string())
                .unwrap_or_else(|| "(entropy)".to_string()),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            regime: RegimeConfig::default(),
            filters: FilterConfig::default(),
            risk: RiskConfig::default(),
            exits: ExitConfig::default(),
            paper: PaperConfig::default(),
            evaluation: EvaluationConfig::default(),
            scheduler: SchedulerConfig::default(),
            store: StoreConfig::default(),
            source: SyntheticSourceConfig::default(),
        }
    }
}
