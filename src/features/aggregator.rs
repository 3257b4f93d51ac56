//! Feature Aggregator
//!
//! Keeps a global and a per-asset event window and derives the four
//! feature snapshots on demand. Event timestamps drive the window: "now"
//! is the newest timestamp observed on the stream.

use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, trace};

use super::types::*;
use super::window::EventWindow;
use crate::config::RegimeConfig;
use crate::stream::{AssetInfo, Event, EventKind};

/// Feature window length
pub const WINDOW_MS: i64 = 5 * 60 * 1000;
/// Trailing span used for liquidity depth
pub const LIQUIDITY_SPAN_MS: i64 = 60 * 1000;
/// Liquidity depth multiplier applied to trailing buy volume
pub const LIQUIDITY_MULTIPLIER: f64 = 10.0;
/// Latency samples retained
pub const LATENCY_HISTORY: usize = 100;
/// Attempt count beyond which the failure counters are halved
pub const ATTEMPT_DECAY_THRESHOLD: u32 = 200;

const GLOBAL_CAPACITY: usize = 50_000;
const ASSET_CAPACITY: usize = 5_000;
/// Inserts between sweeps of idle per-asset windows
const SWEEP_INTERVAL: u32 = 256;

/// Windowed market state and feature computation
#[derive(Debug)]
pub struct FeatureAggregator {
    global: EventWindow,
    assets: HashMap<String, EventWindow>,
    last_prices: HashMap<String, f64>,
    latencies: VecDeque<f64>,
    attempts: u32,
    failures: u32,
    inserts_since_sweep: u32,
}

impl Default for FeatureAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureAggregator {
    pub fn new() -> Self {
        Self {
            global: EventWindow::new(2 * WINDOW_MS, GLOBAL_CAPACITY),
            assets: HashMap::new(),
            last_prices: HashMap::new(),
            latencies: VecDeque::with_capacity(LATENCY_HISTORY),
            attempts: 0,
            failures: 0,
            inserts_since_sweep: 0,
        }
    }

    /// Append an event to the global and per-asset windows
    pub fn record_event(&mut self, event: &Event) {
        if let Some(price) = event.price {
            if price.is_finite() && price > 0.0 {
                self.last_prices.insert(event.asset_id.clone(), price);
            }
        }

        self.assets
            .entry(event.asset_id.clone())
            .or_insert_with(|| EventWindow::new(2 * WINDOW_MS, ASSET_CAPACITY))
            .push(event.clone());
        self.global.push(event.clone());

        self.inserts_since_sweep += 1;
        if self.inserts_since_sweep >= SWEEP_INTERVAL {
            self.sweep_idle_assets();
        }
    }

    /// Drop per-asset windows with nothing inside the retention span
    fn sweep_idle_assets(&mut self) {
        self.inserts_since_sweep = 0;
        let cutoff = self.now().saturating_sub(2 * WINDOW_MS);
        let before = self.assets.len();
        self.assets.retain(|_, w| !w.is_stale(cutoff));
        let assets = &self.assets;
        self.last_prices.retain(|id, _| assets.contains_key(id));
        let removed = before - self.assets.len();
        if removed > 0 {
            trace!(removed, remaining = self.assets.len(), "Swept idle asset windows");
        }
    }

    /// Stream time: newest event timestamp seen
    pub fn now(&self) -> i64 {
        self.global.latest_timestamp().unwrap_or(0)
    }

    /// Last observed price for an asset
    pub fn last_price(&self, asset_id: &str) -> Option<f64> {
        self.last_prices.get(asset_id).copied()
    }

    pub fn tracked_assets(&self) -> usize {
        self.assets.len()
    }

    /// Feed an execution latency sample
    pub fn record_latency(&mut self, ms: f64) {
        if !ms.is_finite() || ms < 0.0 {
            return;
        }
        self.latencies.push_back(ms);
        while self.latencies.len() > LATENCY_HISTORY {
            self.latencies.pop_front();
        }
    }

    /// Feed an execution attempt outcome
    pub fn record_attempt(&mut self, success: bool) {
        self.attempts += 1;
        if !success {
            self.failures += 1;
        }
        if self.attempts > ATTEMPT_DECAY_THRESHOLD {
            self.attempts /= 2;
            self.failures /= 2;
        }
    }

    pub fn average_latency_ms(&self) -> f64 {
        if self.latencies.is_empty() {
            0.0
        } else {
            self.latencies.iter().sum::<f64>() / self.latencies.len() as f64
        }
    }

    pub fn failure_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.failures as f64 / self.attempts as f64
        }
    }

    /// Market-wide regime over the trailing window
    pub fn regime_features(&self, config: &RegimeConfig) -> RegimeFeatures {
        let since = self.now() - WINDOW_MS;

        let mut launch_count = 0u32;
        let mut graduation_count = 0u32;
        let mut volume = 0.0;
        let mut trade_sizes = Vec::new();

        for event in self.global.since(since) {
            match event.kind {
                EventKind::Launch => launch_count += 1,
                EventKind::Graduation => graduation_count += 1,
                EventKind::Buy => {
                    volume += event.amount_units;
                    trade_sizes.push(event.amount_units);
                }
                EventKind::Sell => trade_sizes.push(event.amount_units),
            }
        }

        let score = regime_score(launch_count, volume, graduation_count);
        let regime = classify_regime(score, config.score_threshold);
        let window_minutes = WINDOW_MS as f64 / 60_000.0;

        RegimeFeatures {
            launch_count,
            launch_rate: launch_count as f64 / window_minutes,
            volume_proxy: volume,
            graduation_count,
            volatility_proxy: coefficient_of_variation(&trade_sizes),
            score,
            regime,
            reason: format!(
                "{}: {} launches, {:.1} buy volume, {} graduations in 5m (score {})",
                regime, launch_count, volume, graduation_count, score
            ),
        }
    }

    /// Demand features for one asset
    pub fn traction_features(&self, asset_id: &str, info: &AssetInfo) -> TractionFeatures {
        let now = self.now();
        let since = now - WINDOW_MS;

        let mut buyers = HashSet::new();
        let mut buy_count = 0u32;
        let mut sell_count = 0u32;
        let mut histogram = BuyHistogram::default();
        let mut quarters = [0.0f64; 4];
        let quarter_ms = WINDOW_MS / 4;

        if let Some(window) = self.assets.get(asset_id) {
            for event in window.since(since) {
                match event.kind {
                    EventKind::Buy => {
                        buy_count += 1;
                        buyers.insert(event.wallet_id.as_str());
                        histogram.record(event.amount_units);
                        let q = ((event.timestamp - since) / quarter_ms).clamp(0, 3) as usize;
                        quarters[q] += event.amount_units;
                    }
                    EventKind::Sell => sell_count += 1,
                    _ => {}
                }
            }
        }

        let trades = buy_count + sell_count;
        let net_buy_pressure = if trades == 0 {
            0.0
        } else {
            (buy_count as f64 - sell_count as f64) / trades as f64
        };

        let window_minutes = WINDOW_MS as f64 / 60_000.0;
        let secs_since = |ts: Option<i64>| ts.map(|t| ((now - t) as f64 / 1000.0).max(0.0));

        TractionFeatures {
            unique_buyers: buyers.len() as u32,
            unique_buyers_per_min: buyers.len() as f64 / window_minutes,
            buy_count,
            sell_count,
            net_buy_pressure,
            buy_histogram: histogram,
            breadth_score: breadth_score(histogram.small, histogram.medium, histogram.large),
            velocity: (quarters[2] + quarters[3]) - (quarters[0] + quarters[1]),
            acceleration: (quarters[3] - quarters[2]) - (quarters[1] - quarters[0]),
            time_since_launch_secs: secs_since(info.launched_at),
            time_since_graduation_secs: secs_since(info.graduated_at),
            last_price: self.last_price(asset_id),
        }
    }

    /// Holder concentration estimated from observed buy volume
    pub fn concentration_features(&self, asset_id: &str, info: &AssetInfo) -> ConcentrationFeatures {
        let since = self.now() - WINDOW_MS;

        let mut per_wallet: HashMap<&str, f64> = HashMap::new();
        let mut total_buys = 0.0;
        let mut creator_bought = 0.0;
        let mut creator_sold = 0.0;
        let creator = info.creator.as_deref();

        if let Some(window) = self.assets.get(asset_id) {
            for event in window.since(since) {
                let is_creator = creator == Some(event.wallet_id.as_str());
                match event.kind {
                    EventKind::Buy => {
                        *per_wallet.entry(event.wallet_id.as_str()).or_insert(0.0) += event.amount_units;
                        total_buys += event.amount_units;
                        if is_creator {
                            creator_bought += event.amount_units;
                        }
                    }
                    EventKind::Sell if is_creator => creator_sold += event.amount_units,
                    _ => {}
                }
            }
        }

        let mut volumes: Vec<f64> = per_wallet.values().copied().collect();
        volumes.sort_by(|a, b| b.total_cmp(a));

        let share = |n: usize| {
            if total_buys > 0.0 {
                volumes.iter().take(n).sum::<f64>() / total_buys * 100.0
            } else {
                0.0
            }
        };
        let top10_pct = share(10);
        let top20_pct = share(20);

        let creator_holding_pct = if total_buys > 0.0 {
            ((creator_bought - creator_sold).max(0.0) / total_buys * 100.0).min(100.0)
        } else {
            0.0
        };
        let creator_sold_pct = if creator_bought > 0.0 {
            (creator_sold / creator_bought * 100.0).min(100.0)
        } else if creator_sold > 0.0 {
            100.0
        } else {
            0.0
        };
        let suspicious_creator = creator_sold > 0.5 * creator_bought;

        if suspicious_creator {
            debug!(asset = %asset_id, creator_bought, creator_sold, "Creator selling into demand");
        }

        ConcentrationFeatures {
            unique_holders: per_wallet.len() as u32,
            top10_pct,
            top20_pct,
            creator_holding_pct,
            creator_sold_pct,
            suspicious_creator,
            mint_authority_revoked: info.mint_authority_revoked,
            freeze_authority_revoked: info.freeze_authority_revoked,
            risk: concentration_risk(top10_pct, suspicious_creator),
        }
    }

    /// Execution quality for an intended order size
    pub fn execution_risk_features(&self, asset_id: &str, order_size: f64) -> ExecutionRiskFeatures {
        let since = self.now() - LIQUIDITY_SPAN_MS;

        let recent_buy_volume: f64 = self
            .assets
            .get(asset_id)
            .map(|w| {
                w.since(since)
                    .filter(|e| e.kind == EventKind::Buy)
                    .map(|e| e.amount_units)
                    .sum()
            })
            .unwrap_or(0.0);

        let liquidity = (recent_buy_volume * LIQUIDITY_MULTIPLIER).max(1.0);
        let slippage_bps = estimate_slippage_bps(order_size, liquidity);
        let avg_latency_ms = self.average_latency_ms();
        let failure_rate = self.failure_rate();

        ExecutionRiskFeatures {
            order_size,
            liquidity,
            spread_bps: estimate_spread_bps(liquidity),
            slippage_bps,
            avg_latency_ms,
            failure_rate,
            risk: classify_execution_risk(slippage_bps, avg_latency_ms, failure_rate),
        }
    }

    /// Compute every feature group for an evaluation
    pub fn snapshot(
        &self,
        asset_id: &str,
        info: &AssetInfo,
        order_size: f64,
        regime_config: &RegimeConfig,
    ) -> FeatureSnapshot {
        FeatureSnapshot {
            asset_id: asset_id.to_string(),
            computed_at: self.now(),
            regime: self.regime_features(regime_config),
            traction: self.traction_features(asset_id, info),
            concentration: self.concentration_features(asset_id, info),
            execution: self.execution_risk_features(asset_id, order_size),
        }
    }
}

fn coefficient_of_variation(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if mean <= 0.0 {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt() / mean
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: EventKind, asset: &str, wallet: &str, amount: f64, ts: i64) -> Event {
        Event::new(kind, asset, wallet, amount, ts)
    }

    fn info_with_creator(asset: &str, creator: &str) -> AssetInfo {
        let mut info = AssetInfo::new(asset);
        info.creator = Some(creator.to_string());
        info
    }

    #[test]
    fn test_empty_market_is_cold() {
        let agg = FeatureAggregator::new();
        let regime = agg.regime_features(&RegimeConfig::default());
        assert_eq!(regime.score, 0);
        assert_eq!(regime.regime, Regime::Cold);
    }

    #[test]
    fn test_regime_from_events() {
        let mut agg = FeatureAggregator::new();
        let base = 1_000_000;
        for i in 0..25 {
            agg.record_event(&event(EventKind::Launch, &format!("m{}", i), "c", 0.0, base + i));
            agg.record_event(&event(EventKind::Buy, &format!("m{}", i), "w", 24.0, base + i));
        }
        for i in 0..8 {
            agg.record_event(&event(EventKind::Graduation, &format!("m{}", i), "p", 0.0, base + 100 + i));
        }

        let regime = agg.regime_features(&RegimeConfig::default());
        assert_eq!(regime.launch_count, 25);
        assert_eq!(regime.graduation_count, 8);
        assert!((regime.volume_proxy - 600.0).abs() < 1e-9);
        assert_eq!(regime.regime, Regime::Mania);
        assert!((regime.launch_rate - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_regime_ignores_events_outside_window() {
        let mut agg = FeatureAggregator::new();
        agg.record_event(&event(EventKind::Launch, "old", "c", 0.0, 0));
        agg.record_event(&event(EventKind::Launch, "new", "c", 0.0, WINDOW_MS + 1));

        let regime = agg.regime_features(&RegimeConfig::default());
        assert_eq!(regime.launch_count, 1);
    }

    #[test]
    fn test_traction_features() {
        let mut agg = FeatureAggregator::new();
        let mut info = AssetInfo::new("mint1");
        info.launched_at = Some(0);

        agg.record_event(&event(EventKind::Buy, "mint1", "a", 0.05, 1_000));
        agg.record_event(&event(EventKind::Buy, "mint1", "b", 0.5, 2_000));
        agg.record_event(&event(EventKind::Buy, "mint1", "b", 2.0, 3_000));
        agg.record_event(&event(EventKind::Sell, "mint1", "c", 0.3, 4_000));
        agg.record_event(&event(EventKind::Buy, "other", "z", 1.0, 60_000));

        let t = agg.traction_features("mint1", &info);
        assert_eq!(t.unique_buyers, 2);
        assert_eq!(t.buy_count, 3);
        assert_eq!(t.sell_count, 1);
        assert!((t.net_buy_pressure - 0.5).abs() < 1e-9);
        assert_eq!(t.buy_histogram, BuyHistogram { small: 1, medium: 1, large: 1 });
        assert!((t.breadth_score - 2.0 / 3.0).abs() < 1e-9);
        assert!((t.unique_buyers_per_min - 0.4).abs() < 1e-9);
        assert_eq!(t.time_since_launch_secs, Some(60.0));
        assert!(t.time_since_graduation_secs.is_none());
    }

    #[test]
    fn test_traction_without_trades() {
        let agg = FeatureAggregator::new();
        let t = agg.traction_features("ghost", &AssetInfo::new("ghost"));
        assert_eq!(t.net_buy_pressure, 0.0);
        assert_eq!(t.breadth_score, 0.0);
        assert_eq!(t.unique_buyers_per_min, 0.0);
    }

    #[test]
    fn test_velocity_sign_follows_volume_trend() {
        let mut agg = FeatureAggregator::new();
        let info = AssetInfo::new("mint1");
        // Anchor "now" at the end of a full window
        agg.record_event(&event(EventKind::Launch, "x", "c", 0.0, WINDOW_MS));
        agg.record_event(&event(EventKind::Buy, "mint1", "a", 0.1, 10_000));
        agg.record_event(&event(EventKind::Buy, "mint1", "b", 2.0, WINDOW_MS - 10_000));

        let t = agg.traction_features("mint1", &info);
        assert!(t.velocity > 0.0);
    }

    #[test]
    fn test_concentration_top_holders() {
        let mut agg = FeatureAggregator::new();
        let info = info_with_creator("mint1", "dev");

        // One whale with 90 of 100 volume
        agg.record_event(&event(EventKind::Buy, "mint1", "whale", 90.0, 1));
        for i in 0..20 {
            agg.record_event(&event(EventKind::Buy, "mint1", &format!("w{}", i), 0.5, 2 + i));
        }

        let c = agg.concentration_features("mint1", &info);
        assert_eq!(c.unique_holders, 21);
        assert!((c.top10_pct - 94.5).abs() < 1e-9);
        assert!(c.top20_pct > c.top10_pct);
        assert_eq!(c.risk, ConcentrationRisk::Extreme);
        assert!(!c.suspicious_creator);
    }

    #[test]
    fn test_creator_dump_is_suspicious() {
        let mut agg = FeatureAggregator::new();
        let info = info_with_creator("mint1", "dev");

        agg.record_event(&event(EventKind::Buy, "mint1", "dev", 1.0, 1));
        for i in 0..30 {
            agg.record_event(&event(EventKind::Buy, "mint1", &format!("w{}", i), 0.2, 2 + i));
        }
        agg.record_event(&event(EventKind::Sell, "mint1", "dev", 0.6, 100));

        let c = agg.concentration_features("mint1", &info);
        assert!(c.suspicious_creator);
        assert!((c.creator_sold_pct - 60.0).abs() < 1e-9);
        assert_eq!(c.risk, ConcentrationRisk::Extreme);
    }

    #[test]
    fn test_execution_risk_liquidity_floor_and_slippage() {
        let mut agg = FeatureAggregator::new();
        let empty = agg.execution_risk_features("ghost", 0.05);
        assert_eq!(empty.liquidity, 1.0);
        assert_eq!(empty.spread_bps, 1000.0);
        assert_eq!(empty.slippage_bps, 50.0);

        agg.record_event(&event(EventKind::Buy, "mint1", "a", 5.0, 100_000));
        // Outside the 60s liquidity span
        agg.record_event(&event(EventKind::Buy, "mint1", "b", 50.0, 10_000));

        let e = agg.execution_risk_features("mint1", 0.5);
        assert!((e.liquidity - 50.0).abs() < 1e-9);
        assert_eq!(e.slippage_bps, 10.0);
        assert_eq!(e.risk, ExecutionRisk::Low);
    }

    #[test]
    fn test_latency_history_is_capped() {
        let mut agg = FeatureAggregator::new();
        for _ in 0..150 {
            agg.record_latency(100.0);
        }
        for _ in 0..100 {
            agg.record_latency(3_000.0);
        }
        assert_eq!(agg.average_latency_ms(), 3_000.0);
        assert_eq!(agg.execution_risk_features("x", 0.0).risk, ExecutionRisk::High);
    }

    #[test]
    fn test_failure_counters_decay() {
        let mut agg = FeatureAggregator::new();
        for i in 0..201 {
            agg.record_attempt(i % 4 != 0);
        }
        assert!(agg.attempts <= ATTEMPT_DECAY_THRESHOLD);
        let rate = agg.failure_rate();
        assert!((rate - 0.25).abs() < 0.02, "rate {}", rate);
    }

    #[test]
    fn test_last_price_and_sweep() {
        let mut agg = FeatureAggregator::new();
        agg.record_event(&event(EventKind::Buy, "old", "a", 1.0, 0).with_price(0.01));
        assert_eq!(agg.last_price("old"), Some(0.01));

        let far = 3 * WINDOW_MS;
        for i in 0..SWEEP_INTERVAL as i64 {
            agg.record_event(&event(EventKind::Buy, "fresh", "a", 0.1, far + i));
        }
        assert_eq!(agg.tracked_assets(), 1);
        assert!(agg.last_price("old").is_none());
    }
}
