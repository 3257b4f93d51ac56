//! Synthetic event source
//!
//! Seeded generator standing in for a live launch/trade feed. Emits
//! launches, buys and sells moving a random-walk price, graduations once
//! a token's buy volume crosses the curve target, and occasional creator
//! dumps. A few launches keep a live mint or freeze authority.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::event::{now_ms, Event, EventKind};
use super::source::EventSource;

/// Synthetic feed parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticSourceConfig {
    /// Delay between emitted events
    #[serde(default = "default_event_interval_ms")]
    pub event_interval_ms: u64,
    /// Probability that a step launches a new token
    #[serde(default = "default_launch_probability")]
    pub launch_probability: f64,
    /// Tokens traded concurrently before older ones are retired
    #[serde(default = "default_max_active_assets")]
    pub max_active_assets: usize,
    /// Cumulative buy volume at which the bonding curve completes
    #[serde(default = "default_graduation_volume")]
    pub graduation_volume: f64,
    /// Probability per trade step that the creator dumps
    #[serde(default = "default_creator_dump_probability")]
    pub creator_dump_probability: f64,
    /// Probability that a launch keeps each token authority live
    #[serde(default = "default_live_authority_probability")]
    pub live_authority_probability: f64,
    /// Launch price in quote units per token
    #[serde(default = "default_initial_price")]
    pub initial_price: f64,
    /// Stop after this many events (unbounded when unset)
    #[serde(default)]
    pub max_events: Option<u64>,
    /// RNG seed (entropy when unset)
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_event_interval_ms() -> u64 {
    50
}

fn default_launch_probability() -> f64 {
    0.04
}

fn default_max_active_assets() -> usize {
    12
}

fn default_graduation_volume() -> f64 {
    25.0
}

fn default_creator_dump_probability() -> f64 {
    0.003
}

fn default_live_authority_probability() -> f64 {
    0.05
}

fn default_initial_price() -> f64 {
    0.000_03
}

impl Default for SyntheticSourceConfig {
    fn default() -> Self {
        Self {
            event_interval_ms: default_event_interval_ms(),
            launch_probability: default_launch_probability(),
            max_active_assets: default_max_active_assets(),
            graduation_volume: default_graduation_volume(),
            creator_dump_probability: default_creator_dump_probability(),
            live_authority_probability: default_live_authority_probability(),
            initial_price: default_initial_price(),
            max_events: None,
            seed: None,
        }
    }
}

/// A token the generator is currently trading
#[derive(Debug, Clone)]
struct SyntheticAsset {
    asset_id: String,
    creator: String,
    price: f64,
    buy_volume: f64,
    creator_tokens: f64,
    /// Probability a trade on this token is a buy
    buy_bias: f64,
    graduated: bool,
}

/// Seeded synthetic market feed
pub struct SyntheticEventSource {
    config: SyntheticSourceConfig,
    rng: StdRng,
    assets: Vec<SyntheticAsset>,
    next_asset: u64,
    emitted: u64,
    /// Events produced by one step but not yet handed out
    pending: Vec<Event>,
    /// Sleep between events; disabled for bulk generation in tests
    paced: bool,
}

impl SyntheticEventSource {
    pub fn new(config: SyntheticSourceConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        info!(
            seed = ?config.seed,
            interval_ms = config.event_interval_ms,
            "Synthetic event source ready"
        );
        Self {
            config,
            rng,
            assets: Vec::new(),
            next_asset: 0,
            emitted: 0,
            pending: Vec::new(),
            paced: true,
        }
    }

    /// Emit events back to back without the inter-event delay
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }

    /// Produce the next event synchronously
    pub fn generate(&mut self, timestamp: i64) -> Event {
        if let Some(event) = self.pending.pop() {
            return event;
        }

        let should_launch = self.assets.is_empty() || self.rng.gen_bool(self.config.launch_probability.clamp(0.0, 1.0));
        if should_launch {
            return self.launch(timestamp);
        }

        let idx = self.rng.gen_range(0..self.assets.len());
        if self.rng.gen_bool(self.config.creator_dump_probability.clamp(0.0, 1.0)) {
            if let Some(event) = self.creator_dump(idx, timestamp) {
                return event;
            }
        }
        self.trade(idx, timestamp)
    }

    fn launch(&mut self, timestamp: i64) -> Event {
        self.next_asset += 1;
        let asset_id = format!("SYN{:05}pump", self.next_asset);
        let creator = format!("creator{:05}", self.next_asset);
        let dev_buy = self.rng.gen_range(0.2..1.5);
        let price = self.config.initial_price;
        let live = self.config.live_authority_probability.clamp(0.0, 1.0);
        let mint_revoked = !self.rng.gen_bool(live);
        let freeze_revoked = !self.rng.gen_bool(live);

        let asset = SyntheticAsset {
            asset_id: asset_id.clone(),
            creator: creator.clone(),
            price,
            buy_volume: dev_buy,
            creator_tokens: dev_buy / price,
            buy_bias: self.rng.gen_range(0.35..0.8),
            graduated: false,
        };

        if self.assets.len() >= self.config.max_active_assets.max(1) {
            let retired = self.assets.remove(0);
            debug!(asset = %retired.asset_id, "Retired synthetic asset");
        }
        self.assets.push(asset);

        // The creator's initial buy follows the launch
        self.pending
            .push(Event::new(EventKind::Buy, &asset_id, &creator, dev_buy, timestamp).with_price(price));

        Event::new(EventKind::Launch, &asset_id, &creator, 0.0, timestamp)
            .with_price(price)
            .with_authorities(mint_revoked, freeze_revoked)
    }

    fn trade(&mut self, idx: usize, timestamp: i64) -> Event {
        let is_buy = self.rng.gen_bool(self.assets[idx].buy_bias);
        // Log-uniform trade size between 0.01 and ~3 units
        let amount = 10f64.powf(self.rng.gen_range(-2.0..0.5));
        let wallet = format!("wallet{:04}", self.rng.gen_range(0..2_000));
        let graduation_volume = self.config.graduation_volume;

        let asset = &mut self.assets[idx];
        let impact = (amount / 50.0).min(0.2);
        let noise = self.rng.gen_range(-0.01..0.01);

        let kind = if is_buy {
            asset.price *= 1.0 + impact + noise;
            asset.buy_volume += amount;
            EventKind::Buy
        } else {
            asset.price *= (1.0 - impact + noise).max(0.05);
            EventKind::Sell
        };
        asset.price = asset.price.max(1e-12);

        let event = Event::new(kind, &asset.asset_id, &wallet, amount, timestamp).with_price(asset.price);

        if !asset.graduated && asset.buy_volume >= graduation_volume {
            asset.graduated = true;
            self.pending.push(
                Event::new(EventKind::Graduation, &asset.asset_id, "migration", 0.0, timestamp)
                    .with_price(asset.price),
            );
        }

        event
    }

    fn creator_dump(&mut self, idx: usize, timestamp: i64) -> Option<Event> {
        let asset = &mut self.assets[idx];
        if asset.creator_tokens <= 0.0 {
            return None;
        }
        let amount = asset.creator_tokens * asset.price;
        asset.creator_tokens = 0.0;
        asset.price *= 0.6;
        asset.buy_bias = (asset.buy_bias - 0.2).max(0.1);
        debug!(asset = %asset.asset_id, amount, "Synthetic creator dump");
        Some(Event::new(EventKind::Sell, &asset.asset_id, &asset.creator, amount, timestamp).with_price(asset.price))
    }

    /// Latest synthetic price for an asset
    pub fn price_of(&self, asset_id: &str) -> Option<f64> {
        self.assets.iter().find(|a| a.asset_id == asset_id).map(|a| a.price)
    }
}

#[async_trait]
impl EventSource for SyntheticEventSource {
    async fn next_event(&mut self) -> Option<Event> {
        if let Some(max) = self.config.max_events {
            if self.emitted >= max {
                return None;
            }
        }
        if self.paced && self.config.event_interval_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.event_interval_ms)).await;
        }
        self.emitted += 1;
        Some(self.generate(now_ms()))
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}
