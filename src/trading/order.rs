//! Order model and idempotency keys

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::position::ExitReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Submitted,
    Confirmed,
    Failed,
    Expired,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Confirmed | OrderStatus::Failed | OrderStatus::Expired | OrderStatus::Cancelled
        )
    }
}

/// What caused the order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSource {
    Entry,
    StopLoss,
    TakeProfit,
    TrailingStop,
    TimeStop,
    Manual,
}

impl From<ExitReason> for OrderSource {
    fn from(reason: ExitReason) -> Self {
        match reason {
            ExitReason::StopLoss => OrderSource::StopLoss,
            ExitReason::TakeProfit => OrderSource::TakeProfit,
            ExitReason::TrailingStop => OrderSource::TrailingStop,
            ExitReason::TimeStop => OrderSource::TimeStop,
            ExitReason::Manual => OrderSource::Manual,
        }
    }
}

/// Deduplication token for one logical order: SHA-256 over side, asset and
/// the event that originated it. Each field is length-prefixed so no choice
/// of ids can make two different triples hash the same input.
pub fn idempotency_key(side: OrderSide, asset_id: &str, origin: &str) -> String {
    let mut hasher = Sha256::new();
    for field in [side.to_string().as_str(), asset_id, origin] {
        hasher.update((field.len() as u64).to_be_bytes());
        hasher.update(field.as_bytes());
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// A buy or sell order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub idempotency_key: String,
    pub asset_id: String,
    pub side: OrderSide,
    pub source: OrderSource,
    /// Quote units for buys, tokens for sells
    pub requested_amount: f64,
    pub executed_amount: f64,
    pub reference_price: f64,
    pub executed_price: Option<f64>,
    pub slippage_bps: Option<f64>,
    pub fee: f64,
    pub status: OrderStatus,
    pub is_paper: bool,
    pub decision_id: Option<String>,
    pub position_id: Option<String>,
    pub retry_count: u32,
    pub error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Order {
    /// New PENDING paper order
    pub fn new(
        side: OrderSide,
        source: OrderSource,
        asset_id: &str,
        origin: &str,
        requested_amount: f64,
        reference_price: f64,
        now: i64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            idempotency_key: idempotency_key(side, asset_id, origin),
            asset_id: asset_id.to_string(),
            side,
            source,
            requested_amount,
            executed_amount: 0.0,
            reference_price,
            executed_price: None,
            slippage_bps: None,
            fee: 0.0,
            status: OrderStatus::Pending,
            is_paper: true,
            decision_id: None,
            position_id: None,
            retry_count: 0,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_decision(mut self, decision_id: &str) -> Self {
        self.decision_id = Some(decision_id.to_string());
        self
    }

    pub fn with_position(mut self, position_id: &str) -> Self {
        self.position_id = Some(position_id.to_string());
        self
    }

    pub fn submitted(&mut self, now: i64) {
        self.status = OrderStatus::Submitted;
        self.updated_at = now;
    }

    pub fn confirm(&mut self, executed_amount: f64, executed_price: f64, slippage_bps: f64, fee: f64, now: i64) {
        self.status = OrderStatus::Confirmed;
        self.executed_amount = executed_amount;
        self.executed_price = Some(executed_price);
        self.slippage_bps = Some(slippage_bps);
        self.fee = fee;
        self.updated_at = now;
    }

    pub fn fail(&mut self, error: impl Into<String>, now: i64) {
        self.status = OrderStatus::Failed;
        self.error = Some(error.into());
        self.updated_at = now;
    }

    /// Copy the mutable execution fields of `update` onto this order.
    /// Identity fields (id, key, asset, side, source, links) never change,
    /// and a settled order keeps its outcome. Returns false when refused.
    pub fn merge_terminal_fields(&mut self, update: &Order) -> bool {
        if self.status.is_terminal() && update.status != self.status {
            return false;
        }
        self.status = update.status;
        self.executed_amount = update.executed_amount;
        self.executed_price = update.executed_price;
        self.slippage_bps = update.slippage_bps;
        self.fee = update.fee;
        self.error = update.error.clone();
        self.retry_count = update.retry_count;
        self.updated_at = update.updated_at;
        if self.position_id.is_none() {
            self.position_id = update.position_id.clone();
        }
        true
    }
}
