//! Persistence contract
//!
//! Decision cards and incidents are append-only. Orders and positions are
//! upserted by id. Order idempotency keys are unique: a duplicate insert
//! is reported, not applied.

pub mod memory;
#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;

use crate::error::Result;
use crate::filter::DecisionCard;
use crate::position::Position;
use crate::risk::Incident;
use crate::trading::Order;

pub use memory::MemoryStore;

/// Outcome of inserting an order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// An order with the same idempotency key already exists; nothing written
    Duplicate,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_decision(&self, card: &DecisionCard) -> Result<()>;

    async fn insert_incident(&self, incident: &Incident) -> Result<()>;

    async fn insert_order(&self, order: &Order) -> Result<InsertOutcome>;

    /// Update status, execution and error fields of an existing order
    async fn upsert_order(&self, order: &Order) -> Result<()>;

    async fn upsert_position(&self, position: &Position) -> Result<()>;

    async fn position(&self, id: &str) -> Result<Option<Position>>;

    /// Positions that are OPEN or PARTIALLY_CLOSED
    async fn open_positions(&self) -> Result<Vec<Position>>;

    /// Closed positions, most recently closed first
    async fn closed_positions(&self) -> Result<Vec<Position>>;

    /// Entries (distinct decisions) with a confirmed BUY created at or after `since`
    async fn confirmed_buy_count_since(&self, since: i64) -> Result<u32>;

    /// Losing CLOSED positions in a row, counting back from the latest close
    async fn consecutive_losses(&self) -> Result<u32>;

    async fn recent_decisions(&self, limit: usize) -> Result<Vec<DecisionCard>>;

    async fn recent_incidents(&self, limit: usize) -> Result<Vec<Incident>>;

    async fn orders_for_position(&self, position_id: &str) -> Result<Vec<Order>>;
}
