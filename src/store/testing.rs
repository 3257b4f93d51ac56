//! Fault-injecting store for tests

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use super::{InsertOutcome, MemoryStore, Store};
use crate::error::{Error, Result};
use crate::filter::DecisionCard;
use crate::position::Position;
use crate::risk::Incident;
use crate::trading::Order;

/// MemoryStore with switchable write failures and slow position writes
#[derive(Default)]
pub struct FaultyStore {
    pub inner: MemoryStore,
    pub fail_decisions: AtomicBool,
    /// 1 fails the next position write, 2 the one after; 0 never
    pub fail_nth_position_write: AtomicU32,
    pub position_write_delay_ms: AtomicU64,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for FaultyStore {
    async fn insert_decision(&self, card: &DecisionCard) -> Result<()> {
        if self.fail_decisions.load(Ordering::Relaxed) {
            return Err(Error::Store("disk full".into()));
        }
        self.inner.insert_decision(card).await
    }
    async fn insert_incident(&self, incident: &Incident) -> Result<()> {
        self.inner.insert_incident(incident).await
    }
    async fn insert_order(&self, order: &Order) -> Result<InsertOutcome> {
        self.inner.insert_order(order).await
    }
    async fn upsert_order(&self, order: &Order) -> Result<()> {
        self.inner.upsert_order(order).await
    }
    async fn upsert_position(&self, position: &Position) -> Result<()> {
        let delay = self.position_write_delay_ms.load(Ordering::Relaxed);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let countdown = self
            .fail_nth_position_write
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
        if countdown == Ok(1) {
            return Err(Error::Store("transient write failure".into()));
        }
        self.inner.upsert_position(position).await
    }
    async fn position(&self, id: &str) -> Result<Option<Position>> {
        self.inner.position(id).await
    }
    async fn open_positions(&self) -> Result<Vec<Position>> {
        self.inner.open_positions().await
    }
    async fn closed_positions(&self) -> Result<Vec<Position>> {
        self.inner.closed_positions().await
    }
    async fn confirmed_buy_count_since(&self, since: i64) -> Result<u32> {
        self.inner.confirmed_buy_count_since(since).await
    }
    async fn consecutive_losses(&self) -> Result<u32> {
        self.inner.consecutive_losses().await
    }
    async fn recent_decisions(&self, limit: usize) -> Result<Vec<DecisionCard>> {
        self.inner.recent_decisions(limit).await
    }
    async fn recent_incidents(&self, limit: usize) -> Result<Vec<Incident>> {
        self.inner.recent_incidents(limit).await
    }
    async fn orders_for_position(&self, position_id: &str) -> Result<Vec<Order>> {
        self.inner.orders_for_position(position_id).await
    }
}
