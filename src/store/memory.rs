//! In-memory store with JSON snapshots

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

use super::{InsertOutcome, Store};
use crate::error::{Error, Result};
use crate::filter::DecisionCard;
use crate::position::{Position, PositionStatus};
use crate::risk::Incident;
use crate::trading::{Order, OrderSide, OrderStatus};

/// Serialized form of the whole store
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreSnapshot {
    decisions: Vec<DecisionCard>,
    incidents: Vec<Incident>,
    orders: Vec<Order>,
    positions: Vec<Position>,
}

/// DashMap-backed store
#[derive(Debug, Default)]
pub struct MemoryStore {
    decisions: DashMap<String, DecisionCard>,
    incidents: DashMap<String, Incident>,
    orders: DashMap<String, Order>,
    /// idempotency key -> order id
    order_keys: DashMap<String, String>,
    positions: DashMap<String, Position>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write every record to a JSON file
    pub async fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<()> {
        let snapshot = StoreSnapshot {
            decisions: self.decisions.iter().map(|e| e.value().clone()).collect(),
            incidents: self.incidents.iter().map(|e| e.value().clone()).collect(),
            orders: self.orders.iter().map(|e| e.value().clone()).collect(),
            positions: self.positions.iter().map(|e| e.value().clone()).collect(),
        };
        let json = serde_json::to_vec_pretty(&snapshot)?;
        tokio::fs::write(path.as_ref(), json).await?;
        info!(
            path = %path.as_ref().display(),
            decisions = snapshot.decisions.len(),
            orders = snapshot.orders.len(),
            positions = snapshot.positions.len(),
            "Saved store snapshot"
        );
        Ok(())
    }

    /// Rebuild a store from a snapshot file
    pub async fn load_snapshot(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = tokio::fs::read(path.as_ref()).await?;
        let snapshot: StoreSnapshot = serde_json::from_slice(&bytes)?;

        let store = Self::new();
        for card in snapshot.decisions {
            store.decisions.insert(card.id.clone(), card);
        }
        for incident in snapshot.incidents {
            store.incidents.insert(incident.id.clone(), incident);
        }
        for order in snapshot.orders {
            match store.order_keys.entry(order.idempotency_key.clone()) {
                Entry::Occupied(_) => return Err(Error::DuplicateOrder(order.idempotency_key)),
                Entry::Vacant(slot) => {
                    slot.insert(order.id.clone());
                }
            }
            store.orders.insert(order.id.clone(), order);
        }
        for position in snapshot.positions {
            store.positions.insert(position.id.clone(), position);
        }
        info!(path = %path.as_ref().display(), orders = store.orders.len(), "Loaded store snapshot");
        Ok(store)
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn decision_count(&self) -> usize {
        self.decisions.len()
    }

    pub fn incident_count(&self) -> usize {
        self.incidents.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_decision(&self, card: &DecisionCard) -> Result<()> {
        match self.decisions.entry(card.id.clone()) {
            Entry::Occupied(_) => Err(Error::Store(format!("decision {} already recorded", card.id))),
            Entry::Vacant(slot) => {
                slot.insert(card.clone());
                Ok(())
            }
        }
    }

    async fn insert_incident(&self, incident: &Incident) -> Result<()> {
        match self.incidents.entry(incident.id.clone()) {
            Entry::Occupied(_) => Err(Error::Store(format!("incident {} already recorded", incident.id))),
            Entry::Vacant(slot) => {
                slot.insert(incident.clone());
                Ok(())
            }
        }
    }

    async fn insert_order(&self, order: &Order) -> Result<InsertOutcome> {
        match self.order_keys.entry(order.idempotency_key.clone()) {
            Entry::Occupied(existing) => {
                debug!(key = %order.idempotency_key, existing = %existing.get(), "Duplicate order rejected");
                Ok(InsertOutcome::Duplicate)
            }
            Entry::Vacant(slot) => {
                slot.insert(order.id.clone());
                self.orders.insert(order.id.clone(), order.clone());
                Ok(InsertOutcome::Inserted)
            }
        }
    }

    async fn upsert_order(&self, order: &Order) -> Result<()> {
        match self.orders.get_mut(&order.id) {
            Some(mut stored) => {
                if !stored.merge_terminal_fields(order) {
                    warn!(
                        order = %order.id,
                        settled = ?stored.status,
                        update = ?order.status,
                        "Ignored update to a settled order"
                    );
                }
                Ok(())
            }
            None => Err(Error::OrderNotFound(order.id.clone())),
        }
    }

    async fn upsert_position(&self, position: &Position) -> Result<()> {
        self.positions.insert(position.id.clone(), position.clone());
        Ok(())
    }

    async fn position(&self, id: &str) -> Result<Option<Position>> {
        Ok(self.positions.get(id).map(|p| p.value().clone()))
    }

    async fn open_positions(&self) -> Result<Vec<Position>> {
        let mut open: Vec<Position> = self
            .positions
            .iter()
            .filter(|p| p.status != PositionStatus::Closed)
            .map(|p| p.value().clone())
            .collect();
        open.sort_by_key(|p| std::cmp::Reverse(p.opened_at));
        Ok(open)
    }

    async fn closed_positions(&self) -> Result<Vec<Position>> {
        let mut closed: Vec<Position> = self
            .positions
            .iter()
            .filter(|p| p.status == PositionStatus::Closed)
            .map(|p| p.value().clone())
            .collect();
        closed.sort_by_key(|p| std::cmp::Reverse(p.closed_at.unwrap_or(p.updated_at)));
        Ok(closed)
    }

    async fn confirmed_buy_count_since(&self, since: i64) -> Result<u32> {
        let entries: HashSet<String> = self
            .orders
            .iter()
            .filter(|o| o.side == OrderSide::Buy && o.status == OrderStatus::Confirmed && o.created_at >= since)
            .map(|o| o.decision_id.clone().unwrap_or_else(|| o.id.clone()))
            .collect();
        Ok(entries.len() as u32)
    }

    async fn consecutive_losses(&self) -> Result<u32> {
        let closed = self.closed_positions().await?;
        Ok(closed.iter().take_while(|p| p.realized_pnl < 0.0).count() as u32)
    }

    async fn recent_decisions(&self, limit: usize) -> Result<Vec<DecisionCard>> {
        let mut cards: Vec<DecisionCard> = self.decisions.iter().map(|e| e.value().clone()).collect();
        cards.sort_by_key(|c| std::cmp::Reverse(c.timestamp));
        cards.truncate(limit);
        Ok(cards)
    }

    async fn recent_incidents(&self, limit: usize) -> Result<Vec<Incident>> {
        let mut incidents: Vec<Incident> = self.incidents.iter().map(|e| e.value().clone()).collect();
        incidents.sort_by_key(|i| std::cmp::Reverse(i.timestamp));
        incidents.truncate(limit);
        Ok(incidents)
    }

    async fn orders_for_position(&self, position_id: &str) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|o| o.position_id.as_deref() == Some(position_id))
            .map(|o| o.value().clone())
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }
}
