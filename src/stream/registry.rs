//! Asset registry
//!
//! Learns asset descriptors (creator, launch and graduation times, venue,
//! token authorities) from the event stream and counts buys for the
//! evaluation trigger.

use std::collections::HashMap;
use tracing::debug;

use super::event::{AssetInfo, Event, EventKind};

/// What an event changed for its asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetUpdate {
    /// Nothing notable
    None,
    /// Buy count just reached the evaluation trigger
    ReachedBuyTrigger,
    /// Asset graduated to a pooled venue
    Graduated,
}

#[derive(Debug, Clone)]
struct AssetEntry {
    info: AssetInfo,
    buy_count: u32,
}

/// Registry of every asset seen on the stream
#[derive(Debug, Default)]
pub struct AssetRegistry {
    assets: HashMap<String, AssetEntry>,
    trigger_buy_count: u32,
}

impl AssetRegistry {
    pub fn new(trigger_buy_count: u32) -> Self {
        Self {
            assets: HashMap::new(),
            trigger_buy_count: trigger_buy_count.max(1),
        }
    }

    /// Fold an event into the registry
    pub fn observe(&mut self, event: &Event) -> AssetUpdate {
        let trigger = self.trigger_buy_count;
        let entry = self
            .assets
            .entry(event.asset_id.clone())
            .or_insert_with(|| AssetEntry {
                info: AssetInfo::new(&event.asset_id),
                buy_count: 0,
            });

        if let Some(revoked) = event.mint_authority_revoked {
            entry.info.mint_authority_revoked = revoked;
        }
        if let Some(revoked) = event.freeze_authority_revoked {
            entry.info.freeze_authority_revoked = revoked;
        }

        match event.kind {
            EventKind::Launch => {
                entry.info.creator = Some(event.wallet_id.clone());
                entry.info.launched_at = Some(event.timestamp);
                debug!(asset = %event.asset_id, creator = %event.wallet_id, "Registered launch");
                AssetUpdate::None
            }
            EventKind::Buy => {
                entry.buy_count += 1;
                if entry.buy_count == trigger {
                    AssetUpdate::ReachedBuyTrigger
                } else {
                    AssetUpdate::None
                }
            }
            EventKind::Sell => AssetUpdate::None,
            EventKind::Graduation => {
                if entry.info.graduated_at.is_some() {
                    return AssetUpdate::None;
                }
                entry.info.graduated_at = Some(event.timestamp);
                entry.info.has_pool = true;
                debug!(asset = %event.asset_id, "Registered graduation");
                AssetUpdate::Graduated
            }
        }
    }

    /// Descriptor for an asset (a bare one if never seen)
    pub fn info(&self, asset_id: &str) -> AssetInfo {
        self.assets
            .get(asset_id)
            .map(|e| e.info.clone())
            .unwrap_or_else(|| AssetInfo::new(asset_id))
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}
