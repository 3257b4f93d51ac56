//! Inbound market event contract
//!
//! Events are produced by an external event source (launch detector, trade
//! feed) and consumed by the feature aggregator. Timestamps are epoch
//! milliseconds and are authoritative for windowing.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Kind of market event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// New token launched on the bonding curve
    Launch,
    /// Token bought
    Buy,
    /// Token sold
    Sell,
    /// Bonding curve completed, token migrated to a pooled venue
    Graduation,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventKind::Launch => "LAUNCH",
            EventKind::Buy => "BUY",
            EventKind::Sell => "SELL",
            EventKind::Graduation => "GRADUATION",
        };
        write!(f, "{}", s)
    }
}

/// A single market event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub kind: EventKind,
    pub asset_id: String,
    pub wallet_id: String,
    /// Quote amount of the trade (0 for non-trade events)
    pub amount_units: f64,
    /// Epoch milliseconds
    pub timestamp: i64,
    /// Last traded price in quote units per token, when known
    #[serde(default)]
    pub price: Option<f64>,
    /// Mint authority state reported with a launch or graduation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mint_authority_revoked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freeze_authority_revoked: Option<bool>,
}

impl Event {
    pub fn new(kind: EventKind, asset_id: &str, wallet_id: &str, amount_units: f64, timestamp: i64) -> Self {
        Self {
            kind,
            asset_id: asset_id.to_string(),
            wallet_id: wallet_id.to_string(),
            amount_units,
            timestamp,
            price: None,
            mint_authority_revoked: None,
            freeze_authority_revoked: None,
        }
    }

    /// Attach a trade price
    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    /// Attach the token's authority state
    pub fn with_authorities(mut self, mint_revoked: bool, freeze_revoked: bool) -> Self {
        self.mint_authority_revoked = Some(mint_revoked);
        self.freeze_authority_revoked = Some(freeze_revoked);
        self
    }

    /// Reject events the aggregator cannot window or sum
    pub fn validate(&self) -> Result<()> {
        if self.asset_id.is_empty() {
            return Err(Error::InvalidEvent("empty asset id".to_string()));
        }
        if !self.amount_units.is_finite() || self.amount_units < 0.0 {
            return Err(Error::InvalidEvent(format!(
                "{} {} has invalid amount {}",
                self.kind, self.asset_id, self.amount_units
            )));
        }
        if let Some(price) = self.price {
            if !price.is_finite() || price <= 0.0 {
                return Err(Error::InvalidEvent(format!(
                    "{} {} has invalid price {}",
                    self.kind, self.asset_id, price
                )));
            }
        }
        Ok(())
    }
}

/// Descriptor of an observed asset, supplied to the filters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetInfo {
    pub asset_id: String,
    /// Wallet that launched the token
    pub creator: Option<String>,
    pub launched_at: Option<i64>,
    pub graduated_at: Option<i64>,
    /// A pooled-liquidity venue exists (set on graduation)
    pub has_pool: bool,
    pub mint_authority_revoked: bool,
    pub freeze_authority_revoked: bool,
}

impl AssetInfo {
    /// Descriptor for an asset we have not seen launch. Pump.fun mints are
    /// created with both authorities revoked unless an event says otherwise.
    pub fn new(asset_id: &str) -> Self {
        Self {
            asset_id: asset_id.to_string(),
            creator: None,
            launched_at: None,
            graduated_at: None,
            has_pool: false,
            mint_authority_revoked: true,
            freeze_authority_revoked: true,
        }
    }
}

/// Current wall-clock time in epoch milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_validation() {
        let ok = Event::new(EventKind::Buy, "mint1", "w1", 0.5, 1_000).with_price(0.0001);
        assert!(ok.validate().is_ok());

        let negative = Event::new(EventKind::Buy, "mint1", "w1", -1.0, 1_000);
        assert!(negative.validate().is_err());

        let nan_price = Event::new(EventKind::Sell, "mint1", "w1", 0.5, 1_000).with_price(f64::NAN);
        assert!(nan_price.validate().is_err());

        let no_asset = Event::new(EventKind::Launch, "", "w1", 0.0, 1_000);
        assert!(no_asset.validate().is_err());
    }

    #[test]
    fn test_event_json_shape() {
        let event = Event::new(EventKind::Graduation, "mint1", "pool", 0.0, 42);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "GRADUATION");
        assert_eq!(json["assetId"], "mint1");
        assert_eq!(json["timestamp"], 42);
        assert!(json.get("mintAuthorityRevoked").is_none());
    }

    #[test]
    fn test_authorities_parse_from_launch_json() {
        let json = r#"{"kind":"LAUNCH","assetId":"mint1","walletId":"dev","amountUnits":0.0,
            "timestamp":7,"mintAuthorityRevoked":false,"freezeAuthorityRevoked":true}"#;
        let event: Event = serde_json::from_str(json).unwrap();
        assert_eq!(event.mint_authority_revoked, Some(false));
        assert_eq!(event.freeze_authority_revoked, Some(true));
        assert_eq!(event.price, None);
    }
}
