//! WebSocket wire types for the market-data stream.

use serde::{Deserialize, Serialize};

use crate::core::domain::{BookSnapshot, PriceLevel, TokenId};

/// Initial subscription request.
#[derive(Debug, Serialize)]
pub struct SubscribeMessage {
    pub assets_ids: Vec<String>,
    #[serde(rename = "type")]
    pub msg_type: String,
}

impl SubscribeMessage {
    #[must_use]
    pub fn new(asset_ids: Vec<String>) -> Self {
        Self {
            assets_ids: asset_ids,
            msg_type: "market".into(),
        }
    }
}

/// Incremental subscription update sent on refresh.
#[derive(Debug, Serialize)]
pub struct UpdateSubscriptionMessage {
    pub assets_ids: Vec<String>,
    pub operation: String,
}

impl UpdateSubscriptionMessage {
    #[must_use]
    pub fn subscribe(asset_ids: Vec<String>) -> Self {
        Self {
            assets_ids: asset_ids,
            operation: "subscribe".into(),
        }
    }

    #[must_use]
    pub fn unsubscribe(asset_ids: Vec<String>) -> Self {
        Self {
            assets_ids: asset_ids,
            operation: "unsubscribe".into(),
        }
    }
}

/// Reply to a server-initiated ping.
#[derive(Debug, Serialize)]
pub struct PongMessage {
    pub event_type: String,
}

impl Default for PongMessage {
    fn default() -> Self {
        Self {
            event_type: "pong".into(),
        }
    }
}

/// Messages received from the market-data stream.
#[derive(Debug, Deserialize)]
#[serde(tag = "event_type")]
pub enum WsMessage {
    #[serde(rename = "book")]
    Book(BookMessage),

    #[serde(rename = "price_change")]
    PriceChange(PriceChangeMessage),

    #[serde(rename = "last_trade_price")]
    LastTradePrice(LastTradeMessage),

    #[serde(rename = "tick_size_change")]
    TickSizeChange(serde_json::Value),

    #[serde(rename = "ping")]
    Ping,

    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub struct BookMessage {
    pub asset_id: String,
    pub market: Option<String>,
    pub bids: Vec<WsPriceLevel>,
    pub asks: Vec<WsPriceLevel>,
    pub timestamp: Option<String>,
    pub hash: Option<String>,
}

impl BookMessage {
    /// Convert this wire message to a domain [`BookSnapshot`].
    ///
    /// Levels arrive unordered; bids are sorted best (highest) first and
    /// asks best (lowest) first. The wire timestamp is epoch millis; a
    /// missing or malformed one falls back to `received_at`.
    #[must_use]
    pub fn to_snapshot(&self, received_at: chrono::DateTime<chrono::Utc>) -> BookSnapshot {
        let mut bids = Self::parse_levels(&self.bids);
        let mut asks = Self::parse_levels(&self.asks);
        bids.sort_by(|a, b| b.price.cmp(&a.price));
        asks.sort_by(|a, b| a.price.cmp(&b.price));

        let ts = self
            .timestamp
            .as_deref()
            .and_then(|t| t.parse::<i64>().ok())
            .and_then(chrono::DateTime::from_timestamp_millis)
            .unwrap_or(received_at);

        BookSnapshot::new(TokenId::from(self.asset_id.clone()), ts, bids, asks)
    }

    fn parse_levels(levels: &[WsPriceLevel]) -> Vec<PriceLevel> {
        levels
            .iter()
            .filter_map(|pl| Some(PriceLevel::new(pl.price.parse().ok()?, pl.size.parse().ok()?)))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct PriceChangeMessage {
    pub asset_id: String,
    pub market: Option<String>,
    pub price: Option<String>,
    pub changes: Option<Vec<WsPriceLevel>>,
    pub timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LastTradeMessage {
    pub asset_id: String,
    pub market: Option<String>,
    pub price: Option<String>,
    pub timestamp: Option<String>,
}

/// Price level as received on the wire (strings, not decimals).
#[derive(Debug, Clone, Deserialize)]
pub struct WsPriceLevel {
    pub price: String,
    pub size: String,
}
