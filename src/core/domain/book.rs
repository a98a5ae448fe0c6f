//! Order-book snapshots and per-token market-data health.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::TokenId;
use super::money::Price;

/// A single price level in the order book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Price,
    pub size: Decimal,
}

impl PriceLevel {
    #[must_use]
    pub const fn new(price: Price, size: Decimal) -> Self {
        Self { price, size }
    }
}

/// Latest order-book snapshot for a token. Only the top-N levels are
/// retained; `mid` is derived when both sides are present.
#[derive(Debug, Clone, PartialEq)]
pub struct BookSnapshot {
    pub token_id: TokenId,
    pub snapshot_ts: DateTime<Utc>,
    /// Bids sorted best (highest) first.
    pub bids: Vec<PriceLevel>,
    /// Asks sorted best (lowest) first.
    pub asks: Vec<PriceLevel>,
}

impl BookSnapshot {
    #[must_use]
    pub fn new(
        token_id: TokenId,
        snapshot_ts: DateTime<Utc>,
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
    ) -> Self {
        Self {
            token_id,
            snapshot_ts,
            bids,
            asks,
        }
    }

    #[must_use]
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.first().map(|l| l.price)
    }

    #[must_use]
    pub fn best_ask(&self) -> Option<Price> {
        self.asks.first().map(|l| l.price)
    }

    /// Mid price, `(bid + ask) / 2`, when both sides are present.
    #[must_use]
    pub fn mid(&self) -> Option<Price> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
            _ => None,
        }
    }

    /// Spread in basis points relative to mid. Float: a statistic.
    #[must_use]
    pub fn spread_bps(&self) -> Option<f64> {
        let bid = self.best_bid()?;
        let ask = self.best_ask()?;
        let mid = self.mid()?;
        if mid.is_zero() {
            return None;
        }
        let spread = (ask - bid) / mid * Decimal::from(10_000);
        spread.to_f64()
    }

    /// Age of this snapshot relative to `now`, in whole seconds.
    #[must_use]
    pub fn age_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.snapshot_ts).num_seconds()
    }

    /// Total notional resting on the ask side over the published levels.
    #[must_use]
    pub fn ask_notional(&self) -> Decimal {
        self.asks.iter().map(|l| l.price * l.size).sum()
    }

    /// Total notional resting on the bid side over the published levels.
    #[must_use]
    pub fn bid_notional(&self) -> Decimal {
        self.bids.iter().map(|l| l.price * l.size).sum()
    }
}

/// Derived per-token freshness and volatility metrics, recomputed on every
/// book update.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketDataHealth {
    pub token_id: TokenId,
    pub last_ws_ts: Option<DateTime<Utc>>,
    pub last_rest_ts: Option<DateTime<Utc>>,
    pub spread_bps: Option<f64>,
    /// Magnitude of the most recent mid move, in bps of the previous mid.
    pub price_jump_bps: Option<f64>,
    pub last_book_change_ts: Option<DateTime<Utc>>,
    pub stale: bool,
}

impl MarketDataHealth {
    #[must_use]
    pub fn new(token_id: TokenId) -> Self {
        Self {
            token_id,
            last_ws_ts: None,
            last_rest_ts: None,
            spread_bps: None,
            price_jump_bps: None,
            last_book_change_ts: None,
            stale: true,
        }
    }
}

/// Latest observed trade for a token.
#[derive(Debug, Clone, PartialEq)]
pub struct LastTrade {
    pub token_id: TokenId,
    pub price: Price,
    pub trade_ts: DateTime<Utc>,
}
