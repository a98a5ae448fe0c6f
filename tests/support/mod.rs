//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::mpsc;

use parlay::core::domain::{
    BookSnapshot, Event, EventId, Market, MarketId, Outcome, PriceLevel, Signal, Token, TokenId,
};
use parlay::core::exchange::{OrderResponse, PlaceOrderRequest};
use parlay::core::signal::collector::SignalEmitter;
use parlay::core::store::{MemoryRepository, Repository, SharedRepository};
use parlay::core::trade::ExchangeApi;
use parlay::error::{Error, Result};

pub fn repo() -> (Arc<MemoryRepository>, SharedRepository) {
    let repo = Arc::new(MemoryRepository::new());
    let shared = Arc::clone(&repo) as SharedRepository;
    (repo, shared)
}

/// Seed one tradeable event.
pub async fn seed_event(repo: &dyn Repository, id: &str) {
    repo.upsert_event(&Event {
        id: EventId::from(id),
        slug: format!("{id}-slug"),
        title: format!("Event {id}"),
        active: true,
        closed: false,
        end_time: Some(Utc::now() + chrono::Duration::days(7)),
        series_id: None,
    })
    .await
    .unwrap();
}

/// Seed a binary market with its YES/NO token pair.
pub async fn seed_market(repo: &dyn Repository, event: &str, market: &str, yes: &str, no: &str) {
    repo.upsert_market(&Market {
        id: MarketId::from(market),
        event_id: EventId::from(event),
        slug: format!("{market}-slug"),
        question: format!("Will {market} resolve yes?"),
        condition_id: format!("0x{market}"),
        tick_size: Decimal::new(1, 2),
        active: true,
        closed: false,
        neg_risk: false,
    })
    .await
    .unwrap();
    repo.upsert_token(&Token {
        id: TokenId::from(yes),
        market_id: MarketId::from(market),
        outcome: Outcome::Yes,
    })
    .await
    .unwrap();
    repo.upsert_token(&Token {
        id: TokenId::from(no),
        market_id: MarketId::from(market),
        outcome: Outcome::No,
    })
    .await
    .unwrap();
}

/// Seed a one-level book for a token.
pub async fn seed_book(repo: &dyn Repository, token: &str, bid: Decimal, ask: Decimal) {
    repo.upsert_book(&BookSnapshot::new(
        TokenId::from(token),
        Utc::now(),
        vec![PriceLevel::new(bid, Decimal::from(1000))],
        vec![PriceLevel::new(ask, Decimal::from(1000))],
    ))
    .await
    .unwrap();
}

/// A bounded channel pair for driving collectors by hand.
pub fn emitter(buffer: usize) -> (SignalEmitter, mpsc::Receiver<Signal>) {
    let (tx, rx) = mpsc::channel(buffer);
    (SignalEmitter::new(tx), rx)
}

pub fn drain_signals(rx: &mut mpsc::Receiver<Signal>) -> Vec<Signal> {
    let mut out = Vec::new();
    while let Ok(signal) = rx.try_recv() {
        out.push(signal);
    }
    out
}

/// Exchange double whose fill level is adjustable mid-test.
pub struct ScriptedExchange {
    fill_usd: Mutex<Decimal>,
    avg_price: Decimal,
}

impl ScriptedExchange {
    pub fn new(avg_price: Decimal) -> Self {
        Self {
            fill_usd: Mutex::new(Decimal::ZERO),
            avg_price,
        }
    }

    /// Set the cumulative filled notional reported on the next poll.
    pub fn set_filled(&self, filled: Decimal) {
        *self.fill_usd.lock() = filled;
    }
}

#[async_trait]
impl ExchangeApi for ScriptedExchange {
    async fn place_order(&self, request: &PlaceOrderRequest) -> Result<OrderResponse> {
        Ok(OrderResponse {
            order_id: Some(format!("ext-{}", request.client_order_id)),
            status: Some("open".into()),
            filled_usd: Some(Decimal::ZERO),
            avg_price: None,
            fee: None,
            filled_at: None,
            cancelled_at: None,
            failure_reason: None,
        })
    }

    async fn get_order(&self, external_order_id: &str) -> Result<OrderResponse> {
        let filled = *self.fill_usd.lock();
        if external_order_id.is_empty() {
            return Err(Error::NotFound("order".into()));
        }
        let status = if filled.is_zero() { "open" } else { "partial" };
        Ok(OrderResponse {
            order_id: Some(external_order_id.to_string()),
            status: Some(status.into()),
            filled_usd: Some(filled),
            avg_price: Some(self.avg_price),
            fee: Some(Decimal::ZERO),
            filled_at: None,
            cancelled_at: None,
            failure_reason: None,
        })
    }

    async fn cancel_order(&self, external_order_id: &str) -> Result<OrderResponse> {
        Ok(OrderResponse {
            order_id: Some(external_order_id.to_string()),
            status: Some("cancelled".into()),
            filled_usd: None,
            avg_price: None,
            fee: None,
            filled_at: None,
            cancelled_at: Some(Utc::now().to_rfc3339()),
            failure_reason: None,
        })
    }
}
