//! Immutable per-tick view of market state.
//!
//! Built once per engine tick from the store, then handed to every
//! evaluator. Evaluators are pure functions of this snapshot; all the
//! cross-entity joins happen here, once, through maps keyed by id.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::core::domain::{
    BookSnapshot, Event, EventId, LastTrade, Market, MarketDataHealth, MarketId, MarketLabel,
    Outcome, Signal, SignalType, Token, TokenId,
};
use crate::core::store::{Repository, SharedRepository};
use crate::error::Result;

/// Read-through view for one evaluation tick.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    signals: HashMap<SignalType, Vec<Signal>>,
    books: HashMap<TokenId, BookSnapshot>,
    health: HashMap<TokenId, MarketDataHealth>,
    last_trades: HashMap<TokenId, LastTrade>,
    labels: HashMap<MarketId, Vec<MarketLabel>>,
    events: HashMap<EventId, Event>,
    markets: HashMap<MarketId, Market>,
    tokens: HashMap<TokenId, Token>,
    tokens_by_market: HashMap<MarketId, Vec<TokenId>>,
    markets_by_event: HashMap<EventId, Vec<MarketId>>,
    /// Per-strategy stats JSON, keyed by strategy name.
    stats: HashMap<String, serde_json::Value>,
}

impl Snapshot {
    /// Build a snapshot of everything evaluators join against.
    pub async fn build(
        repo: &SharedRepository,
        signal_window: chrono::Duration,
        strategy_names: &[String],
    ) -> Result<Self> {
        let taken_at = Utc::now();

        let mut signals: HashMap<SignalType, Vec<Signal>> = HashMap::new();
        for signal in repo
            .list_signals_since(None, taken_at - signal_window)
            .await?
        {
            // Expired signals may not have been cleaned up yet.
            if signal.expires_at.is_some_and(|t| t <= taken_at) {
                continue;
            }
            signals
                .entry(signal.signal_type.clone())
                .or_default()
                .push(signal);
        }

        let books = repo
            .list_books()
            .await?
            .into_iter()
            .map(|b| (b.token_id.clone(), b))
            .collect();
        let health = repo
            .list_health()
            .await?
            .into_iter()
            .map(|h| (h.token_id.clone(), h))
            .collect();

        let mut labels: HashMap<MarketId, Vec<MarketLabel>> = HashMap::new();
        for label in repo.list_labels().await? {
            labels.entry(label.market_id.clone()).or_default().push(label);
        }

        let events: HashMap<EventId, Event> = repo
            .list_tradeable_events()
            .await?
            .into_iter()
            .map(|e| (e.id.clone(), e))
            .collect();

        let mut markets = HashMap::new();
        let mut markets_by_event: HashMap<EventId, Vec<MarketId>> = HashMap::new();
        for market in repo.list_tradeable_markets().await? {
            markets_by_event
                .entry(market.event_id.clone())
                .or_default()
                .push(market.id.clone());
            markets.insert(market.id.clone(), market);
        }

        let mut tokens = HashMap::new();
        let mut tokens_by_market: HashMap<MarketId, Vec<TokenId>> = HashMap::new();
        let mut last_trades = HashMap::new();
        for token in repo.list_tradeable_tokens().await? {
            if let Some(trade) = repo.get_last_trade(&token.id).await? {
                last_trades.insert(token.id.clone(), trade);
            }
            tokens_by_market
                .entry(token.market_id.clone())
                .or_default()
                .push(token.id.clone());
            tokens.insert(token.id.clone(), token);
        }

        let mut stats = HashMap::new();
        for name in strategy_names {
            if let Some(strategy) = repo.get_strategy(name).await? {
                stats.insert(name.clone(), strategy.stats);
            }
        }

        Ok(Self {
            taken_at,
            signals,
            books,
            health,
            last_trades,
            labels,
            events,
            markets,
            tokens,
            tokens_by_market,
            markets_by_event,
            stats,
        })
    }

    /// Signals of one type inside the window, oldest first.
    #[must_use]
    pub fn signals_of(&self, signal_type: &SignalType) -> &[Signal] {
        self.signals
            .get(signal_type)
            .map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn book(&self, token_id: &TokenId) -> Option<&BookSnapshot> {
        self.books.get(token_id)
    }

    #[must_use]
    pub fn health_of(&self, token_id: &TokenId) -> Option<&MarketDataHealth> {
        self.health.get(token_id)
    }

    #[must_use]
    pub fn last_trade(&self, token_id: &TokenId) -> Option<&LastTrade> {
        self.last_trades.get(token_id)
    }

    #[must_use]
    pub fn event(&self, event_id: &EventId) -> Option<&Event> {
        self.events.get(event_id)
    }

    #[must_use]
    pub fn market(&self, market_id: &MarketId) -> Option<&Market> {
        self.markets.get(market_id)
    }

    #[must_use]
    pub fn token(&self, token_id: &TokenId) -> Option<&Token> {
        self.tokens.get(token_id)
    }

    #[must_use]
    pub fn markets_of_event(&self, event_id: &EventId) -> &[MarketId] {
        self.markets_by_event
            .get(event_id)
            .map_or(&[], Vec::as_slice)
    }

    /// The market's token for the given outcome.
    #[must_use]
    pub fn outcome_token(&self, market_id: &MarketId, outcome: Outcome) -> Option<&Token> {
        self.tokens_by_market
            .get(market_id)?
            .iter()
            .filter_map(|id| self.tokens.get(id))
            .find(|t| t.outcome == outcome)
    }

    /// Labels on a market.
    #[must_use]
    pub fn labels_of(&self, market_id: &MarketId) -> &[MarketLabel] {
        self.labels.get(market_id).map_or(&[], Vec::as_slice)
    }

    /// Whether the market carries `label` (any sub-label).
    #[must_use]
    pub fn has_label(&self, market_id: &MarketId, label: &str) -> bool {
        self.labels_of(market_id).iter().any(|l| l.label == label)
    }

    /// Markets carrying `label`, with the matching sub-label when present.
    #[must_use]
    pub fn markets_with_label(&self, label: &str) -> Vec<&MarketLabel> {
        self.labels
            .values()
            .flatten()
            .filter(|l| l.label == label)
            .collect()
    }

    #[must_use]
    pub fn stats_of(&self, strategy: &str) -> Option<&serde_json::Value> {
        self.stats.get(strategy)
    }

    /// Milliseconds since the token's book was snapped; `i64::MAX` when no
    /// book exists.
    #[must_use]
    pub fn book_age_ms(&self, token_id: &TokenId) -> i64 {
        self.books.get(token_id).map_or(i64::MAX, |b| {
            (self.taken_at - b.snapshot_ts).num_milliseconds()
        })
    }

    /// Test builder seam.
    #[cfg(any(test, feature = "testkit"))]
    #[must_use]
    pub fn for_tests() -> SnapshotBuilder {
        SnapshotBuilder {
            snapshot: Self {
                taken_at: Utc::now(),
                ..Default::default()
            },
        }
    }
}

/// Hand-assembled snapshots for evaluator tests.
#[cfg(any(test, feature = "testkit"))]
pub struct SnapshotBuilder {
    snapshot: Snapshot,
}

#[cfg(any(test, feature = "testkit"))]
impl SnapshotBuilder {
    #[must_use]
    pub fn signal(mut self, signal: Signal) -> Self {
        self.snapshot
            .signals
            .entry(signal.signal_type.clone())
            .or_default()
            .push(signal);
        self
    }

    #[must_use]
    pub fn book(mut self, book: BookSnapshot) -> Self {
        self.snapshot.books.insert(book.token_id.clone(), book);
        self
    }

    #[must_use]
    pub fn health(mut self, health: MarketDataHealth) -> Self {
        self.snapshot.health.insert(health.token_id.clone(), health);
        self
    }

    #[must_use]
    pub fn event(mut self, event: Event) -> Self {
        self.snapshot.events.insert(event.id.clone(), event);
        self
    }

    #[must_use]
    pub fn market(mut self, market: Market) -> Self {
        self.snapshot
            .markets_by_event
            .entry(market.event_id.clone())
            .or_default()
            .push(market.id.clone());
        self.snapshot.markets.insert(market.id.clone(), market);
        self
    }

    #[must_use]
    pub fn token(mut self, token: Token) -> Self {
        self.snapshot
            .tokens_by_market
            .entry(token.market_id.clone())
            .or_default()
            .push(token.id.clone());
        self.snapshot.tokens.insert(token.id.clone(), token);
        self
    }

    #[must_use]
    pub fn label(mut self, label: MarketLabel) -> Self {
        self.snapshot
            .labels
            .entry(label.market_id.clone())
            .or_default()
            .push(label);
        self
    }

    #[must_use]
    pub fn stats(mut self, strategy: &str, stats: serde_json::Value) -> Self {
        self.snapshot.stats.insert(strategy.to_string(), stats);
        self
    }

    #[must_use]
    pub fn build(self) -> Snapshot {
        self.snapshot
    }
}
