//! Internal market scanner.
//!
//! One tick runs five independent scans over the stored market state:
//! liquidity gaps, arb-sum deviation, systematic NO bias, FDV overpricing
//! and price anomalies. Each scan emits its own signal type; a failing
//! scan degrades health without stopping the others.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::json;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use super::{Collector, HealthCell, HealthSnapshot, SignalEmitter};
use crate::core::domain::{
    clamp01, BookSnapshot, Direction, Outcome, Signal, SignalType, SourceInfo, SourceType, Token,
    TokenId,
};
use crate::core::shutdown::ShutdownToken;
use crate::core::store::{Repository, SharedRepository};
use crate::error::Result;

/// Baked-in category NO-rates used until the settlement aggregator has
/// enough evidence to overwrite them.
pub const DEFAULT_CATEGORY_NO_RATES: &[(&str, f64)] = &[
    ("pre_market_fdv", 0.80),
    ("token_listing", 0.75),
    ("celebrity_quote", 0.85),
];

#[derive(Debug, Clone)]
pub struct InternalScanConfig {
    pub scan_interval: Duration,
    /// Minimum spread for a liquidity-gap signal, in bps.
    pub min_spread_bps: f64,
    /// Minimum YES tokens per event for the arb-sum scan.
    pub min_markets: usize,
    /// Minimum |sum - 1| deviation, in percent.
    pub min_deviation_pct: f64,
    /// Categories eligible for the NO-bias scan.
    pub no_bias_categories: Vec<String>,
    /// Minimum expected value for a NO-bias signal, in percent.
    pub min_ev_pct: f64,
    /// Evidence threshold for trusting learned NO-rates.
    pub min_samples: u64,
    /// Per-token cooldown for NO-bias and price-anomaly emissions.
    pub cooldown: Duration,
}

impl Default for InternalScanConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(30),
            min_spread_bps: 300.0,
            min_markets: 2,
            min_deviation_pct: 2.0,
            no_bias_categories: DEFAULT_CATEGORY_NO_RATES
                .iter()
                .map(|(label, _)| (*label).to_string())
                .collect(),
            min_ev_pct: 10.0,
            min_samples: 10,
            cooldown: Duration::from_secs(10 * 60),
        }
    }
}

pub struct InternalScanCollector {
    repo: SharedRepository,
    config: InternalScanConfig,
    health: HealthCell,
    cooldowns: Mutex<HashMap<(TokenId, &'static str), DateTime<Utc>>>,
}

impl InternalScanCollector {
    #[must_use]
    pub fn new(repo: SharedRepository, config: InternalScanConfig) -> Self {
        Self {
            repo,
            config,
            health: HealthCell::new(),
            cooldowns: Mutex::new(HashMap::new()),
        }
    }

    /// True when `token` is still cooling down for `scan`; records the
    /// emission otherwise.
    fn on_cooldown(&self, token: &TokenId, scan: &'static str, now: DateTime<Utc>) -> bool {
        let cooldown = chrono::Duration::from_std(self.config.cooldown)
            .unwrap_or_else(|_| chrono::Duration::minutes(10));
        let mut cooldowns = self.cooldowns.lock();
        match cooldowns.get(&(token.clone(), scan)) {
            Some(last) if now - *last < cooldown => true,
            _ => {
                cooldowns.insert((token.clone(), scan), now);
                false
            }
        }
    }

    /// One full scan pass. Test seam; the daemon path goes through
    /// [`Collector::produce`].
    #[cfg(any(test, feature = "testkit"))]
    pub async fn scan_once(&self, out: &SignalEmitter) {
        self.run_scans(out).await;
    }

    async fn run_scans(&self, out: &SignalEmitter) {
        let mut failures = Vec::new();

        if let Err(e) = self.scan_liquidity_gaps(out).await {
            failures.push(format!("liquidity_gap: {e}"));
        }
        if let Err(e) = self.scan_arb_sum(out).await {
            failures.push(format!("arb_sum_deviation: {e}"));
        }
        if let Err(e) = self.scan_no_bias(out).await {
            failures.push(format!("no_bias: {e}"));
        }
        if let Err(e) = self.scan_fdv_overpriced(out).await {
            failures.push(format!("fdv_overpriced: {e}"));
        }
        if let Err(e) = self.scan_price_anomalies(out).await {
            failures.push(format!("price_anomaly: {e}"));
        }

        if failures.is_empty() {
            self.health.healthy();
        } else {
            warn!(failures = ?failures, "internal scan partially failed");
            self.health.degraded(failures.join("; "));
        }
    }

    /// Tradeable YES tokens joined with their latest books.
    async fn yes_tokens_with_books(&self) -> Result<Vec<(Token, BookSnapshot)>> {
        let tokens = self.repo.list_tradeable_tokens().await?;
        let books: HashMap<TokenId, BookSnapshot> = self
            .repo
            .list_books()
            .await?
            .into_iter()
            .map(|b| (b.token_id.clone(), b))
            .collect();
        Ok(tokens
            .into_iter()
            .filter(|t| t.outcome == Outcome::Yes)
            .filter_map(|t| {
                let book = books.get(&t.id)?.clone();
                Some((t, book))
            })
            .collect())
    }

    async fn scan_liquidity_gaps(&self, out: &SignalEmitter) -> Result<()> {
        for (token, book) in self.yes_tokens_with_books().await? {
            let Some(spread_bps) = book.spread_bps() else {
                continue;
            };
            if spread_bps < self.config.min_spread_bps {
                continue;
            }
            let signal = Signal::builder(SignalType::LiquidityGap, self.name())
                .market(token.market_id.clone())
                .token(token.id.clone())
                .direction(Direction::Both)
                .strength(clamp01(spread_bps / 1000.0))
                .payload(json!({ "spread_bps": spread_bps }))
                .build();
            out.emit(signal);
        }
        Ok(())
    }

    async fn scan_arb_sum(&self, out: &SignalEmitter) -> Result<()> {
        // Group YES mids by event.
        let markets: HashMap<_, _> = self
            .repo
            .list_tradeable_markets()
            .await?
            .into_iter()
            .map(|m| (m.id.clone(), m))
            .collect();

        let mut sums: HashMap<crate::core::domain::EventId, (Decimal, usize)> = HashMap::new();
        for (token, book) in self.yes_tokens_with_books().await? {
            let Some(market) = markets.get(&token.market_id) else {
                continue;
            };
            let Some(mid) = book.mid() else {
                continue;
            };
            let entry = sums.entry(market.event_id.clone()).or_insert((Decimal::ZERO, 0));
            entry.0 += mid;
            entry.1 += 1;
        }

        for (event_id, (sum, count)) in sums {
            if count < self.config.min_markets {
                continue;
            }
            let deviation = (sum - Decimal::ONE).abs();
            let dev_pct = deviation.to_f64().unwrap_or(0.0) * 100.0;
            if dev_pct < self.config.min_deviation_pct {
                continue;
            }
            let direction = if sum < Decimal::ONE {
                Direction::Yes
            } else {
                Direction::No
            };
            debug!(event = %event_id, %sum, dev_pct, "arb-sum deviation");
            let signal = Signal::builder(SignalType::ArbSumDeviation, self.name())
                .event(event_id)
                .direction(direction)
                .strength(clamp01(dev_pct / 10.0))
                .payload(json!({ "sum": sum.to_string(), "dev_pct": dev_pct, "markets": count }))
                .build();
            out.emit(signal);
        }
        Ok(())
    }

    /// Learned per-category NO-rates from `systematic_no` stats when backed
    /// by enough samples, else the baked-in table.
    async fn category_no_rates(&self) -> Result<HashMap<String, f64>> {
        let fallback = || {
            DEFAULT_CATEGORY_NO_RATES
                .iter()
                .map(|(label, rate)| ((*label).to_string(), *rate))
                .collect()
        };

        let Some(strategy) = self.repo.get_strategy("systematic_no").await? else {
            return Ok(fallback());
        };
        let stats = &strategy.stats;
        let samples = stats
            .get("min_samples")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0);
        let Some(rates) = stats.get("category_no_rates").and_then(|v| v.as_object()) else {
            return Ok(fallback());
        };
        if samples < self.config.min_samples {
            return Ok(fallback());
        }
        Ok(rates
            .iter()
            .filter_map(|(label, rate)| Some((label.clone(), rate.as_f64()?)))
            .collect())
    }

    async fn scan_no_bias(&self, out: &SignalEmitter) -> Result<()> {
        let no_rates = self.category_no_rates().await?;
        let now = Utc::now();
        let lo = Decimal::new(20, 2); // 0.20
        let hi = Decimal::new(55, 2); // 0.55

        for category in &self.config.no_bias_categories {
            let Some(no_rate) = no_rates.get(category).copied() else {
                continue;
            };
            for market_id in self.repo.list_markets_with_label(category).await? {
                let tokens = self.repo.list_tokens_by_market(&market_id).await?;
                let Some(no_token) = tokens.iter().find(|t| t.outcome == Outcome::No) else {
                    continue;
                };
                let Some(book) = self.repo.get_book(&no_token.id).await? else {
                    continue;
                };
                let Some(price) = book.best_ask().or_else(|| book.mid()) else {
                    continue;
                };
                if price < lo || price > hi {
                    continue;
                }
                let price_f = price.to_f64().unwrap_or(1.0);
                let ev_pct = (no_rate - price_f) / price_f * 100.0;
                if ev_pct < self.config.min_ev_pct {
                    continue;
                }
                if self.on_cooldown(&no_token.id, "no_bias", now) {
                    continue;
                }
                let signal = Signal::builder(SignalType::NoBias, self.name())
                    .market(market_id.clone())
                    .token(no_token.id.clone())
                    .direction(Direction::No)
                    .strength(clamp01(ev_pct / 100.0))
                    .payload(json!({
                        "category": category,
                        "no_rate": no_rate,
                        "no_price": price.to_string(),
                        "ev_pct": ev_pct,
                    }))
                    .build();
                out.emit(signal);
            }
        }
        Ok(())
    }

    async fn scan_fdv_overpriced(&self, out: &SignalEmitter) -> Result<()> {
        let now = Utc::now();
        let lo = Decimal::new(35, 2); // 0.35
        let hi = Decimal::new(55, 2); // 0.55

        for market_id in self.repo.list_markets_with_label("pre_market_fdv").await? {
            let Some(market) = self.repo.get_market(&market_id).await? else {
                continue;
            };
            let Some(event) = self.repo.get_event(&market.event_id).await? else {
                continue;
            };
            let Some(end_time) = event.end_time else {
                continue;
            };
            let days_left = (end_time - now).num_days();
            if !(14..=28).contains(&days_left) {
                continue;
            }
            let tokens = self.repo.list_tokens_by_market(&market_id).await?;
            let Some(no_token) = tokens.iter().find(|t| t.outcome == Outcome::No) else {
                continue;
            };
            let Some(book) = self.repo.get_book(&no_token.id).await? else {
                continue;
            };
            let Some(price) = book.best_ask().or_else(|| book.mid()) else {
                continue;
            };
            if price < lo || price > hi {
                continue;
            }
            let signal = Signal::builder(SignalType::FdvOverpriced, self.name())
                .event(event.id.clone())
                .market(market_id.clone())
                .token(no_token.id.clone())
                .direction(Direction::No)
                .strength(0.5)
                .expires_at(end_time)
                .payload(json!({
                    "no_price": price.to_string(),
                    "days_to_end": days_left,
                }))
                .build();
            out.emit(signal);
        }
        Ok(())
    }

    async fn scan_price_anomalies(&self, out: &SignalEmitter) -> Result<()> {
        let now = Utc::now();
        let cheap = Decimal::new(5, 2); // 0.05
        let expensive = Decimal::new(95, 2); // 0.95

        for (token, book) in self.yes_tokens_with_books().await? {
            let Some(mid) = book.mid() else {
                continue;
            };
            let (kind, direction) = if mid <= cheap {
                ("extreme_cheap", Direction::Yes)
            } else if mid >= expensive {
                ("extreme_expensive", Direction::No)
            } else {
                continue;
            };
            if self.on_cooldown(&token.id, "price_anomaly", now) {
                continue;
            }
            let signal = Signal::builder(SignalType::PriceAnomaly, self.name())
                .market(token.market_id.clone())
                .token(token.id.clone())
                .direction(direction)
                .strength(0.7)
                .payload(json!({ "kind": kind, "price": mid.to_string() }))
                .build();
            out.emit(signal);
        }
        Ok(())
    }
}

#[async_trait]
impl Collector for InternalScanCollector {
    fn name(&self) -> &'static str {
        "internal_scan"
    }

    fn source_info(&self) -> SourceInfo {
        SourceInfo {
            source_type: SourceType::Internal,
            endpoint: "store".into(),
            poll_interval: self.config.scan_interval,
        }
    }

    async fn produce(&self, out: SignalEmitter, shutdown: ShutdownToken) -> Result<()> {
        let mut tick = interval(self.config.scan_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => return Ok(()),
                _ = tick.tick() => self.run_scans(&out).await,
            }
        }
    }

    fn health(&self) -> HealthSnapshot {
        self.health.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{
        Event, EventId, Market, MarketId, MarketLabel, PriceLevel, Strategy,
    };
    use crate::core::store::{MemoryRepository, Repository};
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    async fn seed_event_market(
        repo: &dyn Repository,
        event_id: &str,
        market_id: &str,
        yes_token: &str,
        no_token: &str,
    ) {
        repo.upsert_event(&Event {
            id: EventId::from(event_id),
            slug: format!("{event_id}-slug"),
            title: "E".into(),
            active: true,
            closed: false,
            end_time: Some(Utc::now() + chrono::Duration::days(21)),
            series_id: None,
        })
        .await
        .unwrap();
        repo.upsert_market(&Market {
            id: MarketId::from(market_id),
            event_id: EventId::from(event_id),
            slug: format!("{market_id}-slug"),
            question: "Will it?".into(),
            condition_id: format!("0x{market_id}"),
            tick_size: dec!(0.01),
            active: true,
            closed: false,
            neg_risk: false,
        })
        .await
        .unwrap();
        repo.upsert_token(&Token {
            id: TokenId::from(yes_token),
            market_id: MarketId::from(market_id),
            outcome: Outcome::Yes,
        })
        .await
        .unwrap();
        repo.upsert_token(&Token {
            id: TokenId::from(no_token),
            market_id: MarketId::from(market_id),
            outcome: Outcome::No,
        })
        .await
        .unwrap();
    }

    async fn seed_book(repo: &dyn Repository, token: &str, bid: Decimal, ask: Decimal) {
        repo.upsert_book(&BookSnapshot::new(
            TokenId::from(token),
            Utc::now(),
            vec![PriceLevel::new(bid, dec!(100))],
            vec![PriceLevel::new(ask, dec!(100))],
        ))
        .await
        .unwrap();
    }

    fn collector(repo: &Arc<MemoryRepository>) -> InternalScanCollector {
        InternalScanCollector::new(
            Arc::clone(repo) as SharedRepository,
            InternalScanConfig::default(),
        )
    }

    fn emitter() -> (SignalEmitter, mpsc::Receiver<Signal>) {
        let (tx, rx) = mpsc::channel(64);
        (SignalEmitter::new(tx), rx)
    }

    fn drain(rx: &mut mpsc::Receiver<Signal>) -> Vec<Signal> {
        let mut out = Vec::new();
        while let Ok(s) = rx.try_recv() {
            out.push(s);
        }
        out
    }

    #[tokio::test]
    async fn arb_sum_deviation_fires_for_underpriced_event() {
        let repo = Arc::new(MemoryRepository::new());
        seed_event_market(repo.as_ref(), "e1", "ma", "ta-yes", "ta-no").await;
        seed_event_market(repo.as_ref(), "e1", "mb", "tb-yes", "tb-no").await;
        // Mids 0.40 and 0.45; sum 0.85, deviation 15%.
        seed_book(repo.as_ref(), "ta-yes", dec!(0.39), dec!(0.41)).await;
        seed_book(repo.as_ref(), "tb-yes", dec!(0.44), dec!(0.46)).await;

        let c = collector(&repo);
        let (out, mut rx) = emitter();
        c.scan_arb_sum(&out).await.unwrap();

        let signals = drain(&mut rx);
        assert_eq!(signals.len(), 1);
        let s = &signals[0];
        assert_eq!(s.signal_type, SignalType::ArbSumDeviation);
        assert_eq!(s.direction, Direction::Yes);
        assert_eq!(s.strength, 1.0); // clamp01(15 / 10)
        assert_eq!(s.event_id.as_ref().unwrap().as_str(), "e1");
    }

    #[tokio::test]
    async fn arb_sum_respects_min_markets() {
        let repo = Arc::new(MemoryRepository::new());
        seed_event_market(repo.as_ref(), "e1", "ma", "ta-yes", "ta-no").await;
        seed_book(repo.as_ref(), "ta-yes", dec!(0.39), dec!(0.41)).await;

        let c = collector(&repo);
        let (out, mut rx) = emitter();
        c.scan_arb_sum(&out).await.unwrap();
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn no_bias_uses_learned_prior_and_cooldown() {
        let repo = Arc::new(MemoryRepository::new());
        seed_event_market(repo.as_ref(), "e1", "m2", "t-yes", "t-no").await;
        repo.upsert_label(&MarketLabel {
            market_id: MarketId::from("m2"),
            label: "pre_market_fdv".into(),
            sub_label: None,
            auto_labeled: true,
            confidence: 0.9,
        })
        .await
        .unwrap();
        // NO ask at 0.40.
        seed_book(repo.as_ref(), "t-no", dec!(0.38), dec!(0.40)).await;

        let mut strategy = Strategy::new("systematic_no", 5);
        strategy.stats = json!({
            "category_no_rates": { "pre_market_fdv": 0.85 },
            "min_samples": 10,
        });
        repo.upsert_strategy(&strategy).await.unwrap();

        let c = collector(&repo);
        let (out, mut rx) = emitter();
        c.scan_no_bias(&out).await.unwrap();

        let signals = drain(&mut rx);
        assert_eq!(signals.len(), 1);
        let s = &signals[0];
        assert_eq!(s.signal_type, SignalType::NoBias);
        assert_eq!(s.direction, Direction::No);
        // ev_pct = (0.85 - 0.40) / 0.40 * 100 = 112.5
        let ev = s.payload["ev_pct"].as_f64().unwrap();
        assert!((ev - 112.5).abs() < 1e-6, "got {ev}");

        // Second scan within the cooldown emits nothing.
        c.scan_no_bias(&out).await.unwrap();
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn no_bias_falls_back_to_default_table_below_min_samples() {
        let repo = Arc::new(MemoryRepository::new());
        seed_event_market(repo.as_ref(), "e1", "m2", "t-yes", "t-no").await;
        repo.upsert_label(&MarketLabel {
            market_id: MarketId::from("m2"),
            label: "pre_market_fdv".into(),
            sub_label: None,
            auto_labeled: true,
            confidence: 0.9,
        })
        .await
        .unwrap();
        seed_book(repo.as_ref(), "t-no", dec!(0.38), dec!(0.40)).await;

        // Learned rate present but under-evidenced.
        let mut strategy = Strategy::new("systematic_no", 5);
        strategy.stats = json!({
            "category_no_rates": { "pre_market_fdv": 0.99 },
            "min_samples": 3,
        });
        repo.upsert_strategy(&strategy).await.unwrap();

        let c = collector(&repo);
        let rates = c.category_no_rates().await.unwrap();
        // Falls back to the baked-in 0.80.
        assert!((rates["pre_market_fdv"] - 0.80).abs() < 1e-9);
    }

    #[tokio::test]
    async fn liquidity_gap_strength_scales_with_spread() {
        let repo = Arc::new(MemoryRepository::new());
        seed_event_market(repo.as_ref(), "e1", "m1", "t-yes", "t-no").await;
        // Spread (0.50-0.30)/0.40 = 5000 bps.
        seed_book(repo.as_ref(), "t-yes", dec!(0.30), dec!(0.50)).await;

        let c = collector(&repo);
        let (out, mut rx) = emitter();
        c.scan_liquidity_gaps(&out).await.unwrap();

        let signals = drain(&mut rx);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].strength, 1.0); // clamp01(5000 / 1000)
    }

    #[tokio::test]
    async fn price_anomaly_extremes_with_cooldown() {
        let repo = Arc::new(MemoryRepository::new());
        seed_event_market(repo.as_ref(), "e1", "m1", "t-cheap", "t1-no").await;
        seed_event_market(repo.as_ref(), "e2", "m2", "t-dear", "t2-no").await;
        seed_book(repo.as_ref(), "t-cheap", dec!(0.01), dec!(0.03)).await;
        seed_book(repo.as_ref(), "t-dear", dec!(0.96), dec!(0.98)).await;

        let c = collector(&repo);
        let (out, mut rx) = emitter();
        c.scan_price_anomalies(&out).await.unwrap();

        let signals = drain(&mut rx);
        assert_eq!(signals.len(), 2);
        let cheap = signals
            .iter()
            .find(|s| s.token_id.as_ref().unwrap().as_str() == "t-cheap")
            .unwrap();
        assert_eq!(cheap.direction, Direction::Yes);
        let dear = signals
            .iter()
            .find(|s| s.token_id.as_ref().unwrap().as_str() == "t-dear")
            .unwrap();
        assert_eq!(dear.direction, Direction::No);

        c.scan_price_anomalies(&out).await.unwrap();
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn fdv_overpriced_requires_window_and_price_band() {
        let repo = Arc::new(MemoryRepository::new());
        seed_event_market(repo.as_ref(), "e1", "m1", "t-yes", "t-no").await;
        repo.upsert_label(&MarketLabel {
            market_id: MarketId::from("m1"),
            label: "pre_market_fdv".into(),
            sub_label: None,
            auto_labeled: true,
            confidence: 0.9,
        })
        .await
        .unwrap();
        seed_book(repo.as_ref(), "t-no", dec!(0.42), dec!(0.45)).await;

        let c = collector(&repo);
        let (out, mut rx) = emitter();
        c.scan_fdv_overpriced(&out).await.unwrap();

        let signals = drain(&mut rx);
        assert_eq!(signals.len(), 1);
        let s = &signals[0];
        assert_eq!(s.direction, Direction::No);
        // Expiry pinned to the event end, not the default TTL.
        assert!(s.expires_at.unwrap() > Utc::now() + chrono::Duration::days(20));
    }
}
