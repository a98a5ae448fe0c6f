//! Market-data ingest: folds stream events into books, last trades and
//! per-token health.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::core::domain::{BookSnapshot, LastTrade, MarketDataHealth, TokenId};
use crate::core::exchange::{AssetProvider, StreamEvent};
use crate::core::shutdown::ShutdownToken;
use crate::core::store::{Repository, SharedRepository};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// A token with no update for this long is stale.
    pub stale_after: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(60),
        }
    }
}

/// Applies stream events to the store and derives health metrics.
pub struct MarketDataIngest {
    repo: SharedRepository,
    config: IngestConfig,
}

impl MarketDataIngest {
    #[must_use]
    pub fn new(repo: SharedRepository, config: IngestConfig) -> Self {
        Self { repo, config }
    }

    /// Fold one stream event in. Health is recomputed on every book
    /// update: spread from the new book, price jump against the previous
    /// mid, staleness against the configured threshold.
    pub async fn apply(&self, event: StreamEvent) -> Result<()> {
        match event {
            StreamEvent::Book(book) => self.apply_book(book, true).await,
            StreamEvent::LastTrade(trade) => self.apply_last_trade(trade).await,
        }
    }

    /// `from_ws` distinguishes the stream from REST refreshes for the
    /// health timestamps.
    pub async fn apply_book(&self, book: BookSnapshot, from_ws: bool) -> Result<()> {
        let now = Utc::now();
        let previous = self.repo.get_book(&book.token_id).await?;
        let previous_mid = previous.as_ref().and_then(BookSnapshot::mid);

        let mut health = self
            .repo
            .get_health(&book.token_id)
            .await?
            .unwrap_or_else(|| MarketDataHealth::new(book.token_id.clone()));

        if from_ws {
            health.last_ws_ts = Some(now);
        } else {
            health.last_rest_ts = Some(now);
        }
        health.spread_bps = book.spread_bps();
        if let (Some(prev), Some(current)) = (previous_mid, book.mid()) {
            if !prev.is_zero() {
                let jump = ((current - prev) / prev).abs() * rust_decimal::Decimal::from(10_000);
                health.price_jump_bps = jump.to_f64();
            }
            if prev != current {
                health.last_book_change_ts = Some(now);
            }
        } else if book.mid().is_some() {
            health.last_book_change_ts = Some(now);
        }
        health.stale = book.age_seconds(now) > self.config.stale_after.as_secs() as i64;

        self.repo.upsert_book(&book).await?;
        self.repo.upsert_health(&health).await?;
        Ok(())
    }

    async fn apply_last_trade(&self, trade: LastTrade) -> Result<()> {
        self.repo.upsert_last_trade(&trade).await
    }

    /// Flag tokens whose books have gone quiet. Runs periodically so
    /// staleness does not depend on fresh updates arriving.
    pub async fn sweep_stale(&self) -> Result<usize> {
        let now = Utc::now();
        let cap = self.config.stale_after.as_secs() as i64;
        let mut flagged = 0;
        for book in self.repo.list_books().await? {
            let is_stale = book.age_seconds(now) > cap;
            if let Some(mut health) = self.repo.get_health(&book.token_id).await? {
                if health.stale != is_stale {
                    health.stale = is_stale;
                    self.repo.upsert_health(&health).await?;
                    if is_stale {
                        flagged += 1;
                    }
                }
            }
        }
        Ok(flagged)
    }

    /// Drain the stream's event queue until shutdown.
    pub async fn run(
        self: std::sync::Arc<Self>,
        mut events: mpsc::Receiver<StreamEvent>,
        shutdown: ShutdownToken,
    ) -> Result<()> {
        let mut stale_tick = tokio::time::interval(self.config.stale_after);
        stale_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("market-data ingest started");
        loop {
            tokio::select! {
                () = shutdown.cancelled() => return Ok(()),
                event = events.recv() => {
                    let Some(event) = event else {
                        info!("stream closed, ingest stopping");
                        return Ok(());
                    };
                    if let Err(e) = self.apply(event).await {
                        warn!(error = %e, "failed to apply stream event");
                    }
                }
                _ = stale_tick.tick() => {
                    if let Err(e) = self.sweep_stale().await {
                        warn!(error = %e, "stale sweep failed");
                    }
                }
            }
        }
    }
}

/// Asset provider backed by the repository: the stream subscribes to every
/// token of a tradeable market.
pub struct RepoAssetProvider {
    repo: SharedRepository,
}

impl RepoAssetProvider {
    #[must_use]
    pub fn new(repo: SharedRepository) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl AssetProvider for RepoAssetProvider {
    async fn asset_ids(&self) -> Result<Vec<TokenId>> {
        Ok(self
            .repo
            .list_tradeable_tokens()
            .await?
            .into_iter()
            .map(|t| t.id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::PriceLevel;
    use crate::core::store::{MemoryRepository, Repository};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn book(token: &str, bid: rust_decimal::Decimal, ask: rust_decimal::Decimal) -> BookSnapshot {
        BookSnapshot::new(
            TokenId::from(token),
            Utc::now(),
            vec![PriceLevel::new(bid, dec!(100))],
            vec![PriceLevel::new(ask, dec!(100))],
        )
    }

    #[tokio::test]
    async fn book_update_derives_health() {
        let repo = Arc::new(MemoryRepository::new());
        let ingest = MarketDataIngest::new(
            Arc::clone(&repo) as SharedRepository,
            IngestConfig::default(),
        );

        ingest
            .apply(StreamEvent::Book(book("t1", dec!(0.40), dec!(0.44))))
            .await
            .unwrap();

        let health = repo.get_health(&TokenId::from("t1")).await.unwrap().unwrap();
        assert!(health.last_ws_ts.is_some());
        assert!(!health.stale);
        assert!(health.spread_bps.unwrap() > 900.0);
    }

    #[tokio::test]
    async fn price_jump_is_measured_against_previous_mid() {
        let repo = Arc::new(MemoryRepository::new());
        let ingest = MarketDataIngest::new(
            Arc::clone(&repo) as SharedRepository,
            IngestConfig::default(),
        );

        ingest
            .apply(StreamEvent::Book(book("t1", dec!(0.40), dec!(0.40))))
            .await
            .unwrap();
        // Mid moves 0.40 → 0.44: 10% = 1000 bps.
        let mut second = book("t1", dec!(0.44), dec!(0.44));
        second.snapshot_ts = Utc::now() + chrono::Duration::milliseconds(10);
        ingest.apply(StreamEvent::Book(second)).await.unwrap();

        let health = repo.get_health(&TokenId::from("t1")).await.unwrap().unwrap();
        let jump = health.price_jump_bps.unwrap();
        assert!((jump - 1000.0).abs() < 1.0, "got {jump}");
        assert!(health.last_book_change_ts.is_some());
    }

    #[tokio::test]
    async fn stale_sweep_flags_quiet_books() {
        let repo = Arc::new(MemoryRepository::new());
        let ingest = MarketDataIngest::new(
            Arc::clone(&repo) as SharedRepository,
            IngestConfig {
                stale_after: Duration::from_secs(30),
            },
        );

        let mut old = book("t1", dec!(0.40), dec!(0.44));
        old.snapshot_ts = Utc::now() - chrono::Duration::minutes(5);
        ingest.apply_book(old, true).await.unwrap();

        // The apply itself already computes staleness from snapshot age.
        let health = repo.get_health(&TokenId::from("t1")).await.unwrap().unwrap();
        assert!(health.stale);
    }

    #[tokio::test]
    async fn last_trade_is_recorded() {
        let repo = Arc::new(MemoryRepository::new());
        let ingest = MarketDataIngest::new(
            Arc::clone(&repo) as SharedRepository,
            IngestConfig::default(),
        );
        ingest
            .apply(StreamEvent::LastTrade(LastTrade {
                token_id: TokenId::from("t1"),
                price: dec!(0.42),
                trade_ts: Utc::now(),
            }))
            .await
            .unwrap();
        let trade = repo.get_last_trade(&TokenId::from("t1")).await.unwrap().unwrap();
        assert_eq!(trade.price, dec!(0.42));
    }
}
