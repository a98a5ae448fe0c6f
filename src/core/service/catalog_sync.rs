//! Catalog sync: cursor-resumable pull of events, markets, tokens, tags
//! and series, plus REST book refreshes.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::core::domain::{EventId, EventTag, Outcome, SyncState, Tag};
use crate::core::exchange::CatalogClient;
use crate::core::service::ingest::MarketDataIngest;
use crate::core::shutdown::ShutdownToken;
use crate::core::store::{Repository, SharedRepository};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct CatalogSyncConfig {
    pub sync_interval: Duration,
    pub book_refresh_interval: Duration,
    /// Pages consumed per scope per pass; the cursor carries the rest to
    /// the next pass.
    pub max_pages_per_pass: usize,
}

impl Default for CatalogSyncConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(5 * 60),
            book_refresh_interval: Duration::from_secs(30),
            max_pages_per_pass: 10,
        }
    }
}

pub struct CatalogSync {
    repo: SharedRepository,
    client: Arc<CatalogClient>,
    ingest: Arc<MarketDataIngest>,
    config: CatalogSyncConfig,
}

impl CatalogSync {
    #[must_use]
    pub fn new(
        repo: SharedRepository,
        client: Arc<CatalogClient>,
        ingest: Arc<MarketDataIngest>,
        config: CatalogSyncConfig,
    ) -> Self {
        Self {
            repo,
            client,
            ingest,
            config,
        }
    }

    async fn sync_state(&self, scope: &str) -> Result<SyncState> {
        Ok(self
            .repo
            .get_sync_state(scope)
            .await?
            .unwrap_or_else(|| SyncState::new(scope)))
    }

    /// Pull one bounded pass of events, resuming from the stored cursor.
    pub async fn sync_events(&self) -> Result<usize> {
        let mut state = self.sync_state("events").await?;
        let mut cursor = state.cursor.clone();
        let mut synced = 0;

        for _ in 0..self.config.max_pages_per_pass {
            let page = match self.client.events_page(cursor.as_deref()).await {
                Ok(page) => page,
                Err(e) => {
                    state.mark_failure(e.to_string(), Utc::now());
                    self.repo.upsert_sync_state(&state).await?;
                    return Err(e);
                }
            };
            let next = page.resume_cursor();
            for raw in page.data {
                let tags = raw.tags.clone();
                let event = raw.into_domain();
                let event_id = event.id.clone();
                self.repo.upsert_event(&event).await?;
                for tag in tags {
                    self.repo
                        .upsert_tag(&Tag {
                            id: tag.id.clone(),
                            label: tag.label,
                            slug: tag.slug,
                        })
                        .await?;
                    self.repo
                        .upsert_event_tag(&EventTag {
                            event_id: event_id.clone(),
                            tag_id: tag.id,
                        })
                        .await?;
                }
                synced += 1;
            }
            cursor = next;
            if cursor.is_none() {
                break;
            }
        }

        state.mark_success(cursor, Utc::now());
        self.repo.upsert_sync_state(&state).await?;
        debug!(synced, "events synced");
        Ok(synced)
    }

    /// Pull one bounded pass of markets. Only binary markets (exactly one
    /// YES and one NO token) are stored.
    pub async fn sync_markets(&self) -> Result<usize> {
        let mut state = self.sync_state("markets").await?;
        let mut cursor = state.cursor.clone();
        let mut synced = 0;

        for _ in 0..self.config.max_pages_per_pass {
            let page = match self.client.markets_page(cursor.as_deref()).await {
                Ok(page) => page,
                Err(e) => {
                    state.mark_failure(e.to_string(), Utc::now());
                    self.repo.upsert_sync_state(&state).await?;
                    return Err(e);
                }
            };
            let next = page.resume_cursor();
            for raw in page.data {
                let Some(event_id) = raw.event_id.clone() else {
                    continue;
                };
                let (market, tokens) = raw.into_domain(&EventId::from(event_id));
                let yes = tokens.iter().filter(|t| t.outcome == Outcome::Yes).count();
                let no = tokens.iter().filter(|t| t.outcome == Outcome::No).count();
                if yes != 1 || no != 1 {
                    debug!(market = %market.id, "skipping non-binary market");
                    continue;
                }
                self.repo.upsert_market(&market).await?;
                for token in &tokens {
                    self.repo.upsert_token(token).await?;
                }
                synced += 1;
            }
            cursor = next;
            if cursor.is_none() {
                break;
            }
        }

        state.mark_success(cursor, Utc::now());
        self.repo.upsert_sync_state(&state).await?;
        debug!(synced, "markets synced");
        Ok(synced)
    }

    /// Record settlement history for markets that have closed since the
    /// last pass. The outcome is read off the final YES price; the
    /// market's labels ride along so the aggregator can learn per-category
    /// priors.
    pub async fn record_settlements(&self) -> Result<usize> {
        let mut recorded = 0;
        // Tradeable listings exclude closed markets, so walk events and
        // pick up the closed children.
        for event in self.repo.list_tradeable_events().await? {
            for market in self.repo.list_markets_by_event(&event.id).await? {
                if !market.closed {
                    continue;
                }
                if self.repo.get_settlement(&market.id).await?.is_some() {
                    continue;
                }
                let tokens = self.repo.list_tokens_by_market(&market.id).await?;
                let Some(yes_token) = tokens.iter().find(|t| t.outcome == Outcome::Yes) else {
                    continue;
                };
                let final_yes_price = match self.repo.get_book(&yes_token.id).await? {
                    Some(book) => book.mid(),
                    None => self
                        .repo
                        .get_last_trade(&yes_token.id)
                        .await?
                        .map(|t| t.price),
                };
                let Some(final_price) = final_yes_price else {
                    debug!(market = %market.id, "closed market has no final price yet");
                    continue;
                };
                let outcome = if final_price >= rust_decimal::Decimal::new(5, 1) {
                    Outcome::Yes
                } else {
                    Outcome::No
                };
                let labels = self
                    .repo
                    .list_labels_for_market(&market.id)
                    .await?
                    .into_iter()
                    .map(|l| l.label)
                    .collect();
                self.repo
                    .upsert_settlement(&crate::core::domain::MarketSettlement {
                        market_id: market.id.clone(),
                        event_id: event.id.clone(),
                        outcome,
                        labels,
                        initial_yes_price: None,
                        final_yes_price: Some(final_price),
                        settled_at: Utc::now(),
                    })
                    .await?;
                recorded += 1;
            }
        }
        if recorded > 0 {
            info!(recorded, "market settlements recorded");
        }
        Ok(recorded)
    }

    /// Refresh REST book snapshots for every tradeable token.
    pub async fn refresh_books(&self) -> Result<usize> {
        let tokens = self.repo.list_tradeable_tokens().await?;
        let mut refreshed = 0;
        for token in tokens {
            match self.client.book(&token.id).await {
                Ok(book) => {
                    self.ingest.apply_book(book, false).await?;
                    refreshed += 1;
                }
                Err(e) if e.is_transient() => {
                    debug!(token = %token.id, error = %e, "book refresh transient failure");
                }
                Err(e) => {
                    warn!(token = %token.id, error = %e, "book refresh failed");
                }
            }
        }
        Ok(refreshed)
    }

    /// Run catalog passes and book refreshes until shutdown.
    pub async fn run(self: Arc<Self>, shutdown: ShutdownToken) -> Result<()> {
        let mut sync_tick = tokio::time::interval(self.config.sync_interval);
        sync_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut book_tick = tokio::time::interval(self.config.book_refresh_interval);
        book_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("catalog sync started");
        loop {
            // Inner selects keep long HTTP passes cancellable mid-flight.
            tokio::select! {
                () = shutdown.cancelled() => return Ok(()),
                _ = sync_tick.tick() => {
                    tokio::select! {
                        () = shutdown.cancelled() => return Ok(()),
                        result = self.sync_pass() => {
                            if let Err(e) = result {
                                warn!(error = %e, "catalog sync pass failed");
                            }
                        }
                    }
                }
                _ = book_tick.tick() => {
                    tokio::select! {
                        () = shutdown.cancelled() => return Ok(()),
                        result = self.refresh_books() => {
                            if let Err(e) = result {
                                warn!(error = %e, "book refresh failed");
                            }
                        }
                    }
                }
            }
        }
    }

    async fn sync_pass(&self) -> Result<()> {
        self.sync_events().await?;
        self.sync_markets().await?;
        self.record_settlements().await?;
        Ok(())
    }
}
