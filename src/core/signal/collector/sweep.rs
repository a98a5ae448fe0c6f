//! Certainty-sweep collector.
//!
//! Among events ending within the configured horizon, emits
//! `certainty_sweep` for markets whose YES best ask has collapsed to a
//! near-certain price (≥ 0.97 or ≤ 0.03).

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use tokio::time::{interval, MissedTickBehavior};
use tracing::warn;

use super::{Collector, HealthCell, HealthSnapshot, SignalEmitter};
use crate::core::domain::{Direction, Outcome, Signal, SignalType, SourceInfo, SourceType};
use crate::core::shutdown::ShutdownToken;
use crate::core::store::{Repository, SharedRepository};
use crate::error::Result;

const SIGNAL_TTL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone)]
pub struct CertaintySweepConfig {
    pub scan_interval: Duration,
    /// Only events ending within this many hours are swept.
    pub horizon_hours: i64,
}

impl Default for CertaintySweepConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(5 * 60),
            horizon_hours: 24,
        }
    }
}

pub struct CertaintySweepCollector {
    repo: SharedRepository,
    config: CertaintySweepConfig,
    health: HealthCell,
}

impl CertaintySweepCollector {
    #[must_use]
    pub fn new(repo: SharedRepository, config: CertaintySweepConfig) -> Self {
        Self {
            repo,
            config,
            health: HealthCell::new(),
        }
    }

    async fn scan(&self, out: &SignalEmitter) -> Result<()> {
        let now = Utc::now();
        let horizon = now + chrono::Duration::hours(self.config.horizon_hours);
        let expires = now + chrono::Duration::from_std(SIGNAL_TTL).unwrap_or_default();
        let high = Decimal::new(97, 2); // 0.97
        let low = Decimal::new(3, 2); // 0.03

        for event in self.repo.list_tradeable_events().await? {
            let Some(end_time) = event.end_time else {
                continue;
            };
            if end_time > horizon || end_time < now {
                continue;
            }
            for market in self.repo.list_markets_by_event(&event.id).await? {
                if !market.is_tradeable() {
                    continue;
                }
                let tokens = self.repo.list_tokens_by_market(&market.id).await?;
                let Some(yes_token) = tokens.iter().find(|t| t.outcome == Outcome::Yes) else {
                    continue;
                };
                let Some(book) = self.repo.get_book(&yes_token.id).await? else {
                    continue;
                };
                let Some(ask) = book.best_ask() else {
                    continue;
                };
                let direction = if ask >= high {
                    Direction::Yes
                } else if ask <= low {
                    Direction::No
                } else {
                    continue;
                };
                let signal = Signal::builder(SignalType::CertaintySweep, self.name())
                    .event(event.id.clone())
                    .market(market.id.clone())
                    .token(yes_token.id.clone())
                    .direction(direction)
                    .strength(0.9)
                    .expires_at(expires)
                    .payload(json!({
                        "yes_ask": ask.to_string(),
                        "ends_in_hours": (end_time - now).num_hours(),
                    }))
                    .build();
                out.emit(signal);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Collector for CertaintySweepCollector {
    fn name(&self) -> &'static str {
        "certainty_sweep"
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
                _ = tick.tick() => {
                    match self.scan(&out).await {
                        Ok(()) => self.health.healthy(),
                        Err(e) => {
                            warn!(error = %e, "certainty sweep failed");
                            self.health.down(e.to_string());
                        }
                    }
                }
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
    use crate::core::domain::{BookSnapshot, Event, EventId, Market, MarketId, PriceLevel, Token, TokenId};
    use crate::core::store::{MemoryRepository, Repository};
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    async fn seed(repo: &dyn Repository, ends_in_hours: i64, yes_ask: Decimal) {
        repo.upsert_event(&Event {
            id: EventId::from("e1"),
            slug: "e1".into(),
            title: "E".into(),
            active: true,
            closed: false,
            end_time: Some(Utc::now() + chrono::Duration::hours(ends_in_hours)),
            series_id: None,
        })
        .await
        .unwrap();
        repo.upsert_market(&Market {
            id: MarketId::from("m1"),
            event_id: EventId::from("e1"),
            slug: "m1".into(),
            question: "?".into(),
            condition_id: "0xm1".into(),
            tick_size: dec!(0.01),
            active: true,
            closed: false,
            neg_risk: false,
        })
        .await
        .unwrap();
        repo.upsert_token(&Token {
            id: TokenId::from("t-yes"),
            market_id: MarketId::from("m1"),
            outcome: Outcome::Yes,
        })
        .await
        .unwrap();
        repo.upsert_book(&BookSnapshot::new(
            TokenId::from("t-yes"),
            Utc::now(),
            vec![PriceLevel::new(yes_ask - dec!(0.01), dec!(100))],
            vec![PriceLevel::new(yes_ask, dec!(100))],
        ))
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn near_certain_market_inside_horizon_fires() {
        let repo = Arc::new(MemoryRepository::new());
        seed(repo.as_ref(), 6, dec!(0.98)).await;

        let c = CertaintySweepCollector::new(
            Arc::clone(&repo) as SharedRepository,
            CertaintySweepConfig::default(),
        );
        let (tx, mut rx) = mpsc::channel(4);
        c.scan(&SignalEmitter::new(tx)).await.unwrap();

        let signal = rx.try_recv().unwrap();
        assert_eq!(signal.signal_type, SignalType::CertaintySweep);
        assert_eq!(signal.direction, Direction::Yes);
    }

    #[tokio::test]
    async fn event_outside_horizon_is_skipped() {
        let repo = Arc::new(MemoryRepository::new());
        seed(repo.as_ref(), 72, dec!(0.98)).await;

        let c = CertaintySweepCollector::new(
            Arc::clone(&repo) as SharedRepository,
            CertaintySweepConfig::default(),
        );
        let (tx, mut rx) = mpsc::channel(4);
        c.scan(&SignalEmitter::new(tx)).await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn mid_range_price_is_skipped() {
        let repo = Arc::new(MemoryRepository::new());
        seed(repo.as_ref(), 6, dec!(0.60)).await;

        let c = CertaintySweepCollector::new(
            Arc::clone(&repo) as SharedRepository,
            CertaintySweepConfig::default(),
        );
        let (tx, mut rx) = mpsc::channel(4);
        c.scan(&SignalEmitter::new(tx)).await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}
