//! Order-book pattern collector.
//!
//! Scans the derived market-data health table for YES tokens showing
//! `fear_spike` (wide spread with a large price jump) or
//! `mm_inventory_skew` (wide spread with a quiet price), both on a short
//! TTL.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::time::{interval, MissedTickBehavior};
use tracing::warn;

use super::{Collector, HealthCell, HealthSnapshot, SignalEmitter};
use crate::core::domain::{
    clamp01, Direction, Outcome, Signal, SignalType, SourceInfo, SourceType,
};
use crate::core::shutdown::ShutdownToken;
use crate::core::store::{Repository, SharedRepository};
use crate::error::Result;

const SIGNAL_TTL: Duration = Duration::from_secs(2 * 60);

#[derive(Debug, Clone)]
pub struct OrderbookPatternConfig {
    pub scan_interval: Duration,
    /// Spread at or above which a token counts as wide, in bps.
    pub wide_spread_bps: f64,
    /// Jump at or above which a move counts as large, in bps.
    pub large_jump_bps: f64,
    /// Jump at or below which the book counts as quiet, in bps.
    pub quiet_jump_bps: f64,
}

impl Default for OrderbookPatternConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(30),
            wide_spread_bps: 500.0,
            large_jump_bps: 300.0,
            quiet_jump_bps: 50.0,
        }
    }
}

pub struct OrderbookPatternCollector {
    repo: SharedRepository,
    config: OrderbookPatternConfig,
    health: HealthCell,
}

impl OrderbookPatternCollector {
    #[must_use]
    pub fn new(repo: SharedRepository, config: OrderbookPatternConfig) -> Self {
        Self {
            repo,
            config,
            health: HealthCell::new(),
        }
    }

    fn classify(&self, spread_bps: f64, jump_bps: f64) -> Option<(SignalType, Direction)> {
        if spread_bps < self.config.wide_spread_bps {
            return None;
        }
        if jump_bps >= self.config.large_jump_bps {
            Some((SignalType::FearSpike, Direction::Yes))
        } else if jump_bps <= self.config.quiet_jump_bps {
            Some((SignalType::MmInventorySkew, Direction::Yes))
        } else {
            None
        }
    }

    async fn scan(&self, out: &SignalEmitter) -> Result<()> {
        let now = Utc::now();
        let expires = now + chrono::Duration::from_std(SIGNAL_TTL).unwrap_or_default();
        for health in self.repo.list_health().await? {
            if health.stale {
                continue;
            }
            let (Some(spread_bps), Some(jump_bps)) = (health.spread_bps, health.price_jump_bps)
            else {
                continue;
            };
            let Some((signal_type, direction)) = self.classify(spread_bps, jump_bps) else {
                continue;
            };
            // Pattern scans only watch YES tokens.
            let Some(token) = self.repo.get_token(&health.token_id).await? else {
                continue;
            };
            if token.outcome != Outcome::Yes {
                continue;
            }
            let signal = Signal::builder(signal_type, self.name())
                .market(token.market_id.clone())
                .token(token.id.clone())
                .direction(direction)
                .strength(clamp01(spread_bps / 2000.0))
                .expires_at(expires)
                .payload(json!({ "spread_bps": spread_bps, "price_jump_bps": jump_bps }))
                .build();
            out.emit(signal);
        }
        Ok(())
    }
}

#[async_trait]
impl Collector for OrderbookPatternCollector {
    fn name(&self) -> &'static str {
        "orderbook_pattern"
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
                            warn!(error = %e, "orderbook pattern scan failed");
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
    use crate::core::domain::{MarketDataHealth, MarketId, Token, TokenId};
    use crate::core::store::{MemoryRepository, Repository};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    #[test]
    fn classification_bands() {
        let c = OrderbookPatternCollector::new(
            Arc::new(MemoryRepository::new()),
            OrderbookPatternConfig::default(),
        );
        assert_eq!(
            c.classify(600.0, 400.0).map(|(t, _)| t),
            Some(SignalType::FearSpike)
        );
        assert_eq!(
            c.classify(600.0, 10.0).map(|(t, _)| t),
            Some(SignalType::MmInventorySkew)
        );
        assert!(c.classify(600.0, 150.0).is_none()); // between quiet and large
        assert!(c.classify(100.0, 400.0).is_none()); // spread too tight
    }

    #[tokio::test]
    async fn scan_emits_for_yes_tokens_only() {
        let repo = Arc::new(MemoryRepository::new());
        for (token, outcome) in [("t-yes", Outcome::Yes), ("t-no", Outcome::No)] {
            repo.upsert_token(&Token {
                id: TokenId::from(token),
                market_id: MarketId::from("m1"),
                outcome,
            })
            .await
            .unwrap();
            let mut health = MarketDataHealth::new(TokenId::from(token));
            health.stale = false;
            health.spread_bps = Some(800.0);
            health.price_jump_bps = Some(400.0);
            repo.upsert_health(&health).await.unwrap();
        }

        let c = OrderbookPatternCollector::new(
            Arc::clone(&repo) as SharedRepository,
            OrderbookPatternConfig::default(),
        );
        let (tx, mut rx) = mpsc::channel(8);
        c.scan(&SignalEmitter::new(tx)).await.unwrap();

        let signal = rx.try_recv().unwrap();
        assert_eq!(signal.signal_type, SignalType::FearSpike);
        assert_eq!(signal.token_id.as_ref().unwrap().as_str(), "t-yes");
        assert!(rx.try_recv().is_err());
    }
}
