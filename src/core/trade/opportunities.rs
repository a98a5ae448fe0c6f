//! Opportunity manager: dedup, caps and aging for live opportunities.

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::core::domain::{Candidate, Opportunity, OpportunityStatus};
use crate::core::store::{Repository, SharedRepository};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct OpportunityManagerConfig {
    /// Cap on live (active) opportunities per strategy.
    pub max_per_strategy: usize,
}

impl Default for OpportunityManagerConfig {
    fn default() -> Self {
        Self {
            max_per_strategy: 10,
        }
    }
}

/// Admits evaluator candidates into the live opportunity set.
pub struct OpportunityManager {
    repo: SharedRepository,
    config: OpportunityManagerConfig,
}

impl OpportunityManager {
    #[must_use]
    pub fn new(repo: SharedRepository, config: OpportunityManagerConfig) -> Self {
        Self { repo, config }
    }

    /// Admit one tick's worth of candidates. Returns the opportunities
    /// actually inserted.
    pub async fn admit(&self, candidates: Vec<Candidate>) -> Result<Vec<Opportunity>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let now = Utc::now();
        let active = self
            .repo
            .list_opportunities_by_status(OpportunityStatus::Active)
            .await?;

        let mut inserted = Vec::new();
        for candidate in candidates {
            if candidate.expires_at <= now {
                continue;
            }
            let key = candidate.dedup_key();
            if active.iter().any(|o| o.dedup_key() == key)
                || inserted.iter().any(|o: &Opportunity| o.dedup_key() == key)
            {
                debug!(key = %key, "duplicate candidate dropped");
                continue;
            }

            let strategy_live = active
                .iter()
                .filter(|o| o.strategy == candidate.strategy)
                .count()
                + inserted
                    .iter()
                    .filter(|o: &&Opportunity| o.strategy == candidate.strategy)
                    .count();
            if strategy_live >= self.config.max_per_strategy {
                // Over cap: only the weakest live opportunity may be
                // displaced, and only by a stronger candidate.
                let Some(weakest) = active
                    .iter()
                    .filter(|o| o.strategy == candidate.strategy)
                    .min_by(|a, b| {
                        a.risk_adjusted_edge()
                            .partial_cmp(&b.risk_adjusted_edge())
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                else {
                    continue;
                };
                if candidate.risk_adjusted_edge() <= weakest.risk_adjusted_edge() {
                    debug!(
                        strategy = %candidate.strategy,
                        "candidate below the cap floor, dropped"
                    );
                    continue;
                }
                self.repo
                    .update_opportunity_status(&weakest.id, OpportunityStatus::Cancelled)
                    .await?;
                info!(
                    displaced = %weakest.id,
                    strategy = %candidate.strategy,
                    "weakest live opportunity displaced"
                );
            }

            let opportunity = Opportunity::from_candidate(candidate, now);
            self.repo.insert_opportunity(&opportunity).await?;
            info!(
                id = %opportunity.id,
                strategy = %opportunity.strategy,
                edge_pct = %opportunity.edge_pct,
                legs = opportunity.legs.len(),
                "opportunity admitted"
            );
            inserted.push(opportunity);
        }
        Ok(inserted)
    }

    /// Move active opportunities past their expiry to `expired`. Returns
    /// the count aged out.
    pub async fn age_out(&self) -> Result<usize> {
        let now = Utc::now();
        let active = self
            .repo
            .list_opportunities_by_status(OpportunityStatus::Active)
            .await?;
        let mut aged = 0;
        for opportunity in active {
            if opportunity.is_expired(now) {
                if let Err(e) = self
                    .repo
                    .update_opportunity_status(&opportunity.id, OpportunityStatus::Expired)
                    .await
                {
                    warn!(id = %opportunity.id, error = %e, "failed to expire opportunity");
                    continue;
                }
                aged += 1;
            }
        }
        if aged > 0 {
            info!(aged, "opportunities expired");
        }
        Ok(aged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{MarketId, OpportunityLeg, TokenId, TradeDirection};
    use crate::core::store::{MemoryRepository, Repository};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn candidate(strategy: &str, market: &str, edge: rust_decimal::Decimal) -> Candidate {
        Candidate {
            strategy: strategy.into(),
            legs: vec![OpportunityLeg {
                market_id: MarketId::from(market),
                token_id: TokenId::from(format!("{market}-yes")),
                direction: TradeDirection::BuyYes,
                target_price: dec!(0.40),
                current_best_ask: Some(dec!(0.40)),
                size_hint: None,
            }],
            event_id: None,
            primary_market_id: Some(MarketId::from(market)),
            edge_pct: edge,
            edge_usd: edge * dec!(100),
            max_size: dec!(100),
            confidence: 0.8,
            risk_score: 0.2,
            expires_at: Utc::now() + chrono::Duration::minutes(5),
            data_age_ms: 10,
            signal_ids: vec![],
            reasoning: String::new(),
            warnings: vec![],
        }
    }

    fn manager(repo: &Arc<MemoryRepository>, cap: usize) -> OpportunityManager {
        OpportunityManager::new(
            Arc::clone(repo) as SharedRepository,
            OpportunityManagerConfig {
                max_per_strategy: cap,
            },
        )
    }

    #[tokio::test]
    async fn duplicate_candidates_are_dropped() {
        let repo = Arc::new(MemoryRepository::new());
        let mgr = manager(&repo, 10);

        let first = mgr
            .admit(vec![candidate("arbitrage_sum", "m1", dec!(0.10))])
            .await
            .unwrap();
        assert_eq!(first.len(), 1);

        // Same (strategy, market) again: deduped against the live set.
        let second = mgr
            .admit(vec![candidate("arbitrage_sum", "m1", dec!(0.12))])
            .await
            .unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn cap_displaces_only_weaker_opportunities() {
        let repo = Arc::new(MemoryRepository::new());
        let mgr = manager(&repo, 2);

        mgr.admit(vec![
            candidate("s", "m1", dec!(0.05)),
            candidate("s", "m2", dec!(0.10)),
        ])
        .await
        .unwrap();

        // Weaker than both live ones: dropped.
        let rejected = mgr.admit(vec![candidate("s", "m3", dec!(0.01))]).await.unwrap();
        assert!(rejected.is_empty());

        // Stronger than the weakest: displaces it.
        let admitted = mgr.admit(vec![candidate("s", "m4", dec!(0.20))]).await.unwrap();
        assert_eq!(admitted.len(), 1);

        let active = repo
            .list_opportunities_by_status(OpportunityStatus::Active)
            .await
            .unwrap();
        assert_eq!(active.len(), 2);
        assert!(!active
            .iter()
            .any(|o| o.primary_market_id.as_ref().unwrap().as_str() == "m1"));
    }

    #[tokio::test]
    async fn age_out_expires_stale_opportunities() {
        let repo = Arc::new(MemoryRepository::new());
        let mgr = manager(&repo, 10);

        let mut stale = candidate("s", "m1", dec!(0.10));
        stale.expires_at = Utc::now() + chrono::Duration::milliseconds(1);
        mgr.admit(vec![stale]).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert_eq!(mgr.age_out().await.unwrap(), 1);

        let expired = repo
            .list_opportunities_by_status(OpportunityStatus::Expired)
            .await
            .unwrap();
        assert_eq!(expired.len(), 1);
    }

    #[tokio::test]
    async fn already_expired_candidates_are_ignored() {
        let repo = Arc::new(MemoryRepository::new());
        let mgr = manager(&repo, 10);

        let mut dead = candidate("s", "m1", dec!(0.10));
        dead.expires_at = Utc::now() - chrono::Duration::seconds(1);
        let admitted = mgr.admit(vec![dead]).await.unwrap();
        assert!(admitted.is_empty());
    }
}
