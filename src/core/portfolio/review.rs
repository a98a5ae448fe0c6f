//! Post-settlement market reviews.
//!
//! For every settled market without a review, decide what we did about it
//! (traded, dismissed, expired, missed) and estimate what the trade was or
//! would have been worth.

use rust_decimal::Decimal;
use tracing::info;

use crate::core::domain::{
    MarketId, MarketReview, Opportunity, OpportunityStatus, ReviewAction,
};
use crate::core::store::{Repository, SharedRepository};
use crate::error::Result;

pub struct ReviewService {
    repo: SharedRepository,
}

impl ReviewService {
    #[must_use]
    pub fn new(repo: SharedRepository) -> Self {
        Self { repo }
    }

    /// Review all settled markets that do not yet have a review row.
    /// Returns the number of reviews written.
    pub async fn review_settled(&self) -> Result<usize> {
        let mut written = 0;
        for settlement in self.repo.list_settlements().await? {
            if self.repo.get_review(&settlement.market_id).await?.is_some() {
                continue;
            }
            let review = self.build_review(&settlement.market_id).await?;
            self.repo.upsert_review(&review).await?;
            written += 1;
        }
        if written > 0 {
            info!(written, "market reviews generated");
        }
        Ok(written)
    }

    async fn build_review(&self, market_id: &MarketId) -> Result<MarketReview> {
        // Gather every opportunity that named this market as primary.
        let mut touching: Vec<Opportunity> = Vec::new();
        for status in [
            OpportunityStatus::Executed,
            OpportunityStatus::Cancelled,
            OpportunityStatus::Expired,
            OpportunityStatus::Executing,
            OpportunityStatus::Active,
        ] {
            touching.extend(
                self.repo
                    .list_opportunities_by_status(status)
                    .await?
                    .into_iter()
                    .filter(|o| o.primary_market_id.as_ref() == Some(market_id)),
            );
        }

        let executed = touching
            .iter()
            .find(|o| o.status == OpportunityStatus::Executed);
        let expired = touching
            .iter()
            .find(|o| o.status == OpportunityStatus::Expired);
        let dismissed = touching
            .iter()
            .find(|o| o.status == OpportunityStatus::Cancelled);

        let (our_action, hypothetical_pnl, actual_pnl) = if let Some(opp) = executed {
            let actual = self.realized_for_opportunity(opp).await?;
            (ReviewAction::Traded, None, actual)
        } else if let Some(opp) = expired {
            (ReviewAction::Expired, Some(opp.edge_usd), None)
        } else if let Some(opp) = dismissed {
            (ReviewAction::Dismissed, Some(opp.edge_usd), None)
        } else {
            (ReviewAction::Missed, None, None)
        };

        Ok(MarketReview {
            market_id: market_id.clone(),
            our_action,
            hypothetical_pnl,
            actual_pnl,
            lesson_tags: Vec::new(),
            notes: None,
        })
    }

    async fn realized_for_opportunity(
        &self,
        opportunity: &Opportunity,
    ) -> Result<Option<Decimal>> {
        // The plan shares the opportunity's id through its foreign key; the
        // one-to-one mapping means scanning executed plans is cheap.
        for status in [
            crate::core::domain::PlanStatus::Executed,
            crate::core::domain::PlanStatus::Partial,
        ] {
            for plan in self.repo.list_plans_by_status(status).await? {
                if plan.opportunity_id == opportunity.id {
                    return Ok(self
                        .repo
                        .get_pnl_record(&plan.id)
                        .await?
                        .and_then(|r| r.realized_pnl));
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{Candidate, EventId, MarketSettlement, Outcome};
    use crate::core::store::{MemoryRepository, Repository};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    async fn settle_market(repo: &dyn crate::core::store::Repository, market: &str) {
        repo.upsert_settlement(&MarketSettlement {
            market_id: MarketId::from(market),
            event_id: EventId::from("e1"),
            outcome: Outcome::No,
            labels: vec![],
            initial_yes_price: None,
            final_yes_price: None,
            settled_at: Utc::now(),
        })
        .await
        .unwrap();
    }

    fn opportunity(market: &str, status: OpportunityStatus) -> Opportunity {
        let mut opp = Opportunity::from_candidate(
            Candidate {
                strategy: "systematic_no".into(),
                legs: vec![],
                event_id: None,
                primary_market_id: Some(MarketId::from(market)),
                edge_pct: dec!(0.10),
                edge_usd: dec!(8),
                max_size: dec!(80),
                confidence: 0.7,
                risk_score: 0.3,
                expires_at: Utc::now() + chrono::Duration::minutes(5),
                data_age_ms: 0,
                signal_ids: vec![],
                reasoning: String::new(),
                warnings: vec![],
            },
            Utc::now(),
        );
        opp.status = status;
        opp
    }

    #[tokio::test]
    async fn settled_market_without_opportunities_is_missed() {
        let repo = Arc::new(MemoryRepository::new());
        settle_market(repo.as_ref(), "m1").await;

        let service = ReviewService::new(Arc::clone(&repo) as SharedRepository);
        assert_eq!(service.review_settled().await.unwrap(), 1);

        let review = repo.get_review(&MarketId::from("m1")).await.unwrap().unwrap();
        assert_eq!(review.our_action, ReviewAction::Missed);
    }

    #[tokio::test]
    async fn expired_opportunity_records_hypothetical_pnl() {
        let repo = Arc::new(MemoryRepository::new());
        settle_market(repo.as_ref(), "m1").await;
        repo.insert_opportunity(&opportunity("m1", OpportunityStatus::Expired))
            .await
            .unwrap();

        let service = ReviewService::new(Arc::clone(&repo) as SharedRepository);
        service.review_settled().await.unwrap();

        let review = repo.get_review(&MarketId::from("m1")).await.unwrap().unwrap();
        assert_eq!(review.our_action, ReviewAction::Expired);
        assert_eq!(review.hypothetical_pnl, Some(dec!(8)));
    }

    #[tokio::test]
    async fn reviews_are_written_once() {
        let repo = Arc::new(MemoryRepository::new());
        settle_market(repo.as_ref(), "m1").await;

        let service = ReviewService::new(Arc::clone(&repo) as SharedRepository);
        assert_eq!(service.review_settled().await.unwrap(), 1);
        assert_eq!(service.review_settled().await.unwrap(), 0);
    }
}
