//! Settlement: realizing PnL when markets resolve.

use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::info;

use crate::core::domain::{
    MarketId, Outcome, PlanId, PnlOutcome, PnlRecord, TokenId,
};
use crate::core::store::{Repository, SharedRepository};
use crate::error::{Error, Result};

/// Settles executed plans against resolved market outcomes.
pub struct SettlementService {
    repo: SharedRepository,
}

impl SettlementService {
    #[must_use]
    pub fn new(repo: SharedRepository) -> Self {
        Self { repo }
    }

    /// Settle one plan. `overrides` wins over recorded settlement history;
    /// if any touched market has no resolution from either source the call
    /// aborts without writing anything.
    ///
    /// Per fill: `payout = 1` iff the resolved outcome matches the fill
    /// direction's outcome; `pnl = (payout − avg_price)·size − fee`.
    pub async fn settle_plan(
        &self,
        plan_id: &PlanId,
        overrides: &HashMap<MarketId, Outcome>,
    ) -> Result<PnlRecord> {
        let plan = self
            .repo
            .get_plan(plan_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("plan {plan_id}")))?;
        let fills = self.repo.list_fills_by_plan(plan_id).await?;
        if fills.is_empty() {
            return Err(Error::Conflict(format!("plan {plan_id} has no fills")));
        }

        // Resolve every market up front; partial settlement is not allowed.
        let mut outcomes: HashMap<TokenId, Outcome> = HashMap::new();
        let mut missing: Vec<String> = Vec::new();
        for fill in &fills {
            if outcomes.contains_key(&fill.token_id) {
                continue;
            }
            let Some(token) = self.repo.get_token(&fill.token_id).await? else {
                missing.push(fill.token_id.to_string());
                continue;
            };
            let outcome = match overrides.get(&token.market_id) {
                Some(outcome) => Some(*outcome),
                None => self
                    .repo
                    .get_settlement(&token.market_id)
                    .await?
                    .map(|s| s.outcome),
            };
            match outcome {
                Some(outcome) => {
                    outcomes.insert(fill.token_id.clone(), outcome);
                }
                None => missing.push(token.market_id.to_string()),
            }
        }
        if !missing.is_empty() {
            missing.sort();
            missing.dedup();
            return Err(Error::Conflict(format!(
                "missing market outcomes: {}",
                missing.join(", ")
            )));
        }

        let mut realized_pnl = Decimal::ZERO;
        let mut total_cost = Decimal::ZERO;
        let mut slippage_loss = Decimal::ZERO;
        let mut any_slippage = false;
        for fill in &fills {
            let outcome = outcomes[&fill.token_id];
            let payout = if outcome == fill.direction.outcome() {
                Decimal::ONE
            } else {
                Decimal::ZERO
            };
            realized_pnl += (payout - fill.avg_price) * fill.filled_size - fill.fee;
            total_cost += fill.avg_price * fill.filled_size + fill.fee;
            if let Some(slippage) = fill.slippage {
                slippage_loss += slippage;
                any_slippage = true;
            }
        }

        let realized_roi = if total_cost.is_zero() {
            None
        } else {
            (realized_pnl / total_cost).to_f64()
        };
        let outcome = match realized_pnl.cmp(&Decimal::ZERO) {
            std::cmp::Ordering::Greater => PnlOutcome::Win,
            std::cmp::Ordering::Less => PnlOutcome::Loss,
            std::cmp::Ordering::Equal => PnlOutcome::Partial,
        };

        let expected_edge = self
            .repo
            .get_opportunity(&plan.opportunity_id)
            .await?
            .map_or(Decimal::ZERO, |o| o.edge_pct);
        let mut record = self
            .repo
            .get_pnl_record(plan_id)
            .await?
            .unwrap_or_else(|| {
                PnlRecord::pending(plan_id.clone(), plan.strategy.clone(), expected_edge)
            });
        record.strategy = plan.strategy.clone();
        record.realized_pnl = Some(realized_pnl);
        record.realized_roi = realized_roi;
        record.slippage_loss = any_slippage.then_some(slippage_loss);
        record.outcome = outcome;
        record.settled_at = Some(Utc::now());
        self.repo.upsert_pnl_record(&record).await?;

        // The opportunity reaches its terminal state here; the plan keeps
        // whatever execution status it ended with.
        if self
            .repo
            .get_opportunity(&plan.opportunity_id)
            .await?
            .is_some()
        {
            self.repo
                .update_opportunity_status(
                    &plan.opportunity_id,
                    crate::core::domain::OpportunityStatus::Executed,
                )
                .await?;
        }

        info!(
            plan = %plan_id,
            realized_pnl = %realized_pnl,
            roi = ?realized_roi,
            outcome = outcome.as_str(),
            "plan settled"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{
        Candidate, EventId, ExecutionPlan, Fill, Market, MarketSettlement, Opportunity,
        PlanStatus, Token, TradeDirection,
    };
    use crate::core::store::{MemoryRepository, Repository};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    async fn seed_market(repo: &dyn Repository, market: &str, yes: &str, no: &str) {
        repo.upsert_market(&Market {
            id: MarketId::from(market),
            event_id: EventId::from("e1"),
            slug: market.into(),
            question: "?".into(),
            condition_id: format!("0x{market}"),
            tick_size: dec!(0.01),
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

    async fn seed_plan(repo: &dyn Repository) -> PlanId {
        let opp = Opportunity::from_candidate(
            Candidate {
                strategy: "arbitrage_sum".into(),
                legs: vec![],
                event_id: None,
                primary_market_id: None,
                edge_pct: dec!(0.1),
                edge_usd: dec!(10),
                max_size: dec!(100),
                confidence: 0.9,
                risk_score: 0.1,
                expires_at: Utc::now() + chrono::Duration::minutes(5),
                data_age_ms: 0,
                signal_ids: vec![],
                reasoning: String::new(),
                warnings: vec![],
            },
            Utc::now(),
        );
        repo.insert_opportunity(&opp).await.unwrap();
        let plan = ExecutionPlan {
            id: PlanId::generate(),
            opportunity_id: opp.id,
            status: PlanStatus::Executed,
            strategy: "arbitrage_sum".into(),
            planned_size_usd: dec!(33.65),
            max_loss_usd: dec!(33.65),
            kelly_fraction: 0.1,
            legs: vec![],
            params: Default::default(),
            preflight_result: None,
            created_at: Utc::now(),
            executed_at: Some(Utc::now()),
        };
        repo.insert_plan(&plan).await.unwrap();
        plan.id
    }

    fn fill(plan: &PlanId, token: &str, size: Decimal, price: Decimal, fee: Decimal) -> Fill {
        Fill {
            plan_id: plan.clone(),
            token_id: TokenId::from(token),
            direction: TradeDirection::BuyYes,
            filled_size: size,
            avg_price: price,
            fee,
            slippage: None,
            filled_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn settlement_identity_over_two_fills() {
        let repo = Arc::new(MemoryRepository::new());
        seed_market(repo.as_ref(), "ma", "t-yes-a", "t-no-a").await;
        seed_market(repo.as_ref(), "mb", "t-yes-b", "t-no-b").await;
        let plan_id = seed_plan(repo.as_ref()).await;

        repo.insert_fill(&fill(&plan_id, "t-yes-a", dec!(50), dec!(0.40), dec!(0.1)))
            .await
            .unwrap();
        repo.insert_fill(&fill(&plan_id, "t-yes-b", dec!(30), dec!(0.45), dec!(0.05)))
            .await
            .unwrap();

        let overrides: HashMap<MarketId, Outcome> = [
            (MarketId::from("ma"), Outcome::Yes),
            (MarketId::from("mb"), Outcome::No),
        ]
        .into_iter()
        .collect();

        let service = SettlementService::new(Arc::clone(&repo) as SharedRepository);
        let record = service.settle_plan(&plan_id, &overrides).await.unwrap();

        // pnl_a = (1-0.40)*50 - 0.1 = 29.9; pnl_b = (0-0.45)*30 - 0.05 = -13.55
        assert_eq!(record.realized_pnl, Some(dec!(16.35)));
        let roi = record.realized_roi.unwrap();
        assert!((roi - 16.35 / 33.65).abs() < 1e-9, "got {roi}");
        assert_eq!(record.outcome, PnlOutcome::Win);
        assert!(record.settled_at.is_some());

        // Plan keeps its executed status.
        let plan = repo.get_plan(&plan_id).await.unwrap().unwrap();
        assert_eq!(plan.status, PlanStatus::Executed);
    }

    #[tokio::test]
    async fn unresolved_market_aborts_settlement() {
        let repo = Arc::new(MemoryRepository::new());
        seed_market(repo.as_ref(), "ma", "t-yes-a", "t-no-a").await;
        let plan_id = seed_plan(repo.as_ref()).await;
        repo.insert_fill(&fill(&plan_id, "t-yes-a", dec!(50), dec!(0.40), dec!(0)))
            .await
            .unwrap();

        let service = SettlementService::new(Arc::clone(&repo) as SharedRepository);
        let err = service.settle_plan(&plan_id, &HashMap::new()).await.unwrap_err();
        let text = err.to_string();
        assert!(text.contains("missing market outcomes"), "got {text}");
        assert!(text.contains("ma"));

        // Nothing was written.
        assert!(repo.get_pnl_record(&plan_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn settlement_history_supplies_outcomes() {
        let repo = Arc::new(MemoryRepository::new());
        seed_market(repo.as_ref(), "ma", "t-yes-a", "t-no-a").await;
        repo.upsert_settlement(&MarketSettlement {
            market_id: MarketId::from("ma"),
            event_id: EventId::from("e1"),
            outcome: Outcome::Yes,
            labels: vec![],
            initial_yes_price: None,
            final_yes_price: None,
            settled_at: Utc::now(),
        })
        .await
        .unwrap();
        let plan_id = seed_plan(repo.as_ref()).await;
        repo.insert_fill(&fill(&plan_id, "t-yes-a", dec!(100), dec!(0.40), dec!(0)))
            .await
            .unwrap();

        let service = SettlementService::new(Arc::clone(&repo) as SharedRepository);
        let record = service.settle_plan(&plan_id, &HashMap::new()).await.unwrap();
        assert_eq!(record.realized_pnl, Some(dec!(60.00)));
    }
}
