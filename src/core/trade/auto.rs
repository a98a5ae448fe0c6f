//! Auto-executor: walks active opportunities through sizing, planning,
//! preflight and submission without a human in the loop.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use super::executor::OrderExecutor;
use super::planner::ExecutionPlanner;
use super::risk::RiskManager;
use crate::core::domain::{ExecutionRule, Opportunity, OpportunityStatus};
use crate::core::store::{Repository, SharedRepository};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct AutoExecutorConfig {
    pub scan_interval: Duration,
}

impl Default for AutoExecutorConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(15),
        }
    }
}

pub struct AutoExecutor {
    repo: SharedRepository,
    risk: Arc<RiskManager>,
    planner: Arc<ExecutionPlanner>,
    executor: Arc<OrderExecutor>,
    config: AutoExecutorConfig,
}

impl AutoExecutor {
    #[must_use]
    pub fn new(
        repo: SharedRepository,
        risk: Arc<RiskManager>,
        planner: Arc<ExecutionPlanner>,
        executor: Arc<OrderExecutor>,
        config: AutoExecutorConfig,
    ) -> Self {
        Self {
            repo,
            risk,
            planner,
            executor,
            config,
        }
    }

    /// Whether the strategy's rule admits this opportunity.
    fn admits(rule: &ExecutionRule, opportunity: &Opportunity) -> bool {
        rule.auto_execute
            && opportunity.confidence >= rule.min_confidence
            && opportunity.edge_pct >= rule.min_edge_pct
    }

    /// One pass over the active opportunities. Returns how many plans were
    /// submitted.
    pub async fn scan_once(&self) -> Result<usize> {
        let active = self
            .repo
            .list_opportunities_by_status(OpportunityStatus::Active)
            .await?;
        let mut submitted = 0;
        for opportunity in active {
            let rule = match self.repo.get_execution_rule(&opportunity.strategy).await? {
                Some(rule) => rule,
                None => ExecutionRule::defaults_for(opportunity.strategy.clone()),
            };
            if !Self::admits(&rule, &opportunity) {
                continue;
            }
            match self.execute_one(&opportunity, &rule).await {
                Ok(true) => submitted += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        opportunity = %opportunity.id,
                        error = %e,
                        "auto-execution attempt failed"
                    );
                }
            }
        }
        Ok(submitted)
    }

    async fn execute_one(&self, opportunity: &Opportunity, rule: &ExecutionRule) -> Result<bool> {
        let sizing = self.risk.suggest_plan_sizing(opportunity, rule);
        if sizing.planned_size_usd <= Decimal::ZERO {
            debug!(opportunity = %opportunity.id, "sized to zero, skipping");
            return Ok(false);
        }
        let plan = self.planner.plan(opportunity, &sizing, None).await?;
        let result = self.risk.preflight_plan(&plan, opportunity, rule).await?;
        let plan = self.planner.apply_preflight(plan, result).await?;
        if plan.status != crate::core::domain::PlanStatus::PreflightPass {
            info!(plan = %plan.id, "preflight failed; plan parked");
            return Ok(false);
        }
        self.executor.submit_plan(&plan).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{
        BookSnapshot, Candidate, EventId, Market, MarketId, OpportunityLeg, Outcome, PlanStatus,
        PriceLevel, Token, TokenId, TradeDirection,
    };
    use crate::core::portfolio::{JournalService, PositionTracker};
    use crate::core::store::{MemoryRepository, Repository};
    use crate::core::trade::executor::DryRunExchange;
    use crate::core::trade::risk::RiskConfig;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    async fn seed(repo: &dyn Repository) {
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
            id: TokenId::from("t1"),
            market_id: MarketId::from("m1"),
            outcome: Outcome::Yes,
        })
        .await
        .unwrap();
        repo.upsert_book(&BookSnapshot::new(
            TokenId::from("t1"),
            Utc::now(),
            vec![PriceLevel::new(dec!(0.38), dec!(1000))],
            vec![PriceLevel::new(dec!(0.40), dec!(1000))],
        ))
        .await
        .unwrap();
    }

    fn opportunity() -> Opportunity {
        Opportunity::from_candidate(
            Candidate {
                strategy: "arbitrage_sum".into(),
                legs: vec![OpportunityLeg {
                    market_id: MarketId::from("m1"),
                    token_id: TokenId::from("t1"),
                    direction: TradeDirection::BuyYes,
                    target_price: dec!(0.40),
                    current_best_ask: Some(dec!(0.40)),
                    size_hint: None,
                }],
                event_id: None,
                primary_market_id: Some(MarketId::from("m1")),
                edge_pct: dec!(0.10),
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
        )
    }

    fn auto(repo: &std::sync::Arc<MemoryRepository>) -> AutoExecutor {
        let shared = std::sync::Arc::clone(repo) as SharedRepository;
        let executor = Arc::new(OrderExecutor::new(
            Arc::clone(&shared),
            Arc::new(DryRunExchange::new()),
            Arc::new(PositionTracker::new(Arc::clone(&shared))),
            Arc::new(JournalService::new(Arc::clone(&shared))),
            Default::default(),
        ));
        AutoExecutor::new(
            Arc::clone(&shared),
            Arc::new(RiskManager::new(Arc::clone(&shared), RiskConfig::default())),
            Arc::new(ExecutionPlanner::new(Arc::clone(&shared))),
            executor,
            AutoExecutorConfig::default(),
        )
    }

    #[tokio::test]
    async fn rule_gates_auto_execution() {
        let repo = std::sync::Arc::new(MemoryRepository::new());
        seed(repo.as_ref()).await;
        repo.insert_opportunity(&opportunity()).await.unwrap();
        // Default rule has auto_execute = false.
        assert_eq!(auto(&repo).scan_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn admitted_opportunity_is_planned_and_submitted() {
        let repo = std::sync::Arc::new(MemoryRepository::new());
        seed(repo.as_ref()).await;
        let opp = opportunity();
        repo.insert_opportunity(&opp).await.unwrap();
        let rule = ExecutionRule {
            auto_execute: true,
            ..ExecutionRule::defaults_for("arbitrage_sum")
        };
        repo.upsert_execution_rule(&rule).await.unwrap();

        assert_eq!(auto(&repo).scan_once().await.unwrap(), 1);

        let executing = repo
            .list_plans_by_status(PlanStatus::Executing)
            .await
            .unwrap();
        assert_eq!(executing.len(), 1);
        let stored = repo.get_opportunity(&opp.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OpportunityStatus::Executing);
    }

    #[tokio::test]
    async fn min_edge_rule_filters_opportunities() {
        let repo = std::sync::Arc::new(MemoryRepository::new());
        seed(repo.as_ref()).await;
        repo.insert_opportunity(&opportunity()).await.unwrap();
        let rule = ExecutionRule {
            auto_execute: true,
            min_edge_pct: dec!(0.50),
            ..ExecutionRule::defaults_for("arbitrage_sum")
        };
        repo.upsert_execution_rule(&rule).await.unwrap();

        assert_eq!(auto(&repo).scan_once().await.unwrap(), 0);
    }
}
