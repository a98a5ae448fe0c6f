//! Daily stats rollup.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::info;

use crate::core::domain::{
    DailyStats, OpportunityStatus, PlanStatus, PnlOutcome, StrategyDailyStats,
};
use crate::core::store::{Repository, SharedRepository};
use crate::error::Result;

pub struct DailyStatsService {
    repo: SharedRepository,
}

impl DailyStatsService {
    #[must_use]
    pub fn new(repo: SharedRepository) -> Self {
        Self { repo }
    }

    fn day_key(ts: DateTime<Utc>) -> String {
        ts.format("%Y-%m-%d").to_string()
    }

    /// Recompute and upsert today's counters, overall and per strategy.
    pub async fn rollup(&self) -> Result<DailyStats> {
        let today = Self::day_key(Utc::now());
        let mut stats = DailyStats {
            date: today.clone(),
            ..Default::default()
        };
        let mut per_strategy: HashMap<String, StrategyDailyStats> = HashMap::new();

        for status in [
            OpportunityStatus::Active,
            OpportunityStatus::Executing,
            OpportunityStatus::Executed,
            OpportunityStatus::Cancelled,
            OpportunityStatus::Expired,
        ] {
            for opp in self.repo.list_opportunities_by_status(status).await? {
                if Self::day_key(opp.created_at) != today {
                    continue;
                }
                stats.opportunities_detected += 1;
                let entry = per_strategy
                    .entry(opp.strategy.clone())
                    .or_insert_with(|| StrategyDailyStats {
                        date: today.clone(),
                        strategy: opp.strategy.clone(),
                        ..Default::default()
                    });
                entry.opportunities_detected += 1;
                if matches!(
                    status,
                    OpportunityStatus::Executing | OpportunityStatus::Executed
                ) {
                    stats.opportunities_executed += 1;
                    entry.opportunities_executed += 1;
                }
                if status == OpportunityStatus::Expired {
                    stats.opportunities_expired += 1;
                }
            }
        }

        for status in [
            PlanStatus::Draft,
            PlanStatus::PreflightPass,
            PlanStatus::PreflightFail,
            PlanStatus::Executing,
            PlanStatus::Partial,
            PlanStatus::Executed,
            PlanStatus::Cancelled,
            PlanStatus::Failed,
        ] {
            for plan in self.repo.list_plans_by_status(status).await? {
                if Self::day_key(plan.created_at) == today {
                    stats.plans_created += 1;
                }
                if status != PlanStatus::Executed {
                    continue;
                }
                if plan
                    .executed_at
                    .map_or(false, |t| Self::day_key(t) == today)
                {
                    stats.plans_executed += 1;
                    if let Some(entry) = per_strategy.get_mut(&plan.strategy) {
                        entry.plans_executed += 1;
                    }
                }
                // Settled PnL counts on its settlement day.
                if let Some(record) = self.repo.get_pnl_record(&plan.id).await? {
                    let settled_today = record
                        .settled_at
                        .map_or(false, |t| Self::day_key(t) == today);
                    if !settled_today {
                        continue;
                    }
                    let pnl = record.realized_pnl.unwrap_or(Decimal::ZERO);
                    stats.realized_pnl += pnl;
                    match record.outcome {
                        PnlOutcome::Win => stats.win_count += 1,
                        PnlOutcome::Loss => stats.loss_count += 1,
                        _ => {}
                    }
                    if let Some(entry) = per_strategy.get_mut(&plan.strategy) {
                        entry.realized_pnl += pnl;
                        match record.outcome {
                            PnlOutcome::Win => entry.win_count += 1,
                            PnlOutcome::Loss => entry.loss_count += 1,
                            _ => {}
                        }
                    }
                }
            }
        }

        self.repo.upsert_daily_stats(&stats).await?;
        for entry in per_strategy.values() {
            self.repo.upsert_strategy_daily_stats(entry).await?;
        }
        info!(
            date = %stats.date,
            opportunities = stats.opportunities_detected,
            plans_executed = stats.plans_executed,
            realized_pnl = %stats.realized_pnl,
            "daily stats rolled up"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{Candidate, ExecutionPlan, Opportunity, PlanId, PnlRecord};
    use crate::core::store::{MemoryRepository, Repository};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    #[tokio::test]
    async fn rollup_counts_todays_activity() {
        let repo = Arc::new(MemoryRepository::new());

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
        let mut executed = opp.clone();
        executed.status = OpportunityStatus::Executed;
        repo.insert_opportunity(&executed).await.unwrap();

        let plan = ExecutionPlan {
            id: PlanId::generate(),
            opportunity_id: executed.id.clone(),
            status: PlanStatus::Executed,
            strategy: "arbitrage_sum".into(),
            planned_size_usd: dec!(50),
            max_loss_usd: dec!(50),
            kelly_fraction: 0.2,
            legs: vec![],
            params: Default::default(),
            preflight_result: None,
            created_at: Utc::now(),
            executed_at: Some(Utc::now()),
        };
        repo.insert_plan(&plan).await.unwrap();

        let mut record = PnlRecord::pending(plan.id.clone(), "arbitrage_sum".into(), dec!(0.1));
        record.realized_pnl = Some(dec!(16.35));
        record.outcome = PnlOutcome::Win;
        record.settled_at = Some(Utc::now());
        repo.upsert_pnl_record(&record).await.unwrap();

        let service = DailyStatsService::new(Arc::clone(&repo) as SharedRepository);
        let stats = service.rollup().await.unwrap();

        assert_eq!(stats.opportunities_detected, 1);
        assert_eq!(stats.opportunities_executed, 1);
        assert_eq!(stats.plans_created, 1);
        assert_eq!(stats.plans_executed, 1);
        assert_eq!(stats.realized_pnl, dec!(16.35));
        assert_eq!(stats.win_count, 1);

        let today = DailyStatsService::day_key(Utc::now());
        let stored = repo.get_daily_stats(&today).await.unwrap().unwrap();
        assert_eq!(stored, stats);
    }
}
