//! Decision-chain journal capture.

use chrono::Utc;
use serde_json::json;
use tracing::debug;

use crate::core::domain::{ExecutionPlan, JournalEntry, PlanId, PnlRecord};
use crate::core::store::{Repository, SharedRepository};
use crate::error::{Error, Result};

/// Captures what the pipeline knew when it committed to a plan, and how
/// the trade turned out.
pub struct JournalService {
    repo: SharedRepository,
}

impl JournalService {
    #[must_use]
    pub fn new(repo: SharedRepository) -> Self {
        Self { repo }
    }

    /// Record the decision state for a plan at execution time: the
    /// contributing signals, the books behind each leg, and the sizing
    /// parameters.
    pub async fn capture(&self, plan: &ExecutionPlan) -> Result<JournalEntry> {
        let opportunity = self.repo.get_opportunity(&plan.opportunity_id).await?;

        let mut leg_state = Vec::new();
        for leg in &plan.legs {
            let book = self.repo.get_book(&leg.token_id).await?;
            leg_state.push(json!({
                "market_id": leg.market_id.as_str(),
                "token_id": leg.token_id.as_str(),
                "direction": leg.direction.as_str(),
                "target_price": leg.target_price.to_string(),
                "size_usd": leg.size_usd.to_string(),
                "best_bid": book.as_ref().and_then(|b| b.best_bid()).map(|p| p.to_string()),
                "best_ask": book.as_ref().and_then(|b| b.best_ask()).map(|p| p.to_string()),
            }));
        }

        let signals = match &opportunity {
            Some(opp) => json!(opp
                .signal_ids
                .iter()
                .map(|id| id.as_str())
                .collect::<Vec<_>>()),
            None => json!([]),
        };

        let entry = JournalEntry {
            plan_id: plan.id.clone(),
            strategy: plan.strategy.clone(),
            signals,
            decision_state: json!({
                "legs": leg_state,
                "edge_pct": opportunity.as_ref().map(|o| o.edge_pct.to_string()),
                "confidence": opportunity.as_ref().map(|o| o.confidence),
                "reasoning": opportunity.as_ref().map(|o| o.reasoning.clone()),
            }),
            entry_params: json!({
                "planned_size_usd": plan.planned_size_usd.to_string(),
                "max_loss_usd": plan.max_loss_usd.to_string(),
                "kelly_fraction": plan.kelly_fraction,
                "params": plan.params,
            }),
            outcome_state: None,
            notes: None,
            tags: Vec::new(),
            created_at: Utc::now(),
            reviewed_at: None,
        };
        self.repo.upsert_journal_entry(&entry).await?;
        debug!(plan = %plan.id, "journal entry captured");
        Ok(entry)
    }

    /// Append the post-outcome state once the plan settles.
    pub async fn record_outcome(&self, record: &PnlRecord) -> Result<()> {
        let Some(mut entry) = self.repo.get_journal_entry(&record.plan_id).await? else {
            return Ok(());
        };
        entry.outcome_state = Some(json!({
            "outcome": record.outcome.as_str(),
            "realized_pnl": record.realized_pnl.map(|p| p.to_string()),
            "realized_roi": record.realized_roi,
            "slippage_loss": record.slippage_loss.map(|s| s.to_string()),
            "settled_at": record.settled_at.map(|t| t.to_rfc3339()),
        }));
        self.repo.upsert_journal_entry(&entry).await
    }

    /// Append a human note and tags; stamps `reviewed_at`.
    pub async fn annotate(
        &self,
        plan_id: &PlanId,
        notes: Option<String>,
        tags: Vec<String>,
    ) -> Result<JournalEntry> {
        let mut entry = self
            .repo
            .get_journal_entry(plan_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("journal entry for plan {plan_id}")))?;
        if notes.is_some() {
            entry.notes = notes;
        }
        for tag in tags {
            if !entry.tags.contains(&tag) {
                entry.tags.push(tag);
            }
        }
        entry.reviewed_at = Some(Utc::now());
        self.repo.upsert_journal_entry(&entry).await?;
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{
        Candidate, OpportunityId, PlanStatus, PnlOutcome,
    };
    use crate::core::store::{MemoryRepository, Repository};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn plan(opportunity_id: OpportunityId) -> ExecutionPlan {
        ExecutionPlan {
            id: PlanId::generate(),
            opportunity_id,
            status: PlanStatus::Executed,
            strategy: "systematic_no".into(),
            planned_size_usd: dec!(50),
            max_loss_usd: dec!(50),
            kelly_fraction: 0.12,
            legs: vec![],
            params: Default::default(),
            preflight_result: None,
            created_at: Utc::now(),
            executed_at: Some(Utc::now()),
        }
    }

    #[tokio::test]
    async fn capture_then_outcome_then_annotate() {
        let repo = Arc::new(MemoryRepository::new());
        let opp = crate::core::domain::Opportunity::from_candidate(
            Candidate {
                strategy: "systematic_no".into(),
                legs: vec![],
                event_id: None,
                primary_market_id: None,
                edge_pct: dec!(0.45),
                edge_usd: dec!(20),
                max_size: dec!(100),
                confidence: 0.8,
                risk_score: 0.3,
                expires_at: Utc::now() + chrono::Duration::minutes(30),
                data_age_ms: 5,
                signal_ids: vec![],
                reasoning: "category prior".into(),
                warnings: vec![],
            },
            Utc::now(),
        );
        repo.insert_opportunity(&opp).await.unwrap();
        let plan = plan(opp.id.clone());
        repo.insert_plan(&plan).await.unwrap();

        let service = JournalService::new(Arc::clone(&repo) as SharedRepository);
        let entry = service.capture(&plan).await.unwrap();
        assert_eq!(entry.strategy, "systematic_no");
        assert!(entry.outcome_state.is_none());

        let mut record = PnlRecord::pending(plan.id.clone(), plan.strategy.clone(), dec!(0.45));
        record.outcome = PnlOutcome::Win;
        record.realized_pnl = Some(dec!(12.50));
        record.settled_at = Some(Utc::now());
        service.record_outcome(&record).await.unwrap();

        let entry = service
            .annotate(&plan.id, Some("good entry".into()), vec!["fdv".into()])
            .await
            .unwrap();
        assert_eq!(entry.notes.as_deref(), Some("good entry"));
        assert_eq!(entry.tags, vec!["fdv".to_string()]);
        assert!(entry.reviewed_at.is_some());
        assert_eq!(
            entry.outcome_state.as_ref().unwrap()["outcome"],
            "win"
        );
    }
}
