//! Execution planner: materializes opportunities into plans.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::info;

use super::risk::PlanSizing;
use crate::core::domain::{
    ExecutionPlan, Opportunity, OpportunityStatus, PlanId, PlanLeg, PlanParams, PlanStatus,
    PnlRecord,
};
use crate::core::store::{Repository, SharedRepository};
use crate::error::{Error, Result};

pub struct ExecutionPlanner {
    repo: SharedRepository,
}

impl ExecutionPlanner {
    #[must_use]
    pub fn new(repo: SharedRepository) -> Self {
        Self { repo }
    }

    /// Create a draft plan from an active opportunity.
    ///
    /// Legs are copied from the opportunity with the planned size split
    /// equally across them (weights are a future knob) and prioritized in
    /// leg order. The opportunity moves `active → executing`; a pending
    /// PnL record is opened alongside.
    pub async fn plan(
        &self,
        opportunity: &Opportunity,
        sizing: &PlanSizing,
        params: Option<PlanParams>,
    ) -> Result<ExecutionPlan> {
        if opportunity.status != OpportunityStatus::Active {
            return Err(Error::Conflict(format!(
                "opportunity {} is {}, not active",
                opportunity.id,
                opportunity.status.as_str()
            )));
        }
        if opportunity.legs.is_empty() {
            return Err(Error::Input(format!(
                "opportunity {} has no legs",
                opportunity.id
            )));
        }
        if sizing.planned_size_usd <= Decimal::ZERO {
            return Err(Error::Input(format!(
                "opportunity {} sized to zero ({})",
                opportunity.id,
                sizing.warnings.join("; ")
            )));
        }

        let per_leg = sizing.planned_size_usd / Decimal::from(opportunity.legs.len() as u64);
        let legs: Vec<PlanLeg> = opportunity
            .legs
            .iter()
            .enumerate()
            .map(|(i, leg)| PlanLeg {
                market_id: leg.market_id.clone(),
                token_id: leg.token_id.clone(),
                direction: leg.direction,
                target_price: leg.target_price,
                size_usd: per_leg,
                priority: i as u32,
            })
            .collect();

        let plan = ExecutionPlan {
            id: PlanId::generate(),
            opportunity_id: opportunity.id.clone(),
            status: PlanStatus::Draft,
            strategy: opportunity.strategy.clone(),
            planned_size_usd: sizing.planned_size_usd,
            max_loss_usd: sizing.max_loss_usd,
            kelly_fraction: sizing.kelly_fraction,
            legs,
            params: params.unwrap_or_default(),
            preflight_result: None,
            created_at: Utc::now(),
            executed_at: None,
        };

        self.repo.insert_plan(&plan).await?;
        self.repo
            .update_opportunity_status(&opportunity.id, OpportunityStatus::Executing)
            .await?;
        self.repo
            .upsert_pnl_record(&PnlRecord::pending(
                plan.id.clone(),
                plan.strategy.clone(),
                opportunity.edge_pct,
            ))
            .await?;

        info!(
            plan = %plan.id,
            opportunity = %opportunity.id,
            size_usd = %plan.planned_size_usd,
            legs = plan.legs.len(),
            "plan created"
        );
        Ok(plan)
    }

    /// Record a preflight outcome on the plan and step its status.
    pub async fn apply_preflight(
        &self,
        mut plan: ExecutionPlan,
        result: crate::core::domain::PreflightResult,
    ) -> Result<ExecutionPlan> {
        let next = if result.passed {
            PlanStatus::PreflightPass
        } else {
            PlanStatus::PreflightFail
        };
        if !plan.status.can_transition_to(next) {
            return Err(Error::Conflict(format!(
                "plan {} cannot move {} → {}",
                plan.id,
                plan.status.as_str(),
                next.as_str()
            )));
        }
        plan.preflight_result = Some(result);
        plan.status = next;
        self.repo.update_plan(&plan).await?;
        Ok(plan)
    }
}
