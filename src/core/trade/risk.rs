//! Risk management: sizing, preflight checks and daily caps.

use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use tracing::warn;

use crate::core::domain::{
    CheckStatus, ExecutionPlan, ExecutionRule, FailureReason, Opportunity, PnlRecord,
    PreflightCheck, PreflightResult, Usd,
};
use crate::core::store::{Repository, SharedRepository};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct RiskConfig {
    /// Total capital the Kelly fraction applies to.
    pub bankroll: Usd,
    /// Hard cap on the Kelly fraction.
    pub max_kelly: f64,
    /// Below this confidence the suggested fraction is zero.
    pub min_confidence: f64,
    /// Book snapshots older than this fail `data_freshness`.
    pub freshness_cap_secs: i64,
    /// Fraction of the original edge that must survive `edge_recheck`.
    pub edge_retention: f64,
    /// Advisory spread cap in bps.
    pub spread_cap_bps: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            bankroll: Decimal::from(1000),
            max_kelly: 0.25,
            min_confidence: 0.3,
            freshness_cap_secs: 30,
            edge_retention: 0.6,
            spread_cap_bps: 1000.0,
        }
    }
}

/// Sizing suggestion for a plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanSizing {
    pub planned_size_usd: Usd,
    pub max_loss_usd: Usd,
    pub kelly_fraction: f64,
    pub warnings: Vec<String>,
}

pub struct RiskManager {
    repo: SharedRepository,
    config: RiskConfig,
}

impl RiskManager {
    #[must_use]
    pub fn new(repo: SharedRepository, config: RiskConfig) -> Self {
        Self { repo, config }
    }

    /// Kelly fraction in the standard binary form, clamped to
    /// `[0, max_kelly]`. Confidence is the win probability; the implied
    /// share price is the probability less the edge.
    #[must_use]
    pub fn kelly_fraction(&self, edge_pct: Decimal, confidence: f64) -> f64 {
        if confidence < self.config.min_confidence {
            return 0.0;
        }
        let edge = edge_pct.to_f64().unwrap_or(0.0);
        if edge <= 0.0 {
            return 0.0;
        }
        let p = confidence.clamp(0.0, 1.0);
        let price = (p - edge).clamp(0.01, 0.99);
        // Net odds of a binary share bought at `price`.
        let b = (1.0 - price) / price;
        let q = 1.0 - p;
        let fraction = (b * p - q) / b;
        fraction.clamp(0.0, self.config.max_kelly)
    }

    /// Suggested plan sizing:
    /// `min(bankroll · kelly, rule.max_per_trade_usd, opportunity.max_size)`.
    /// For binary shares the loss cap equals the stake.
    #[must_use]
    pub fn suggest_plan_sizing(
        &self,
        opportunity: &Opportunity,
        rule: &ExecutionRule,
    ) -> PlanSizing {
        let mut warnings = Vec::new();
        let kelly = self.kelly_fraction(opportunity.edge_pct, opportunity.confidence);
        if kelly == 0.0 && opportunity.confidence < self.config.min_confidence {
            warnings.push(format!(
                "confidence {:.2} below minimum {:.2}; sizing zeroed",
                opportunity.confidence, self.config.min_confidence
            ));
        }
        let kelly_size = self.config.bankroll * Decimal::from_f64(kelly).unwrap_or_default();
        let planned = kelly_size
            .min(rule.max_per_trade_usd)
            .min(opportunity.max_size)
            .max(Decimal::ZERO);
        PlanSizing {
            planned_size_usd: planned,
            max_loss_usd: planned,
            kelly_fraction: kelly,
            warnings,
        }
    }

    /// Run the ordered preflight checks for a plan. `passed` holds iff all
    /// required checks pass; a required failure also stamps the PnL record
    /// with the mapped failure reason.
    pub async fn preflight_plan(
        &self,
        plan: &ExecutionPlan,
        opportunity: &Opportunity,
        rule: &ExecutionRule,
    ) -> Result<PreflightResult> {
        let mut checks = Vec::new();
        checks.push(self.check_data_freshness(plan).await?);
        checks.push(self.check_edge(plan, opportunity).await?);
        checks.push(self.check_capital_limit(plan, rule).await?);
        checks.push(self.check_spread_cap(plan).await?);
        checks.push(self.check_depth(plan).await?);

        let result = PreflightResult::from_checks(checks);
        if let Some(failure) = result.first_failure() {
            let reason = match failure.name.as_str() {
                "data_freshness" => FailureReason::Latency,
                "edge_recheck" => FailureReason::PriceJump,
                _ => FailureReason::RuleMismatch,
            };
            warn!(
                plan = %plan.id,
                check = %failure.name,
                detail = %failure.detail,
                "preflight failed"
            );
            let mut record = self
                .repo
                .get_pnl_record(&plan.id)
                .await?
                .unwrap_or_else(|| {
                    PnlRecord::pending(
                        plan.id.clone(),
                        plan.strategy.clone(),
                        opportunity.edge_pct,
                    )
                });
            record.failure_reason = Some(reason.as_str().to_string());
            self.repo.upsert_pnl_record(&record).await?;
        }
        Ok(result)
    }

    /// Every leg's book must be fresh and recently changed.
    async fn check_data_freshness(&self, plan: &ExecutionPlan) -> Result<PreflightCheck> {
        let now = Utc::now();
        let cap = ChronoDuration::seconds(self.config.freshness_cap_secs);
        for leg in &plan.legs {
            let Some(book) = self.repo.get_book(&leg.token_id).await? else {
                return Ok(required_check(
                    "data_freshness",
                    CheckStatus::Fail,
                    format!("no book for token {}", leg.token_id),
                ));
            };
            if now - book.snapshot_ts > cap {
                return Ok(required_check(
                    "data_freshness",
                    CheckStatus::Fail,
                    format!(
                        "book for {} is {}s old",
                        leg.token_id,
                        (now - book.snapshot_ts).num_seconds()
                    ),
                ));
            }
            if let Some(health) = self.repo.get_health(&leg.token_id).await? {
                if let Some(changed) = health.last_book_change_ts {
                    if now - changed > cap {
                        return Ok(required_check(
                            "data_freshness",
                            CheckStatus::Fail,
                            format!("book for {} unchanged beyond cap", leg.token_id),
                        ));
                    }
                }
            }
        }
        Ok(required_check(
            "data_freshness",
            CheckStatus::Pass,
            "all legs fresh".into(),
        ))
    }

    /// Re-derive the current edge from live asks; fail when it has decayed
    /// below the retention floor.
    async fn check_edge(
        &self,
        plan: &ExecutionPlan,
        opportunity: &Opportunity,
    ) -> Result<PreflightCheck> {
        let mut slip = Decimal::ZERO;
        for leg in &plan.legs {
            let Some(ask) = self
                .repo
                .get_book(&leg.token_id)
                .await?
                .and_then(|b| b.best_ask())
            else {
                return Ok(required_check(
                    "edge_recheck",
                    CheckStatus::Fail,
                    format!("no ask for token {}", leg.token_id),
                ));
            };
            if ask > leg.target_price {
                slip += ask - leg.target_price;
            }
        }
        let current_edge = opportunity.edge_pct - slip;
        let floor = opportunity.edge_pct
            * Decimal::from_f64(self.config.edge_retention).unwrap_or_default();
        if current_edge <= floor {
            return Ok(required_check(
                "edge_recheck",
                CheckStatus::Fail,
                format!(
                    "edge decayed from {} to {current_edge} (floor {floor})",
                    opportunity.edge_pct
                ),
            ));
        }
        Ok(required_check(
            "edge_recheck",
            CheckStatus::Pass,
            format!("current edge {current_edge}"),
        ))
    }

    /// Daily quota: trade count and total size per strategy over 24h.
    async fn check_capital_limit(
        &self,
        plan: &ExecutionPlan,
        rule: &ExecutionRule,
    ) -> Result<PreflightCheck> {
        let since = Utc::now() - ChronoDuration::hours(24);
        let trades = self.repo.count_plans_since(&plan.strategy, since).await?;
        if trades >= rule.max_daily_trades {
            return Ok(required_check(
                "capital_limit",
                CheckStatus::Fail,
                format!(
                    "{trades} plans in 24h at the {} cap",
                    rule.max_daily_trades
                ),
            ));
        }
        let committed = self
            .repo
            .sum_planned_size_since(&plan.strategy, since)
            .await?;
        let cap = rule.max_per_trade_usd * Decimal::from(rule.max_daily_trades);
        if committed + plan.planned_size_usd > cap {
            return Ok(required_check(
                "capital_limit",
                CheckStatus::Fail,
                format!("daily capital {committed} + {} exceeds {cap}", plan.planned_size_usd),
            ));
        }
        Ok(required_check(
            "capital_limit",
            CheckStatus::Pass,
            format!("{committed} committed of {cap}"),
        ))
    }

    /// Advisory: warn on very wide books.
    async fn check_spread_cap(&self, plan: &ExecutionPlan) -> Result<PreflightCheck> {
        for leg in &plan.legs {
            let spread = self
                .repo
                .get_book(&leg.token_id)
                .await?
                .and_then(|b| b.spread_bps());
            if spread.is_some_and(|s| s > self.config.spread_cap_bps) {
                return Ok(advisory_check(
                    "spread_cap",
                    CheckStatus::Warn,
                    format!("token {} spread above cap", leg.token_id),
                ));
            }
        }
        Ok(advisory_check(
            "spread_cap",
            CheckStatus::Pass,
            "spreads inside cap".into(),
        ))
    }

    /// Advisory: warn when the top of book cannot absorb a leg.
    async fn check_depth(&self, plan: &ExecutionPlan) -> Result<PreflightCheck> {
        for leg in &plan.legs {
            let depth = self
                .repo
                .get_book(&leg.token_id)
                .await?
                .and_then(|b| b.asks.first().map(|l| l.price * l.size));
            if depth.is_some_and(|d| d < leg.size_usd) {
                return Ok(advisory_check(
                    "depth_ok",
                    CheckStatus::Warn,
                    format!("token {} top-of-book thinner than leg", leg.token_id),
                ));
            }
        }
        Ok(advisory_check(
            "depth_ok",
            CheckStatus::Pass,
            "depth sufficient".into(),
        ))
    }
}

fn required_check(name: &str, status: CheckStatus, detail: String) -> PreflightCheck {
    PreflightCheck {
        name: name.to_string(),
        status,
        detail,
        required: true,
    }
}

fn advisory_check(name: &str, status: CheckStatus, detail: String) -> PreflightCheck {
    PreflightCheck {
        name: name.to_string(),
        status,
        detail,
        required: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{
        BookSnapshot, Candidate, MarketId, PlanId, PlanLeg, PlanStatus, PriceLevel, TokenId,
        TradeDirection,
    };
    use crate::core::store::{MemoryRepository, Repository};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn opportunity(edge: Decimal, confidence: f64) -> Opportunity {
        Opportunity::from_candidate(
            Candidate {
                strategy: "arbitrage_sum".into(),
                legs: vec![],
                event_id: None,
                primary_market_id: None,
                edge_pct: edge,
                edge_usd: edge * dec!(100),
                max_size: dec!(100),
                confidence,
                risk_score: 0.1,
                expires_at: Utc::now() + ChronoDuration::minutes(5),
                data_age_ms: 0,
                signal_ids: vec![],
                reasoning: String::new(),
                warnings: vec![],
            },
            Utc::now(),
        )
    }

    fn plan_with_leg(target: Decimal) -> ExecutionPlan {
        ExecutionPlan {
            id: PlanId::generate(),
            opportunity_id: crate::core::domain::OpportunityId::generate(),
            status: PlanStatus::Draft,
            strategy: "arbitrage_sum".into(),
            planned_size_usd: dec!(50),
            max_loss_usd: dec!(50),
            kelly_fraction: 0.1,
            legs: vec![PlanLeg {
                market_id: MarketId::from("m1"),
                token_id: TokenId::from("t1"),
                direction: TradeDirection::BuyYes,
                target_price: target,
                size_usd: dec!(50),
                priority: 0,
            }],
            params: Default::default(),
            preflight_result: None,
            created_at: Utc::now(),
            executed_at: None,
        }
    }

    async fn seed_book(repo: &dyn Repository, token: &str, ask: Decimal) {
        repo.upsert_book(&BookSnapshot::new(
            TokenId::from(token),
            Utc::now(),
            vec![PriceLevel::new(ask - dec!(0.02), dec!(1000))],
            vec![PriceLevel::new(ask, dec!(1000))],
        ))
        .await
        .unwrap();
    }

    fn manager(repo: &Arc<MemoryRepository>) -> RiskManager {
        RiskManager::new(Arc::clone(repo) as SharedRepository, RiskConfig::default())
    }

    #[test]
    fn kelly_clamps_to_max() {
        let risk = manager(&Arc::new(MemoryRepository::new()));
        let f = risk.kelly_fraction(dec!(0.15), 0.9);
        assert!((f - 0.25).abs() < 1e-9, "large edge should clamp, got {f}");
    }

    #[test]
    fn kelly_zero_below_min_confidence() {
        let risk = manager(&Arc::new(MemoryRepository::new()));
        assert_eq!(risk.kelly_fraction(dec!(0.15), 0.1), 0.0);
    }

    #[test]
    fn kelly_zero_for_non_positive_edge() {
        let risk = manager(&Arc::new(MemoryRepository::new()));
        assert_eq!(risk.kelly_fraction(dec!(0), 0.9), 0.0);
        assert_eq!(risk.kelly_fraction(dec!(-0.05), 0.9), 0.0);
    }

    #[test]
    fn sizing_takes_the_tightest_cap() {
        let risk = manager(&Arc::new(MemoryRepository::new()));
        let opp = opportunity(dec!(0.15), 0.9); // kelly clamps at 0.25 → 250 of bankroll
        let rule = ExecutionRule {
            max_per_trade_usd: dec!(60),
            ..ExecutionRule::defaults_for("arbitrage_sum")
        };
        let sizing = risk.suggest_plan_sizing(&opp, &rule);
        assert_eq!(sizing.planned_size_usd, dec!(60)); // rule cap binds
        assert_eq!(sizing.max_loss_usd, dec!(60));
    }

    #[test]
    fn low_confidence_sizing_is_zero_with_warning() {
        let risk = manager(&Arc::new(MemoryRepository::new()));
        let opp = opportunity(dec!(0.15), 0.1);
        let rule = ExecutionRule::defaults_for("arbitrage_sum");
        let sizing = risk.suggest_plan_sizing(&opp, &rule);
        assert_eq!(sizing.planned_size_usd, Decimal::ZERO);
        assert_eq!(sizing.warnings.len(), 1);
    }

    #[tokio::test]
    async fn preflight_passes_on_fresh_stable_market() {
        let repo = Arc::new(MemoryRepository::new());
        seed_book(repo.as_ref(), "t1", dec!(0.40)).await;
        let risk = manager(&repo);
        let opp = opportunity(dec!(0.10), 0.9);
        let plan = plan_with_leg(dec!(0.40));
        let rule = ExecutionRule::defaults_for("arbitrage_sum");

        let result = risk.preflight_plan(&plan, &opp, &rule).await.unwrap();
        assert!(result.passed, "checks: {:?}", result.checks);
    }

    #[tokio::test]
    async fn price_jump_fails_edge_recheck_and_stamps_pnl() {
        let repo = Arc::new(MemoryRepository::new());
        // Ask moved 0.40 → 0.48: edge 0.10 → 0.02 ≤ 0.6·0.10.
        seed_book(repo.as_ref(), "t1", dec!(0.48)).await;
        let risk = manager(&repo);
        let opp = opportunity(dec!(0.10), 0.9);
        let plan = plan_with_leg(dec!(0.40));
        let rule = ExecutionRule::defaults_for("arbitrage_sum");

        let result = risk.preflight_plan(&plan, &opp, &rule).await.unwrap();
        assert!(!result.passed);
        assert_eq!(result.first_failure().unwrap().name, "edge_recheck");

        let record = repo.get_pnl_record(&plan.id).await.unwrap().unwrap();
        assert_eq!(record.failure_reason.as_deref(), Some("price_jump"));
    }

    #[tokio::test]
    async fn stale_book_fails_freshness() {
        let repo = Arc::new(MemoryRepository::new());
        repo.upsert_book(&BookSnapshot::new(
            TokenId::from("t1"),
            Utc::now() - ChronoDuration::minutes(5),
            vec![PriceLevel::new(dec!(0.38), dec!(100))],
            vec![PriceLevel::new(dec!(0.40), dec!(100))],
        ))
        .await
        .unwrap();
        let risk = manager(&repo);
        let opp = opportunity(dec!(0.10), 0.9);
        let plan = plan_with_leg(dec!(0.40));
        let rule = ExecutionRule::defaults_for("arbitrage_sum");

        let result = risk.preflight_plan(&plan, &opp, &rule).await.unwrap();
        assert!(!result.passed);
        assert_eq!(result.first_failure().unwrap().name, "data_freshness");

        let record = repo.get_pnl_record(&plan.id).await.unwrap().unwrap();
        assert_eq!(record.failure_reason.as_deref(), Some("latency"));
    }

    #[tokio::test]
    async fn daily_quota_fails_capital_limit() {
        let repo = Arc::new(MemoryRepository::new());
        seed_book(repo.as_ref(), "t1", dec!(0.40)).await;
        // Fill the 24h window to the trade-count cap.
        for _ in 0..10 {
            let plan = plan_with_leg(dec!(0.40));
            repo.insert_plan(&plan).await.unwrap();
        }
        let risk = manager(&repo);
        let opp = opportunity(dec!(0.10), 0.9);
        let plan = plan_with_leg(dec!(0.40));
        let rule = ExecutionRule::defaults_for("arbitrage_sum");

        let result = risk.preflight_plan(&plan, &opp, &rule).await.unwrap();
        assert!(!result.passed);
        assert_eq!(result.first_failure().unwrap().name, "capital_limit");

        let record = repo.get_pnl_record(&plan.id).await.unwrap().unwrap();
        assert_eq!(record.failure_reason.as_deref(), Some("rule_mismatch"));
    }
}
