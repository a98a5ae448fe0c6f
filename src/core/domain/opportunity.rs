//! Trading opportunities and the evaluator candidates they come from.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::execution::TradeDirection;
use super::id::{EventId, MarketId, OpportunityId, SignalId, TokenId};
use super::money::{Price, Usd};

/// Lifecycle of an opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpportunityStatus {
    Active,
    Executing,
    Executed,
    Cancelled,
    Expired,
}

impl OpportunityStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Executing => "executing",
            Self::Executed => "executed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "executing" => Some(Self::Executing),
            "executed" => Some(Self::Executed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

/// One (market, token, direction) entry within a candidate or opportunity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityLeg {
    pub market_id: MarketId,
    pub token_id: TokenId,
    pub direction: TradeDirection,
    pub target_price: Price,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_best_ask: Option<Price>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_hint: Option<Usd>,
}

/// What an evaluator hands to the opportunity manager on each tick.
/// Pure data; evaluators are side-effect-free.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub strategy: String,
    pub legs: Vec<OpportunityLeg>,
    pub event_id: Option<EventId>,
    pub primary_market_id: Option<MarketId>,
    /// Absolute price deviation captured, e.g. `0.15` for a 15% arb gap.
    pub edge_pct: Decimal,
    pub edge_usd: Usd,
    pub max_size: Usd,
    /// Confidence in `[0, 1]`. Float: a statistic.
    pub confidence: f64,
    /// Risk score in `[0, 1]`; higher is riskier.
    pub risk_score: f64,
    pub expires_at: DateTime<Utc>,
    /// Age of the most stale input the evaluator consumed.
    pub data_age_ms: i64,
    pub signal_ids: Vec<SignalId>,
    pub reasoning: String,
    pub warnings: Vec<String>,
}

impl Candidate {
    /// Ranking key used when the per-strategy cap is exceeded.
    #[must_use]
    pub fn risk_adjusted_edge(&self) -> f64 {
        use rust_decimal::prelude::ToPrimitive;
        let edge = self.edge_pct.to_f64().unwrap_or(0.0);
        edge * self.confidence * (1.0 - self.risk_score)
    }

    /// Dedup key: `(strategy, primary_market_id)` when a primary market is
    /// set, otherwise a fingerprint of the sorted leg tuples.
    #[must_use]
    pub fn dedup_key(&self) -> String {
        match &self.primary_market_id {
            Some(market) => format!("{}|{}", self.strategy, market),
            None => {
                let mut parts: Vec<String> = self
                    .legs
                    .iter()
                    .map(|l| format!("{}:{}:{}", l.market_id, l.token_id, l.direction.as_str()))
                    .collect();
                parts.sort();
                format!("{}|{}", self.strategy, parts.join(","))
            }
        }
    }
}

/// A live opportunity tracked by the opportunity manager.
#[derive(Debug, Clone)]
pub struct Opportunity {
    pub id: OpportunityId,
    pub strategy: String,
    pub status: OpportunityStatus,
    pub event_id: Option<EventId>,
    pub primary_market_id: Option<MarketId>,
    pub edge_pct: Decimal,
    pub edge_usd: Usd,
    pub max_size: Usd,
    pub confidence: f64,
    pub risk_score: f64,
    pub expires_at: DateTime<Utc>,
    pub legs: Vec<OpportunityLeg>,
    pub signal_ids: Vec<SignalId>,
    pub reasoning: String,
    pub warnings: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Opportunity {
    /// Materialize a candidate into a live opportunity.
    #[must_use]
    pub fn from_candidate(candidate: Candidate, now: DateTime<Utc>) -> Self {
        Self {
            id: OpportunityId::generate(),
            strategy: candidate.strategy,
            status: OpportunityStatus::Active,
            event_id: candidate.event_id,
            primary_market_id: candidate.primary_market_id,
            edge_pct: candidate.edge_pct,
            edge_usd: candidate.edge_usd,
            max_size: candidate.max_size,
            confidence: candidate.confidence,
            risk_score: candidate.risk_score,
            expires_at: candidate.expires_at,
            legs: candidate.legs,
            signal_ids: candidate.signal_ids,
            reasoning: candidate.reasoning,
            warnings: candidate.warnings,
            created_at: now,
        }
    }

    #[must_use]
    pub fn dedup_key(&self) -> String {
        match &self.primary_market_id {
            Some(market) => format!("{}|{}", self.strategy, market),
            None => {
                let mut parts: Vec<String> = self
                    .legs
                    .iter()
                    .map(|l| format!("{}:{}:{}", l.market_id, l.token_id, l.direction.as_str()))
                    .collect();
                parts.sort();
                format!("{}|{}", self.strategy, parts.join(","))
            }
        }
    }

    #[must_use]
    pub fn risk_adjusted_edge(&self) -> f64 {
        use rust_decimal::prelude::ToPrimitive;
        let edge = self.edge_pct.to_f64().unwrap_or(0.0);
        edge * self.confidence * (1.0 - self.risk_score)
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn leg(market: &str, token: &str) -> OpportunityLeg {
        OpportunityLeg {
            market_id: MarketId::from(market),
            token_id: TokenId::from(token),
            direction: TradeDirection::BuyYes,
            target_price: dec!(0.40),
            current_best_ask: None,
            size_hint: None,
        }
    }

    fn candidate(primary: Option<&str>, legs: Vec<OpportunityLeg>) -> Candidate {
        Candidate {
            strategy: "arbitrage_sum".into(),
            legs,
            event_id: None,
            primary_market_id: primary.map(MarketId::from),
            edge_pct: dec!(0.10),
            edge_usd: dec!(10),
            max_size: dec!(100),
            confidence: 0.8,
            risk_score: 0.2,
            expires_at: Utc::now(),
            data_age_ms: 0,
            signal_ids: vec![],
            reasoning: String::new(),
            warnings: vec![],
        }
    }

    #[test]
    fn dedup_key_uses_primary_market_when_set() {
        let c = candidate(Some("m1"), vec![leg("m1", "t1")]);
        assert_eq!(c.dedup_key(), "arbitrage_sum|m1");
    }

    #[test]
    fn dedup_key_fingerprint_is_order_independent() {
        let a = candidate(None, vec![leg("m1", "t1"), leg("m2", "t2")]);
        let b = candidate(None, vec![leg("m2", "t2"), leg("m1", "t1")]);
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn risk_adjusted_edge_formula() {
        let c = candidate(Some("m1"), vec![leg("m1", "t1")]);
        // 0.10 * 0.8 * (1 - 0.2) = 0.064
        assert!((c.risk_adjusted_edge() - 0.064).abs() < 1e-9);
    }

    #[test]
    fn status_parses_both_spellings() {
        assert_eq!(
            OpportunityStatus::parse("canceled"),
            Some(OpportunityStatus::Cancelled)
        );
        assert_eq!(
            OpportunityStatus::parse("cancelled"),
            Some(OpportunityStatus::Cancelled)
        );
    }
}
