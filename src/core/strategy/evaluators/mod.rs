//! Evaluator implementations.

mod arbitrage;
mod book;
mod momentum;
mod sweep;
mod systematic;
mod weather;

pub use arbitrage::ArbitrageSum;
pub use book::{ContrarianFear, LiquidityReward, MmBehavior};
pub use momentum::{BtcShortTerm, NewsAlpha, VolatilityArb};
pub use sweep::{CertaintySweep, MarketAnomaly};
pub use systematic::{PreMarketFdv, SystematicNo};
pub use weather::Weather;

use std::sync::Arc;

use super::Evaluator;

/// Every built-in evaluator, in no particular order; the engine orders by
/// the registry's priority.
#[must_use]
pub fn default_evaluators() -> Vec<Arc<dyn Evaluator>> {
    vec![
        Arc::new(ArbitrageSum),
        Arc::new(SystematicNo),
        Arc::new(PreMarketFdv),
        Arc::new(NewsAlpha),
        Arc::new(VolatilityArb),
        Arc::new(Weather),
        Arc::new(BtcShortTerm),
        Arc::new(ContrarianFear),
        Arc::new(MmBehavior),
        Arc::new(CertaintySweep),
        Arc::new(LiquidityReward),
        Arc::new(MarketAnomaly),
    ]
}

/// Shared construction helpers for evaluators.
pub mod helpers {
    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;

    use crate::core::domain::{
        BookSnapshot, Candidate, MarketId, OpportunityLeg, Signal, TokenId, TradeDirection, Usd,
    };
    use crate::core::strategy::Snapshot;

    /// Cap on the size any single candidate suggests, absent depth info.
    pub const DEFAULT_MAX_SIZE: Decimal = Decimal::ONE_HUNDRED;

    #[must_use]
    pub fn leg(
        market_id: MarketId,
        token_id: TokenId,
        direction: TradeDirection,
        target_price: Decimal,
        current_best_ask: Option<Decimal>,
    ) -> OpportunityLeg {
        OpportunityLeg {
            market_id,
            token_id,
            direction,
            target_price,
            current_best_ask,
            size_hint: None,
        }
    }

    /// Notional resting at the best ask; bounds how much a taker candidate
    /// can expect to fill without walking the book.
    #[must_use]
    pub fn best_ask_notional(book: &BookSnapshot) -> Option<Usd> {
        book.asks.first().map(|l| l.price * l.size)
    }

    /// Assemble a candidate with the bookkeeping fields evaluators share.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn candidate(
        strategy: &'static str,
        snapshot: &Snapshot,
        signal: &Signal,
        legs: Vec<OpportunityLeg>,
        edge_pct: Decimal,
        max_size: Usd,
        confidence: f64,
        risk_score: f64,
        expires_at: DateTime<Utc>,
        reasoning: String,
    ) -> Candidate {
        let data_age_ms = legs
            .iter()
            .map(|l| snapshot.book_age_ms(&l.token_id))
            .max()
            .unwrap_or(i64::MAX);
        let primary_market_id = match legs.as_slice() {
            [only] => Some(only.market_id.clone()),
            _ => None,
        };
        Candidate {
            strategy: strategy.to_string(),
            event_id: signal.event_id.clone(),
            primary_market_id,
            edge_pct,
            edge_usd: edge_pct * max_size,
            max_size,
            confidence,
            risk_score,
            expires_at,
            data_age_ms,
            signal_ids: vec![signal.id.clone()],
            reasoning,
            warnings: Vec::new(),
            legs,
        }
    }
}
