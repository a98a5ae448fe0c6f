//! Evaluators driven by order-book microstructure signals.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use super::helpers;
use crate::core::domain::{Candidate, SignalType, TradeDirection};
use crate::core::strategy::{Evaluator, Snapshot};

/// Buys into fear: a `fear_spike` marks a panicked, gappy book where the
/// YES side trades below fair. Single BUY_YES leg at the ask.
pub struct ContrarianFear;

impl Evaluator for ContrarianFear {
    fn name(&self) -> &'static str {
        "contrarian_fear"
    }

    fn evaluate(&self, snapshot: &Snapshot) -> Vec<Candidate> {
        let mut out = Vec::new();
        for signal in snapshot.signals_of(&SignalType::FearSpike) {
            let (Some(market_id), Some(token_id)) = (&signal.market_id, &signal.token_id) else {
                continue;
            };
            let Some(book) = snapshot.book(token_id) else {
                continue;
            };
            let (Some(ask), Some(mid)) = (book.best_ask(), book.mid()) else {
                continue;
            };
            // Panic pricing: the half-spread is the concession on offer.
            let edge_pct = (ask - mid).abs();
            if edge_pct.is_zero() {
                continue;
            }
            let max_size = helpers::best_ask_notional(book)
                .unwrap_or(helpers::DEFAULT_MAX_SIZE)
                .min(helpers::DEFAULT_MAX_SIZE);
            out.push(helpers::candidate(
                self.name(),
                snapshot,
                signal,
                vec![helpers::leg(
                    market_id.clone(),
                    token_id.clone(),
                    TradeDirection::BuyYes,
                    mid,
                    Some(ask),
                )],
                edge_pct,
                max_size,
                0.5 * signal.strength.max(0.2),
                0.6,
                snapshot.taken_at + chrono::Duration::minutes(5),
                "fear spike; bidding the dislocated YES side back to mid".into(),
            ));
        }
        out
    }
}

/// Leans against market-maker inventory skew: a wide, quiet book means the
/// maker is off balance and the touch is mispriced.
pub struct MmBehavior;

impl Evaluator for MmBehavior {
    fn name(&self) -> &'static str {
        "mm_behavior"
    }

    fn evaluate(&self, snapshot: &Snapshot) -> Vec<Candidate> {
        let mut out = Vec::new();
        for signal in snapshot.signals_of(&SignalType::MmInventorySkew) {
            let (Some(market_id), Some(token_id)) = (&signal.market_id, &signal.token_id) else {
                continue;
            };
            let Some(book) = snapshot.book(token_id) else {
                continue;
            };
            let (Some(bid), Some(mid)) = (book.best_bid(), book.mid()) else {
                continue;
            };
            let edge_pct = (mid - bid).abs();
            if edge_pct.is_zero() {
                continue;
            }
            out.push(helpers::candidate(
                self.name(),
                snapshot,
                signal,
                vec![helpers::leg(
                    market_id.clone(),
                    token_id.clone(),
                    TradeDirection::BuyYes,
                    bid,
                    book.best_ask(),
                )],
                edge_pct,
                helpers::DEFAULT_MAX_SIZE,
                0.4 * signal.strength.max(0.2),
                0.5,
                snapshot.taken_at + chrono::Duration::minutes(5),
                "inventory-skewed maker; joining the thin bid".into(),
            ));
        }
        out
    }
}

/// Earns the spread on persistently wide books by quoting inside the gap.
pub struct LiquidityReward;

impl Evaluator for LiquidityReward {
    fn name(&self) -> &'static str {
        "liquidity_reward"
    }

    fn evaluate(&self, snapshot: &Snapshot) -> Vec<Candidate> {
        let mut out = Vec::new();
        for signal in snapshot.signals_of(&SignalType::LiquidityGap) {
            let (Some(market_id), Some(token_id)) = (&signal.market_id, &signal.token_id) else {
                continue;
            };
            let Some(book) = snapshot.book(token_id) else {
                continue;
            };
            let (Some(mid), Some(spread_bps)) = (book.mid(), book.spread_bps()) else {
                continue;
            };
            // Capture half the spread by quoting at mid.
            let Some(edge_pct) =
                Decimal::from_f64(spread_bps / 10_000.0 / 2.0).map(|s| s * mid)
            else {
                continue;
            };
            if edge_pct.is_zero() {
                continue;
            }
            out.push(helpers::candidate(
                self.name(),
                snapshot,
                signal,
                vec![helpers::leg(
                    market_id.clone(),
                    token_id.clone(),
                    TradeDirection::BuyYes,
                    mid,
                    book.best_ask(),
                )],
                edge_pct,
                helpers::DEFAULT_MAX_SIZE,
                0.45,
                0.4,
                snapshot.taken_at + chrono::Duration::minutes(10),
                format!("spread of {spread_bps:.0} bps; quoting at mid"),
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{
        BookSnapshot, Direction, MarketId, PriceLevel, Signal, TokenId,
    };
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn wide_book(token: &str) -> BookSnapshot {
        BookSnapshot::new(
            TokenId::from(token),
            Utc::now(),
            vec![PriceLevel::new(dec!(0.30), dec!(100))],
            vec![PriceLevel::new(dec!(0.50), dec!(100))],
        )
    }

    fn signal(signal_type: SignalType, market: &str, token: &str) -> Signal {
        Signal::builder(signal_type, "orderbook_pattern")
            .market(MarketId::from(market))
            .token(TokenId::from(token))
            .direction(Direction::Yes)
            .strength(0.8)
            .created_at(Utc::now())
            .build()
    }

    #[test]
    fn contrarian_fear_targets_mid() {
        let snapshot = Snapshot::for_tests()
            .book(wide_book("t1"))
            .signal(signal(SignalType::FearSpike, "m1", "t1"))
            .build();

        let candidates = ContrarianFear.evaluate(&snapshot);
        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.legs[0].target_price, dec!(0.40)); // mid of 0.30/0.50
        assert_eq!(c.edge_pct, dec!(0.10)); // half spread
    }

    #[test]
    fn mm_behavior_joins_the_bid() {
        let snapshot = Snapshot::for_tests()
            .book(wide_book("t1"))
            .signal(signal(SignalType::MmInventorySkew, "m1", "t1"))
            .build();

        let candidates = MmBehavior.evaluate(&snapshot);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].legs[0].target_price, dec!(0.30));
    }

    #[test]
    fn liquidity_reward_prices_half_the_spread() {
        let snapshot = Snapshot::for_tests()
            .book(wide_book("t1"))
            .signal(signal(SignalType::LiquidityGap, "m1", "t1"))
            .build();

        let candidates = LiquidityReward.evaluate(&snapshot);
        assert_eq!(candidates.len(), 1);
        // spread 5000 bps; half is 0.25 of mid 0.40 = 0.10.
        assert_eq!(candidates[0].edge_pct, dec!(0.10));
    }

    #[test]
    fn no_book_means_no_candidate() {
        let snapshot = Snapshot::for_tests()
            .signal(signal(SignalType::FearSpike, "m1", "t1"))
            .build();
        assert!(ContrarianFear.evaluate(&snapshot).is_empty());
    }
}
