//! Systematic NO strategies: category priors and FDV overpricing.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use super::helpers;
use crate::core::domain::{Candidate, SignalType, TradeDirection};
use crate::core::strategy::{Evaluator, Snapshot};

/// Buys NO where the learned category NO-rate says the market overprices
/// YES. One leg at the NO best ask; edge is the prior minus the price.
pub struct SystematicNo;

impl Evaluator for SystematicNo {
    fn name(&self) -> &'static str {
        "systematic_no"
    }

    fn evaluate(&self, snapshot: &Snapshot) -> Vec<Candidate> {
        let mut out = Vec::new();
        for signal in snapshot.signals_of(&SignalType::NoBias) {
            let (Some(market_id), Some(token_id)) = (&signal.market_id, &signal.token_id) else {
                continue;
            };
            let Some(book) = snapshot.book(token_id) else {
                continue;
            };
            let Some(ask) = book.best_ask() else {
                continue;
            };
            let Some(no_rate) = signal
                .payload
                .get("no_rate")
                .and_then(serde_json::Value::as_f64)
                .and_then(Decimal::from_f64)
            else {
                continue;
            };
            let edge_pct = no_rate - ask;
            if edge_pct <= Decimal::ZERO {
                continue;
            }
            let max_size = helpers::best_ask_notional(book)
                .unwrap_or(helpers::DEFAULT_MAX_SIZE)
                .min(helpers::DEFAULT_MAX_SIZE);
            let category = signal
                .payload
                .get("category")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown");
            out.push(helpers::candidate(
                self.name(),
                snapshot,
                signal,
                vec![helpers::leg(
                    market_id.clone(),
                    token_id.clone(),
                    TradeDirection::BuyNo,
                    ask,
                    Some(ask),
                )],
                edge_pct,
                max_size,
                signal.strength.max(0.4),
                0.3,
                snapshot.taken_at + chrono::Duration::minutes(30),
                format!("category {category} resolves NO at {no_rate}; NO asked at {ask}"),
            ));
        }
        out
    }
}

/// Buys NO on `fdv_overpriced` markets; the position decays with time to
/// the event end, so the candidate expires with the signal.
pub struct PreMarketFdv;

impl Evaluator for PreMarketFdv {
    fn name(&self) -> &'static str {
        "pre_market_fdv"
    }

    fn evaluate(&self, snapshot: &Snapshot) -> Vec<Candidate> {
        let mut out = Vec::new();
        for signal in snapshot.signals_of(&SignalType::FdvOverpriced) {
            let (Some(market_id), Some(token_id)) = (&signal.market_id, &signal.token_id) else {
                continue;
            };
            let Some(book) = snapshot.book(token_id) else {
                continue;
            };
            let Some(ask) = book.best_ask() else {
                continue;
            };
            // FDV launches overwhelmingly miss their listed valuation band;
            // treat the baked prior as the fair NO price.
            let prior = Decimal::new(80, 2); // 0.80
            let edge_pct = prior - ask;
            if edge_pct <= Decimal::ZERO {
                continue;
            }
            let expires_at = signal
                .expires_at
                .unwrap_or(snapshot.taken_at + chrono::Duration::hours(24));
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
                    TradeDirection::BuyNo,
                    ask,
                    Some(ask),
                )],
                edge_pct,
                max_size,
                0.6,
                0.4,
                expires_at,
                format!("pre-market FDV market; NO asked at {ask} against a {prior} prior"),
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{BookSnapshot, Direction, MarketId, PriceLevel, Signal, TokenId};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn no_bias_signal(market: &str, token: &str, no_rate: f64) -> Signal {
        Signal::builder(SignalType::NoBias, "internal_scan")
            .market(MarketId::from(market))
            .token(TokenId::from(token))
            .direction(Direction::No)
            .strength(0.8)
            .payload(json!({ "category": "pre_market_fdv", "no_rate": no_rate, "ev_pct": 112.5 }))
            .created_at(Utc::now())
            .build()
    }

    fn book(token: &str, ask: Decimal) -> BookSnapshot {
        BookSnapshot::new(
            TokenId::from(token),
            Utc::now(),
            vec![PriceLevel::new(ask - dec!(0.02), dec!(1000))],
            vec![PriceLevel::new(ask, dec!(1000))],
        )
    }

    #[test]
    fn no_bias_signal_becomes_single_buy_no_leg() {
        let snapshot = Snapshot::for_tests()
            .book(book("t-no", dec!(0.40)))
            .signal(no_bias_signal("m2", "t-no", 0.85))
            .build();

        let candidates = SystematicNo.evaluate(&snapshot);
        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.legs.len(), 1);
        assert_eq!(c.legs[0].direction, TradeDirection::BuyNo);
        assert_eq!(c.edge_pct, dec!(0.45));
        assert_eq!(
            c.primary_market_id.as_ref().map(|m| m.as_str()),
            Some("m2")
        );
    }

    #[test]
    fn repriced_market_kills_the_edge() {
        // NO now asks above the prior; no candidate.
        let snapshot = Snapshot::for_tests()
            .book(book("t-no", dec!(0.90)))
            .signal(no_bias_signal("m2", "t-no", 0.85))
            .build();
        assert!(SystematicNo.evaluate(&snapshot).is_empty());
    }

    #[test]
    fn fdv_candidate_expires_with_the_signal() {
        let end = Utc::now() + chrono::Duration::days(20);
        let signal = Signal::builder(SignalType::FdvOverpriced, "internal_scan")
            .market(MarketId::from("m1"))
            .token(TokenId::from("t-no"))
            .direction(Direction::No)
            .expires_at(end)
            .created_at(Utc::now())
            .build();
        let snapshot = Snapshot::for_tests()
            .book(book("t-no", dec!(0.45)))
            .signal(signal)
            .build();

        let candidates = PreMarketFdv.evaluate(&snapshot);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].expires_at, end);
    }
}
