//! Near-resolution sweeps and price-anomaly evaluators.

use rust_decimal::Decimal;

use super::helpers;
use crate::core::domain::{Candidate, Direction, Outcome, SignalType, TradeDirection};
use crate::core::strategy::{Evaluator, Snapshot};

/// Collects the last cents on near-certain markets close to resolution:
/// buys the near-certain side at its ask.
pub struct CertaintySweep;

impl Evaluator for CertaintySweep {
    fn name(&self) -> &'static str {
        "certainty_sweep"
    }

    fn evaluate(&self, snapshot: &Snapshot) -> Vec<Candidate> {
        let mut out = Vec::new();
        for signal in snapshot.signals_of(&SignalType::CertaintySweep) {
            let Some(market_id) = &signal.market_id else {
                continue;
            };
            let outcome = match signal.direction {
                Direction::Yes => Outcome::Yes,
                Direction::No => Outcome::No,
                _ => continue,
            };
            let Some(token) = snapshot.outcome_token(market_id, outcome) else {
                continue;
            };
            let Some(book) = snapshot.book(&token.id) else {
                continue;
            };
            let Some(ask) = book.best_ask() else {
                continue;
            };
            let edge_pct = Decimal::ONE - ask;
            if edge_pct <= Decimal::ZERO {
                continue;
            }
            let trade_direction = match outcome {
                Outcome::Yes => TradeDirection::BuyYes,
                Outcome::No => TradeDirection::BuyNo,
            };
            let max_size = helpers::best_ask_notional(book)
                .unwrap_or(helpers::DEFAULT_MAX_SIZE)
                .min(helpers::DEFAULT_MAX_SIZE);
            out.push(helpers::candidate(
                self.name(),
                snapshot,
                signal,
                vec![helpers::leg(
                    market_id.clone(),
                    token.id.clone(),
                    trade_direction,
                    ask,
                    Some(ask),
                )],
                edge_pct,
                max_size,
                0.9,
                0.15,
                snapshot.taken_at + chrono::Duration::minutes(15),
                format!("near-certain {outcome} side asked at {ask} before resolution"),
            ));
        }
        out
    }
}

/// Fades extreme prints: buys YES on extreme-cheap tokens and NO on
/// extreme-expensive ones.
pub struct MarketAnomaly;

impl Evaluator for MarketAnomaly {
    fn name(&self) -> &'static str {
        "market_anomaly"
    }

    fn evaluate(&self, snapshot: &Snapshot) -> Vec<Candidate> {
        let mut out = Vec::new();
        for signal in snapshot.signals_of(&SignalType::PriceAnomaly) {
            let Some(market_id) = &signal.market_id else {
                continue;
            };
            let outcome = match signal.direction {
                Direction::Yes => Outcome::Yes,
                Direction::No => Outcome::No,
                _ => continue,
            };
            let Some(token) = snapshot.outcome_token(market_id, outcome) else {
                continue;
            };
            let Some(book) = snapshot.book(&token.id) else {
                continue;
            };
            let Some(ask) = book.best_ask() else {
                continue;
            };
            // Anomalies are lottery tickets; edge is nominal, risk high.
            let edge_pct = Decimal::new(5, 2); // 0.05
            let trade_direction = match outcome {
                Outcome::Yes => TradeDirection::BuyYes,
                Outcome::No => TradeDirection::BuyNo,
            };
            out.push(helpers::candidate(
                self.name(),
                snapshot,
                signal,
                vec![helpers::leg(
                    market_id.clone(),
                    token.id.clone(),
                    trade_direction,
                    ask,
                    Some(ask),
                )],
                edge_pct,
                Decimal::TEN.min(helpers::DEFAULT_MAX_SIZE),
                0.3,
                0.8,
                snapshot.taken_at + chrono::Duration::minutes(10),
                "extreme print; small probe against the anomaly".into(),
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{
        BookSnapshot, MarketId, PriceLevel, Signal, Token, TokenId,
    };
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn seeded(yes_ask: Decimal) -> crate::core::strategy::snapshot::SnapshotBuilder {
        Snapshot::for_tests()
            .token(Token {
                id: TokenId::from("t-yes"),
                market_id: MarketId::from("m1"),
                outcome: Outcome::Yes,
            })
            .token(Token {
                id: TokenId::from("t-no"),
                market_id: MarketId::from("m1"),
                outcome: Outcome::No,
            })
            .book(BookSnapshot::new(
                TokenId::from("t-yes"),
                Utc::now(),
                vec![PriceLevel::new(yes_ask - dec!(0.01), dec!(200))],
                vec![PriceLevel::new(yes_ask, dec!(200))],
            ))
    }

    #[test]
    fn sweep_buys_the_certain_side_for_the_last_cents() {
        let signal = Signal::builder(SignalType::CertaintySweep, "certainty_sweep")
            .market(MarketId::from("m1"))
            .token(TokenId::from("t-yes"))
            .direction(Direction::Yes)
            .created_at(Utc::now())
            .build();
        let snapshot = seeded(dec!(0.98)).signal(signal).build();

        let candidates = CertaintySweep.evaluate(&snapshot);
        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.legs[0].direction, TradeDirection::BuyYes);
        assert_eq!(c.edge_pct, dec!(0.02));
    }

    #[test]
    fn anomaly_probe_is_small() {
        let signal = Signal::builder(SignalType::PriceAnomaly, "internal_scan")
            .market(MarketId::from("m1"))
            .token(TokenId::from("t-yes"))
            .direction(Direction::Yes)
            .created_at(Utc::now())
            .build();
        let snapshot = seeded(dec!(0.04)).signal(signal).build();

        let candidates = MarketAnomaly.evaluate(&snapshot);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].max_size, dec!(10));
        assert!(candidates[0].risk_score > 0.5);
    }
}
