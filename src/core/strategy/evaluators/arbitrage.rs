//! Sum-of-prices arbitrage across an event's YES tokens.

use rust_decimal::Decimal;

use super::helpers;
use crate::core::domain::{Candidate, Direction, Outcome, SignalType, TradeDirection};
use crate::core::strategy::{Evaluator, Snapshot};

/// Reads `arb_sum_deviation` signals and builds one leg per YES token of
/// the event (or per NO token when the sum is above one). The edge is the
/// absolute deviation of the sum from parity, recomputed from live books.
pub struct ArbitrageSum;

impl Evaluator for ArbitrageSum {
    fn name(&self) -> &'static str {
        "arbitrage_sum"
    }

    fn evaluate(&self, snapshot: &Snapshot) -> Vec<Candidate> {
        let mut out = Vec::new();
        for signal in snapshot.signals_of(&SignalType::ArbSumDeviation) {
            let Some(event_id) = &signal.event_id else {
                continue;
            };
            // Buy the cheap side: YES legs when the sum is short of one,
            // NO legs when it overshoots.
            let outcome = match signal.direction {
                Direction::Yes => Outcome::Yes,
                Direction::No => Outcome::No,
                _ => continue,
            };
            let trade_direction = match outcome {
                Outcome::Yes => TradeDirection::BuyYes,
                Outcome::No => TradeDirection::BuyNo,
            };

            let mut legs = Vec::new();
            let mut yes_sum = Decimal::ZERO;
            let mut max_size = helpers::DEFAULT_MAX_SIZE;
            let mut complete = true;
            for market_id in snapshot.markets_of_event(event_id) {
                let Some(yes_token) = snapshot.outcome_token(market_id, Outcome::Yes) else {
                    complete = false;
                    break;
                };
                let Some(yes_mid) = snapshot.book(&yes_token.id).and_then(|b| b.mid()) else {
                    complete = false;
                    break;
                };
                yes_sum += yes_mid;

                let Some(leg_token) = snapshot.outcome_token(market_id, outcome) else {
                    complete = false;
                    break;
                };
                let Some(book) = snapshot.book(&leg_token.id) else {
                    complete = false;
                    break;
                };
                let Some(ask) = book.best_ask() else {
                    complete = false;
                    break;
                };
                if let Some(depth) = helpers::best_ask_notional(book) {
                    max_size = max_size.min(depth);
                }
                legs.push(helpers::leg(
                    market_id.clone(),
                    leg_token.id.clone(),
                    trade_direction,
                    ask,
                    Some(ask),
                ));
            }
            if !complete || legs.len() < 2 {
                continue;
            }

            let edge_pct = (Decimal::ONE - yes_sum).abs();
            if edge_pct.is_zero() {
                continue;
            }
            out.push(helpers::candidate(
                self.name(),
                snapshot,
                signal,
                legs,
                edge_pct,
                max_size,
                0.9,
                0.1,
                snapshot.taken_at + chrono::Duration::minutes(2),
                format!("YES prices sum to {yes_sum}; buying the cheap side across the event"),
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{
        BookSnapshot, Event, EventId, Market, MarketId, PriceLevel, Signal, Token, TokenId,
    };
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn market(id: &str) -> Market {
        Market {
            id: MarketId::from(id),
            event_id: EventId::from("e1"),
            slug: id.into(),
            question: "?".into(),
            condition_id: format!("0x{id}"),
            tick_size: dec!(0.01),
            active: true,
            closed: false,
            neg_risk: false,
        }
    }

    fn token(id: &str, market: &str, outcome: Outcome) -> Token {
        Token {
            id: TokenId::from(id),
            market_id: MarketId::from(market),
            outcome,
        }
    }

    fn book(token: &str, bid: Decimal, ask: Decimal) -> BookSnapshot {
        BookSnapshot::new(
            TokenId::from(token),
            Utc::now(),
            vec![PriceLevel::new(bid, dec!(500))],
            vec![PriceLevel::new(ask, dec!(500))],
        )
    }

    fn arb_signal() -> Signal {
        Signal::builder(SignalType::ArbSumDeviation, "internal_scan")
            .event(EventId::from("e1"))
            .direction(Direction::Yes)
            .strength(1.0)
            .created_at(Utc::now())
            .build()
    }

    #[test]
    fn underpriced_event_yields_buy_yes_legs() {
        let snapshot = Snapshot::for_tests()
            .event(Event {
                id: EventId::from("e1"),
                slug: "e1".into(),
                title: "E".into(),
                active: true,
                closed: false,
                end_time: None,
                series_id: None,
            })
            .market(market("ma"))
            .market(market("mb"))
            .token(token("ta", "ma", Outcome::Yes))
            .token(token("tb", "mb", Outcome::Yes))
            .book(book("ta", dec!(0.40), dec!(0.40)))
            .book(book("tb", dec!(0.45), dec!(0.45)))
            .signal(arb_signal())
            .build();

        let candidates = ArbitrageSum.evaluate(&snapshot);
        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        // Sum of mids = 0.85; edge = 0.15.
        assert_eq!(c.edge_pct, dec!(0.15));
        assert_eq!(c.legs.len(), 2);
        assert!(c
            .legs
            .iter()
            .all(|l| l.direction == TradeDirection::BuyYes));
        assert!(c.primary_market_id.is_none());
    }

    #[test]
    fn missing_book_suppresses_the_candidate() {
        let snapshot = Snapshot::for_tests()
            .market(market("ma"))
            .market(market("mb"))
            .token(token("ta", "ma", Outcome::Yes))
            .token(token("tb", "mb", Outcome::Yes))
            .book(book("ta", dec!(0.40), dec!(0.40)))
            .signal(arb_signal())
            .build();

        assert!(ArbitrageSum.evaluate(&snapshot).is_empty());
    }

    #[test]
    fn max_size_caps_at_available_depth() {
        let thin = BookSnapshot::new(
            TokenId::from("tb"),
            Utc::now(),
            vec![PriceLevel::new(dec!(0.45), dec!(10))],
            vec![PriceLevel::new(dec!(0.45), dec!(10))], // 4.50 notional
        );
        let snapshot = Snapshot::for_tests()
            .market(market("ma"))
            .market(market("mb"))
            .token(token("ta", "ma", Outcome::Yes))
            .token(token("tb", "mb", Outcome::Yes))
            .book(book("ta", dec!(0.40), dec!(0.40)))
            .book(thin)
            .signal(arb_signal())
            .build();

        let candidates = ArbitrageSum.evaluate(&snapshot);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].max_size, dec!(4.50));
    }
}
