//! Weather-market evaluator.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use super::helpers;
use crate::core::domain::{Candidate, Direction, Outcome, SignalType, TradeDirection};
use crate::core::strategy::{Evaluator, Snapshot};

/// Joins city-scoped `weather_deviation` signals with markets labeled
/// `weather` whose sub-label names the same city, and takes the deviated
/// side.
pub struct Weather;

impl Evaluator for Weather {
    fn name(&self) -> &'static str {
        "weather"
    }

    fn evaluate(&self, snapshot: &Snapshot) -> Vec<Candidate> {
        let mut out = Vec::new();
        for signal in snapshot.signals_of(&SignalType::WeatherDeviation) {
            let Some(city) = signal
                .payload
                .get("city")
                .and_then(serde_json::Value::as_str)
            else {
                continue;
            };
            let outcome = match signal.direction {
                Direction::Yes => Outcome::Yes,
                Direction::No => Outcome::No,
                _ => continue,
            };
            let trade_direction = match outcome {
                Outcome::Yes => TradeDirection::BuyYes,
                Outcome::No => TradeDirection::BuyNo,
            };

            for label in snapshot.markets_with_label("weather") {
                if label.sub_label.as_deref() != Some(city) {
                    continue;
                }
                let market_id = &label.market_id;
                let Some(token) = snapshot.outcome_token(market_id, outcome) else {
                    continue;
                };
                let Some(book) = snapshot.book(&token.id) else {
                    continue;
                };
                let Some(ask) = book.best_ask() else {
                    continue;
                };
                let Some(edge_pct) = Decimal::from_f64(signal.strength * 0.08) else {
                    continue;
                };
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
                        token.id.clone(),
                        trade_direction,
                        ask,
                        Some(ask),
                    )],
                    edge_pct,
                    max_size,
                    0.6 * signal.strength.max(0.2),
                    0.5,
                    snapshot.taken_at + chrono::Duration::hours(2),
                    format!("forecast deviation in {city}; taking the {outcome} side"),
                ));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{
        BookSnapshot, MarketId, MarketLabel, PriceLevel, Signal, Token, TokenId,
    };
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn weather_signal(city: &str) -> Signal {
        Signal::builder(SignalType::WeatherDeviation, "weather")
            .direction(Direction::Yes)
            .strength(0.7)
            .payload(json!({ "city": city, "deviation": 5.0 }))
            .created_at(Utc::now())
            .build()
    }

    fn city_market(city: &str) -> crate::core::strategy::snapshot::SnapshotBuilder {
        Snapshot::for_tests()
            .label(MarketLabel {
                market_id: MarketId::from("m-w"),
                label: "weather".into(),
                sub_label: Some(city.into()),
                auto_labeled: true,
                confidence: 0.9,
            })
            .token(Token {
                id: TokenId::from("t-yes"),
                market_id: MarketId::from("m-w"),
                outcome: Outcome::Yes,
            })
            .book(BookSnapshot::new(
                TokenId::from("t-yes"),
                Utc::now(),
                vec![PriceLevel::new(dec!(0.55), dec!(100))],
                vec![PriceLevel::new(dec!(0.60), dec!(100))],
            ))
    }

    #[test]
    fn city_join_matches_sub_label() {
        let snapshot = city_market("nyc").signal(weather_signal("nyc")).build();
        let candidates = Weather.evaluate(&snapshot);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].legs[0].direction, TradeDirection::BuyYes);
    }

    #[test]
    fn different_city_does_not_match() {
        let snapshot = city_market("chicago").signal(weather_signal("nyc")).build();
        assert!(Weather.evaluate(&snapshot).is_empty());
    }
}
