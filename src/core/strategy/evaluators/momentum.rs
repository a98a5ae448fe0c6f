//! Momentum and mean-reversion evaluators driven by external feeds.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use super::helpers;
use crate::core::domain::{
    Candidate, Direction, Outcome, Signal, SignalType, TradeDirection,
};
use crate::core::strategy::{Evaluator, Snapshot};

/// Shared shape for the label-joined directional evaluators: take the
/// signal's lean, find the labeled markets, buy the leaning side at ask.
fn directional_candidates(
    evaluator: &'static str,
    label: &str,
    signal: &Signal,
    snapshot: &Snapshot,
    momentum: bool,
    confidence: f64,
    risk_score: f64,
) -> Vec<Candidate> {
    let lean = match (signal.direction, momentum) {
        (Direction::Yes, true) | (Direction::No, false) => Outcome::Yes,
        (Direction::No, true) | (Direction::Yes, false) => Outcome::No,
        _ => return Vec::new(),
    };
    let trade_direction = match lean {
        Outcome::Yes => TradeDirection::BuyYes,
        Outcome::No => TradeDirection::BuyNo,
    };

    let mut out = Vec::new();
    for market_label in snapshot.markets_with_label(label) {
        let market_id = &market_label.market_id;
        let Some(token) = snapshot.outcome_token(market_id, lean) else {
            continue;
        };
        let Some(book) = snapshot.book(&token.id) else {
            continue;
        };
        let Some(ask) = book.best_ask() else {
            continue;
        };
        let edge_pct = Decimal::from_f64(signal.strength * 0.05).unwrap_or_default();
        if edge_pct.is_zero() {
            continue;
        }
        let max_size = helpers::best_ask_notional(book)
            .unwrap_or(helpers::DEFAULT_MAX_SIZE)
            .min(helpers::DEFAULT_MAX_SIZE);
        out.push(helpers::candidate(
            evaluator,
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
            confidence * signal.strength,
            risk_score,
            snapshot.taken_at + chrono::Duration::minutes(10),
            format!("{label} feed leans {}; taking the {lean} side", signal.direction),
        ));
    }
    out
}

/// Rides news-driven moves: trades with the jump on `news_alpha` signals.
pub struct NewsAlpha;

impl Evaluator for NewsAlpha {
    fn name(&self) -> &'static str {
        "news_alpha"
    }

    fn evaluate(&self, snapshot: &Snapshot) -> Vec<Candidate> {
        snapshot
            .signals_of(&SignalType::NewsAlpha)
            .iter()
            .flat_map(|signal| {
                directional_candidates(self.name(), "news", signal, snapshot, true, 0.7, 0.5)
            })
            .collect()
    }
}

/// Fades volatility spikes: trades against the jump on `volatility_spread`
/// signals.
pub struct VolatilityArb;

impl Evaluator for VolatilityArb {
    fn name(&self) -> &'static str {
        "volatility_arb"
    }

    fn evaluate(&self, snapshot: &Snapshot) -> Vec<Candidate> {
        snapshot
            .signals_of(&SignalType::VolatilitySpread)
            .iter()
            .flat_map(|signal| {
                directional_candidates(self.name(), "volatile", signal, snapshot, false, 0.6, 0.6)
            })
            .collect()
    }
}

/// Short-horizon BTC markets driven by the external price and depth feeds.
pub struct BtcShortTerm;

impl Evaluator for BtcShortTerm {
    fn name(&self) -> &'static str {
        "btc_short_term"
    }

    fn evaluate(&self, snapshot: &Snapshot) -> Vec<Candidate> {
        let price_signals = snapshot.signals_of(&SignalType::BtcPriceChange);
        let depth_signals = snapshot.signals_of(&SignalType::BtcDepthImbalance);
        price_signals
            .iter()
            .chain(depth_signals)
            .flat_map(|signal| {
                directional_candidates(self.name(), "btc", signal, snapshot, true, 0.65, 0.55)
            })
            .collect()
    }
}
