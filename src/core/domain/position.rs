//! Positions, portfolio snapshots, PnL records and post-trade review.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::execution::{Fill, TradeDirection, TradeSide};
use super::id::{MarketId, PlanId, TokenId};
use super::money::{Price, Quantity, Usd};

/// Position lifecycle; closed iff quantity is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Open,
    Closed,
}

impl PositionStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

/// A per-token position derived from fills.
///
/// `quantity` is always non-negative; entries increment it with a
/// size-weighted entry price, exits decrement it and realize PnL.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub token_id: TokenId,
    pub market_id: MarketId,
    pub direction: TradeDirection,
    pub quantity: Quantity,
    pub avg_entry_price: Price,
    pub current_price: Option<Price>,
    pub cost_basis: Usd,
    pub unrealized_pnl: Usd,
    pub realized_pnl: Usd,
    pub status: PositionStatus,
    pub strategy: String,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Position {
    /// Open a new position from the first fill.
    #[must_use]
    pub fn open_from_fill(fill: &Fill, market_id: MarketId, strategy: String) -> Self {
        Self {
            token_id: fill.token_id.clone(),
            market_id,
            direction: fill.direction,
            quantity: fill.filled_size,
            avg_entry_price: fill.avg_price,
            current_price: None,
            cost_basis: fill.filled_size * fill.avg_price,
            unrealized_pnl: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            status: PositionStatus::Open,
            strategy,
            opened_at: fill.filled_at,
            closed_at: None,
        }
    }

    /// Apply a subsequent fill. Buys add quantity at a size-weighted entry
    /// price; sells reduce quantity and realize `(exit − entry) · size`.
    pub fn apply_fill(&mut self, fill: &Fill) {
        match fill.direction.side() {
            TradeSide::Buy => {
                let new_quantity = self.quantity + fill.filled_size;
                if new_quantity > Decimal::ZERO {
                    self.avg_entry_price = (self.avg_entry_price * self.quantity
                        + fill.avg_price * fill.filled_size)
                        / new_quantity;
                }
                self.quantity = new_quantity;
                self.cost_basis = self.quantity * self.avg_entry_price;
            }
            TradeSide::Sell => {
                let closed = fill.filled_size.min(self.quantity);
                self.realized_pnl += (fill.avg_price - self.avg_entry_price) * closed - fill.fee;
                self.quantity -= closed;
                self.cost_basis = self.quantity * self.avg_entry_price;
            }
        }
        if self.quantity.is_zero() {
            self.status = PositionStatus::Closed;
            self.closed_at = Some(fill.filled_at);
            self.unrealized_pnl = Decimal::ZERO;
        }
    }

    /// Refresh mark price and recompute unrealized PnL.
    pub fn mark(&mut self, current_price: Price) {
        self.current_price = Some(current_price);
        if self.status == PositionStatus::Open {
            self.unrealized_pnl = (current_price - self.avg_entry_price) * self.quantity;
        }
    }

    #[must_use]
    pub fn market_value(&self) -> Usd {
        match self.current_price {
            Some(price) => price * self.quantity,
            None => self.cost_basis,
        }
    }
}

/// Point-in-time aggregate over all positions. Append-only.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioSnapshot {
    pub snapshot_at: DateTime<Utc>,
    pub total_cost_basis: Usd,
    pub total_market_value: Usd,
    pub unrealized_pnl: Usd,
    pub realized_pnl: Usd,
    pub net_liquidation: Usd,
}

/// Terminal outcome of a plan's PnL record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PnlOutcome {
    Pending,
    Win,
    Loss,
    Partial,
}

impl PnlOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Win => "win",
            Self::Loss => "loss",
            Self::Partial => "partial",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "win" => Some(Self::Win),
            "loss" => Some(Self::Loss),
            "partial" => Some(Self::Partial),
            _ => None,
        }
    }
}

/// Why a plan failed before or during execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Latency,
    PriceJump,
    RuleMismatch,
}

impl FailureReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Latency => "latency",
            Self::PriceJump => "price_jump",
            Self::RuleMismatch => "rule_mismatch",
        }
    }
}

/// Per-plan profit and loss, upserted across the plan lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub struct PnlRecord {
    pub plan_id: PlanId,
    pub strategy: String,
    pub expected_edge: Decimal,
    pub realized_pnl: Option<Usd>,
    /// Realized return on cost. Float: a statistic.
    pub realized_roi: Option<f64>,
    pub slippage_loss: Option<Usd>,
    pub outcome: PnlOutcome,
    pub failure_reason: Option<String>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl PnlRecord {
    /// A pending record created at planning time.
    #[must_use]
    pub fn pending(plan_id: PlanId, strategy: String, expected_edge: Decimal) -> Self {
        Self {
            plan_id,
            strategy,
            expected_edge,
            realized_pnl: None,
            realized_roi: None,
            slippage_loss: None,
            outcome: PnlOutcome::Pending,
            failure_reason: None,
            settled_at: None,
        }
    }
}

/// What we did about a market, judged after settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewAction {
    Traded,
    Dismissed,
    Expired,
    Missed,
}

impl ReviewAction {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Traded => "traded",
            Self::Dismissed => "dismissed",
            Self::Expired => "expired",
            Self::Missed => "missed",
        }
    }
}

/// Post-settlement review of a market we saw.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketReview {
    pub market_id: MarketId,
    pub our_action: ReviewAction,
    pub hypothetical_pnl: Option<Usd>,
    pub actual_pnl: Option<Usd>,
    pub lesson_tags: Vec<String>,
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fill(direction: TradeDirection, size: Quantity, price: Price) -> Fill {
        Fill {
            plan_id: PlanId::from("p1"),
            token_id: TokenId::from("t1"),
            direction,
            filled_size: size,
            avg_price: price,
            fee: Decimal::ZERO,
            slippage: None,
            filled_at: Utc::now(),
        }
    }

    #[test]
    fn entry_fill_opens_position() {
        let f = fill(TradeDirection::BuyYes, dec!(100), dec!(0.40));
        let pos = Position::open_from_fill(&f, MarketId::from("m1"), "arbitrage_sum".into());
        assert_eq!(pos.quantity, dec!(100));
        assert_eq!(pos.avg_entry_price, dec!(0.40));
        assert_eq!(pos.cost_basis, dec!(40.00));
        assert_eq!(pos.status, PositionStatus::Open);
    }

    #[test]
    fn second_entry_weights_average_price() {
        let f1 = fill(TradeDirection::BuyYes, dec!(100), dec!(0.40));
        let mut pos = Position::open_from_fill(&f1, MarketId::from("m1"), "s".into());
        pos.apply_fill(&fill(TradeDirection::BuyYes, dec!(100), dec!(0.50)));
        assert_eq!(pos.quantity, dec!(200));
        assert_eq!(pos.avg_entry_price, dec!(0.45));
    }

    #[test]
    fn exit_fill_realizes_pnl_and_closes_at_zero() {
        let f1 = fill(TradeDirection::BuyYes, dec!(100), dec!(0.40));
        let mut pos = Position::open_from_fill(&f1, MarketId::from("m1"), "s".into());
        pos.apply_fill(&fill(TradeDirection::SellYes, dec!(100), dec!(0.55)));
        assert_eq!(pos.quantity, Decimal::ZERO);
        assert_eq!(pos.realized_pnl, dec!(15.00));
        assert_eq!(pos.status, PositionStatus::Closed);
        assert!(pos.closed_at.is_some());
    }

    #[test]
    fn quantity_never_goes_negative() {
        let f1 = fill(TradeDirection::BuyYes, dec!(50), dec!(0.40));
        let mut pos = Position::open_from_fill(&f1, MarketId::from("m1"), "s".into());
        pos.apply_fill(&fill(TradeDirection::SellYes, dec!(80), dec!(0.50)));
        assert_eq!(pos.quantity, Decimal::ZERO);
    }

    #[test]
    fn mark_updates_unrealized() {
        let f1 = fill(TradeDirection::BuyYes, dec!(100), dec!(0.40));
        let mut pos = Position::open_from_fill(&f1, MarketId::from("m1"), "s".into());
        pos.mark(dec!(0.46));
        assert_eq!(pos.unrealized_pnl, dec!(6.00));
        assert_eq!(pos.market_value(), dec!(46.00));
    }
}
