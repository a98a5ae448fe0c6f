//! Execution plans, orders and fills.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{MarketId, OpportunityId, OrderId, PlanId, TokenId};
use super::market::Outcome;
use super::money::{Price, Quantity, Usd};

/// Exchange-level order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

/// Outcome-aware trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeDirection {
    BuyYes,
    BuyNo,
    SellYes,
    SellNo,
}

impl TradeDirection {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BuyYes => "BUY_YES",
            Self::BuyNo => "BUY_NO",
            Self::SellYes => "SELL_YES",
            Self::SellNo => "SELL_NO",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BUY_YES" => Some(Self::BuyYes),
            "BUY_NO" => Some(Self::BuyNo),
            "SELL_YES" => Some(Self::SellYes),
            "SELL_NO" => Some(Self::SellNo),
            _ => None,
        }
    }

    #[must_use]
    pub fn side(&self) -> TradeSide {
        match self {
            Self::BuyYes | Self::BuyNo => TradeSide::Buy,
            Self::SellYes | Self::SellNo => TradeSide::Sell,
        }
    }

    /// The outcome this direction profits from at settlement.
    #[must_use]
    pub fn outcome(&self) -> Outcome {
        match self {
            Self::BuyYes | Self::SellNo => Outcome::Yes,
            Self::BuyNo | Self::SellYes => Outcome::No,
        }
    }

    /// `+1` for entries (buys), `-1` for exits (sells).
    #[must_use]
    pub fn quantity_sign(&self) -> i64 {
        match self.side() {
            TradeSide::Buy => 1,
            TradeSide::Sell => -1,
        }
    }
}

impl std::fmt::Display for TradeDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of an execution plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Draft,
    PreflightPass,
    PreflightFail,
    Executing,
    Partial,
    Executed,
    Cancelled,
    Failed,
}

impl PlanStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::PreflightPass => "preflight_pass",
            Self::PreflightFail => "preflight_fail",
            Self::Executing => "executing",
            Self::Partial => "partial",
            Self::Executed => "executed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "preflight_pass" => Some(Self::PreflightPass),
            "preflight_fail" => Some(Self::PreflightFail),
            "executing" => Some(Self::Executing),
            "partial" => Some(Self::Partial),
            "executed" => Some(Self::Executed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether the documented state machine permits `self → next`.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::PreflightPass)
                | (Self::Draft, Self::PreflightFail)
                | (Self::PreflightPass, Self::Executing)
                | (Self::Executing, Self::Partial)
                | (Self::Executing, Self::Executed)
                | (Self::Executing, Self::Cancelled)
                | (Self::Executing, Self::Failed)
                | (Self::Partial, Self::Executed)
                | (Self::Partial, Self::Cancelled)
                | (Self::Partial, Self::Failed)
        )
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::PreflightFail | Self::Executed | Self::Cancelled | Self::Failed
        )
    }
}

/// A plan leg: an opportunity leg annotated with its slice of the planned
/// size and a submission priority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanLeg {
    pub market_id: MarketId,
    pub token_id: TokenId,
    pub direction: TradeDirection,
    pub target_price: Price,
    pub size_usd: Usd,
    pub priority: u32,
}

/// Execution knobs attached to a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanParams {
    pub slippage_tolerance: Decimal,
    pub execution_order: ExecutionOrder,
    pub limit_vs_market: OrderKind,
    pub time_limit_seconds: u64,
}

impl Default for PlanParams {
    fn default() -> Self {
        Self {
            slippage_tolerance: Decimal::new(2, 2), // 0.02
            execution_order: ExecutionOrder::Sequential,
            limit_vs_market: OrderKind::Limit,
            time_limit_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionOrder {
    Sequential,
    Parallel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Limit,
    Market,
}

/// Result of a single preflight check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreflightCheck {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
    pub required: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// Ordered preflight outcome; `passed` holds iff every required check passed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreflightResult {
    pub passed: bool,
    pub checks: Vec<PreflightCheck>,
}

impl PreflightResult {
    #[must_use]
    pub fn from_checks(checks: Vec<PreflightCheck>) -> Self {
        let passed = checks
            .iter()
            .filter(|c| c.required)
            .all(|c| c.status == CheckStatus::Pass);
        Self { passed, checks }
    }

    /// The first failed required check, if any.
    #[must_use]
    pub fn first_failure(&self) -> Option<&PreflightCheck> {
        self.checks
            .iter()
            .find(|c| c.required && c.status == CheckStatus::Fail)
    }
}

/// A multi-leg execution plan, one-to-one with its opportunity.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub id: PlanId,
    pub opportunity_id: OpportunityId,
    pub status: PlanStatus,
    pub strategy: String,
    pub planned_size_usd: Usd,
    pub max_loss_usd: Usd,
    /// Kelly fraction used for sizing. Float: a statistic.
    pub kelly_fraction: f64,
    pub legs: Vec<PlanLeg>,
    pub params: PlanParams,
    pub preflight_result: Option<PreflightResult>,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
}

/// Lifecycle of an order. Monotone along the documented DAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    New,
    Submitted,
    Open,
    Partial,
    Filled,
    Cancelled,
    Failed,
}

impl OrderStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Submitted => "submitted",
            Self::Open => "open",
            Self::Partial => "partial",
            Self::Filled => "filled",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Self::New),
            "submitted" => Some(Self::Submitted),
            "open" | "live" => Some(Self::Open),
            "partial" | "partially_filled" => Some(Self::Partial),
            "filled" | "matched" | "complete" => Some(Self::Filled),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            "failed" | "rejected" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Rank along the DAG; transitions never decrease it.
    #[must_use]
    fn rank(&self) -> u8 {
        match self {
            Self::New => 0,
            Self::Submitted => 1,
            Self::Open => 2,
            Self::Partial => 3,
            Self::Filled | Self::Cancelled | Self::Failed => 4,
        }
    }

    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        next.rank() > self.rank() || (self == &Self::Partial && next == Self::Partial)
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Failed)
    }

    /// Orders in these states are polled against the exchange.
    #[must_use]
    pub fn is_pollable(&self) -> bool {
        matches!(self, Self::Submitted | Self::Open | Self::Partial)
    }
}

/// An order placed (or about to be placed) on the exchange.
///
/// `client_order_id` is generated and persisted before the network call;
/// retries deduplicate off it. `external_order_id` is assigned by the
/// exchange on acceptance.
#[derive(Debug, Clone)]
pub struct Order {
    pub id: OrderId,
    pub plan_id: PlanId,
    pub token_id: TokenId,
    pub side: TradeSide,
    pub direction: TradeDirection,
    pub price: Price,
    pub size_usd: Usd,
    pub status: OrderStatus,
    pub external_order_id: Option<String>,
    pub client_order_id: String,
    pub submitted_at: Option<DateTime<Utc>>,
    pub filled_usd: Usd,
    pub avg_price: Option<Price>,
    pub fee: Usd,
    pub failure_reason: Option<String>,
}

impl Order {
    /// A fresh order in `new` state with a generated client order id.
    #[must_use]
    pub fn new(
        plan_id: PlanId,
        token_id: TokenId,
        direction: TradeDirection,
        price: Price,
        size_usd: Usd,
    ) -> Self {
        Self {
            id: OrderId::generate(),
            plan_id,
            token_id,
            side: direction.side(),
            direction,
            price,
            size_usd,
            status: OrderStatus::New,
            external_order_id: None,
            client_order_id: uuid::Uuid::new_v4().to_string(),
            submitted_at: None,
            filled_usd: Decimal::ZERO,
            avg_price: None,
            fee: Decimal::ZERO,
            failure_reason: None,
        }
    }
}

/// An append-only fill record.
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub plan_id: PlanId,
    pub token_id: TokenId,
    pub direction: TradeDirection,
    pub filled_size: Quantity,
    pub avg_price: Price,
    pub fee: Usd,
    pub slippage: Option<Usd>,
    pub filled_at: DateTime<Utc>,
}
