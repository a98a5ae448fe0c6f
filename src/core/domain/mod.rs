//! Core domain types.
//!
//! Pure data: no I/O, no persistence concerns. Entity records mirror the
//! persisted schema one to one; derived quantities (mid, spread, edges,
//! weighted entry prices) are computed on access.

mod book;
mod execution;
mod id;
mod journal;
mod market;
mod money;
mod opportunity;
mod position;
mod settings;
mod signal;
mod strategy;
mod sync;

pub use book::{BookSnapshot, LastTrade, MarketDataHealth, PriceLevel};
pub use execution::{
    CheckStatus, ExecutionOrder, ExecutionPlan, Fill, Order, OrderKind, OrderStatus, PlanLeg,
    PlanParams, PlanStatus, PreflightCheck, PreflightResult, TradeDirection, TradeSide,
};
pub use id::{EventId, MarketId, OpportunityId, OrderId, PlanId, SignalId, TokenId};
pub use journal::{DailyStats, JournalEntry, StrategyDailyStats};
pub use market::{Event, EventTag, Market, MarketLabel, MarketSettlement, Outcome, Tag, Token};
pub use money::{clamp01, Price, Quantity, Usd};
pub use opportunity::{Candidate, Opportunity, OpportunityLeg, OpportunityStatus};
pub use position::{
    FailureReason, MarketReview, PnlOutcome, PnlRecord, PortfolioSnapshot, Position,
    PositionStatus, ReviewAction,
};
pub use settings::{feature, is_sensitive_key, SystemSetting, MASK};
pub use signal::{
    Direction, HealthStatus, Signal, SignalBuilder, SignalSource, SignalType, SourceInfo,
    SourceType,
};
pub use strategy::{ExecutionRule, Strategy};
pub use sync::SyncState;
