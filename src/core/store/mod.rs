//! Persistence layer with pluggable storage backends.
//!
//! [`Repository`] is the contract over the persistent store: it returns
//! domain entities, takes strongly typed parameters and holds no business
//! logic. All pipeline mutations of persisted state go through it.

mod memory;
mod sqlite;

pub use memory::MemoryRepository;
pub use sqlite::SqliteRepository;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::core::domain::{
    BookSnapshot, DailyStats, Event, EventId, EventTag, ExecutionPlan, ExecutionRule, Fill,
    JournalEntry, LastTrade, Market, MarketDataHealth, MarketId, MarketLabel, MarketReview,
    MarketSettlement, Opportunity, OpportunityId, OpportunityStatus, Order, OrderStatus, PlanId,
    PlanStatus, PnlRecord, PortfolioSnapshot, Position, Signal, SignalSource, SignalType,
    Strategy, StrategyDailyStats, SyncState, SystemSetting, Tag, Token, TokenId,
};
use crate::error::Result;

/// Shared repository handle.
pub type SharedRepository = Arc<dyn Repository>;

/// Contract over the persistent store.
///
/// Upserts keyed by natural id treat unique-constraint violations as
/// idempotent success. Queries never return partially parsed rows: a
/// malformed row is a `Parse` error.
#[async_trait]
pub trait Repository: Send + Sync {
    // -- catalog ----------------------------------------------------------

    async fn upsert_event(&self, event: &Event) -> Result<()>;
    async fn get_event(&self, id: &EventId) -> Result<Option<Event>>;
    /// Events with `active && !closed`.
    async fn list_tradeable_events(&self) -> Result<Vec<Event>>;

    async fn upsert_market(&self, market: &Market) -> Result<()>;
    async fn get_market(&self, id: &MarketId) -> Result<Option<Market>>;
    async fn list_tradeable_markets(&self) -> Result<Vec<Market>>;
    async fn list_markets_by_event(&self, event_id: &EventId) -> Result<Vec<Market>>;

    async fn upsert_token(&self, token: &Token) -> Result<()>;
    async fn get_token(&self, id: &TokenId) -> Result<Option<Token>>;
    async fn list_tokens_by_market(&self, market_id: &MarketId) -> Result<Vec<Token>>;
    /// All tokens of tradeable markets.
    async fn list_tradeable_tokens(&self) -> Result<Vec<Token>>;

    async fn upsert_tag(&self, tag: &Tag) -> Result<()>;
    async fn upsert_event_tag(&self, event_tag: &EventTag) -> Result<()>;
    async fn list_tags_for_event(&self, event_id: &EventId) -> Result<Vec<Tag>>;

    // -- market data ------------------------------------------------------

    /// Update the latest book only if `snapshot_ts` is newer than the
    /// stored row.
    async fn upsert_book(&self, book: &BookSnapshot) -> Result<()>;
    async fn get_book(&self, token_id: &TokenId) -> Result<Option<BookSnapshot>>;
    async fn list_books(&self) -> Result<Vec<BookSnapshot>>;

    async fn upsert_health(&self, health: &MarketDataHealth) -> Result<()>;
    async fn get_health(&self, token_id: &TokenId) -> Result<Option<MarketDataHealth>>;
    async fn list_health(&self) -> Result<Vec<MarketDataHealth>>;

    async fn upsert_last_trade(&self, trade: &LastTrade) -> Result<()>;
    async fn get_last_trade(&self, token_id: &TokenId) -> Result<Option<LastTrade>>;

    // -- signals ----------------------------------------------------------

    async fn insert_signal(&self, signal: &Signal) -> Result<()>;
    /// Signals of `signal_type` (all types when `None`) created at or after
    /// `since`, oldest first.
    async fn list_signals_since(
        &self,
        signal_type: Option<&SignalType>,
        since: DateTime<Utc>,
    ) -> Result<Vec<Signal>>;
    /// Drop signals whose `expires_at` is past; returns the count removed.
    async fn delete_expired_signals(&self, now: DateTime<Utc>) -> Result<usize>;

    async fn upsert_signal_source(&self, source: &SignalSource) -> Result<()>;
    async fn list_signal_sources(&self) -> Result<Vec<SignalSource>>;

    // -- labels -----------------------------------------------------------

    async fn upsert_label(&self, label: &MarketLabel) -> Result<()>;
    async fn list_labels(&self) -> Result<Vec<MarketLabel>>;
    async fn list_labels_for_market(&self, market_id: &MarketId) -> Result<Vec<MarketLabel>>;
    async fn list_markets_with_label(&self, label: &str) -> Result<Vec<MarketId>>;

    // -- strategies -------------------------------------------------------

    async fn upsert_strategy(&self, strategy: &Strategy) -> Result<()>;
    async fn get_strategy(&self, name: &str) -> Result<Option<Strategy>>;
    /// Enabled strategies ordered by priority descending.
    async fn list_enabled_strategies(&self) -> Result<Vec<Strategy>>;
    async fn update_strategy_stats(&self, name: &str, stats: &serde_json::Value) -> Result<()>;

    async fn upsert_execution_rule(&self, rule: &ExecutionRule) -> Result<()>;
    async fn get_execution_rule(&self, strategy: &str) -> Result<Option<ExecutionRule>>;

    // -- opportunities ----------------------------------------------------

    async fn insert_opportunity(&self, opportunity: &Opportunity) -> Result<()>;
    async fn get_opportunity(&self, id: &OpportunityId) -> Result<Option<Opportunity>>;
    async fn update_opportunity_status(
        &self,
        id: &OpportunityId,
        status: OpportunityStatus,
    ) -> Result<()>;
    async fn list_opportunities_by_status(
        &self,
        status: OpportunityStatus,
    ) -> Result<Vec<Opportunity>>;

    // -- plans ------------------------------------------------------------

    async fn insert_plan(&self, plan: &ExecutionPlan) -> Result<()>;
    async fn update_plan(&self, plan: &ExecutionPlan) -> Result<()>;
    async fn get_plan(&self, id: &PlanId) -> Result<Option<ExecutionPlan>>;
    async fn list_plans_by_status(&self, status: PlanStatus) -> Result<Vec<ExecutionPlan>>;
    /// Sum of `planned_size_usd` over the strategy's plans created at or
    /// after `since` (feeds the capital-limit preflight check).
    async fn sum_planned_size_since(
        &self,
        strategy: &str,
        since: DateTime<Utc>,
    ) -> Result<Decimal>;
    /// Count of the strategy's plans created at or after `since`.
    async fn count_plans_since(&self, strategy: &str, since: DateTime<Utc>) -> Result<u32>;

    // -- orders -----------------------------------------------------------

    async fn insert_order(&self, order: &Order) -> Result<()>;
    async fn update_order(&self, order: &Order) -> Result<()>;
    async fn get_order_by_client_id(&self, client_order_id: &str) -> Result<Option<Order>>;
    async fn list_orders_by_plan(&self, plan_id: &PlanId) -> Result<Vec<Order>>;
    async fn list_orders_by_status(&self, statuses: &[OrderStatus]) -> Result<Vec<Order>>;

    // -- fills ------------------------------------------------------------

    async fn insert_fill(&self, fill: &Fill) -> Result<()>;
    /// Fills for a plan in `filled_at` order.
    async fn list_fills_by_plan(&self, plan_id: &PlanId) -> Result<Vec<Fill>>;

    // -- positions & pnl --------------------------------------------------

    async fn upsert_position(&self, position: &Position) -> Result<()>;
    async fn get_position(&self, token_id: &TokenId) -> Result<Option<Position>>;
    async fn list_open_positions(&self) -> Result<Vec<Position>>;

    async fn insert_portfolio_snapshot(&self, snapshot: &PortfolioSnapshot) -> Result<()>;

    async fn upsert_pnl_record(&self, record: &PnlRecord) -> Result<()>;
    async fn get_pnl_record(&self, plan_id: &PlanId) -> Result<Option<PnlRecord>>;

    async fn upsert_settlement(&self, settlement: &MarketSettlement) -> Result<()>;
    async fn get_settlement(&self, market_id: &MarketId) -> Result<Option<MarketSettlement>>;
    async fn list_settlements(&self) -> Result<Vec<MarketSettlement>>;

    async fn upsert_review(&self, review: &MarketReview) -> Result<()>;
    async fn get_review(&self, market_id: &MarketId) -> Result<Option<MarketReview>>;

    // -- journal & daily stats --------------------------------------------

    async fn upsert_journal_entry(&self, entry: &JournalEntry) -> Result<()>;
    async fn get_journal_entry(&self, plan_id: &PlanId) -> Result<Option<JournalEntry>>;

    async fn upsert_daily_stats(&self, stats: &DailyStats) -> Result<()>;
    async fn get_daily_stats(&self, date: &str) -> Result<Option<DailyStats>>;
    async fn upsert_strategy_daily_stats(&self, stats: &StrategyDailyStats) -> Result<()>;

    // -- settings & sync --------------------------------------------------

    async fn upsert_setting(&self, setting: &SystemSetting) -> Result<()>;
    async fn get_setting(&self, key: &str) -> Result<Option<SystemSetting>>;
    async fn list_settings(&self) -> Result<Vec<SystemSetting>>;

    async fn get_sync_state(&self, scope: &str) -> Result<Option<SyncState>>;
    async fn upsert_sync_state(&self, state: &SyncState) -> Result<()>;
}
