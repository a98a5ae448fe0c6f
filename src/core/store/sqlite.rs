//! SQLite repository implementation using Diesel.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, PooledConnection};
use rust_decimal::Decimal;

use super::Repository;
use crate::core::db::model::{
    fmt_ts, BookRow, DailyStatsRow, EventRow, EventTagRow, ExecutionRuleRow, FillRow, HealthRow,
    JournalEntryRow, LastTradeRow, MarketLabelRow, MarketReviewRow, MarketRow,
    MarketSettlementRow, NewFillRow, OpportunityRow, OrderRow, PlanRow, PnlRecordRow,
    PortfolioSnapshotRow, PositionRow, SignalRow, SignalSourceRow, StrategyDailyStatsRow,
    StrategyRow, SyncStateRow, SystemSettingRow, TagRow, TokenRow,
};
use crate::core::db::{schema, DbPool};
use crate::core::domain::{
    BookSnapshot, DailyStats, Event, EventId, EventTag, ExecutionPlan, ExecutionRule, Fill,
    JournalEntry, LastTrade, Market, MarketDataHealth, MarketId, MarketLabel, MarketReview,
    MarketSettlement, Opportunity, OpportunityId, OpportunityStatus, Order, OrderStatus, PlanId,
    PlanStatus, PnlRecord, PortfolioSnapshot, Position, Signal, SignalSource, SignalType,
    Strategy, StrategyDailyStats, SyncState, SystemSetting, Tag, Token, TokenId,
};
use crate::error::{Error, Result};

type Conn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// SQLite-backed repository.
pub struct SqliteRepository {
    pool: DbPool,
}

impl SqliteRepository {
    /// Create a new SQLite repository over an existing pool.
    #[must_use]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<Conn> {
        self.pool.get().map_err(|e| Error::Connection(e.to_string()))
    }
}

fn db_err(e: diesel::result::Error) -> Error {
    Error::Database(e.to_string())
}

#[async_trait]
impl Repository for SqliteRepository {
    // -- catalog ----------------------------------------------------------

    async fn upsert_event(&self, event: &Event) -> Result<()> {
        let row = EventRow::from_domain(event, Utc::now());
        let mut conn = self.conn()?;
        diesel::replace_into(schema::events::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn get_event(&self, id: &EventId) -> Result<Option<Event>> {
        let mut conn = self.conn()?;
        let row: Option<EventRow> = schema::events::table
            .find(id.to_string())
            .first(&mut conn)
            .optional()
            .map_err(db_err)?;
        row.map(EventRow::into_domain).transpose()
    }

    async fn list_tradeable_events(&self) -> Result<Vec<Event>> {
        use schema::events::dsl::*;
        let mut conn = self.conn()?;
        let rows: Vec<EventRow> = events
            .filter(active.eq(true))
            .filter(closed.eq(false))
            .load(&mut conn)
            .map_err(db_err)?;
        rows.into_iter().map(EventRow::into_domain).collect()
    }

    async fn upsert_market(&self, market: &Market) -> Result<()> {
        let row = MarketRow::from_domain(market, Utc::now());
        let mut conn = self.conn()?;
        diesel::replace_into(schema::markets::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn get_market(&self, id: &MarketId) -> Result<Option<Market>> {
        let mut conn = self.conn()?;
        let row: Option<MarketRow> = schema::markets::table
            .find(id.to_string())
            .first(&mut conn)
            .optional()
            .map_err(db_err)?;
        row.map(MarketRow::into_domain).transpose()
    }

    async fn list_tradeable_markets(&self) -> Result<Vec<Market>> {
        use schema::markets::dsl::*;
        let mut conn = self.conn()?;
        let rows: Vec<MarketRow> = markets
            .filter(active.eq(true))
            .filter(closed.eq(false))
            .load(&mut conn)
            .map_err(db_err)?;
        rows.into_iter().map(MarketRow::into_domain).collect()
    }

    async fn list_markets_by_event(&self, event: &EventId) -> Result<Vec<Market>> {
        use schema::markets::dsl::*;
        let mut conn = self.conn()?;
        let rows: Vec<MarketRow> = markets
            .filter(event_id.eq(event.to_string()))
            .load(&mut conn)
            .map_err(db_err)?;
        rows.into_iter().map(MarketRow::into_domain).collect()
    }

    async fn upsert_token(&self, token: &Token) -> Result<()> {
        let row = TokenRow::from_domain(token);
        let mut conn = self.conn()?;
        diesel::replace_into(schema::tokens::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn get_token(&self, id: &TokenId) -> Result<Option<Token>> {
        let mut conn = self.conn()?;
        let row: Option<TokenRow> = schema::tokens::table
            .find(id.to_string())
            .first(&mut conn)
            .optional()
            .map_err(db_err)?;
        row.map(TokenRow::into_domain).transpose()
    }

    async fn list_tokens_by_market(&self, market: &MarketId) -> Result<Vec<Token>> {
        use schema::tokens::dsl::*;
        let mut conn = self.conn()?;
        let rows: Vec<TokenRow> = tokens
            .filter(market_id.eq(market.to_string()))
            .load(&mut conn)
            .map_err(db_err)?;
        rows.into_iter().map(TokenRow::into_domain).collect()
    }

    async fn list_tradeable_tokens(&self) -> Result<Vec<Token>> {
        let mut conn = self.conn()?;
        let rows: Vec<TokenRow> = schema::tokens::table
            .inner_join(
                schema::markets::table.on(schema::markets::id.eq(schema::tokens::market_id)),
            )
            .filter(schema::markets::active.eq(true))
            .filter(schema::markets::closed.eq(false))
            .select(TokenRow::as_select())
            .load(&mut conn)
            .map_err(db_err)?;
        rows.into_iter().map(TokenRow::into_domain).collect()
    }

    async fn upsert_tag(&self, tag: &Tag) -> Result<()> {
        let row = TagRow::from_domain(tag);
        let mut conn = self.conn()?;
        diesel::replace_into(schema::tags::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn upsert_event_tag(&self, event_tag: &EventTag) -> Result<()> {
        let row = EventTagRow::from_domain(event_tag);
        let mut conn = self.conn()?;
        diesel::replace_into(schema::event_tags::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn list_tags_for_event(&self, event: &EventId) -> Result<Vec<Tag>> {
        let mut conn = self.conn()?;
        let rows: Vec<TagRow> = schema::tags::table
            .inner_join(schema::event_tags::table.on(schema::event_tags::tag_id.eq(schema::tags::id)))
            .filter(schema::event_tags::event_id.eq(event.to_string()))
            .select(TagRow::as_select())
            .load(&mut conn)
            .map_err(db_err)?;
        Ok(rows.into_iter().map(TagRow::into_domain).collect())
    }

    // -- market data ------------------------------------------------------

    async fn upsert_book(&self, book: &BookSnapshot) -> Result<()> {
        use schema::orderbook_latest::dsl::*;
        let row = BookRow::from_domain(book)?;
        let mut conn = self.conn()?;
        let existing: Option<String> = orderbook_latest
            .find(&row.token_id)
            .select(snapshot_ts)
            .first(&mut conn)
            .optional()
            .map_err(db_err)?;
        if let Some(ts) = existing {
            // Stale snapshots are dropped: the latest row only moves forward.
            if ts >= row.snapshot_ts {
                return Ok(());
            }
        }
        diesel::replace_into(orderbook_latest)
            .values(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn get_book(&self, token: &TokenId) -> Result<Option<BookSnapshot>> {
        let mut conn = self.conn()?;
        let row: Option<BookRow> = schema::orderbook_latest::table
            .find(token.to_string())
            .first(&mut conn)
            .optional()
            .map_err(db_err)?;
        row.map(BookRow::into_domain).transpose()
    }

    async fn list_books(&self) -> Result<Vec<BookSnapshot>> {
        let mut conn = self.conn()?;
        let rows: Vec<BookRow> = schema::orderbook_latest::table
            .load(&mut conn)
            .map_err(db_err)?;
        rows.into_iter().map(BookRow::into_domain).collect()
    }

    async fn upsert_health(&self, health: &MarketDataHealth) -> Result<()> {
        let row = HealthRow::from_domain(health);
        let mut conn = self.conn()?;
        diesel::replace_into(schema::market_data_health::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn get_health(&self, token: &TokenId) -> Result<Option<MarketDataHealth>> {
        let mut conn = self.conn()?;
        let row: Option<HealthRow> = schema::market_data_health::table
            .find(token.to_string())
            .first(&mut conn)
            .optional()
            .map_err(db_err)?;
        row.map(HealthRow::into_domain).transpose()
    }

    async fn list_health(&self) -> Result<Vec<MarketDataHealth>> {
        let mut conn = self.conn()?;
        let rows: Vec<HealthRow> = schema::market_data_health::table
            .load(&mut conn)
            .map_err(db_err)?;
        rows.into_iter().map(HealthRow::into_domain).collect()
    }

    async fn upsert_last_trade(&self, trade: &LastTrade) -> Result<()> {
        let row = LastTradeRow::from_domain(trade);
        let mut conn = self.conn()?;
        diesel::replace_into(schema::last_trade_prices::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn get_last_trade(&self, token: &TokenId) -> Result<Option<LastTrade>> {
        let mut conn = self.conn()?;
        let row: Option<LastTradeRow> = schema::last_trade_prices::table
            .find(token.to_string())
            .first(&mut conn)
            .optional()
            .map_err(db_err)?;
        row.map(LastTradeRow::into_domain).transpose()
    }

    // -- signals ----------------------------------------------------------

    async fn insert_signal(&self, signal: &Signal) -> Result<()> {
        let row = SignalRow::from_domain(signal)?;
        let mut conn = self.conn()?;
        diesel::insert_or_ignore_into(schema::signals::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn list_signals_since(
        &self,
        filter_type: Option<&SignalType>,
        since: DateTime<Utc>,
    ) -> Result<Vec<Signal>> {
        use schema::signals::dsl::*;
        let mut conn = self.conn()?;
        let since_s = fmt_ts(since);
        let rows: Vec<SignalRow> = match filter_type {
            Some(t) => signals
                .filter(created_at.ge(&since_s))
                .filter(signal_type.eq(t.as_str()))
                .order(created_at.asc())
                .load(&mut conn)
                .map_err(db_err)?,
            None => signals
                .filter(created_at.ge(&since_s))
                .order(created_at.asc())
                .load(&mut conn)
                .map_err(db_err)?,
        };
        rows.into_iter().map(SignalRow::into_domain).collect()
    }

    async fn delete_expired_signals(&self, now: DateTime<Utc>) -> Result<usize> {
        use schema::signals::dsl::*;
        let mut conn = self.conn()?;
        let deleted = diesel::delete(signals.filter(expires_at.le(fmt_ts(now))))
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(deleted)
    }

    async fn upsert_signal_source(&self, source: &SignalSource) -> Result<()> {
        let row = SignalSourceRow::from_domain(source);
        let mut conn = self.conn()?;
        diesel::replace_into(schema::signal_sources::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn list_signal_sources(&self) -> Result<Vec<SignalSource>> {
        let mut conn = self.conn()?;
        let rows: Vec<SignalSourceRow> = schema::signal_sources::table
            .load(&mut conn)
            .map_err(db_err)?;
        rows.into_iter().map(SignalSourceRow::into_domain).collect()
    }

    // -- labels -----------------------------------------------------------

    async fn upsert_label(&self, label: &MarketLabel) -> Result<()> {
        let row = MarketLabelRow::from_domain(label);
        let mut conn = self.conn()?;
        diesel::replace_into(schema::market_labels::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn list_labels(&self) -> Result<Vec<MarketLabel>> {
        let mut conn = self.conn()?;
        let rows: Vec<MarketLabelRow> = schema::market_labels::table
            .load(&mut conn)
            .map_err(db_err)?;
        Ok(rows.into_iter().map(MarketLabelRow::into_domain).collect())
    }

    async fn list_labels_for_market(&self, market: &MarketId) -> Result<Vec<MarketLabel>> {
        use schema::market_labels::dsl::*;
        let mut conn = self.conn()?;
        let rows: Vec<MarketLabelRow> = market_labels
            .filter(market_id.eq(market.to_string()))
            .load(&mut conn)
            .map_err(db_err)?;
        Ok(rows.into_iter().map(MarketLabelRow::into_domain).collect())
    }

    async fn list_markets_with_label(&self, wanted: &str) -> Result<Vec<MarketId>> {
        use schema::market_labels::dsl::*;
        let mut conn = self.conn()?;
        let ids: Vec<String> = market_labels
            .filter(label.eq(wanted))
            .select(market_id)
            .load(&mut conn)
            .map_err(db_err)?;
        Ok(ids.into_iter().map(MarketId::from).collect())
    }

    // -- strategies -------------------------------------------------------

    async fn upsert_strategy(&self, strategy: &Strategy) -> Result<()> {
        let row = StrategyRow::from_domain(strategy)?;
        let mut conn = self.conn()?;
        diesel::replace_into(schema::strategies::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn get_strategy(&self, strategy_name: &str) -> Result<Option<Strategy>> {
        let mut conn = self.conn()?;
        let row: Option<StrategyRow> = schema::strategies::table
            .find(strategy_name)
            .first(&mut conn)
            .optional()
            .map_err(db_err)?;
        row.map(StrategyRow::into_domain).transpose()
    }

    async fn list_enabled_strategies(&self) -> Result<Vec<Strategy>> {
        use schema::strategies::dsl::*;
        let mut conn = self.conn()?;
        let rows: Vec<StrategyRow> = strategies
            .filter(enabled.eq(true))
            .order(priority.desc())
            .load(&mut conn)
            .map_err(db_err)?;
        rows.into_iter().map(StrategyRow::into_domain).collect()
    }

    async fn update_strategy_stats(
        &self,
        strategy_name: &str,
        new_stats: &serde_json::Value,
    ) -> Result<()> {
        use schema::strategies::dsl::*;
        let mut conn = self.conn()?;
        let updated = diesel::update(strategies.find(strategy_name))
            .set((
                stats.eq(serde_json::to_string(new_stats)?),
                updated_at.eq(fmt_ts(Utc::now())),
            ))
            .execute(&mut conn)
            .map_err(db_err)?;
        if updated == 0 {
            return Err(Error::NotFound(format!("strategy {strategy_name}")));
        }
        Ok(())
    }

    async fn upsert_execution_rule(&self, rule: &ExecutionRule) -> Result<()> {
        let row = ExecutionRuleRow::from_domain(rule);
        let mut conn = self.conn()?;
        diesel::replace_into(schema::execution_rules::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn get_execution_rule(&self, strategy_name: &str) -> Result<Option<ExecutionRule>> {
        let mut conn = self.conn()?;
        let row: Option<ExecutionRuleRow> = schema::execution_rules::table
            .find(strategy_name)
            .first(&mut conn)
            .optional()
            .map_err(db_err)?;
        row.map(ExecutionRuleRow::into_domain).transpose()
    }

    // -- opportunities ----------------------------------------------------

    async fn insert_opportunity(&self, opportunity: &Opportunity) -> Result<()> {
        let row = OpportunityRow::from_domain(opportunity)?;
        let mut conn = self.conn()?;
        diesel::replace_into(schema::opportunities::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn get_opportunity(&self, opp_id: &OpportunityId) -> Result<Option<Opportunity>> {
        let mut conn = self.conn()?;
        let row: Option<OpportunityRow> = schema::opportunities::table
            .find(opp_id.to_string())
            .first(&mut conn)
            .optional()
            .map_err(db_err)?;
        row.map(OpportunityRow::into_domain).transpose()
    }

    async fn update_opportunity_status(
        &self,
        opp_id: &OpportunityId,
        new_status: OpportunityStatus,
    ) -> Result<()> {
        use schema::opportunities::dsl::*;
        let mut conn = self.conn()?;
        let updated = diesel::update(opportunities.find(opp_id.to_string()))
            .set(status.eq(new_status.as_str()))
            .execute(&mut conn)
            .map_err(db_err)?;
        if updated == 0 {
            return Err(Error::NotFound(format!("opportunity {opp_id}")));
        }
        Ok(())
    }

    async fn list_opportunities_by_status(
        &self,
        wanted: OpportunityStatus,
    ) -> Result<Vec<Opportunity>> {
        use schema::opportunities::dsl::*;
        let mut conn = self.conn()?;
        let rows: Vec<OpportunityRow> = opportunities
            .filter(status.eq(wanted.as_str()))
            .load(&mut conn)
            .map_err(db_err)?;
        rows.into_iter().map(OpportunityRow::into_domain).collect()
    }

    // -- plans ------------------------------------------------------------

    async fn insert_plan(&self, plan: &ExecutionPlan) -> Result<()> {
        let row = PlanRow::from_domain(plan)?;
        let mut conn = self.conn()?;
        diesel::replace_into(schema::execution_plans::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn update_plan(&self, plan: &ExecutionPlan) -> Result<()> {
        let row = PlanRow::from_domain(plan)?;
        let mut conn = self.conn()?;
        let updated = diesel::update(schema::execution_plans::table.find(plan.id.to_string()))
            .set(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        if updated == 0 {
            return Err(Error::NotFound(format!("plan {}", plan.id)));
        }
        Ok(())
    }

    async fn get_plan(&self, plan_id: &PlanId) -> Result<Option<ExecutionPlan>> {
        let mut conn = self.conn()?;
        let row: Option<PlanRow> = schema::execution_plans::table
            .find(plan_id.to_string())
            .first(&mut conn)
            .optional()
            .map_err(db_err)?;
        row.map(PlanRow::into_domain).transpose()
    }

    async fn list_plans_by_status(&self, wanted: PlanStatus) -> Result<Vec<ExecutionPlan>> {
        use schema::execution_plans::dsl::*;
        let mut conn = self.conn()?;
        let rows: Vec<PlanRow> = execution_plans
            .filter(status.eq(wanted.as_str()))
            .load(&mut conn)
            .map_err(db_err)?;
        rows.into_iter().map(PlanRow::into_domain).collect()
    }

    async fn sum_planned_size_since(
        &self,
        strategy_name: &str,
        since: DateTime<Utc>,
    ) -> Result<Decimal> {
        use schema::execution_plans::dsl::*;
        let mut conn = self.conn()?;
        // Decimals are stored as text; sum in Rust rather than SQL.
        let sizes: Vec<String> = execution_plans
            .filter(strategy.eq(strategy_name))
            .filter(created_at.ge(fmt_ts(since)))
            .select(planned_size_usd)
            .load(&mut conn)
            .map_err(db_err)?;
        let mut total = Decimal::ZERO;
        for s in sizes {
            total += s
                .parse::<Decimal>()
                .map_err(|e| Error::Parse(format!("planned_size_usd {s:?}: {e}")))?;
        }
        Ok(total)
    }

    async fn count_plans_since(&self, strategy_name: &str, since: DateTime<Utc>) -> Result<u32> {
        use schema::execution_plans::dsl::*;
        let mut conn = self.conn()?;
        let count: i64 = execution_plans
            .filter(strategy.eq(strategy_name))
            .filter(created_at.ge(fmt_ts(since)))
            .count()
            .get_result(&mut conn)
            .map_err(db_err)?;
        Ok(count.max(0) as u32)
    }

    // -- orders -----------------------------------------------------------

    async fn insert_order(&self, order: &Order) -> Result<()> {
        let row = OrderRow::from_domain(order);
        let mut conn = self.conn()?;
        // client_order_id is unique: a retry that re-inserts the same order
        // is an idempotent no-op.
        diesel::insert_or_ignore_into(schema::orders::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn update_order(&self, order: &Order) -> Result<()> {
        let row = OrderRow::from_domain(order);
        let mut conn = self.conn()?;
        let updated = diesel::update(schema::orders::table.find(order.id.to_string()))
            .set(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        if updated == 0 {
            return Err(Error::NotFound(format!("order {}", order.id)));
        }
        Ok(())
    }

    async fn get_order_by_client_id(&self, client_id: &str) -> Result<Option<Order>> {
        use schema::orders::dsl::*;
        let mut conn = self.conn()?;
        let row: Option<OrderRow> = orders
            .filter(client_order_id.eq(client_id))
            .first(&mut conn)
            .optional()
            .map_err(db_err)?;
        row.map(OrderRow::into_domain).transpose()
    }

    async fn list_orders_by_plan(&self, plan: &PlanId) -> Result<Vec<Order>> {
        use schema::orders::dsl::*;
        let mut conn = self.conn()?;
        let rows: Vec<OrderRow> = orders
            .filter(plan_id.eq(plan.to_string()))
            .load(&mut conn)
            .map_err(db_err)?;
        rows.into_iter().map(OrderRow::into_domain).collect()
    }

    async fn list_orders_by_status(&self, statuses: &[OrderStatus]) -> Result<Vec<Order>> {
        use schema::orders::dsl::*;
        let mut conn = self.conn()?;
        let wanted: Vec<&str> = statuses.iter().map(OrderStatus::as_str).collect();
        let rows: Vec<OrderRow> = orders
            .filter(status.eq_any(wanted))
            .load(&mut conn)
            .map_err(db_err)?;
        rows.into_iter().map(OrderRow::into_domain).collect()
    }

    // -- fills ------------------------------------------------------------

    async fn insert_fill(&self, fill: &Fill) -> Result<()> {
        let row = NewFillRow::from_domain(fill);
        let mut conn = self.conn()?;
        diesel::insert_into(schema::fills::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn list_fills_by_plan(&self, plan: &PlanId) -> Result<Vec<Fill>> {
        use schema::fills::dsl::*;
        let mut conn = self.conn()?;
        let rows: Vec<FillRow> = fills
            .filter(plan_id.eq(plan.to_string()))
            .order(filled_at.asc())
            .load(&mut conn)
            .map_err(db_err)?;
        rows.into_iter().map(FillRow::into_domain).collect()
    }

    // -- positions & pnl --------------------------------------------------

    async fn upsert_position(&self, position: &Position) -> Result<()> {
        let row = PositionRow::from_domain(position);
        let mut conn = self.conn()?;
        diesel::replace_into(schema::positions::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn get_position(&self, token: &TokenId) -> Result<Option<Position>> {
        let mut conn = self.conn()?;
        let row: Option<PositionRow> = schema::positions::table
            .find(token.to_string())
            .first(&mut conn)
            .optional()
            .map_err(db_err)?;
        row.map(PositionRow::into_domain).transpose()
    }

    async fn list_open_positions(&self) -> Result<Vec<Position>> {
        use schema::positions::dsl::*;
        let mut conn = self.conn()?;
        let rows: Vec<PositionRow> = positions
            .filter(status.eq("open"))
            .load(&mut conn)
            .map_err(db_err)?;
        rows.into_iter().map(PositionRow::into_domain).collect()
    }

    async fn insert_portfolio_snapshot(&self, snapshot: &PortfolioSnapshot) -> Result<()> {
        let row = PortfolioSnapshotRow::from_domain(snapshot);
        let mut conn = self.conn()?;
        diesel::insert_or_ignore_into(schema::portfolio_snapshots::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn upsert_pnl_record(&self, record: &PnlRecord) -> Result<()> {
        let row = PnlRecordRow::from_domain(record);
        let mut conn = self.conn()?;
        diesel::replace_into(schema::pnl_records::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn get_pnl_record(&self, plan: &PlanId) -> Result<Option<PnlRecord>> {
        let mut conn = self.conn()?;
        let row: Option<PnlRecordRow> = schema::pnl_records::table
            .find(plan.to_string())
            .first(&mut conn)
            .optional()
            .map_err(db_err)?;
        row.map(PnlRecordRow::into_domain).transpose()
    }

    async fn upsert_settlement(&self, settlement: &MarketSettlement) -> Result<()> {
        let row = MarketSettlementRow::from_domain(settlement)?;
        let mut conn = self.conn()?;
        diesel::replace_into(schema::market_settlements::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn get_settlement(&self, market: &MarketId) -> Result<Option<MarketSettlement>> {
        let mut conn = self.conn()?;
        let row: Option<MarketSettlementRow> = schema::market_settlements::table
            .find(market.to_string())
            .first(&mut conn)
            .optional()
            .map_err(db_err)?;
        row.map(MarketSettlementRow::into_domain).transpose()
    }

    async fn list_settlements(&self) -> Result<Vec<MarketSettlement>> {
        let mut conn = self.conn()?;
        let rows: Vec<MarketSettlementRow> = schema::market_settlements::table
            .load(&mut conn)
            .map_err(db_err)?;
        rows.into_iter()
            .map(MarketSettlementRow::into_domain)
            .collect()
    }

    async fn upsert_review(&self, review: &MarketReview) -> Result<()> {
        let row = MarketReviewRow::from_domain(review)?;
        let mut conn = self.conn()?;
        diesel::replace_into(schema::market_reviews::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn get_review(&self, market: &MarketId) -> Result<Option<MarketReview>> {
        let mut conn = self.conn()?;
        let row: Option<MarketReviewRow> = schema::market_reviews::table
            .find(market.to_string())
            .first(&mut conn)
            .optional()
            .map_err(db_err)?;
        row.map(MarketReviewRow::into_domain).transpose()
    }

    // -- journal & daily stats --------------------------------------------

    async fn upsert_journal_entry(&self, entry: &JournalEntry) -> Result<()> {
        let row = JournalEntryRow::from_domain(entry)?;
        let mut conn = self.conn()?;
        diesel::replace_into(schema::journal_entries::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn get_journal_entry(&self, plan: &PlanId) -> Result<Option<JournalEntry>> {
        let mut conn = self.conn()?;
        let row: Option<JournalEntryRow> = schema::journal_entries::table
            .find(plan.to_string())
            .first(&mut conn)
            .optional()
            .map_err(db_err)?;
        row.map(JournalEntryRow::into_domain).transpose()
    }

    async fn upsert_daily_stats(&self, stats: &DailyStats) -> Result<()> {
        let row = DailyStatsRow::from_domain(stats);
        let mut conn = self.conn()?;
        diesel::replace_into(schema::daily_stats::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn get_daily_stats(&self, date: &str) -> Result<Option<DailyStats>> {
        let mut conn = self.conn()?;
        let row: Option<DailyStatsRow> = schema::daily_stats::table
            .find(date)
            .first(&mut conn)
            .optional()
            .map_err(db_err)?;
        row.map(DailyStatsRow::into_domain).transpose()
    }

    async fn upsert_strategy_daily_stats(&self, stats: &StrategyDailyStats) -> Result<()> {
        let row = StrategyDailyStatsRow::from_domain(stats);
        let mut conn = self.conn()?;
        diesel::replace_into(schema::strategy_daily_stats::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    // -- settings & sync --------------------------------------------------

    async fn upsert_setting(&self, setting: &SystemSetting) -> Result<()> {
        let row = SystemSettingRow::from_domain(setting)?;
        let mut conn = self.conn()?;
        diesel::replace_into(schema::system_settings::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn get_setting(&self, setting_key: &str) -> Result<Option<SystemSetting>> {
        let mut conn = self.conn()?;
        let row: Option<SystemSettingRow> = schema::system_settings::table
            .find(setting_key)
            .first(&mut conn)
            .optional()
            .map_err(db_err)?;
        row.map(SystemSettingRow::into_domain).transpose()
    }

    async fn list_settings(&self) -> Result<Vec<SystemSetting>> {
        let mut conn = self.conn()?;
        let rows: Vec<SystemSettingRow> = schema::system_settings::table
            .load(&mut conn)
            .map_err(db_err)?;
        rows.into_iter().map(SystemSettingRow::into_domain).collect()
    }

    async fn get_sync_state(&self, sync_scope: &str) -> Result<Option<SyncState>> {
        let mut conn = self.conn()?;
        let row: Option<SyncStateRow> = schema::sync_states::table
            .find(sync_scope)
            .first(&mut conn)
            .optional()
            .map_err(db_err)?;
        row.map(SyncStateRow::into_domain).transpose()
    }

    async fn upsert_sync_state(&self, state: &SyncState) -> Result<()> {
        let row = SyncStateRow::from_domain(state)?;
        let mut conn = self.conn()?;
        diesel::replace_into(schema::sync_states::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::{create_pool, run_migrations};
    use crate::core::domain::{Direction, Signal, SignalType, TradeDirection};
    use rust_decimal_macros::dec;

    fn setup() -> SqliteRepository {
        let pool = create_pool(":memory:").expect("pool");
        run_migrations(&pool).expect("migrations");
        SqliteRepository::new(pool)
    }

    fn event(id: &str) -> Event {
        Event {
            id: EventId::from(id),
            slug: format!("{id}-slug"),
            title: "Test event".into(),
            active: true,
            closed: false,
            end_time: None,
            series_id: None,
        }
    }

    fn market(id: &str, event_id: &str) -> Market {
        Market {
            id: MarketId::from(id),
            event_id: EventId::from(event_id),
            slug: format!("{id}-slug"),
            question: "Will it?".into(),
            condition_id: format!("0x{id}"),
            tick_size: dec!(0.01),
            active: true,
            closed: false,
            neg_risk: false,
        }
    }

    #[tokio::test]
    async fn event_upsert_roundtrip() {
        let repo = setup();
        let e = event("e1");
        repo.upsert_event(&e).await.unwrap();
        let loaded = repo.get_event(&e.id).await.unwrap().unwrap();
        assert_eq!(loaded, e);

        // Upsert with same id is idempotent.
        repo.upsert_event(&e).await.unwrap();
        assert_eq!(repo.list_tradeable_events().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn book_upsert_keeps_newest() {
        let repo = setup();
        let now = Utc::now();
        let newer = BookSnapshot::new(
            TokenId::from("t1"),
            now,
            vec![crate::core::domain::PriceLevel::new(dec!(0.40), dec!(10))],
            vec![crate::core::domain::PriceLevel::new(dec!(0.44), dec!(10))],
        );
        let older = BookSnapshot::new(
            TokenId::from("t1"),
            now - chrono::Duration::seconds(30),
            vec![],
            vec![],
        );

        repo.upsert_book(&newer).await.unwrap();
        repo.upsert_book(&older).await.unwrap();

        let stored = repo.get_book(&TokenId::from("t1")).await.unwrap().unwrap();
        assert_eq!(stored.best_bid(), Some(dec!(0.40)));
    }

    #[tokio::test]
    async fn signal_expiry_cleanup() {
        let repo = setup();
        let now = Utc::now();
        let live = Signal::builder(SignalType::LiquidityGap, "internal_scan")
            .direction(Direction::Yes)
            .created_at(now)
            .expires_at(now + chrono::Duration::minutes(10))
            .build();
        let dead = Signal::builder(SignalType::LiquidityGap, "internal_scan")
            .direction(Direction::Yes)
            .created_at(now - chrono::Duration::hours(1))
            .expires_at(now - chrono::Duration::minutes(1))
            .build();
        repo.insert_signal(&live).await.unwrap();
        repo.insert_signal(&dead).await.unwrap();

        assert_eq!(repo.delete_expired_signals(now).await.unwrap(), 1);
        let left = repo
            .list_signals_since(None, now - chrono::Duration::days(1))
            .await
            .unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, live.id);
    }

    #[tokio::test]
    async fn order_insert_is_idempotent_by_client_id() {
        let repo = setup();
        let e = event("e1");
        repo.upsert_event(&e).await.unwrap();
        let m = market("m1", "e1");
        repo.upsert_market(&m).await.unwrap();

        let opp = Opportunity::from_candidate(
            crate::core::domain::Candidate {
                strategy: "arbitrage_sum".into(),
                legs: vec![],
                event_id: None,
                primary_market_id: Some(m.id.clone()),
                edge_pct: dec!(0.1),
                edge_usd: dec!(5),
                max_size: dec!(100),
                confidence: 0.9,
                risk_score: 0.1,
                expires_at: Utc::now() + chrono::Duration::minutes(5),
                data_age_ms: 0,
                signal_ids: vec![],
                reasoning: String::new(),
                warnings: vec![],
            },
            Utc::now(),
        );
        repo.insert_opportunity(&opp).await.unwrap();

        let plan = ExecutionPlan {
            id: PlanId::generate(),
            opportunity_id: opp.id.clone(),
            status: PlanStatus::Draft,
            strategy: "arbitrage_sum".into(),
            planned_size_usd: dec!(50),
            max_loss_usd: dec!(50),
            kelly_fraction: 0.1,
            legs: vec![],
            params: Default::default(),
            preflight_result: None,
            created_at: Utc::now(),
            executed_at: None,
        };
        repo.insert_plan(&plan).await.unwrap();

        let order = Order::new(
            plan.id.clone(),
            TokenId::from("t1"),
            TradeDirection::BuyYes,
            dec!(0.40),
            dec!(50),
        );
        repo.insert_order(&order).await.unwrap();
        repo.insert_order(&order).await.unwrap();

        let orders = repo.list_orders_by_plan(&plan.id).await.unwrap();
        assert_eq!(orders.len(), 1);
        let found = repo
            .get_order_by_client_id(&order.client_order_id)
            .await
            .unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn enabled_strategies_ordered_by_priority() {
        let repo = setup();
        for (name, prio, on) in [("low", 1, true), ("high", 9, true), ("off", 5, false)] {
            let mut s = Strategy::new(name, prio);
            s.enabled = on;
            repo.upsert_strategy(&s).await.unwrap();
        }
        let listed = repo.list_enabled_strategies().await.unwrap();
        let names: Vec<&str> = listed.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["high", "low"]);
    }

    #[tokio::test]
    async fn pnl_record_upsert_uses_renamed_columns() {
        let repo = setup();
        let e = event("e1");
        repo.upsert_event(&e).await.unwrap();

        let opp_id = OpportunityId::generate();
        let opp = Opportunity {
            id: opp_id.clone(),
            strategy: "systematic_no".into(),
            status: OpportunityStatus::Active,
            event_id: None,
            primary_market_id: None,
            edge_pct: dec!(0.1),
            edge_usd: dec!(5),
            max_size: dec!(100),
            confidence: 0.9,
            risk_score: 0.1,
            expires_at: Utc::now(),
            legs: vec![],
            signal_ids: vec![],
            reasoning: String::new(),
            warnings: vec![],
            created_at: Utc::now(),
        };
        repo.insert_opportunity(&opp).await.unwrap();
        let plan = ExecutionPlan {
            id: PlanId::generate(),
            opportunity_id: opp_id,
            status: PlanStatus::Executed,
            strategy: "systematic_no".into(),
            planned_size_usd: dec!(50),
            max_loss_usd: dec!(50),
            kelly_fraction: 0.1,
            legs: vec![],
            params: Default::default(),
            preflight_result: None,
            created_at: Utc::now(),
            executed_at: None,
        };
        repo.insert_plan(&plan).await.unwrap();

        let mut record = PnlRecord::pending(plan.id.clone(), "systematic_no".into(), dec!(0.1));
        record.realized_pnl = Some(dec!(16.35));
        record.realized_roi = Some(0.486);
        repo.upsert_pnl_record(&record).await.unwrap();

        let loaded = repo.get_pnl_record(&plan.id).await.unwrap().unwrap();
        assert_eq!(loaded.realized_pnl, Some(dec!(16.35)));
        assert_eq!(loaded.realized_roi, Some(0.486));
    }
}
