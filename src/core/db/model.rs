//! Database row types and their domain conversions.
//!
//! Rows are flat text/number mirrors of the domain entities. Conversion
//! helpers keep the parse/format rules (RFC3339 timestamps, decimal text)
//! in one place; a malformed row surfaces as [`Error::Parse`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use rust_decimal::Decimal;

use super::schema::{
    daily_stats, event_tags, events, execution_plans, execution_rules, fills, journal_entries,
    last_trade_prices, market_data_health, market_labels, market_reviews, market_settlements,
    markets, opportunities, orderbook_latest, orders, pnl_records, portfolio_snapshots, positions,
    signal_sources, signals, strategies, strategy_daily_stats, sync_states, system_settings, tags,
    tokens,
};
use crate::core::domain::{
    BookSnapshot, DailyStats, Direction, Event, EventId, EventTag, ExecutionPlan, ExecutionRule,
    Fill, HealthStatus, JournalEntry, LastTrade, Market, MarketDataHealth, MarketId, MarketLabel,
    MarketReview, MarketSettlement, Opportunity, OpportunityId, OpportunityStatus, Order, OrderId,
    OrderStatus, Outcome, PlanId, PlanStatus, PnlOutcome, PnlRecord, PortfolioSnapshot, Position,
    PositionStatus, PriceLevel, ReviewAction, Signal, SignalId, SignalSource, SignalType,
    SourceType, Strategy, StrategyDailyStats, SyncState, SystemSetting, Tag, Token, TokenId,
    TradeDirection, TradeSide,
};
use crate::error::{Error, Result};

pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

pub(crate) fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Parse(format!("timestamp {s:?}: {e}")))
}

pub(crate) fn parse_ts_opt(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    s.map(parse_ts).transpose()
}

pub(crate) fn fmt_dec(d: Decimal) -> String {
    d.to_string()
}

pub(crate) fn parse_dec(s: &str) -> Result<Decimal> {
    s.parse()
        .map_err(|e| Error::Parse(format!("decimal {s:?}: {e}")))
}

pub(crate) fn parse_dec_opt(s: Option<&str>) -> Result<Option<Decimal>> {
    s.map(parse_dec).transpose()
}

fn parse_json(s: &str) -> Result<serde_json::Value> {
    serde_json::from_str(s).map_err(|e| Error::Parse(format!("json: {e}")))
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = events)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct EventRow {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub active: bool,
    pub closed: bool,
    pub end_time: Option<String>,
    pub series_id: Option<String>,
    pub updated_at: String,
}

impl EventRow {
    pub fn from_domain(event: &Event, now: DateTime<Utc>) -> Self {
        Self {
            id: event.id.to_string(),
            slug: event.slug.clone(),
            title: event.title.clone(),
            active: event.active,
            closed: event.closed,
            end_time: event.end_time.map(fmt_ts),
            series_id: event.series_id.clone(),
            updated_at: fmt_ts(now),
        }
    }

    pub fn into_domain(self) -> Result<Event> {
        Ok(Event {
            id: EventId::from(self.id),
            slug: self.slug,
            title: self.title,
            active: self.active,
            closed: self.closed,
            end_time: parse_ts_opt(self.end_time.as_deref())?,
            series_id: self.series_id,
        })
    }
}

#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = markets)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct MarketRow {
    pub id: String,
    pub event_id: String,
    pub slug: String,
    pub question: String,
    pub condition_id: String,
    pub tick_size: String,
    pub active: bool,
    pub closed: bool,
    pub neg_risk: bool,
    pub updated_at: String,
}

impl MarketRow {
    pub fn from_domain(market: &Market, now: DateTime<Utc>) -> Self {
        Self {
            id: market.id.to_string(),
            event_id: market.event_id.to_string(),
            slug: market.slug.clone(),
            question: market.question.clone(),
            condition_id: market.condition_id.clone(),
            tick_size: fmt_dec(market.tick_size),
            active: market.active,
            closed: market.closed,
            neg_risk: market.neg_risk,
            updated_at: fmt_ts(now),
        }
    }

    pub fn into_domain(self) -> Result<Market> {
        Ok(Market {
            id: MarketId::from(self.id),
            event_id: EventId::from(self.event_id),
            slug: self.slug,
            question: self.question,
            condition_id: self.condition_id,
            tick_size: parse_dec(&self.tick_size)?,
            active: self.active,
            closed: self.closed,
            neg_risk: self.neg_risk,
        })
    }
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = tokens)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TokenRow {
    pub id: String,
    pub market_id: String,
    pub outcome: String,
}

impl TokenRow {
    pub fn from_domain(token: &Token) -> Self {
        Self {
            id: token.id.to_string(),
            market_id: token.market_id.to_string(),
            outcome: token.outcome.as_str().to_string(),
        }
    }

    pub fn into_domain(self) -> Result<Token> {
        let outcome = Outcome::parse(&self.outcome)
            .ok_or_else(|| Error::Parse(format!("outcome {:?}", self.outcome)))?;
        Ok(Token {
            id: TokenId::from(self.id),
            market_id: MarketId::from(self.market_id),
            outcome,
        })
    }
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = tags)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TagRow {
    pub id: String,
    pub label: String,
    pub slug: String,
}

impl TagRow {
    pub fn from_domain(tag: &Tag) -> Self {
        Self {
            id: tag.id.clone(),
            label: tag.label.clone(),
            slug: tag.slug.clone(),
        }
    }

    pub fn into_domain(self) -> Tag {
        Tag {
            id: self.id,
            label: self.label,
            slug: self.slug,
        }
    }
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = event_tags)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct EventTagRow {
    pub event_id: String,
    pub tag_id: String,
}

impl EventTagRow {
    pub fn from_domain(et: &EventTag) -> Self {
        Self {
            event_id: et.event_id.to_string(),
            tag_id: et.tag_id.clone(),
        }
    }

    pub fn into_domain(self) -> EventTag {
        EventTag {
            event_id: EventId::from(self.event_id),
            tag_id: self.tag_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = orderbook_latest)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct BookRow {
    pub token_id: String,
    pub snapshot_ts: String,
    pub best_bid: Option<String>,
    pub best_ask: Option<String>,
    pub mid: Option<String>,
    pub bids: String,
    pub asks: String,
}

impl BookRow {
    pub fn from_domain(book: &BookSnapshot) -> Result<Self> {
        Ok(Self {
            token_id: book.token_id.to_string(),
            snapshot_ts: fmt_ts(book.snapshot_ts),
            best_bid: book.best_bid().map(fmt_dec),
            best_ask: book.best_ask().map(fmt_dec),
            mid: book.mid().map(fmt_dec),
            bids: serde_json::to_string(&book.bids)?,
            asks: serde_json::to_string(&book.asks)?,
        })
    }

    pub fn into_domain(self) -> Result<BookSnapshot> {
        let bids: Vec<PriceLevel> = serde_json::from_str(&self.bids)?;
        let asks: Vec<PriceLevel> = serde_json::from_str(&self.asks)?;
        Ok(BookSnapshot::new(
            TokenId::from(self.token_id),
            parse_ts(&self.snapshot_ts)?,
            bids,
            asks,
        ))
    }
}

#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = market_data_health)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct HealthRow {
    pub token_id: String,
    pub last_ws_ts: Option<String>,
    pub last_rest_ts: Option<String>,
    pub spread_bps: Option<f64>,
    pub price_jump_bps: Option<f64>,
    pub last_book_change_ts: Option<String>,
    pub stale: bool,
}

impl HealthRow {
    pub fn from_domain(health: &MarketDataHealth) -> Self {
        Self {
            token_id: health.token_id.to_string(),
            last_ws_ts: health.last_ws_ts.map(fmt_ts),
            last_rest_ts: health.last_rest_ts.map(fmt_ts),
            spread_bps: health.spread_bps,
            price_jump_bps: health.price_jump_bps,
            last_book_change_ts: health.last_book_change_ts.map(fmt_ts),
            stale: health.stale,
        }
    }

    pub fn into_domain(self) -> Result<MarketDataHealth> {
        Ok(MarketDataHealth {
            token_id: TokenId::from(self.token_id),
            last_ws_ts: parse_ts_opt(self.last_ws_ts.as_deref())?,
            last_rest_ts: parse_ts_opt(self.last_rest_ts.as_deref())?,
            spread_bps: self.spread_bps,
            price_jump_bps: self.price_jump_bps,
            last_book_change_ts: parse_ts_opt(self.last_book_change_ts.as_deref())?,
            stale: self.stale,
        })
    }
}

#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = last_trade_prices)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct LastTradeRow {
    pub token_id: String,
    pub price: String,
    pub trade_ts: String,
}

impl LastTradeRow {
    pub fn from_domain(trade: &LastTrade) -> Self {
        Self {
            token_id: trade.token_id.to_string(),
            price: fmt_dec(trade.price),
            trade_ts: fmt_ts(trade.trade_ts),
        }
    }

    pub fn into_domain(self) -> Result<LastTrade> {
        Ok(LastTrade {
            token_id: TokenId::from(self.token_id),
            price: parse_dec(&self.price)?,
            trade_ts: parse_ts(&self.trade_ts)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = signals)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SignalRow {
    pub id: String,
    pub signal_type: String,
    pub source: String,
    pub event_id: Option<String>,
    pub market_id: Option<String>,
    pub token_id: Option<String>,
    pub strength: f64,
    pub direction: String,
    pub payload: String,
    pub expires_at: String,
    pub created_at: String,
}

impl SignalRow {
    /// Signals reach the store post-normalization, so both timestamps are
    /// guaranteed present.
    pub fn from_domain(signal: &Signal) -> Result<Self> {
        let created_at = signal
            .created_at
            .ok_or_else(|| Error::Internal("unnormalized signal: missing created_at".into()))?;
        let expires_at = signal
            .expires_at
            .ok_or_else(|| Error::Internal("unnormalized signal: missing expires_at".into()))?;
        Ok(Self {
            id: signal.id.to_string(),
            signal_type: signal.signal_type.as_str().to_string(),
            source: signal.source.clone(),
            event_id: signal.event_id.as_ref().map(ToString::to_string),
            market_id: signal.market_id.as_ref().map(ToString::to_string),
            token_id: signal.token_id.as_ref().map(ToString::to_string),
            strength: signal.strength,
            direction: signal.direction.as_str().to_string(),
            payload: serde_json::to_string(&signal.payload)?,
            expires_at: fmt_ts(expires_at),
            created_at: fmt_ts(created_at),
        })
    }

    pub fn into_domain(self) -> Result<Signal> {
        let direction = Direction::parse(&self.direction)
            .ok_or_else(|| Error::Parse(format!("direction {:?}", self.direction)))?;
        Ok(Signal {
            id: SignalId::from(self.id),
            signal_type: SignalType::from(self.signal_type),
            source: self.source,
            event_id: self.event_id.map(EventId::from),
            market_id: self.market_id.map(MarketId::from),
            token_id: self.token_id.map(TokenId::from),
            strength: self.strength,
            direction,
            payload: parse_json(&self.payload)?,
            expires_at: Some(parse_ts(&self.expires_at)?),
            created_at: Some(parse_ts(&self.created_at)?),
        })
    }
}

#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = signal_sources)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SignalSourceRow {
    pub name: String,
    pub source_type: String,
    pub endpoint: String,
    pub poll_interval_secs: i64,
    pub enabled: bool,
    pub health_status: String,
    pub last_poll_at: Option<String>,
    pub last_error: Option<String>,
}

impl SignalSourceRow {
    pub fn from_domain(source: &SignalSource) -> Self {
        Self {
            name: source.name.clone(),
            source_type: source.source_type.as_str().to_string(),
            endpoint: source.endpoint.clone(),
            poll_interval_secs: source.poll_interval.as_secs() as i64,
            enabled: source.enabled,
            health_status: source.health_status.as_str().to_string(),
            last_poll_at: source.last_poll_at.map(fmt_ts),
            last_error: source.last_error.clone(),
        }
    }

    pub fn into_domain(self) -> Result<SignalSource> {
        let source_type = match self.source_type.as_str() {
            "internal" => SourceType::Internal,
            "rest" => SourceType::Rest,
            "websocket" => SourceType::Websocket,
            "aggregate" => SourceType::Aggregate,
            other => return Err(Error::Parse(format!("source_type {other:?}"))),
        };
        let health_status = match self.health_status.as_str() {
            "healthy" => HealthStatus::Healthy,
            "degraded" => HealthStatus::Degraded,
            "down" => HealthStatus::Down,
            _ => HealthStatus::Unknown,
        };
        Ok(SignalSource {
            name: self.name,
            source_type,
            endpoint: self.endpoint,
            poll_interval: Duration::from_secs(self.poll_interval_secs.max(0) as u64),
            enabled: self.enabled,
            health_status,
            last_poll_at: parse_ts_opt(self.last_poll_at.as_deref())?,
            last_error: self.last_error,
        })
    }
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = market_labels)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct MarketLabelRow {
    pub market_id: String,
    pub label: String,
    pub sub_label: Option<String>,
    pub auto_labeled: bool,
    pub confidence: f64,
}

impl MarketLabelRow {
    pub fn from_domain(label: &MarketLabel) -> Self {
        Self {
            market_id: label.market_id.to_string(),
            label: label.label.clone(),
            sub_label: label.sub_label.clone(),
            auto_labeled: label.auto_labeled,
            confidence: label.confidence,
        }
    }

    pub fn into_domain(self) -> MarketLabel {
        MarketLabel {
            market_id: MarketId::from(self.market_id),
            label: self.label,
            sub_label: self.sub_label,
            auto_labeled: self.auto_labeled,
            confidence: self.confidence,
        }
    }
}

// ---------------------------------------------------------------------------
// Strategies and opportunities
// ---------------------------------------------------------------------------

#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = strategies)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct StrategyRow {
    pub name: String,
    pub enabled: bool,
    pub priority: i32,
    pub params: String,
    pub required_signals: String,
    pub stats: String,
    pub updated_at: String,
}

impl StrategyRow {
    pub fn from_domain(strategy: &Strategy) -> Result<Self> {
        Ok(Self {
            name: strategy.name.clone(),
            enabled: strategy.enabled,
            priority: strategy.priority,
            params: serde_json::to_string(&strategy.params)?,
            required_signals: serde_json::to_string(&strategy.required_signals)?,
            stats: serde_json::to_string(&strategy.stats)?,
            updated_at: fmt_ts(strategy.updated_at),
        })
    }

    pub fn into_domain(self) -> Result<Strategy> {
        Ok(Strategy {
            name: self.name,
            enabled: self.enabled,
            priority: self.priority,
            params: parse_json(&self.params)?,
            required_signals: serde_json::from_str(&self.required_signals)?,
            stats: parse_json(&self.stats)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = opportunities)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct OpportunityRow {
    pub id: String,
    pub strategy: String,
    pub status: String,
    pub event_id: Option<String>,
    pub primary_market_id: Option<String>,
    pub edge_pct: String,
    pub edge_usd: String,
    pub max_size: String,
    pub confidence: f64,
    pub risk_score: f64,
    pub expires_at: String,
    pub legs: String,
    pub signal_ids: String,
    pub reasoning: String,
    pub warnings: String,
    pub created_at: String,
}

impl OpportunityRow {
    pub fn from_domain(opp: &Opportunity) -> Result<Self> {
        Ok(Self {
            id: opp.id.to_string(),
            strategy: opp.strategy.clone(),
            status: opp.status.as_str().to_string(),
            event_id: opp.event_id.as_ref().map(ToString::to_string),
            primary_market_id: opp.primary_market_id.as_ref().map(ToString::to_string),
            edge_pct: fmt_dec(opp.edge_pct),
            edge_usd: fmt_dec(opp.edge_usd),
            max_size: fmt_dec(opp.max_size),
            confidence: opp.confidence,
            risk_score: opp.risk_score,
            expires_at: fmt_ts(opp.expires_at),
            legs: serde_json::to_string(&opp.legs)?,
            signal_ids: serde_json::to_string(&opp.signal_ids)?,
            reasoning: opp.reasoning.clone(),
            warnings: serde_json::to_string(&opp.warnings)?,
            created_at: fmt_ts(opp.created_at),
        })
    }

    pub fn into_domain(self) -> Result<Opportunity> {
        let status = OpportunityStatus::parse(&self.status)
            .ok_or_else(|| Error::Parse(format!("opportunity status {:?}", self.status)))?;
        Ok(Opportunity {
            id: OpportunityId::from(self.id),
            strategy: self.strategy,
            status,
            event_id: self.event_id.map(EventId::from),
            primary_market_id: self.primary_market_id.map(MarketId::from),
            edge_pct: parse_dec(&self.edge_pct)?,
            edge_usd: parse_dec(&self.edge_usd)?,
            max_size: parse_dec(&self.max_size)?,
            confidence: self.confidence,
            risk_score: self.risk_score,
            expires_at: parse_ts(&self.expires_at)?,
            legs: serde_json::from_str(&self.legs)?,
            signal_ids: serde_json::from_str(&self.signal_ids)?,
            reasoning: self.reasoning,
            warnings: serde_json::from_str(&self.warnings)?,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = execution_plans)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PlanRow {
    pub id: String,
    pub opportunity_id: String,
    pub status: String,
    pub strategy: String,
    pub planned_size_usd: String,
    pub max_loss_usd: String,
    pub kelly_fraction: f64,
    pub legs: String,
    pub params: String,
    pub preflight_result: Option<String>,
    pub created_at: String,
    pub executed_at: Option<String>,
}

impl PlanRow {
    pub fn from_domain(plan: &ExecutionPlan) -> Result<Self> {
        Ok(Self {
            id: plan.id.to_string(),
            opportunity_id: plan.opportunity_id.to_string(),
            status: plan.status.as_str().to_string(),
            strategy: plan.strategy.clone(),
            planned_size_usd: fmt_dec(plan.planned_size_usd),
            max_loss_usd: fmt_dec(plan.max_loss_usd),
            kelly_fraction: plan.kelly_fraction,
            legs: serde_json::to_string(&plan.legs)?,
            params: serde_json::to_string(&plan.params)?,
            preflight_result: plan
                .preflight_result
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            created_at: fmt_ts(plan.created_at),
            executed_at: plan.executed_at.map(fmt_ts),
        })
    }

    pub fn into_domain(self) -> Result<ExecutionPlan> {
        let status = PlanStatus::parse(&self.status)
            .ok_or_else(|| Error::Parse(format!("plan status {:?}", self.status)))?;
        Ok(ExecutionPlan {
            id: PlanId::from(self.id),
            opportunity_id: OpportunityId::from(self.opportunity_id),
            status,
            strategy: self.strategy,
            planned_size_usd: parse_dec(&self.planned_size_usd)?,
            max_loss_usd: parse_dec(&self.max_loss_usd)?,
            kelly_fraction: self.kelly_fraction,
            legs: serde_json::from_str(&self.legs)?,
            params: serde_json::from_str(&self.params)?,
            preflight_result: self
                .preflight_result
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            created_at: parse_ts(&self.created_at)?,
            executed_at: parse_ts_opt(self.executed_at.as_deref())?,
        })
    }
}

#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = orders)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct OrderRow {
    pub id: String,
    pub plan_id: String,
    pub token_id: String,
    pub side: String,
    pub direction: String,
    pub price: String,
    pub size_usd: String,
    pub status: String,
    pub external_order_id: Option<String>,
    pub client_order_id: String,
    pub submitted_at: Option<String>,
    pub filled_usd: String,
    pub avg_price: Option<String>,
    pub fee: String,
    pub failure_reason: Option<String>,
}

impl OrderRow {
    pub fn from_domain(order: &Order) -> Self {
        Self {
            id: order.id.to_string(),
            plan_id: order.plan_id.to_string(),
            token_id: order.token_id.to_string(),
            side: order.side.as_str().to_string(),
            direction: order.direction.as_str().to_string(),
            price: fmt_dec(order.price),
            size_usd: fmt_dec(order.size_usd),
            status: order.status.as_str().to_string(),
            external_order_id: order.external_order_id.clone(),
            client_order_id: order.client_order_id.clone(),
            submitted_at: order.submitted_at.map(fmt_ts),
            filled_usd: fmt_dec(order.filled_usd),
            avg_price: order.avg_price.map(fmt_dec),
            fee: fmt_dec(order.fee),
            failure_reason: order.failure_reason.clone(),
        }
    }

    pub fn into_domain(self) -> Result<Order> {
        let status = OrderStatus::parse(&self.status)
            .ok_or_else(|| Error::Parse(format!("order status {:?}", self.status)))?;
        let direction = TradeDirection::parse(&self.direction)
            .ok_or_else(|| Error::Parse(format!("direction {:?}", self.direction)))?;
        let side = match self.side.as_str() {
            "buy" => TradeSide::Buy,
            "sell" => TradeSide::Sell,
            other => return Err(Error::Parse(format!("side {other:?}"))),
        };
        Ok(Order {
            id: OrderId::from(self.id),
            plan_id: PlanId::from(self.plan_id),
            token_id: TokenId::from(self.token_id),
            side,
            direction,
            price: parse_dec(&self.price)?,
            size_usd: parse_dec(&self.size_usd)?,
            status,
            external_order_id: self.external_order_id,
            client_order_id: self.client_order_id,
            submitted_at: parse_ts_opt(self.submitted_at.as_deref())?,
            filled_usd: parse_dec(&self.filled_usd)?,
            avg_price: parse_dec_opt(self.avg_price.as_deref())?,
            fee: parse_dec(&self.fee)?,
            failure_reason: self.failure_reason,
        })
    }
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = fills)]
pub struct NewFillRow {
    pub plan_id: String,
    pub token_id: String,
    pub direction: String,
    pub filled_size: String,
    pub avg_price: String,
    pub fee: String,
    pub slippage: Option<String>,
    pub filled_at: String,
}

impl NewFillRow {
    pub fn from_domain(fill: &Fill) -> Self {
        Self {
            plan_id: fill.plan_id.to_string(),
            token_id: fill.token_id.to_string(),
            direction: fill.direction.as_str().to_string(),
            filled_size: fmt_dec(fill.filled_size),
            avg_price: fmt_dec(fill.avg_price),
            fee: fmt_dec(fill.fee),
            slippage: fill.slippage.map(fmt_dec),
            filled_at: fmt_ts(fill.filled_at),
        }
    }
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = fills)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct FillRow {
    pub id: Option<i32>,
    pub plan_id: String,
    pub token_id: String,
    pub direction: String,
    pub filled_size: String,
    pub avg_price: String,
    pub fee: String,
    pub slippage: Option<String>,
    pub filled_at: String,
}

impl FillRow {
    pub fn into_domain(self) -> Result<Fill> {
        let direction = TradeDirection::parse(&self.direction)
            .ok_or_else(|| Error::Parse(format!("direction {:?}", self.direction)))?;
        Ok(Fill {
            plan_id: PlanId::from(self.plan_id),
            token_id: TokenId::from(self.token_id),
            direction,
            filled_size: parse_dec(&self.filled_size)?,
            avg_price: parse_dec(&self.avg_price)?,
            fee: parse_dec(&self.fee)?,
            slippage: parse_dec_opt(self.slippage.as_deref())?,
            filled_at: parse_ts(&self.filled_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Positions and PnL
// ---------------------------------------------------------------------------

#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = positions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PositionRow {
    pub token_id: String,
    pub market_id: String,
    pub direction: String,
    pub quantity: String,
    pub avg_entry_price: String,
    pub current_price: Option<String>,
    pub cost_basis: String,
    pub unrealized_pnl: String,
    pub realized_pnl: String,
    pub status: String,
    pub strategy: String,
    pub opened_at: String,
    pub closed_at: Option<String>,
}

impl PositionRow {
    pub fn from_domain(position: &Position) -> Self {
        Self {
            token_id: position.token_id.to_string(),
            market_id: position.market_id.to_string(),
            direction: position.direction.as_str().to_string(),
            quantity: fmt_dec(position.quantity),
            avg_entry_price: fmt_dec(position.avg_entry_price),
            current_price: position.current_price.map(fmt_dec),
            cost_basis: fmt_dec(position.cost_basis),
            unrealized_pnl: fmt_dec(position.unrealized_pnl),
            realized_pnl: fmt_dec(position.realized_pnl),
            status: position.status.as_str().to_string(),
            strategy: position.strategy.clone(),
            opened_at: fmt_ts(position.opened_at),
            closed_at: position.closed_at.map(fmt_ts),
        }
    }

    pub fn into_domain(self) -> Result<Position> {
        let direction = TradeDirection::parse(&self.direction)
            .ok_or_else(|| Error::Parse(format!("direction {:?}", self.direction)))?;
        let status = match self.status.as_str() {
            "open" => PositionStatus::Open,
            "closed" => PositionStatus::Closed,
            other => return Err(Error::Parse(format!("position status {other:?}"))),
        };
        Ok(Position {
            token_id: TokenId::from(self.token_id),
            market_id: MarketId::from(self.market_id),
            direction,
            quantity: parse_dec(&self.quantity)?,
            avg_entry_price: parse_dec(&self.avg_entry_price)?,
            current_price: parse_dec_opt(self.current_price.as_deref())?,
            cost_basis: parse_dec(&self.cost_basis)?,
            unrealized_pnl: parse_dec(&self.unrealized_pnl)?,
            realized_pnl: parse_dec(&self.realized_pnl)?,
            status,
            strategy: self.strategy,
            opened_at: parse_ts(&self.opened_at)?,
            closed_at: parse_ts_opt(self.closed_at.as_deref())?,
        })
    }
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = portfolio_snapshots)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PortfolioSnapshotRow {
    pub snapshot_at: String,
    pub total_cost_basis: String,
    pub total_market_value: String,
    pub unrealized_pnl: String,
    pub realized_pnl: String,
    pub net_liquidation: String,
}

impl PortfolioSnapshotRow {
    pub fn from_domain(snap: &PortfolioSnapshot) -> Self {
        Self {
            snapshot_at: fmt_ts(snap.snapshot_at),
            total_cost_basis: fmt_dec(snap.total_cost_basis),
            total_market_value: fmt_dec(snap.total_market_value),
            unrealized_pnl: fmt_dec(snap.unrealized_pnl),
            realized_pnl: fmt_dec(snap.realized_pnl),
            net_liquidation: fmt_dec(snap.net_liquidation),
        }
    }

    pub fn into_domain(self) -> Result<PortfolioSnapshot> {
        Ok(PortfolioSnapshot {
            snapshot_at: parse_ts(&self.snapshot_at)?,
            total_cost_basis: parse_dec(&self.total_cost_basis)?,
            total_market_value: parse_dec(&self.total_market_value)?,
            unrealized_pnl: parse_dec(&self.unrealized_pnl)?,
            realized_pnl: parse_dec(&self.realized_pnl)?,
            net_liquidation: parse_dec(&self.net_liquidation)?,
        })
    }
}

#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = pnl_records)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PnlRecordRow {
    pub plan_id: String,
    pub strategy: String,
    pub expected_edge: String,
    pub realized_pnl: Option<String>,
    pub realized_roi: Option<f64>,
    pub slippage_loss: Option<String>,
    pub outcome: String,
    pub failure_reason: Option<String>,
    pub settled_at: Option<String>,
}

impl PnlRecordRow {
    pub fn from_domain(record: &PnlRecord) -> Self {
        Self {
            plan_id: record.plan_id.to_string(),
            strategy: record.strategy.clone(),
            expected_edge: fmt_dec(record.expected_edge),
            realized_pnl: record.realized_pnl.map(fmt_dec),
            realized_roi: record.realized_roi,
            slippage_loss: record.slippage_loss.map(fmt_dec),
            outcome: record.outcome.as_str().to_string(),
            failure_reason: record.failure_reason.clone(),
            settled_at: record.settled_at.map(fmt_ts),
        }
    }

    pub fn into_domain(self) -> Result<PnlRecord> {
        let outcome = PnlOutcome::parse(&self.outcome)
            .ok_or_else(|| Error::Parse(format!("pnl outcome {:?}", self.outcome)))?;
        Ok(PnlRecord {
            plan_id: PlanId::from(self.plan_id),
            strategy: self.strategy,
            expected_edge: parse_dec(&self.expected_edge)?,
            realized_pnl: parse_dec_opt(self.realized_pnl.as_deref())?,
            realized_roi: self.realized_roi,
            slippage_loss: parse_dec_opt(self.slippage_loss.as_deref())?,
            outcome,
            failure_reason: self.failure_reason,
            settled_at: parse_ts_opt(self.settled_at.as_deref())?,
        })
    }
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = market_settlements)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct MarketSettlementRow {
    pub market_id: String,
    pub event_id: String,
    pub outcome: String,
    pub labels: String,
    pub initial_yes_price: Option<String>,
    pub final_yes_price: Option<String>,
    pub settled_at: String,
}

impl MarketSettlementRow {
    pub fn from_domain(settlement: &MarketSettlement) -> Result<Self> {
        Ok(Self {
            market_id: settlement.market_id.to_string(),
            event_id: settlement.event_id.to_string(),
            outcome: settlement.outcome.as_str().to_string(),
            labels: serde_json::to_string(&settlement.labels)?,
            initial_yes_price: settlement.initial_yes_price.map(fmt_dec),
            final_yes_price: settlement.final_yes_price.map(fmt_dec),
            settled_at: fmt_ts(settlement.settled_at),
        })
    }

    pub fn into_domain(self) -> Result<MarketSettlement> {
        let outcome = Outcome::parse(&self.outcome)
            .ok_or_else(|| Error::Parse(format!("outcome {:?}", self.outcome)))?;
        Ok(MarketSettlement {
            market_id: MarketId::from(self.market_id),
            event_id: EventId::from(self.event_id),
            outcome,
            labels: serde_json::from_str(&self.labels)?,
            initial_yes_price: parse_dec_opt(self.initial_yes_price.as_deref())?,
            final_yes_price: parse_dec_opt(self.final_yes_price.as_deref())?,
            settled_at: parse_ts(&self.settled_at)?,
        })
    }
}

#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = execution_rules)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ExecutionRuleRow {
    pub strategy: String,
    pub auto_execute: bool,
    pub min_confidence: f64,
    pub min_edge_pct: String,
    pub stop_loss_pct: Option<String>,
    pub take_profit_pct: Option<String>,
    pub max_hold_hours: Option<i32>,
    pub max_daily_trades: i32,
    pub max_per_trade_usd: String,
}

impl ExecutionRuleRow {
    pub fn from_domain(rule: &ExecutionRule) -> Self {
        Self {
            strategy: rule.strategy.clone(),
            auto_execute: rule.auto_execute,
            min_confidence: rule.min_confidence,
            min_edge_pct: fmt_dec(rule.min_edge_pct),
            stop_loss_pct: rule.stop_loss_pct.map(fmt_dec),
            take_profit_pct: rule.take_profit_pct.map(fmt_dec),
            max_hold_hours: rule.max_hold_hours.map(|h| h as i32),
            max_daily_trades: rule.max_daily_trades as i32,
            max_per_trade_usd: fmt_dec(rule.max_per_trade_usd),
        }
    }

    pub fn into_domain(self) -> Result<ExecutionRule> {
        Ok(ExecutionRule {
            strategy: self.strategy,
            auto_execute: self.auto_execute,
            min_confidence: self.min_confidence,
            min_edge_pct: parse_dec(&self.min_edge_pct)?,
            stop_loss_pct: parse_dec_opt(self.stop_loss_pct.as_deref())?,
            take_profit_pct: parse_dec_opt(self.take_profit_pct.as_deref())?,
            max_hold_hours: self.max_hold_hours.map(|h| h.max(0) as u32),
            max_daily_trades: self.max_daily_trades.max(0) as u32,
            max_per_trade_usd: parse_dec(&self.max_per_trade_usd)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Settings, reviews, sync
// ---------------------------------------------------------------------------

#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = system_settings)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SystemSettingRow {
    pub key: String,
    pub value: String,
    pub description: Option<String>,
    pub updated_at: String,
}

impl SystemSettingRow {
    pub fn from_domain(setting: &SystemSetting) -> Result<Self> {
        Ok(Self {
            key: setting.key.clone(),
            value: serde_json::to_string(&setting.value)?,
            description: setting.description.clone(),
            updated_at: fmt_ts(setting.updated_at),
        })
    }

    pub fn into_domain(self) -> Result<SystemSetting> {
        Ok(SystemSetting {
            key: self.key,
            value: parse_json(&self.value)?,
            description: self.description,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = market_reviews)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct MarketReviewRow {
    pub market_id: String,
    pub our_action: String,
    pub hypothetical_pnl: Option<String>,
    pub actual_pnl: Option<String>,
    pub lesson_tags: String,
    pub notes: Option<String>,
}

impl MarketReviewRow {
    pub fn from_domain(review: &MarketReview) -> Result<Self> {
        Ok(Self {
            market_id: review.market_id.to_string(),
            our_action: review.our_action.as_str().to_string(),
            hypothetical_pnl: review.hypothetical_pnl.map(fmt_dec),
            actual_pnl: review.actual_pnl.map(fmt_dec),
            lesson_tags: serde_json::to_string(&review.lesson_tags)?,
            notes: review.notes.clone(),
        })
    }

    pub fn into_domain(self) -> Result<MarketReview> {
        let our_action = match self.our_action.as_str() {
            "traded" => ReviewAction::Traded,
            "dismissed" => ReviewAction::Dismissed,
            "expired" => ReviewAction::Expired,
            "missed" => ReviewAction::Missed,
            other => return Err(Error::Parse(format!("review action {other:?}"))),
        };
        Ok(MarketReview {
            market_id: MarketId::from(self.market_id),
            our_action,
            hypothetical_pnl: parse_dec_opt(self.hypothetical_pnl.as_deref())?,
            actual_pnl: parse_dec_opt(self.actual_pnl.as_deref())?,
            lesson_tags: serde_json::from_str(&self.lesson_tags)?,
            notes: self.notes,
        })
    }
}

#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = sync_states)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncStateRow {
    pub scope: String,
    pub cursor: Option<String>,
    pub watermark_ts: Option<String>,
    pub last_success_at: Option<String>,
    pub last_attempt_at: Option<String>,
    pub last_error: Option<String>,
    pub stats: String,
}

impl SyncStateRow {
    pub fn from_domain(state: &SyncState) -> Result<Self> {
        Ok(Self {
            scope: state.scope.clone(),
            cursor: state.cursor.clone(),
            watermark_ts: state.watermark_ts.map(fmt_ts),
            last_success_at: state.last_success_at.map(fmt_ts),
            last_attempt_at: state.last_attempt_at.map(fmt_ts),
            last_error: state.last_error.clone(),
            stats: serde_json::to_string(&state.stats)?,
        })
    }

    pub fn into_domain(self) -> Result<SyncState> {
        Ok(SyncState {
            scope: self.scope,
            cursor: self.cursor,
            watermark_ts: parse_ts_opt(self.watermark_ts.as_deref())?,
            last_success_at: parse_ts_opt(self.last_success_at.as_deref())?,
            last_attempt_at: parse_ts_opt(self.last_attempt_at.as_deref())?,
            last_error: self.last_error,
            stats: parse_json(&self.stats)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Journal and daily stats
// ---------------------------------------------------------------------------

#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = journal_entries)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct JournalEntryRow {
    pub plan_id: String,
    pub strategy: String,
    pub signals: String,
    pub decision_state: String,
    pub entry_params: String,
    pub outcome_state: Option<String>,
    pub notes: Option<String>,
    pub tags: String,
    pub created_at: String,
    pub reviewed_at: Option<String>,
}

impl JournalEntryRow {
    pub fn from_domain(entry: &JournalEntry) -> Result<Self> {
        Ok(Self {
            plan_id: entry.plan_id.to_string(),
            strategy: entry.strategy.clone(),
            signals: serde_json::to_string(&entry.signals)?,
            decision_state: serde_json::to_string(&entry.decision_state)?,
            entry_params: serde_json::to_string(&entry.entry_params)?,
            outcome_state: entry
                .outcome_state
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            notes: entry.notes.clone(),
            tags: serde_json::to_string(&entry.tags)?,
            created_at: fmt_ts(entry.created_at),
            reviewed_at: entry.reviewed_at.map(fmt_ts),
        })
    }

    pub fn into_domain(self) -> Result<JournalEntry> {
        Ok(JournalEntry {
            plan_id: PlanId::from(self.plan_id),
            strategy: self.strategy,
            signals: parse_json(&self.signals)?,
            decision_state: parse_json(&self.decision_state)?,
            entry_params: parse_json(&self.entry_params)?,
            outcome_state: self
                .outcome_state
                .as_deref()
                .map(parse_json)
                .transpose()?,
            notes: self.notes,
            tags: serde_json::from_str(&self.tags)?,
            created_at: parse_ts(&self.created_at)?,
            reviewed_at: parse_ts_opt(self.reviewed_at.as_deref())?,
        })
    }
}

#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone, Default)]
#[diesel(table_name = daily_stats)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DailyStatsRow {
    pub date: String,
    pub opportunities_detected: i32,
    pub opportunities_executed: i32,
    pub opportunities_expired: i32,
    pub plans_created: i32,
    pub plans_executed: i32,
    pub realized_pnl: String,
    pub win_count: i32,
    pub loss_count: i32,
}

impl DailyStatsRow {
    pub fn from_domain(stats: &DailyStats) -> Self {
        Self {
            date: stats.date.clone(),
            opportunities_detected: stats.opportunities_detected as i32,
            opportunities_executed: stats.opportunities_executed as i32,
            opportunities_expired: stats.opportunities_expired as i32,
            plans_created: stats.plans_created as i32,
            plans_executed: stats.plans_executed as i32,
            realized_pnl: fmt_dec(stats.realized_pnl),
            win_count: stats.win_count as i32,
            loss_count: stats.loss_count as i32,
        }
    }

    pub fn into_domain(self) -> Result<DailyStats> {
        Ok(DailyStats {
            date: self.date,
            opportunities_detected: self.opportunities_detected.max(0) as u32,
            opportunities_executed: self.opportunities_executed.max(0) as u32,
            opportunities_expired: self.opportunities_expired.max(0) as u32,
            plans_created: self.plans_created.max(0) as u32,
            plans_executed: self.plans_executed.max(0) as u32,
            realized_pnl: parse_dec(&self.realized_pnl)?,
            win_count: self.win_count.max(0) as u32,
            loss_count: self.loss_count.max(0) as u32,
        })
    }
}

#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone, Default)]
#[diesel(table_name = strategy_daily_stats)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct StrategyDailyStatsRow {
    pub date: String,
    pub strategy: String,
    pub opportunities_detected: i32,
    pub opportunities_executed: i32,
    pub plans_executed: i32,
    pub realized_pnl: String,
    pub win_count: i32,
    pub loss_count: i32,
}

impl StrategyDailyStatsRow {
    pub fn from_domain(stats: &StrategyDailyStats) -> Self {
        Self {
            date: stats.date.clone(),
            strategy: stats.strategy.clone(),
            opportunities_detected: stats.opportunities_detected as i32,
            opportunities_executed: stats.opportunities_executed as i32,
            plans_executed: stats.plans_executed as i32,
            realized_pnl: fmt_dec(stats.realized_pnl),
            win_count: stats.win_count as i32,
            loss_count: stats.loss_count as i32,
        }
    }

    pub fn into_domain(self) -> Result<StrategyDailyStats> {
        Ok(StrategyDailyStats {
            date: self.date,
            strategy: self.strategy,
            opportunities_detected: self.opportunities_detected.max(0) as u32,
            opportunities_executed: self.opportunities_executed.max(0) as u32,
            plans_executed: self.plans_executed.max(0) as u32,
            realized_pnl: parse_dec(&self.realized_pnl)?,
            win_count: self.win_count.max(0) as u32,
            loss_count: self.loss_count.max(0) as u32,
        })
    }
}
