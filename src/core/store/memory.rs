//! In-memory repository for tests and dry runs.
//!
//! Mirrors the SQLite implementation's semantics (idempotent upserts,
//! newest-wins book updates, ordered queries) over plain maps.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;

use super::Repository;
use crate::core::domain::{
    BookSnapshot, DailyStats, Event, EventId, EventTag, ExecutionPlan, ExecutionRule, Fill,
    JournalEntry, LastTrade, Market, MarketDataHealth, MarketId, MarketLabel, MarketReview,
    MarketSettlement, Opportunity, OpportunityId, OpportunityStatus, Order, OrderStatus, PlanId,
    PlanStatus, PnlRecord, PortfolioSnapshot, Position, Signal, SignalSource, SignalType,
    Strategy, StrategyDailyStats, SyncState, SystemSetting, Tag, Token, TokenId,
};
use crate::error::{Error, Result};

#[derive(Default)]
struct Inner {
    events: HashMap<EventId, Event>,
    markets: HashMap<MarketId, Market>,
    tokens: HashMap<TokenId, Token>,
    tags: HashMap<String, Tag>,
    event_tags: Vec<EventTag>,
    books: HashMap<TokenId, BookSnapshot>,
    health: HashMap<TokenId, MarketDataHealth>,
    last_trades: HashMap<TokenId, LastTrade>,
    signals: Vec<Signal>,
    signal_sources: HashMap<String, SignalSource>,
    labels: HashMap<(MarketId, String), MarketLabel>,
    strategies: HashMap<String, Strategy>,
    execution_rules: HashMap<String, ExecutionRule>,
    opportunities: HashMap<OpportunityId, Opportunity>,
    plans: HashMap<PlanId, ExecutionPlan>,
    orders: HashMap<String, Order>,
    fills: Vec<Fill>,
    positions: HashMap<TokenId, Position>,
    snapshots: Vec<PortfolioSnapshot>,
    pnl_records: HashMap<PlanId, PnlRecord>,
    settlements: HashMap<MarketId, MarketSettlement>,
    reviews: HashMap<MarketId, MarketReview>,
    settings: HashMap<String, SystemSetting>,
    sync_states: HashMap<String, SyncState>,
    journal: HashMap<PlanId, JournalEntry>,
    daily_stats: HashMap<String, DailyStats>,
    strategy_daily_stats: HashMap<(String, String), StrategyDailyStats>,
}

/// Map-backed repository; cheap to construct per test.
#[derive(Default)]
pub struct MemoryRepository {
    inner: RwLock<Inner>,
}

impl MemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn upsert_event(&self, event: &Event) -> Result<()> {
        self.inner
            .write()
            .events
            .insert(event.id.clone(), event.clone());
        Ok(())
    }

    async fn get_event(&self, id: &EventId) -> Result<Option<Event>> {
        Ok(self.inner.read().events.get(id).cloned())
    }

    async fn list_tradeable_events(&self) -> Result<Vec<Event>> {
        Ok(self
            .inner
            .read()
            .events
            .values()
            .filter(|e| e.is_tradeable())
            .cloned()
            .collect())
    }

    async fn upsert_market(&self, market: &Market) -> Result<()> {
        self.inner
            .write()
            .markets
            .insert(market.id.clone(), market.clone());
        Ok(())
    }

    async fn get_market(&self, id: &MarketId) -> Result<Option<Market>> {
        Ok(self.inner.read().markets.get(id).cloned())
    }

    async fn list_tradeable_markets(&self) -> Result<Vec<Market>> {
        Ok(self
            .inner
            .read()
            .markets
            .values()
            .filter(|m| m.is_tradeable())
            .cloned()
            .collect())
    }

    async fn list_markets_by_event(&self, event_id: &EventId) -> Result<Vec<Market>> {
        Ok(self
            .inner
            .read()
            .markets
            .values()
            .filter(|m| &m.event_id == event_id)
            .cloned()
            .collect())
    }

    async fn upsert_token(&self, token: &Token) -> Result<()> {
        self.inner
            .write()
            .tokens
            .insert(token.id.clone(), token.clone());
        Ok(())
    }

    async fn get_token(&self, id: &TokenId) -> Result<Option<Token>> {
        Ok(self.inner.read().tokens.get(id).cloned())
    }

    async fn list_tokens_by_market(&self, market_id: &MarketId) -> Result<Vec<Token>> {
        Ok(self
            .inner
            .read()
            .tokens
            .values()
            .filter(|t| &t.market_id == market_id)
            .cloned()
            .collect())
    }

    async fn list_tradeable_tokens(&self) -> Result<Vec<Token>> {
        let inner = self.inner.read();
        Ok(inner
            .tokens
            .values()
            .filter(|t| {
                inner
                    .markets
                    .get(&t.market_id)
                    .is_some_and(Market::is_tradeable)
            })
            .cloned()
            .collect())
    }

    async fn upsert_tag(&self, tag: &Tag) -> Result<()> {
        self.inner.write().tags.insert(tag.id.clone(), tag.clone());
        Ok(())
    }

    async fn upsert_event_tag(&self, event_tag: &EventTag) -> Result<()> {
        let mut inner = self.inner.write();
        if !inner.event_tags.contains(event_tag) {
            inner.event_tags.push(event_tag.clone());
        }
        Ok(())
    }

    async fn list_tags_for_event(&self, event_id: &EventId) -> Result<Vec<Tag>> {
        let inner = self.inner.read();
        Ok(inner
            .event_tags
            .iter()
            .filter(|et| &et.event_id == event_id)
            .filter_map(|et| inner.tags.get(&et.tag_id).cloned())
            .collect())
    }

    async fn upsert_book(&self, book: &BookSnapshot) -> Result<()> {
        let mut inner = self.inner.write();
        match inner.books.get(&book.token_id) {
            Some(existing) if existing.snapshot_ts >= book.snapshot_ts => {}
            _ => {
                inner.books.insert(book.token_id.clone(), book.clone());
            }
        }
        Ok(())
    }

    async fn get_book(&self, token_id: &TokenId) -> Result<Option<BookSnapshot>> {
        Ok(self.inner.read().books.get(token_id).cloned())
    }

    async fn list_books(&self) -> Result<Vec<BookSnapshot>> {
        Ok(self.inner.read().books.values().cloned().collect())
    }

    async fn upsert_health(&self, health: &MarketDataHealth) -> Result<()> {
        self.inner
            .write()
            .health
            .insert(health.token_id.clone(), health.clone());
        Ok(())
    }

    async fn get_health(&self, token_id: &TokenId) -> Result<Option<MarketDataHealth>> {
        Ok(self.inner.read().health.get(token_id).cloned())
    }

    async fn list_health(&self) -> Result<Vec<MarketDataHealth>> {
        Ok(self.inner.read().health.values().cloned().collect())
    }

    async fn upsert_last_trade(&self, trade: &LastTrade) -> Result<()> {
        self.inner
            .write()
            .last_trades
            .insert(trade.token_id.clone(), trade.clone());
        Ok(())
    }

    async fn get_last_trade(&self, token_id: &TokenId) -> Result<Option<LastTrade>> {
        Ok(self.inner.read().last_trades.get(token_id).cloned())
    }

    async fn insert_signal(&self, signal: &Signal) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.signals.iter().any(|s| s.id == signal.id) {
            return Ok(());
        }
        inner.signals.push(signal.clone());
        Ok(())
    }

    async fn list_signals_since(
        &self,
        signal_type: Option<&SignalType>,
        since: DateTime<Utc>,
    ) -> Result<Vec<Signal>> {
        let mut out: Vec<Signal> = self
            .inner
            .read()
            .signals
            .iter()
            .filter(|s| s.created_at.is_some_and(|t| t >= since))
            .filter(|s| signal_type.map_or(true, |t| &s.signal_type == t))
            .cloned()
            .collect();
        out.sort_by_key(|s| s.created_at);
        Ok(out)
    }

    async fn delete_expired_signals(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut inner = self.inner.write();
        let before = inner.signals.len();
        inner
            .signals
            .retain(|s| s.expires_at.map_or(true, |t| t > now));
        Ok(before - inner.signals.len())
    }

    async fn upsert_signal_source(&self, source: &SignalSource) -> Result<()> {
        self.inner
            .write()
            .signal_sources
            .insert(source.name.clone(), source.clone());
        Ok(())
    }

    async fn list_signal_sources(&self) -> Result<Vec<SignalSource>> {
        Ok(self.inner.read().signal_sources.values().cloned().collect())
    }

    async fn upsert_label(&self, label: &MarketLabel) -> Result<()> {
        self.inner.write().labels.insert(
            (label.market_id.clone(), label.label.clone()),
            label.clone(),
        );
        Ok(())
    }

    async fn list_labels(&self) -> Result<Vec<MarketLabel>> {
        Ok(self.inner.read().labels.values().cloned().collect())
    }

    async fn list_labels_for_market(&self, market_id: &MarketId) -> Result<Vec<MarketLabel>> {
        Ok(self
            .inner
            .read()
            .labels
            .values()
            .filter(|l| &l.market_id == market_id)
            .cloned()
            .collect())
    }

    async fn list_markets_with_label(&self, label: &str) -> Result<Vec<MarketId>> {
        Ok(self
            .inner
            .read()
            .labels
            .values()
            .filter(|l| l.label == label)
            .map(|l| l.market_id.clone())
            .collect())
    }

    async fn upsert_strategy(&self, strategy: &Strategy) -> Result<()> {
        self.inner
            .write()
            .strategies
            .insert(strategy.name.clone(), strategy.clone());
        Ok(())
    }

    async fn get_strategy(&self, name: &str) -> Result<Option<Strategy>> {
        Ok(self.inner.read().strategies.get(name).cloned())
    }

    async fn list_enabled_strategies(&self) -> Result<Vec<Strategy>> {
        let mut out: Vec<Strategy> = self
            .inner
            .read()
            .strategies
            .values()
            .filter(|s| s.enabled)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(out)
    }

    async fn update_strategy_stats(&self, name: &str, stats: &serde_json::Value) -> Result<()> {
        let mut inner = self.inner.write();
        let strategy = inner
            .strategies
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(format!("strategy {name}")))?;
        strategy.stats = stats.clone();
        strategy.updated_at = Utc::now();
        Ok(())
    }

    async fn upsert_execution_rule(&self, rule: &ExecutionRule) -> Result<()> {
        self.inner
            .write()
            .execution_rules
            .insert(rule.strategy.clone(), rule.clone());
        Ok(())
    }

    async fn get_execution_rule(&self, strategy: &str) -> Result<Option<ExecutionRule>> {
        Ok(self.inner.read().execution_rules.get(strategy).cloned())
    }

    async fn insert_opportunity(&self, opportunity: &Opportunity) -> Result<()> {
        self.inner
            .write()
            .opportunities
            .insert(opportunity.id.clone(), opportunity.clone());
        Ok(())
    }

    async fn get_opportunity(&self, id: &OpportunityId) -> Result<Option<Opportunity>> {
        Ok(self.inner.read().opportunities.get(id).cloned())
    }

    async fn update_opportunity_status(
        &self,
        id: &OpportunityId,
        status: OpportunityStatus,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        let opp = inner
            .opportunities
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("opportunity {id}")))?;
        opp.status = status;
        Ok(())
    }

    async fn list_opportunities_by_status(
        &self,
        status: OpportunityStatus,
    ) -> Result<Vec<Opportunity>> {
        Ok(self
            .inner
            .read()
            .opportunities
            .values()
            .filter(|o| o.status == status)
            .cloned()
            .collect())
    }

    async fn insert_plan(&self, plan: &ExecutionPlan) -> Result<()> {
        self.inner.write().plans.insert(plan.id.clone(), plan.clone());
        Ok(())
    }

    async fn update_plan(&self, plan: &ExecutionPlan) -> Result<()> {
        let mut inner = self.inner.write();
        if !inner.plans.contains_key(&plan.id) {
            return Err(Error::NotFound(format!("plan {}", plan.id)));
        }
        inner.plans.insert(plan.id.clone(), plan.clone());
        Ok(())
    }

    async fn get_plan(&self, id: &PlanId) -> Result<Option<ExecutionPlan>> {
        Ok(self.inner.read().plans.get(id).cloned())
    }

    async fn list_plans_by_status(&self, status: PlanStatus) -> Result<Vec<ExecutionPlan>> {
        Ok(self
            .inner
            .read()
            .plans
            .values()
            .filter(|p| p.status == status)
            .cloned()
            .collect())
    }

    async fn sum_planned_size_since(
        &self,
        strategy: &str,
        since: DateTime<Utc>,
    ) -> Result<Decimal> {
        Ok(self
            .inner
            .read()
            .plans
            .values()
            .filter(|p| p.strategy == strategy && p.created_at >= since)
            .map(|p| p.planned_size_usd)
            .sum())
    }

    async fn count_plans_since(&self, strategy: &str, since: DateTime<Utc>) -> Result<u32> {
        Ok(self
            .inner
            .read()
            .plans
            .values()
            .filter(|p| p.strategy == strategy && p.created_at >= since)
            .count() as u32)
    }

    async fn insert_order(&self, order: &Order) -> Result<()> {
        let mut inner = self.inner.write();
        // Keyed by client_order_id: re-insert after a retry is a no-op.
        inner
            .orders
            .entry(order.client_order_id.clone())
            .or_insert_with(|| order.clone());
        Ok(())
    }

    async fn update_order(&self, order: &Order) -> Result<()> {
        let mut inner = self.inner.write();
        let existing = inner
            .orders
            .values_mut()
            .find(|o| o.id == order.id)
            .ok_or_else(|| Error::NotFound(format!("order {}", order.id)))?;
        *existing = order.clone();
        Ok(())
    }

    async fn get_order_by_client_id(&self, client_order_id: &str) -> Result<Option<Order>> {
        Ok(self.inner.read().orders.get(client_order_id).cloned())
    }

    async fn list_orders_by_plan(&self, plan_id: &PlanId) -> Result<Vec<Order>> {
        Ok(self
            .inner
            .read()
            .orders
            .values()
            .filter(|o| &o.plan_id == plan_id)
            .cloned()
            .collect())
    }

    async fn list_orders_by_status(&self, statuses: &[OrderStatus]) -> Result<Vec<Order>> {
        Ok(self
            .inner
            .read()
            .orders
            .values()
            .filter(|o| statuses.contains(&o.status))
            .cloned()
            .collect())
    }

    async fn insert_fill(&self, fill: &Fill) -> Result<()> {
        self.inner.write().fills.push(fill.clone());
        Ok(())
    }

    async fn list_fills_by_plan(&self, plan_id: &PlanId) -> Result<Vec<Fill>> {
        let mut out: Vec<Fill> = self
            .inner
            .read()
            .fills
            .iter()
            .filter(|f| &f.plan_id == plan_id)
            .cloned()
            .collect();
        out.sort_by_key(|f| f.filled_at);
        Ok(out)
    }

    async fn upsert_position(&self, position: &Position) -> Result<()> {
        self.inner
            .write()
            .positions
            .insert(position.token_id.clone(), position.clone());
        Ok(())
    }

    async fn get_position(&self, token_id: &TokenId) -> Result<Option<Position>> {
        Ok(self.inner.read().positions.get(token_id).cloned())
    }

    async fn list_open_positions(&self) -> Result<Vec<Position>> {
        Ok(self
            .inner
            .read()
            .positions
            .values()
            .filter(|p| p.status == crate::core::domain::PositionStatus::Open)
            .cloned()
            .collect())
    }

    async fn insert_portfolio_snapshot(&self, snapshot: &PortfolioSnapshot) -> Result<()> {
        self.inner.write().snapshots.push(snapshot.clone());
        Ok(())
    }

    async fn upsert_pnl_record(&self, record: &PnlRecord) -> Result<()> {
        self.inner
            .write()
            .pnl_records
            .insert(record.plan_id.clone(), record.clone());
        Ok(())
    }

    async fn get_pnl_record(&self, plan_id: &PlanId) -> Result<Option<PnlRecord>> {
        Ok(self.inner.read().pnl_records.get(plan_id).cloned())
    }

    async fn upsert_settlement(&self, settlement: &MarketSettlement) -> Result<()> {
        self.inner
            .write()
            .settlements
            .insert(settlement.market_id.clone(), settlement.clone());
        Ok(())
    }

    async fn get_settlement(&self, market_id: &MarketId) -> Result<Option<MarketSettlement>> {
        Ok(self.inner.read().settlements.get(market_id).cloned())
    }

    async fn list_settlements(&self) -> Result<Vec<MarketSettlement>> {
        Ok(self.inner.read().settlements.values().cloned().collect())
    }

    async fn upsert_review(&self, review: &MarketReview) -> Result<()> {
        self.inner
            .write()
            .reviews
            .insert(review.market_id.clone(), review.clone());
        Ok(())
    }

    async fn get_review(&self, market_id: &MarketId) -> Result<Option<MarketReview>> {
        Ok(self.inner.read().reviews.get(market_id).cloned())
    }

    async fn upsert_journal_entry(&self, entry: &JournalEntry) -> Result<()> {
        self.inner
            .write()
            .journal
            .insert(entry.plan_id.clone(), entry.clone());
        Ok(())
    }

    async fn get_journal_entry(&self, plan_id: &PlanId) -> Result<Option<JournalEntry>> {
        Ok(self.inner.read().journal.get(plan_id).cloned())
    }

    async fn upsert_daily_stats(&self, stats: &DailyStats) -> Result<()> {
        self.inner
            .write()
            .daily_stats
            .insert(stats.date.clone(), stats.clone());
        Ok(())
    }

    async fn get_daily_stats(&self, date: &str) -> Result<Option<DailyStats>> {
        Ok(self.inner.read().daily_stats.get(date).cloned())
    }

    async fn upsert_strategy_daily_stats(&self, stats: &StrategyDailyStats) -> Result<()> {
        self.inner.write().strategy_daily_stats.insert(
            (stats.date.clone(), stats.strategy.clone()),
            stats.clone(),
        );
        Ok(())
    }

    async fn upsert_setting(&self, setting: &SystemSetting) -> Result<()> {
        self.inner
            .write()
            .settings
            .insert(setting.key.clone(), setting.clone());
        Ok(())
    }

    async fn get_setting(&self, key: &str) -> Result<Option<SystemSetting>> {
        Ok(self.inner.read().settings.get(key).cloned())
    }

    async fn list_settings(&self) -> Result<Vec<SystemSetting>> {
        Ok(self.inner.read().settings.values().cloned().collect())
    }

    async fn get_sync_state(&self, scope: &str) -> Result<Option<SyncState>> {
        Ok(self.inner.read().sync_states.get(scope).cloned())
    }

    async fn upsert_sync_state(&self, state: &SyncState) -> Result<()> {
        self.inner
            .write()
            .sync_states
            .insert(state.scope.clone(), state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{Direction, Signal};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn book_upsert_keeps_newest() {
        let repo = MemoryRepository::new();
        let now = Utc::now();
        let newer = BookSnapshot::new(
            TokenId::from("t1"),
            now,
            vec![crate::core::domain::PriceLevel::new(dec!(0.40), dec!(10))],
            vec![],
        );
        let older = BookSnapshot::new(
            TokenId::from("t1"),
            now - chrono::Duration::seconds(5),
            vec![],
            vec![],
        );
        repo.upsert_book(&newer).await.unwrap();
        repo.upsert_book(&older).await.unwrap();
        let stored = repo.get_book(&TokenId::from("t1")).await.unwrap().unwrap();
        assert_eq!(stored.snapshot_ts, now);
    }

    #[tokio::test]
    async fn signals_filter_by_type_and_time() {
        let repo = MemoryRepository::new();
        let now = Utc::now();
        for (t, age_secs) in [
            (SignalType::LiquidityGap, 10),
            (SignalType::NoBias, 10),
            (SignalType::LiquidityGap, 3600),
        ] {
            let s = Signal::builder(t, "internal_scan")
                .direction(Direction::Yes)
                .created_at(now - chrono::Duration::seconds(age_secs))
                .expires_at(now + chrono::Duration::minutes(10))
                .build();
            repo.insert_signal(&s).await.unwrap();
        }
        let recent = repo
            .list_signals_since(
                Some(&SignalType::LiquidityGap),
                now - chrono::Duration::minutes(5),
            )
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
    }
}
