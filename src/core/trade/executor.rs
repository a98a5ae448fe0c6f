//! Order executor: submits, polls and cancels orders for plans.
//!
//! Submission is idempotent: each leg's order (with its client order id)
//! is persisted before the network call, and a retry reuses the stored
//! order instead of minting a new one. Polling reconciles remote state
//! into orders, appends fills, updates positions and steps plan status.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::core::domain::{
    ExecutionPlan, Fill, OpportunityStatus, Order, OrderStatus, PlanId, PlanStatus,
};
use crate::core::exchange::{OrderResponse, PlaceOrderRequest, TradingClient};
use crate::core::portfolio::{JournalService, PositionTracker};
use crate::core::shutdown::ShutdownToken;
use crate::core::store::{Repository, SharedRepository};
use crate::error::{Error, Result};

/// A leg counts as done once this share of its expected size has filled.
const FILL_COMPLETE_RATIO: Decimal = Decimal::from_parts(98, 0, 0, false, 2); // 0.98

/// Seam over the trading endpoints so the executor can run against the
/// real client, a dry-run simulator, or a scripted test double.
#[async_trait]
pub trait ExchangeApi: Send + Sync {
    async fn place_order(&self, request: &PlaceOrderRequest) -> Result<OrderResponse>;
    async fn get_order(&self, external_order_id: &str) -> Result<OrderResponse>;
    async fn cancel_order(&self, external_order_id: &str) -> Result<OrderResponse>;
}

#[async_trait]
impl ExchangeApi for TradingClient {
    async fn place_order(&self, request: &PlaceOrderRequest) -> Result<OrderResponse> {
        TradingClient::place_order(self, request).await
    }

    async fn get_order(&self, external_order_id: &str) -> Result<OrderResponse> {
        TradingClient::get_order(self, external_order_id).await
    }

    async fn cancel_order(&self, external_order_id: &str) -> Result<OrderResponse> {
        TradingClient::cancel_order(self, external_order_id).await
    }
}

/// Accepts every order and reports it fully filled at the limit price on
/// the next poll. Used in `dry-run` mode.
#[derive(Default)]
pub struct DryRunExchange {
    orders: Mutex<HashMap<String, PlaceOrderRequest>>,
}

impl DryRunExchange {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExchangeApi for DryRunExchange {
    async fn place_order(&self, request: &PlaceOrderRequest) -> Result<OrderResponse> {
        let external_id = format!("dry-{}", uuid::Uuid::new_v4());
        self.orders
            .lock()
            .insert(external_id.clone(), request.clone());
        Ok(OrderResponse {
            order_id: Some(external_id),
            status: Some("open".into()),
            filled_usd: Some(Decimal::ZERO),
            avg_price: None,
            fee: None,
            filled_at: None,
            cancelled_at: None,
            failure_reason: None,
        })
    }

    async fn get_order(&self, external_order_id: &str) -> Result<OrderResponse> {
        let orders = self.orders.lock();
        let request = orders
            .get(external_order_id)
            .ok_or_else(|| Error::NotFound(format!("order {external_order_id}")))?;
        Ok(OrderResponse {
            order_id: Some(external_order_id.to_string()),
            status: Some("filled".into()),
            filled_usd: Some(request.size_usd),
            avg_price: Some(request.price),
            fee: Some(Decimal::ZERO),
            filled_at: Some(Utc::now().to_rfc3339()),
            cancelled_at: None,
            failure_reason: None,
        })
    }

    async fn cancel_order(&self, external_order_id: &str) -> Result<OrderResponse> {
        Ok(OrderResponse {
            order_id: Some(external_order_id.to_string()),
            status: Some("cancelled".into()),
            filled_usd: None,
            avg_price: None,
            fee: None,
            filled_at: None,
            cancelled_at: Some(Utc::now().to_rfc3339()),
            failure_reason: None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub poll_interval: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
        }
    }
}

pub struct OrderExecutor {
    repo: SharedRepository,
    exchange: Arc<dyn ExchangeApi>,
    positions: Arc<PositionTracker>,
    journal: Arc<JournalService>,
    config: ExecutorConfig,
}

impl OrderExecutor {
    #[must_use]
    pub fn new(
        repo: SharedRepository,
        exchange: Arc<dyn ExchangeApi>,
        positions: Arc<PositionTracker>,
        journal: Arc<JournalService>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            repo,
            exchange,
            positions,
            journal,
            config,
        }
    }

    /// Submit a preflight-passed plan: one order per leg, in priority
    /// order. A permanent exchange rejection fails the order and the plan;
    /// a transient failure leaves the stored order for the retry to reuse.
    pub async fn submit_plan(&self, plan: &ExecutionPlan) -> Result<ExecutionPlan> {
        if plan.status != PlanStatus::PreflightPass {
            return Err(Error::Conflict(format!(
                "plan {} is {}, not preflight_pass",
                plan.id,
                plan.status.as_str()
            )));
        }
        let mut plan = plan.clone();
        plan.status = PlanStatus::Executing;
        self.repo.update_plan(&plan).await?;

        let existing = self.repo.list_orders_by_plan(&plan.id).await?;
        let mut legs = plan.legs.clone();
        legs.sort_by_key(|l| l.priority);

        for leg in &legs {
            // Reuse the persisted order on retry; dedup keys off the
            // client order id.
            let mut order = match existing
                .iter()
                .find(|o| o.token_id == leg.token_id && !o.status.is_terminal())
            {
                Some(order) if order.status != OrderStatus::New => continue,
                Some(order) => order.clone(),
                None => {
                    let order = Order::new(
                        plan.id.clone(),
                        leg.token_id.clone(),
                        leg.direction,
                        leg.target_price,
                        leg.size_usd,
                    );
                    self.repo.insert_order(&order).await?;
                    order
                }
            };

            let request = PlaceOrderRequest::limit(
                &order.token_id,
                order.side,
                order.price,
                order.size_usd,
                order.client_order_id.clone(),
            );
            match self.exchange.place_order(&request).await {
                Ok(response) => {
                    order.external_order_id = response.order_id;
                    order.status = OrderStatus::Open;
                    order.submitted_at = Some(Utc::now());
                    self.repo.update_order(&order).await?;
                    info!(
                        order = %order.id,
                        token = %order.token_id,
                        external = ?order.external_order_id,
                        "order placed"
                    );
                }
                Err(Error::Api { status, body }) if (400..500).contains(&status) => {
                    order.status = OrderStatus::Failed;
                    order.failure_reason = Some(body.clone());
                    self.repo.update_order(&order).await?;
                    plan.status = PlanStatus::Failed;
                    self.repo.update_plan(&plan).await?;
                    return Err(Error::Api { status, body });
                }
                Err(e) => {
                    // Transient: the order row (still `new`) carries the
                    // client id the retry will reuse.
                    warn!(order = %order.id, error = %e, "order placement failed, will retry");
                    return Err(e);
                }
            }
        }
        Ok(plan)
    }

    /// One reconciliation pass over every pollable order.
    pub async fn poll_once(&self) -> Result<usize> {
        let pollable = self
            .repo
            .list_orders_by_status(&[
                OrderStatus::Submitted,
                OrderStatus::Open,
                OrderStatus::Partial,
            ])
            .await?;
        let mut updated = 0;
        for order in pollable {
            match self.poll_order(order).await {
                Ok(true) => updated += 1,
                Ok(false) => {}
                Err(e) if e.is_transient() => {
                    debug!(error = %e, "order poll transient failure");
                }
                Err(e) => warn!(error = %e, "order poll failed"),
            }
        }
        Ok(updated)
    }

    /// Fetch remote state for one order and fold it in. Returns whether
    /// anything changed.
    async fn poll_order(&self, mut order: Order) -> Result<bool> {
        let Some(external_id) = order.external_order_id.clone() else {
            return Ok(false);
        };
        let response = self.exchange.get_order(&external_id).await?;

        let mut changed = false;
        let previous_filled = order.filled_usd;
        if let Some(filled_usd) = response.filled_usd {
            if filled_usd > order.filled_usd {
                order.filled_usd = filled_usd;
                changed = true;
            }
        }
        if let Some(avg_price) = response.avg_price {
            if order.avg_price != Some(avg_price) {
                order.avg_price = Some(avg_price);
                changed = true;
            }
        }
        let fee_delta = match response.fee {
            Some(fee) if fee > order.fee => {
                let delta = fee - order.fee;
                order.fee = fee;
                changed = true;
                delta
            }
            _ => Decimal::ZERO,
        };
        if let Some(reason) = &response.failure_reason {
            if order.failure_reason.as_deref() != Some(reason) {
                order.failure_reason = Some(reason.clone());
                changed = true;
            }
        }

        // The remote status only ever moves the order forward.
        if let Some(remote) = response.order_status() {
            if order.status.can_transition_to(remote) && order.status != remote {
                order.status = remote;
                changed = true;
            }
        }

        let fill_delta_usd = order.filled_usd - previous_filled;
        if fill_delta_usd > Decimal::ZERO {
            let price = order.avg_price.unwrap_or(order.price);
            let filled_size = if price.is_zero() {
                Decimal::ZERO
            } else {
                fill_delta_usd / price
            };
            let slippage = (price - order.price) * filled_size;
            let fill = Fill {
                plan_id: order.plan_id.clone(),
                token_id: order.token_id.clone(),
                direction: order.direction,
                filled_size,
                avg_price: price,
                fee: fee_delta,
                slippage: Some(slippage),
                filled_at: response.filled_at_ts().unwrap_or_else(Utc::now),
            };
            self.repo.insert_fill(&fill).await?;

            if let Some(token) = self.repo.get_token(&order.token_id).await? {
                let plan = self.repo.get_plan(&order.plan_id).await?;
                let strategy = plan.as_ref().map_or("", |p| p.strategy.as_str());
                self.positions
                    .apply_fill(&fill, &token.market_id, strategy)
                    .await?;
            } else {
                warn!(token = %order.token_id, "fill for unknown token; position skipped");
            }
        }

        if changed {
            self.repo.update_order(&order).await?;
            self.update_plan_completion(&order.plan_id).await?;
        }
        Ok(changed)
    }

    /// Recompute a plan's completion from its orders: every leg filled to
    /// at least 98% of its expected size means `executed`; any fill at all
    /// means `partial`.
    async fn update_plan_completion(&self, plan_id: &PlanId) -> Result<()> {
        let Some(mut plan) = self.repo.get_plan(plan_id).await? else {
            return Ok(());
        };
        if plan.status.is_terminal() {
            return Ok(());
        }
        let orders = self.repo.list_orders_by_plan(plan_id).await?;
        let mut filled_by_token: HashMap<&crate::core::domain::TokenId, Decimal> = HashMap::new();
        for order in &orders {
            *filled_by_token.entry(&order.token_id).or_default() += order.filled_usd;
        }

        let mut any_fill = false;
        let mut all_complete = !plan.legs.is_empty();
        for leg in &plan.legs {
            let filled = filled_by_token
                .get(&leg.token_id)
                .copied()
                .unwrap_or_default();
            if filled > Decimal::ZERO {
                any_fill = true;
            }
            if filled < leg.size_usd * FILL_COMPLETE_RATIO {
                all_complete = false;
            }
        }

        if all_complete && plan.status.can_transition_to(PlanStatus::Executed) {
            plan.status = PlanStatus::Executed;
            plan.executed_at = Some(Utc::now());
            self.repo.update_plan(&plan).await?;
            self.repo
                .update_opportunity_status(&plan.opportunity_id, OpportunityStatus::Executed)
                .await?;
            self.journal.capture(&plan).await?;
            info!(plan = %plan.id, "plan executed");
        } else if any_fill
            && plan.status == PlanStatus::Executing
            && plan.status.can_transition_to(PlanStatus::Partial)
        {
            plan.status = PlanStatus::Partial;
            self.repo.update_plan(&plan).await?;
        }
        Ok(())
    }

    /// Cancel one order. Only `submitted|open|partial` orders can be
    /// cancelled; anything else is a conflict.
    pub async fn cancel_order(&self, client_order_id: &str) -> Result<Order> {
        let mut order = self
            .repo
            .get_order_by_client_id(client_order_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("order {client_order_id}")))?;
        if !order.status.is_pollable() {
            return Err(Error::Conflict(format!(
                "order {} is {}, not cancellable",
                order.id,
                order.status.as_str()
            )));
        }
        if let Some(external_id) = order.external_order_id.clone() {
            let response = self.exchange.cancel_order(&external_id).await?;
            let confirmed = response.cancelled_at.is_some()
                || response.order_status() == Some(OrderStatus::Cancelled);
            if !confirmed {
                return Err(Error::Upstream(format!(
                    "cancel of {external_id} not confirmed"
                )));
            }
        }
        order.status = OrderStatus::Cancelled;
        self.repo.update_order(&order).await?;
        info!(order = %order.id, "order cancelled");
        Ok(order)
    }

    /// Cancel a plan: cancel its open orders, then move the plan and its
    /// opportunity to `cancelled`.
    pub async fn cancel_plan(&self, plan_id: &PlanId) -> Result<ExecutionPlan> {
        let mut plan = self
            .repo
            .get_plan(plan_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("plan {plan_id}")))?;
        if !plan.status.can_transition_to(PlanStatus::Cancelled) {
            return Err(Error::Conflict(format!(
                "plan {} is {}, not cancellable",
                plan.id,
                plan.status.as_str()
            )));
        }
        for order in self.repo.list_orders_by_plan(plan_id).await? {
            if order.status.is_pollable() {
                self.cancel_order(&order.client_order_id).await?;
            }
        }
        plan.status = PlanStatus::Cancelled;
        self.repo.update_plan(&plan).await?;
        self.repo
            .update_opportunity_status(&plan.opportunity_id, OpportunityStatus::Cancelled)
            .await?;
        info!(plan = %plan.id, "plan cancelled");
        Ok(plan)
    }

    /// Poll loop; reconciles every `poll_interval`.
    pub async fn run(self: Arc<Self>, shutdown: ShutdownToken) -> Result<()> {
        let mut tick = interval(self.config.poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => return Ok(()),
                _ = tick.tick() => {
                    if let Err(e) = self.poll_once().await {
                        warn!(error = %e, "executor poll pass failed");
                    }
                }
            }
        }
    }
}
