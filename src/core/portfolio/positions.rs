//! Position derivation and maintenance.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::core::domain::{Fill, MarketId, PortfolioSnapshot, Position};
use crate::core::store::{Repository, SharedRepository};
use crate::error::Result;

/// Applies fills to positions and keeps marks fresh.
///
/// Fills for a single token are applied in `filled_at` order by the
/// executor's poll loop; the per-token row in the store is the only
/// mutable state.
pub struct PositionTracker {
    repo: SharedRepository,
}

impl PositionTracker {
    #[must_use]
    pub fn new(repo: SharedRepository) -> Self {
        Self { repo }
    }

    /// Fold one fill into its token's position.
    pub async fn apply_fill(
        &self,
        fill: &Fill,
        market_id: &MarketId,
        strategy: &str,
    ) -> Result<Position> {
        let position = match self.repo.get_position(&fill.token_id).await? {
            Some(mut existing) => {
                existing.apply_fill(fill);
                existing
            }
            None => Position::open_from_fill(fill, market_id.clone(), strategy.to_string()),
        };
        self.repo.upsert_position(&position).await?;
        debug!(
            token = %position.token_id,
            quantity = %position.quantity,
            avg_entry = %position.avg_entry_price,
            "position updated"
        );
        Ok(position)
    }

    /// Refresh marks on every open position from the latest book (mid) or
    /// last trade.
    pub async fn sync_marks(&self) -> Result<usize> {
        let mut updated = 0;
        for mut position in self.repo.list_open_positions().await? {
            let book_mid = self
                .repo
                .get_book(&position.token_id)
                .await?
                .and_then(|b| b.mid());
            let mark = match book_mid {
                Some(mid) => Some(mid),
                None => self
                    .repo
                    .get_last_trade(&position.token_id)
                    .await?
                    .map(|t| t.price),
            };
            let Some(mark) = mark else {
                continue;
            };
            position.mark(mark);
            self.repo.upsert_position(&position).await?;
            updated += 1;
        }
        Ok(updated)
    }

    /// Aggregate open positions into an append-only snapshot row.
    pub async fn snapshot_portfolio(&self) -> Result<PortfolioSnapshot> {
        let positions = self.repo.list_open_positions().await?;
        let mut total_cost_basis = Decimal::ZERO;
        let mut total_market_value = Decimal::ZERO;
        let mut unrealized = Decimal::ZERO;
        let mut realized = Decimal::ZERO;
        for position in &positions {
            total_cost_basis += position.cost_basis;
            total_market_value += position.market_value();
            unrealized += position.unrealized_pnl;
            realized += position.realized_pnl;
        }
        let snapshot = PortfolioSnapshot {
            snapshot_at: Utc::now(),
            total_cost_basis,
            total_market_value,
            unrealized_pnl: unrealized,
            realized_pnl: realized,
            net_liquidation: total_market_value,
        };
        self.repo.insert_portfolio_snapshot(&snapshot).await?;
        info!(
            positions = positions.len(),
            market_value = %snapshot.total_market_value,
            unrealized = %snapshot.unrealized_pnl,
            "portfolio snapshot"
        );
        Ok(snapshot)
    }

    /// Periodic mark refresh loop (30s) plus hourly snapshots.
    pub async fn run(
        self: std::sync::Arc<Self>,
        shutdown: crate::core::shutdown::ShutdownToken,
    ) -> Result<()> {
        let mut mark_tick = tokio::time::interval(std::time::Duration::from_secs(30));
        mark_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut snapshot_tick = tokio::time::interval(std::time::Duration::from_secs(60 * 60));
        snapshot_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        snapshot_tick.tick().await; // skip the immediate first firing
        loop {
            tokio::select! {
                () = shutdown.cancelled() => return Ok(()),
                _ = mark_tick.tick() => {
                    if let Err(e) = self.sync_marks().await {
                        warn!(error = %e, "position mark sync failed");
                    }
                }
                _ = snapshot_tick.tick() => {
                    if let Err(e) = self.snapshot_portfolio().await {
                        warn!(error = %e, "portfolio snapshot failed");
                    }
                }
            }
        }
    }
}
