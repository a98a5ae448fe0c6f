//! Decision-chain journal and daily rollups.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::id::PlanId;

/// Captured decision chain for one executed plan: the signals that drove
/// it, the market state at decision time, the entry parameters, and (after
/// settlement) the outcome. Notes and tags are appended by humans later.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    pub plan_id: PlanId,
    pub strategy: String,
    /// Snapshot of the contributing signals at decision time.
    pub signals: serde_json::Value,
    /// Book/market state per leg at decision time.
    pub decision_state: serde_json::Value,
    /// Sizing and execution parameters the plan ran with.
    pub entry_params: serde_json::Value,
    /// Filled-in after settlement.
    pub outcome_state: Option<serde_json::Value>,
    pub notes: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

/// One day of pipeline counters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DailyStats {
    /// Day in `YYYY-MM-DD` (UTC).
    pub date: String,
    pub opportunities_detected: u32,
    pub opportunities_executed: u32,
    pub opportunities_expired: u32,
    pub plans_created: u32,
    pub plans_executed: u32,
    pub realized_pnl: Decimal,
    pub win_count: u32,
    pub loss_count: u32,
}

/// One day of per-strategy counters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StrategyDailyStats {
    pub date: String,
    pub strategy: String,
    pub opportunities_detected: u32,
    pub opportunities_executed: u32,
    pub plans_executed: u32,
    pub realized_pnl: Decimal,
    pub win_count: u32,
    pub loss_count: u32,
}
