//! Strategy registry rows and per-strategy execution rules.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// A registered strategy. `enabled` and `priority` control evaluation
/// order; `stats` carries learned state (e.g. category NO-rates).
#[derive(Debug, Clone, PartialEq)]
pub struct Strategy {
    pub name: String,
    pub enabled: bool,
    pub priority: i32,
    pub params: serde_json::Value,
    pub required_signals: Vec<String>,
    pub stats: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

impl Strategy {
    #[must_use]
    pub fn new(name: impl Into<String>, priority: i32) -> Self {
        Self {
            name: name.into(),
            enabled: false,
            priority,
            params: serde_json::json!({}),
            required_signals: Vec::new(),
            stats: serde_json::json!({}),
            updated_at: Utc::now(),
        }
    }
}

/// Per-strategy execution governance for the auto-executor.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRule {
    pub strategy: String,
    pub auto_execute: bool,
    /// Minimum candidate confidence. Float: a statistic.
    pub min_confidence: f64,
    pub min_edge_pct: Decimal,
    pub stop_loss_pct: Option<Decimal>,
    pub take_profit_pct: Option<Decimal>,
    pub max_hold_hours: Option<u32>,
    pub max_daily_trades: u32,
    pub max_per_trade_usd: Decimal,
}

impl ExecutionRule {
    /// Conservative defaults: manual execution only.
    #[must_use]
    pub fn defaults_for(strategy: impl Into<String>) -> Self {
        Self {
            strategy: strategy.into(),
            auto_execute: false,
            min_confidence: 0.5,
            min_edge_pct: Decimal::new(2, 2), // 0.02
            stop_loss_pct: None,
            take_profit_pct: None,
            max_hold_hours: None,
            max_daily_trades: 10,
            max_per_trade_usd: Decimal::from(100),
        }
    }
}
