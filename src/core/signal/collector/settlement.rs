//! Settlement-history aggregator.
//!
//! Recomputes per-label NO-rates from the settlement history, persists
//! them into the `systematic_no` strategy's stats (where the internal
//! scanner reads its learned priors), and emits a `settlement_no_rates`
//! signal for observability.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use super::{Collector, HealthCell, HealthSnapshot, SignalEmitter};
use crate::core::domain::{Direction, Outcome, Signal, SignalType, SourceInfo, SourceType};
use crate::core::shutdown::ShutdownToken;
use crate::core::store::{Repository, SharedRepository};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct SettlementAggregatorConfig {
    pub aggregate_interval: Duration,
    /// Recorded alongside the rates; consumers ignore the table below this
    /// evidence level.
    pub min_samples: u64,
}

impl Default for SettlementAggregatorConfig {
    fn default() -> Self {
        Self {
            aggregate_interval: Duration::from_secs(30 * 60),
            min_samples: 10,
        }
    }
}

pub struct SettlementAggregator {
    repo: SharedRepository,
    config: SettlementAggregatorConfig,
    health: HealthCell,
}

impl SettlementAggregator {
    #[must_use]
    pub fn new(repo: SharedRepository, config: SettlementAggregatorConfig) -> Self {
        Self {
            repo,
            config,
            health: HealthCell::new(),
        }
    }

    async fn aggregate(&self, out: &SignalEmitter) -> Result<()> {
        let settlements = self.repo.list_settlements().await?;
        if settlements.is_empty() {
            return Ok(());
        }

        let mut per_label: HashMap<String, (u64, u64)> = HashMap::new();
        for settlement in &settlements {
            for label in &settlement.labels {
                let entry = per_label.entry(label.clone()).or_insert((0, 0));
                entry.1 += 1;
                if settlement.outcome == Outcome::No {
                    entry.0 += 1;
                }
            }
        }

        let total_samples = settlements.len() as u64;
        let rates: serde_json::Map<String, serde_json::Value> = per_label
            .iter()
            .map(|(label, (no_count, total))| {
                let rate = *no_count as f64 / *total as f64;
                (label.clone(), json!(rate))
            })
            .collect();
        let sample_counts: serde_json::Map<String, serde_json::Value> = per_label
            .iter()
            .map(|(label, (_, total))| (label.clone(), json!(total)))
            .collect();

        let stats = json!({
            "category_no_rates": rates,
            "category_samples": sample_counts,
            "min_samples": total_samples.min(u64::from(u32::MAX)),
            "aggregated_at": Utc::now().to_rfc3339(),
        });

        // The strategy row may not exist yet on a fresh database.
        if let Err(e) = self.repo.update_strategy_stats("systematic_no", &stats).await {
            warn!(error = %e, "could not persist settlement aggregates");
        } else {
            info!(
                labels = per_label.len(),
                samples = total_samples,
                "settlement NO-rates refreshed"
            );
        }

        let signal = Signal::builder(SignalType::SettlementNoRates, self.name())
            .direction(Direction::Neutral)
            .strength(1.0)
            .expires_at(Utc::now() + chrono::Duration::hours(6))
            .payload(stats)
            .build();
        out.emit(signal);
        Ok(())
    }
}

#[async_trait]
impl Collector for SettlementAggregator {
    fn name(&self) -> &'static str {
        "settlement_aggregator"
    }

    fn source_info(&self) -> SourceInfo {
        SourceInfo {
            source_type: SourceType::Aggregate,
            endpoint: "store".into(),
            poll_interval: self.config.aggregate_interval,
        }
    }

    async fn produce(&self, out: SignalEmitter, shutdown: ShutdownToken) -> Result<()> {
        let mut tick = interval(self.config.aggregate_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => return Ok(()),
                _ = tick.tick() => {
                    match self.aggregate(&out).await {
                        Ok(()) => self.health.healthy(),
                        Err(e) => {
                            warn!(error = %e, "settlement aggregation failed");
                            self.health.down(e.to_string());
                        }
                    }
                }
            }
        }
    }

    fn health(&self) -> HealthSnapshot {
        self.health.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{EventId, MarketId, MarketSettlement, Strategy};
    use crate::core::store::{MemoryRepository, Repository};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn settlement(market: &str, outcome: Outcome, labels: &[&str]) -> MarketSettlement {
        MarketSettlement {
            market_id: MarketId::from(market),
            event_id: EventId::from("e1"),
            outcome,
            labels: labels.iter().map(ToString::to_string).collect(),
            initial_yes_price: None,
            final_yes_price: None,
            settled_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn no_rates_are_count_ratios() {
        let repo = Arc::new(MemoryRepository::new());
        repo.upsert_strategy(&Strategy::new("systematic_no", 5))
            .await
            .unwrap();
        for (market, outcome) in [
            ("m1", Outcome::No),
            ("m2", Outcome::No),
            ("m3", Outcome::No),
            ("m4", Outcome::Yes),
        ] {
            repo.upsert_settlement(&settlement(market, outcome, &["pre_market_fdv"]))
                .await
                .unwrap();
        }

        let aggregator = SettlementAggregator::new(
            Arc::clone(&repo) as SharedRepository,
            SettlementAggregatorConfig::default(),
        );
        let (tx, mut rx) = mpsc::channel(4);
        aggregator
            .aggregate(&SignalEmitter::new(tx))
            .await
            .unwrap();

        let strategy = repo.get_strategy("systematic_no").await.unwrap().unwrap();
        let rate = strategy.stats["category_no_rates"]["pre_market_fdv"]
            .as_f64()
            .unwrap();
        assert!((rate - 0.75).abs() < 1e-9, "got {rate}");

        let signal = rx.try_recv().unwrap();
        assert_eq!(signal.signal_type, SignalType::SettlementNoRates);
        let ttl = signal.expires_at.unwrap() - Utc::now();
        assert!(ttl > chrono::Duration::hours(5));
    }

    #[tokio::test]
    async fn empty_history_emits_nothing() {
        let repo = Arc::new(MemoryRepository::new());
        let aggregator = SettlementAggregator::new(
            Arc::clone(&repo) as SharedRepository,
            SettlementAggregatorConfig::default(),
        );
        let (tx, mut rx) = mpsc::channel(4);
        aggregator
            .aggregate(&SignalEmitter::new(tx))
            .await
            .unwrap();
        assert!(rx.try_recv().is_err());
    }
}
