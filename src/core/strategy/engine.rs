//! The strategy engine tick loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};

use super::{Evaluator, Snapshot};
use crate::core::domain::Candidate;
use crate::core::store::{Repository, SharedRepository};
use crate::core::trade::OpportunityManager;
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct StrategyEngineConfig {
    pub tick_interval: Duration,
    /// How far back the snapshot's signal view reaches.
    pub signal_window: Duration,
}

impl Default for StrategyEngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(30),
            signal_window: Duration::from_secs(10 * 60),
        }
    }
}

/// Ticks on a schedule, joins signals with market state and runs the
/// enabled evaluators in priority order.
pub struct StrategyEngine {
    repo: SharedRepository,
    config: StrategyEngineConfig,
    evaluators: HashMap<&'static str, Arc<dyn Evaluator>>,
    opportunities: Arc<OpportunityManager>,
}

impl StrategyEngine {
    #[must_use]
    pub fn new(
        repo: SharedRepository,
        config: StrategyEngineConfig,
        evaluators: Vec<Arc<dyn Evaluator>>,
        opportunities: Arc<OpportunityManager>,
    ) -> Self {
        let evaluators = evaluators.into_iter().map(|e| (e.name(), e)).collect();
        Self {
            repo,
            config,
            evaluators,
            opportunities,
        }
    }

    /// One evaluation pass. Returns the number of candidates produced.
    pub async fn tick(&self) -> Result<usize> {
        let strategies = self.repo.list_enabled_strategies().await?;
        if strategies.is_empty() {
            debug!("no enabled strategies");
            return Ok(0);
        }
        let names: Vec<String> = strategies.iter().map(|s| s.name.clone()).collect();
        let window = chrono::Duration::from_std(self.config.signal_window)
            .unwrap_or_else(|_| chrono::Duration::minutes(10));
        let snapshot = Snapshot::build(&self.repo, window, &names).await?;

        let mut candidates: Vec<Candidate> = Vec::new();
        let mut produced_by: HashMap<String, usize> = HashMap::new();
        for strategy in &strategies {
            let Some(evaluator) = self.evaluators.get(strategy.name.as_str()) else {
                debug!(strategy = %strategy.name, "no evaluator registered");
                continue;
            };
            let mut found = evaluator.evaluate(&snapshot);
            produced_by.insert(strategy.name.clone(), found.len());
            candidates.append(&mut found);
        }

        let produced = candidates.len();
        if produced > 0 {
            info!(candidates = produced, "strategy tick produced candidates");
        }
        self.opportunities.admit(candidates).await?;
        self.opportunities.age_out().await?;
        self.record_run(&produced_by).await;
        Ok(produced)
    }

    /// Fold per-run counters into each strategy's stats without clobbering
    /// learned state kept under other keys.
    async fn record_run(&self, produced_by: &HashMap<String, usize>) {
        for (name, produced) in produced_by {
            let Ok(Some(strategy)) = self.repo.get_strategy(name).await else {
                continue;
            };
            let mut stats = match strategy.stats {
                serde_json::Value::Object(map) => map,
                _ => serde_json::Map::new(),
            };
            let runs = stats
                .get("engine_runs")
                .and_then(serde_json::Value::as_u64)
                .unwrap_or(0);
            let total = stats
                .get("candidates_produced")
                .and_then(serde_json::Value::as_u64)
                .unwrap_or(0);
            stats.insert("engine_runs".into(), json!(runs + 1));
            stats.insert(
                "candidates_produced".into(),
                json!(total + *produced as u64),
            );
            stats.insert("last_run_at".into(), json!(Utc::now().to_rfc3339()));
            let stats = serde_json::Value::Object(stats);
            if let Err(e) = self.repo.update_strategy_stats(name, &stats).await {
                warn!(strategy = %name, error = %e, "stats update failed");
            }
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{
        BookSnapshot, Direction, Event, EventId, Market, MarketId, OpportunityStatus, Outcome,
        PriceLevel, Signal, SignalType, Strategy, Token, TokenId,
    };
    use crate::core::store::{MemoryRepository, Repository};
    use crate::core::strategy::default_evaluators;
    use crate::core::trade::{OpportunityManager, OpportunityManagerConfig};
    use rust_decimal_macros::dec;

    async fn seed_arb_event(repo: &dyn Repository) {
        repo.upsert_event(&Event {
            id: EventId::from("e1"),
            slug: "e1".into(),
            title: "E".into(),
            active: true,
            closed: false,
            end_time: None,
            series_id: None,
        })
        .await
        .unwrap();
        for (market, yes_token, mid) in [("ma", "ta", dec!(0.40)), ("mb", "tb", dec!(0.45))] {
            repo.upsert_market(&Market {
                id: MarketId::from(market),
                event_id: EventId::from("e1"),
                slug: market.into(),
                question: "?".into(),
                condition_id: format!("0x{market}"),
                tick_size: dec!(0.01),
                active: true,
                closed: false,
                neg_risk: false,
            })
            .await
            .unwrap();
            repo.upsert_token(&Token {
                id: TokenId::from(yes_token),
                market_id: MarketId::from(market),
                outcome: Outcome::Yes,
            })
            .await
            .unwrap();
            repo.upsert_token(&Token {
                id: TokenId::from(format!("{yes_token}-no")),
                market_id: MarketId::from(market),
                outcome: Outcome::No,
            })
            .await
            .unwrap();
            repo.upsert_book(&BookSnapshot::new(
                TokenId::from(yes_token),
                chrono::Utc::now(),
                vec![PriceLevel::new(mid, dec!(500))],
                vec![PriceLevel::new(mid, dec!(500))],
            ))
            .await
            .unwrap();
        }
        let signal = Signal::builder(SignalType::ArbSumDeviation, "internal_scan")
            .event(EventId::from("e1"))
            .direction(Direction::Yes)
            .strength(1.0)
            .created_at(chrono::Utc::now())
            .expires_at(chrono::Utc::now() + chrono::Duration::minutes(2))
            .build();
        repo.insert_signal(&signal).await.unwrap();
    }

    fn engine(repo: &std::sync::Arc<MemoryRepository>) -> StrategyEngine {
        let shared = std::sync::Arc::clone(repo) as SharedRepository;
        StrategyEngine::new(
            std::sync::Arc::clone(&shared),
            StrategyEngineConfig::default(),
            default_evaluators(),
            Arc::new(OpportunityManager::new(
                shared,
                OpportunityManagerConfig::default(),
            )),
        )
    }

    #[tokio::test]
    async fn tick_turns_arb_signal_into_opportunity() {
        let repo = std::sync::Arc::new(MemoryRepository::new());
        seed_arb_event(repo.as_ref()).await;
        let mut strategy = Strategy::new("arbitrage_sum", 9);
        strategy.enabled = true;
        repo.upsert_strategy(&strategy).await.unwrap();

        let produced = engine(&repo).tick().await.unwrap();
        assert_eq!(produced, 1);

        let active = repo
            .list_opportunities_by_status(OpportunityStatus::Active)
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].edge_pct, dec!(0.15));
        assert_eq!(active[0].legs.len(), 2);
    }

    #[tokio::test]
    async fn disabled_strategies_do_not_run() {
        let repo = std::sync::Arc::new(MemoryRepository::new());
        seed_arb_event(repo.as_ref()).await;
        // arbitrage_sum exists but is disabled.
        repo.upsert_strategy(&Strategy::new("arbitrage_sum", 9))
            .await
            .unwrap();

        let produced = engine(&repo).tick().await.unwrap();
        assert_eq!(produced, 0);
    }

    #[tokio::test]
    async fn tick_records_run_stats() {
        let repo = std::sync::Arc::new(MemoryRepository::new());
        seed_arb_event(repo.as_ref()).await;
        let mut strategy = Strategy::new("arbitrage_sum", 9);
        strategy.enabled = true;
        repo.upsert_strategy(&strategy).await.unwrap();

        engine(&repo).tick().await.unwrap();

        let stored = repo.get_strategy("arbitrage_sum").await.unwrap().unwrap();
        assert_eq!(stored.stats["engine_runs"], 1);
        assert_eq!(stored.stats["candidates_produced"], 1);
    }
}
