//! Application orchestration: wiring, task spawning and shutdown.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use super::config::{Config, ExecutorMode};
use crate::core::db::{create_pool, run_migrations};
use crate::core::domain::{feature, ExecutionRule, Strategy};
use crate::core::exchange::{BookStream, CatalogClient, TradingClient};
use crate::core::portfolio::{
    JournalService, PositionTracker, ReviewService, SettlementService,
};
use crate::core::service::{
    CatalogSync, DailyStatsService, Labeler, MarketDataIngest, RepoAssetProvider, Scheduler,
    SettingsService,
};
use crate::core::shutdown::ShutdownToken;
use crate::core::signal::collector::{
    CertaintySweepCollector, DepthCollector, InternalScanCollector, OrderbookPatternCollector,
    PricePollCollector, SettlementAggregator, WeatherCollector,
};
use crate::core::signal::SignalHub;
use crate::core::store::{Repository, SharedRepository, SqliteRepository};
use crate::core::strategy::{default_evaluators, StrategyEngine};
use crate::core::trade::{
    AutoExecutor, DryRunExchange, ExchangeApi, ExecutionPlanner, OpportunityManager,
    OrderExecutor, RiskManager,
};
use crate::error::Result;

/// Default priorities for the strategy registry seed, strongest first.
const STRATEGY_SEED: &[(&str, i32)] = &[
    ("arbitrage_sum", 90),
    ("certainty_sweep", 80),
    ("systematic_no", 70),
    ("pre_market_fdv", 60),
    ("btc_short_term", 50),
    ("weather", 45),
    ("news_alpha", 40),
    ("volatility_arb", 35),
    ("contrarian_fear", 30),
    ("mm_behavior", 25),
    ("liquidity_reward", 20),
    ("market_anomaly", 10),
];

/// Composition root for the trading daemon.
pub struct Orchestrator;

impl Orchestrator {
    /// Open the database and run the pipeline until the token cancels.
    pub async fn run(config: Config, shutdown: ShutdownToken) -> Result<()> {
        let pool = create_pool(config.database_path())?;
        run_migrations(&pool)?;
        let repo: SharedRepository = Arc::new(SqliteRepository::new(pool));
        Self::run_with_repo(config, repo, shutdown).await
    }

    /// Run against an externally supplied repository (tests inject the
    /// memory store here).
    pub async fn run_with_repo(
        config: Config,
        repo: SharedRepository,
        shutdown: ShutdownToken,
    ) -> Result<()> {
        seed_registry(&repo).await?;

        let settings = Arc::new(SettingsService::new(Arc::clone(&repo)));
        let catalog_client = Arc::new(CatalogClient::new(
            config.network.gamma_url.clone(),
            config.http_timeout(),
            config.network.page_limit,
        )?);
        let exchange: Arc<dyn ExchangeApi> = match config.executor.mode {
            ExecutorMode::Live => {
                info!("executor in live mode");
                Arc::new(TradingClient::new(
                    config.network.clob_url.clone(),
                    config.http_timeout(),
                    config.trading_auth(),
                )?)
            }
            ExecutorMode::DryRun => {
                info!("executor in dry-run mode");
                Arc::new(DryRunExchange::new())
            }
        };

        let ingest = Arc::new(MarketDataIngest::new(
            Arc::clone(&repo),
            config.ingest_config(),
        ));
        let positions = Arc::new(PositionTracker::new(Arc::clone(&repo)));
        let journal = Arc::new(JournalService::new(Arc::clone(&repo)));
        let risk = Arc::new(RiskManager::new(Arc::clone(&repo), config.risk_config()));
        let planner = Arc::new(ExecutionPlanner::new(Arc::clone(&repo)));
        let executor = Arc::new(OrderExecutor::new(
            Arc::clone(&repo),
            exchange,
            Arc::clone(&positions),
            Arc::clone(&journal),
            config.executor_config(),
        ));
        let opportunities = Arc::new(OpportunityManager::new(
            Arc::clone(&repo),
            config.opportunity_config(),
        ));
        let engine = Arc::new(StrategyEngine::new(
            Arc::clone(&repo),
            config.engine_config(),
            default_evaluators(),
            Arc::clone(&opportunities),
        ));
        let auto_executor = Arc::new(AutoExecutor::new(
            Arc::clone(&repo),
            Arc::clone(&risk),
            Arc::clone(&planner),
            Arc::clone(&executor),
            config.auto_executor_config(),
        ));

        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        // Live book stream feeding the ingest queue.
        if settings
            .feature_enabled(feature::CLOB_STREAM, true)
            .await?
        {
            let (events_tx, events_rx) = tokio::sync::mpsc::channel(256);
            let stream = BookStream::new(
                config.stream_config(),
                RepoAssetProvider::new(Arc::clone(&repo)),
            );
            tasks.push(spawn_task(
                "book_stream",
                stream.run(events_tx, shutdown.clone()),
            ));
            tasks.push(spawn_task(
                "market_data_ingest",
                Arc::clone(&ingest).run(events_rx, shutdown.clone()),
            ));
        }

        // Catalog sync with its REST book refresh.
        if settings
            .feature_enabled(feature::CATALOG_SYNC, true)
            .await?
        {
            let sync = Arc::new(CatalogSync::new(
                Arc::clone(&repo),
                Arc::clone(&catalog_client),
                Arc::clone(&ingest),
                config.catalog_sync_config(),
            ));
            tasks.push(spawn_task("catalog_sync", sync.run(shutdown.clone())));
        }

        // Signal hub and collectors.
        let hub = Arc::new(SignalHub::new(Arc::clone(&repo)));
        if settings
            .feature_enabled(feature::COLLECTORS_INTERNAL, true)
            .await?
        {
            hub.register(Arc::new(InternalScanCollector::new(
                Arc::clone(&repo),
                config.internal_scan_config(),
            )));
            hub.register(Arc::new(SettlementAggregator::new(
                Arc::clone(&repo),
                config.settlement_aggregator_config(),
            )));
            hub.register(Arc::new(OrderbookPatternCollector::new(
                Arc::clone(&repo),
                config.pattern_config(),
            )));
            hub.register(Arc::new(CertaintySweepCollector::new(
                Arc::clone(&repo),
                config.sweep_config(),
            )));
        }
        if settings
            .feature_enabled(feature::COLLECTORS_EXTERNAL, true)
            .await?
        {
            if let Some(depth) = config.depth_config() {
                hub.register(Arc::new(DepthCollector::new(depth)));
            }
            if let Some(price) = config.price_config() {
                hub.register(Arc::new(PricePollCollector::new(price)?));
            }
            if let Some(weather) = config.weather_config() {
                hub.register(Arc::new(WeatherCollector::new(weather)?));
            }
        }
        tasks.push(spawn_task(
            "signal_hub",
            Arc::clone(&hub).run(shutdown.clone()),
        ));

        // Strategy engine tick loop, gated per tick so the switch works at
        // runtime. Off by default.
        {
            let engine = Arc::clone(&engine);
            let settings = Arc::clone(&settings);
            let token = shutdown.clone();
            let period = config.engine_config().tick_interval;
            tasks.push(spawn_task("strategy_engine", async move {
                let mut tick = interval(period);
                tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        () = token.cancelled() => return Ok(()),
                        _ = tick.tick() => {
                            match settings
                                .feature_enabled(feature::STRATEGY_ENGINE, false)
                                .await
                            {
                                Ok(true) => {
                                    if let Err(e) = engine.tick().await {
                                        warn!(error = %e, "strategy tick failed");
                                    }
                                }
                                Ok(false) => {}
                                Err(e) => warn!(error = %e, "feature check failed"),
                            }
                        }
                    }
                }
            }));
        }

        // Auto-executor, gated per scan. Off by default.
        {
            let auto_executor = Arc::clone(&auto_executor);
            let settings = Arc::clone(&settings);
            let token = shutdown.clone();
            let period = config.auto_executor_config().scan_interval;
            tasks.push(spawn_task("auto_executor", async move {
                let mut tick = interval(period);
                tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        () = token.cancelled() => return Ok(()),
                        _ = tick.tick() => {
                            match settings
                                .feature_enabled(feature::AUTO_EXECUTOR, false)
                                .await
                            {
                                Ok(true) => {
                                    if let Err(e) = auto_executor.scan_once().await {
                                        warn!(error = %e, "auto-executor scan failed");
                                    }
                                }
                                Ok(false) => {}
                                Err(e) => warn!(error = %e, "feature check failed"),
                            }
                        }
                    }
                }
            }));
        }

        // Order poll loop and position maintenance run unconditionally:
        // open orders and positions must reconcile even when the strategy
        // side is switched off.
        tasks.push(spawn_task(
            "order_executor",
            Arc::clone(&executor).run(shutdown.clone()),
        ));
        tasks.push(spawn_task(
            "position_tracker",
            Arc::clone(&positions).run(shutdown.clone()),
        ));

        // Periodic housekeeping via the scheduler; each job re-checks its
        // feature switch at every firing.
        let mut scheduler = Scheduler::new();
        {
            let repo = Arc::clone(&repo);
            scheduler.add("signal_cleanup", "60s", move || {
                let repo = Arc::clone(&repo);
                async move {
                    let removed = repo.delete_expired_signals(chrono::Utc::now()).await?;
                    if removed > 0 {
                        info!(removed, "expired signals cleaned up");
                    }
                    Ok(())
                }
            })?;
        }
        {
            let labeler = Arc::new(Labeler::new(
                Arc::clone(&repo),
                crate::core::service::default_rules(),
            ));
            let settings = Arc::clone(&settings);
            scheduler.add("labeler", "10m", move || {
                let labeler = Arc::clone(&labeler);
                let settings = Arc::clone(&settings);
                async move {
                    if settings.feature_enabled(feature::LABELER, true).await? {
                        labeler.label_markets().await?;
                    }
                    Ok(())
                }
            })?;
        }
        {
            let stats = Arc::new(DailyStatsService::new(Arc::clone(&repo)));
            let settings = Arc::clone(&settings);
            scheduler.add("daily_stats", "15m", move || {
                let stats = Arc::clone(&stats);
                let settings = Arc::clone(&settings);
                async move {
                    if settings.feature_enabled(feature::DAILY_STATS, true).await? {
                        stats.rollup().await?;
                    }
                    Ok(())
                }
            })?;
        }
        {
            let review = Arc::new(ReviewService::new(Arc::clone(&repo)));
            let settings = Arc::clone(&settings);
            scheduler.add("market_review", "1h", move || {
                let review = Arc::clone(&review);
                let settings = Arc::clone(&settings);
                async move {
                    if settings
                        .feature_enabled(feature::REVIEW_SERVICE, true)
                        .await?
                    {
                        review.review_settled().await?;
                    }
                    Ok(())
                }
            })?;
        }
        tasks.push(spawn_task("scheduler", scheduler.run(shutdown.clone())));

        info!(tasks = tasks.len(), "pipeline running");
        shutdown.cancelled().await;
        info!("shutdown signalled, draining tasks");
        for task in tasks {
            let _ = task.await;
        }
        info!("pipeline stopped");
        Ok(())
    }
}

/// Settlement surface for admin callers (kept separate from the task
/// wiring because settlement is request-driven, not periodic).
#[must_use]
pub fn settlement_service(repo: SharedRepository) -> SettlementService {
    SettlementService::new(repo)
}

fn spawn_task(
    name: &'static str,
    future: impl std::future::Future<Output = Result<()>> + Send + 'static,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match future.await {
            Ok(()) => info!(task = name, "task finished"),
            Err(e) if e.is_cancelled() => info!(task = name, "task cancelled"),
            Err(e) => warn!(task = name, error = %e, "task exited with error"),
        }
    })
}

/// Ensure every evaluator has a registry row and an execution rule, so
/// operators can flip `enabled` without inserting rows by hand. Existing
/// rows are left untouched.
async fn seed_registry(repo: &SharedRepository) -> Result<()> {
    for (name, priority) in STRATEGY_SEED {
        if repo.get_strategy(name).await?.is_none() {
            repo.upsert_strategy(&Strategy::new(*name, *priority)).await?;
        }
        if repo.get_execution_rule(name).await?.is_none() {
            repo.upsert_execution_rule(&ExecutionRule::defaults_for(*name))
                .await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shutdown::ShutdownController;
    use crate::core::store::MemoryRepository;
    use std::time::Duration;

    #[tokio::test]
    async fn registry_seed_is_idempotent_and_disabled() {
        let repo: SharedRepository = Arc::new(MemoryRepository::new());
        seed_registry(&repo).await.unwrap();
        seed_registry(&repo).await.unwrap();

        let strategy = repo.get_strategy("arbitrage_sum").await.unwrap().unwrap();
        assert!(!strategy.enabled);
        let rule = repo.get_execution_rule("arbitrage_sum").await.unwrap().unwrap();
        assert!(!rule.auto_execute);
        // No enabled strategies out of the box.
        assert!(repo.list_enabled_strategies().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pipeline_starts_and_observes_shutdown() {
        let repo: SharedRepository = Arc::new(MemoryRepository::new());
        let (controller, token) = ShutdownController::new();
        // Keep network-facing subsystems off; the smoke test only needs
        // the wiring and teardown paths.
        let mut config = Config::default();
        config.network.ws_url = "wss://unreachable.invalid/ws".into();

        let handle = tokio::spawn(Orchestrator::run_with_repo(config, repo, token));
        tokio::time::sleep(Duration::from_millis(200)).await;
        controller.shutdown();

        // Every task must observe cancellation well within a second.
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("pipeline should stop after shutdown")
            .expect("join")
            .expect("clean exit");
    }
}
