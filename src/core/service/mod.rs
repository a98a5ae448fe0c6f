//! Long-running services around the trading pipeline.

pub mod catalog_sync;
pub mod daily_stats;
pub mod ingest;
pub mod labeler;
pub mod scheduler;
pub mod settings;

pub use catalog_sync::{CatalogSync, CatalogSyncConfig};
pub use daily_stats::DailyStatsService;
pub use ingest::{IngestConfig, MarketDataIngest, RepoAssetProvider};
pub use labeler::{default_rules, LabelRule, Labeler};
pub use scheduler::Scheduler;
pub use settings::SettingsService;
