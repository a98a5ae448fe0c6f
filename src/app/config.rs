//! Application configuration loading and validation.
//!
//! Configuration is loaded from a TOML file with environment variable
//! overrides for sensitive values. `PM_CONFIG` points at the file
//! (default `config/config.toml`); `PM_ENV_ONLY=true` skips the file and
//! builds the config from defaults plus environment.

use std::fs;
use std::path::Path;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::core::exchange::{StreamConfig, TradingAuth};
use crate::core::service::{CatalogSyncConfig, IngestConfig};
use crate::core::signal::collector::{
    CertaintySweepConfig, DepthConfig, InternalScanConfig, OrderbookPatternConfig,
    PricePollConfig, SettlementAggregatorConfig, WeatherConfig,
};
use crate::core::strategy::StrategyEngineConfig;
use crate::core::trade::{AutoExecutorConfig, ExecutorConfig, OpportunityManagerConfig, RiskConfig};
use crate::error::{Error, Result};

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Catalog API base URL.
    pub gamma_url: String,
    /// Trading API base URL.
    pub clob_url: String,
    /// Market-data WebSocket URL.
    pub ws_url: String,
    pub http_timeout_secs: u64,
    pub page_limit: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            gamma_url: "https://gamma-api.polymarket.com".into(),
            clob_url: "https://clob.polymarket.com".into(),
            ws_url: "wss://ws-subscriptions-clob.polymarket.com/ws/market".into(),
            http_timeout_secs: 10,
            page_limit: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `parlay=debug,info`.
    pub level: String,
    /// Emit JSON log lines instead of human-readable ones.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Install the global subscriber. Call once at startup.
    pub fn init(&self) {
        use tracing_subscriber::{fmt, EnvFilter};
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.clone()));
        if self.json {
            let _ = fmt().with_env_filter(filter).json().try_init();
        } else {
            let _ = fmt().with_env_filter(filter).try_init();
        }
    }
}

/// How placed orders reach the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutorMode {
    Live,
    #[default]
    DryRun,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExecutorSection {
    pub mode: ExecutorMode,
    pub poll_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    pub bearer_token: Option<String>,
    pub api_key: Option<String>,
    pub hmac_secret: Option<String>,
    pub passphrase: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskSection {
    pub bankroll: Decimal,
    pub max_kelly: f64,
    pub min_confidence: f64,
    pub freshness_cap_secs: i64,
    pub edge_retention: f64,
    pub spread_cap_bps: f64,
}

impl Default for RiskSection {
    fn default() -> Self {
        let defaults = RiskConfig::default();
        Self {
            bankroll: defaults.bankroll,
            max_kelly: defaults.max_kelly,
            min_confidence: defaults.min_confidence,
            freshness_cap_secs: defaults.freshness_cap_secs,
            edge_retention: defaults.edge_retention,
            spread_cap_bps: defaults.spread_cap_bps,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub tick_interval_secs: Option<u64>,
    pub signal_window_secs: Option<u64>,
    pub max_opportunities_per_strategy: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CollectorsSection {
    /// Depth stream URL; the collector is skipped when unset.
    pub depth_url: Option<String>,
    /// Spot price poll URL; the collector is skipped when unset.
    pub price_url: Option<String>,
    pub price_trigger_pct: Option<f64>,
    /// Weather endpoints as `(url_template, api_key, weight, pointer)`.
    pub weather_endpoints: Vec<WeatherEndpointSection>,
    pub weather_cities: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeatherEndpointSection {
    pub url_template: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    pub temperature_pointer: String,
}

fn default_weight() -> f64 {
    1.0
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub network: NetworkConfig,
    pub logging: LoggingConfig,
    #[serde(rename = "database")]
    pub database_path: Option<String>,
    pub auth: AuthSection,
    pub executor: ExecutorSection,
    pub risk: RiskSection,
    pub engine: EngineSection,
    pub collectors: CollectorsSection,
}

impl Config {
    /// Load configuration honoring `PM_CONFIG` and `PM_ENV_ONLY`.
    pub fn load() -> Result<Self> {
        let env_only = std::env::var("PM_ENV_ONLY")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let path =
            std::env::var("PM_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        let mut config = if env_only || !Path::new(&path).exists() {
            Self::default()
        } else {
            Self::from_file(&path)?
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse one TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {path}: {e}")))?;
        toml::from_str(&content).map_err(|e| Error::Config(format!("cannot parse {path}: {e}")))
    }

    /// Environment overrides for endpoints and credentials.
    fn apply_env(&mut self) {
        let overrides: &mut [(&str, &mut Option<String>)] = &mut [
            ("PM_CLOB_API_KEY", &mut self.auth.api_key),
            ("PM_CLOB_SECRET", &mut self.auth.hmac_secret),
            ("PM_CLOB_PASSPHRASE", &mut self.auth.passphrase),
            ("PM_CLOB_ADDRESS", &mut self.auth.address),
            ("PM_BEARER_TOKEN", &mut self.auth.bearer_token),
            ("PM_DB_PATH", &mut self.database_path),
        ];
        for (var, slot) in overrides.iter_mut() {
            if let Ok(value) = std::env::var(var) {
                **slot = Some(value);
            }
        }
        if let Ok(url) = std::env::var("PM_GAMMA_URL") {
            self.network.gamma_url = url;
        }
        if let Ok(url) = std::env::var("PM_CLOB_URL") {
            self.network.clob_url = url;
        }
        if let Ok(url) = std::env::var("PM_WS_URL") {
            self.network.ws_url = url;
        }
        if let Ok(mode) = std::env::var("PM_EXECUTOR_MODE") {
            match mode.as_str() {
                "live" => self.executor.mode = ExecutorMode::Live,
                "dry-run" => self.executor.mode = ExecutorMode::DryRun,
                _ => {}
            }
        }
    }

    /// Reject configurations that cannot run.
    pub fn validate(&self) -> Result<()> {
        if self.network.gamma_url.is_empty()
            || self.network.clob_url.is_empty()
            || self.network.ws_url.is_empty()
        {
            return Err(Error::Config("network URLs must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&self.risk.max_kelly) {
            return Err(Error::Config(format!(
                "risk.max_kelly {} outside [0, 1]",
                self.risk.max_kelly
            )));
        }
        if self.executor.mode == ExecutorMode::Live
            && self.auth.bearer_token.is_none()
            && self.auth.api_key.is_none()
        {
            return Err(Error::Config(
                "live executor requires auth.bearer_token or auth.api_key".into(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn database_path(&self) -> &str {
        self.database_path.as_deref().unwrap_or("parlay.db")
    }

    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.network.http_timeout_secs)
    }

    #[must_use]
    pub fn trading_auth(&self) -> TradingAuth {
        TradingAuth {
            bearer_token: self.auth.bearer_token.clone(),
            api_key: self.auth.api_key.clone(),
            hmac_secret: self.auth.hmac_secret.clone(),
            passphrase: self.auth.passphrase.clone(),
            address: self.auth.address.clone(),
        }
    }

    #[must_use]
    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            url: self.network.ws_url.clone(),
            ..StreamConfig::default()
        }
    }

    #[must_use]
    pub fn risk_config(&self) -> RiskConfig {
        RiskConfig {
            bankroll: self.risk.bankroll,
            max_kelly: self.risk.max_kelly,
            min_confidence: self.risk.min_confidence,
            freshness_cap_secs: self.risk.freshness_cap_secs,
            edge_retention: self.risk.edge_retention,
            spread_cap_bps: self.risk.spread_cap_bps,
        }
    }

    #[must_use]
    pub fn engine_config(&self) -> StrategyEngineConfig {
        let defaults = StrategyEngineConfig::default();
        StrategyEngineConfig {
            tick_interval: self
                .engine
                .tick_interval_secs
                .map_or(defaults.tick_interval, Duration::from_secs),
            signal_window: self
                .engine
                .signal_window_secs
                .map_or(defaults.signal_window, Duration::from_secs),
        }
    }

    #[must_use]
    pub fn opportunity_config(&self) -> OpportunityManagerConfig {
        let defaults = OpportunityManagerConfig::default();
        OpportunityManagerConfig {
            max_per_strategy: self
                .engine
                .max_opportunities_per_strategy
                .unwrap_or(defaults.max_per_strategy),
        }
    }

    #[must_use]
    pub fn executor_config(&self) -> ExecutorConfig {
        let defaults = ExecutorConfig::default();
        ExecutorConfig {
            poll_interval: self
                .executor
                .poll_interval_secs
                .map_or(defaults.poll_interval, Duration::from_secs),
        }
    }

    #[must_use]
    pub fn auto_executor_config(&self) -> AutoExecutorConfig {
        AutoExecutorConfig::default()
    }

    #[must_use]
    pub fn catalog_sync_config(&self) -> CatalogSyncConfig {
        CatalogSyncConfig::default()
    }

    #[must_use]
    pub fn ingest_config(&self) -> IngestConfig {
        IngestConfig::default()
    }

    #[must_use]
    pub fn internal_scan_config(&self) -> InternalScanConfig {
        InternalScanConfig::default()
    }

    #[must_use]
    pub fn settlement_aggregator_config(&self) -> SettlementAggregatorConfig {
        SettlementAggregatorConfig::default()
    }

    #[must_use]
    pub fn pattern_config(&self) -> OrderbookPatternConfig {
        OrderbookPatternConfig::default()
    }

    #[must_use]
    pub fn sweep_config(&self) -> CertaintySweepConfig {
        CertaintySweepConfig::default()
    }

    #[must_use]
    pub fn depth_config(&self) -> Option<DepthConfig> {
        self.collectors.depth_url.as_ref().map(|url| DepthConfig {
            url: url.clone(),
            ..DepthConfig::default()
        })
    }

    #[must_use]
    pub fn price_config(&self) -> Option<PricePollConfig> {
        self.collectors.price_url.as_ref().map(|url| {
            let defaults = PricePollConfig::default();
            PricePollConfig {
                url: url.clone(),
                trigger_pct: self
                    .collectors
                    .price_trigger_pct
                    .unwrap_or(defaults.trigger_pct),
                ..defaults
            }
        })
    }

    #[must_use]
    pub fn weather_config(&self) -> Option<WeatherConfig> {
        if self.collectors.weather_endpoints.is_empty() || self.collectors.weather_cities.is_empty()
        {
            return None;
        }
        Some(WeatherConfig {
            endpoints: self
                .collectors
                .weather_endpoints
                .iter()
                .map(|e| crate::core::signal::collector::WeatherEndpoint {
                    url_template: e.url_template.clone(),
                    api_key: e.api_key.clone(),
                    weight: e.weight,
                    temperature_pointer: e.temperature_pointer.clone(),
                })
                .collect(),
            cities: self.collectors.weather_cities.clone(),
            ..WeatherConfig::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_for_dry_run() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.executor.mode, ExecutorMode::DryRun);
        assert_eq!(config.database_path(), "parlay.db");
    }

    #[test]
    fn live_mode_requires_credentials() {
        let mut config = Config::default();
        config.executor.mode = ExecutorMode::Live;
        assert!(config.validate().is_err());

        config.auth.api_key = Some("key".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn toml_sections_parse() {
        let raw = r#"
            database = "data/parlay.db"

            [network]
            gamma_url = "https://gamma.example.com"
            page_limit = 50

            [logging]
            level = "debug"
            json = true

            [executor]
            mode = "live"
            poll_interval_secs = 3

            [auth]
            api_key = "k"

            [risk]
            bankroll = "2500"
            max_kelly = 0.1

            [engine]
            tick_interval_secs = 15

            [collectors]
            price_url = "https://api.example.com/btc"
            price_trigger_pct = 0.5
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.network.gamma_url, "https://gamma.example.com");
        assert_eq!(config.network.page_limit, 50);
        assert_eq!(config.executor.mode, ExecutorMode::Live);
        assert_eq!(config.database_path(), "data/parlay.db");
        assert_eq!(config.risk_config().bankroll, Decimal::from(2500));
        assert_eq!(
            config.engine_config().tick_interval,
            Duration::from_secs(15)
        );
        let price = config.price_config().unwrap();
        assert_eq!(price.trigger_pct, 0.5);
        assert!(config.depth_config().is_none());
    }

    #[test]
    fn invalid_kelly_is_rejected() {
        let mut config = Config::default();
        config.risk.max_kelly = 1.5;
        assert!(config.validate().is_err());
    }
}
