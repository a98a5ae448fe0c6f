//! Signals and their producers.
//!
//! A signal is a typed event produced by a collector. Signals are immutable
//! once inserted; the hub normalizes timestamps and TTLs, deduplicates, and
//! fans them out to subscribers by type.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{EventId, MarketId, SignalId, TokenId};

/// Directional lean a signal carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Yes,
    No,
    Neutral,
    Both,
}

impl Direction {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yes => "YES",
            Self::No => "NO",
            Self::Neutral => "NEUTRAL",
            Self::Both => "BOTH",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "YES" => Some(Self::Yes),
            "NO" => Some(Self::No),
            "NEUTRAL" => Some(Self::Neutral),
            "BOTH" => Some(Self::Both),
            _ => None,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The known signal types. Collector-specific extensions ride in `Other`
/// and are passed through without interpretation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum SignalType {
    LiquidityGap,
    ArbSumDeviation,
    NoBias,
    FdvOverpriced,
    PriceAnomaly,
    SettlementNoRates,
    BtcDepthImbalance,
    BtcPriceChange,
    WeatherDeviation,
    FearSpike,
    MmInventorySkew,
    CertaintySweep,
    NewsAlpha,
    VolatilitySpread,
    Other(String),
}

impl SignalType {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::LiquidityGap => "liquidity_gap",
            Self::ArbSumDeviation => "arb_sum_deviation",
            Self::NoBias => "no_bias",
            Self::FdvOverpriced => "fdv_overpriced",
            Self::PriceAnomaly => "price_anomaly",
            Self::SettlementNoRates => "settlement_no_rates",
            Self::BtcDepthImbalance => "btc_depth_imbalance",
            Self::BtcPriceChange => "btc_price_change",
            Self::WeatherDeviation => "weather_deviation",
            Self::FearSpike => "fear_spike",
            Self::MmInventorySkew => "mm_inventory_skew",
            Self::CertaintySweep => "certainty_sweep",
            Self::NewsAlpha => "news_alpha",
            Self::VolatilitySpread => "volatility_spread",
            Self::Other(s) => s,
        }
    }

    /// Default time-to-live applied by the hub when a collector leaves
    /// `expires_at` unset.
    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        match self {
            Self::ArbSumDeviation => Duration::from_secs(2 * 60),
            Self::NoBias => Duration::from_secs(2 * 60 * 60),
            Self::LiquidityGap => Duration::from_secs(10 * 60),
            _ => Duration::from_secs(10 * 60),
        }
    }

    /// How long an identical dedup key suppresses re-emission.
    #[must_use]
    pub fn dedup_window(&self) -> Duration {
        match self {
            Self::ArbSumDeviation | Self::BtcDepthImbalance | Self::BtcPriceChange => {
                Duration::from_secs(30)
            }
            Self::NoBias | Self::FdvOverpriced | Self::SettlementNoRates => {
                Duration::from_secs(2 * 60)
            }
            _ => Duration::from_secs(60),
        }
    }

    /// The largest dedup window across all types; bounds cache pruning.
    #[must_use]
    pub fn max_dedup_window() -> Duration {
        Duration::from_secs(2 * 60)
    }
}

impl From<String> for SignalType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "liquidity_gap" => Self::LiquidityGap,
            "arb_sum_deviation" => Self::ArbSumDeviation,
            "no_bias" => Self::NoBias,
            "fdv_overpriced" => Self::FdvOverpriced,
            "price_anomaly" => Self::PriceAnomaly,
            "settlement_no_rates" => Self::SettlementNoRates,
            "btc_depth_imbalance" => Self::BtcDepthImbalance,
            "btc_price_change" => Self::BtcPriceChange,
            "weather_deviation" => Self::WeatherDeviation,
            "fear_spike" => Self::FearSpike,
            "mm_inventory_skew" => Self::MmInventorySkew,
            "certainty_sweep" => Self::CertaintySweep,
            "news_alpha" => Self::NewsAlpha,
            "volatility_spread" => Self::VolatilitySpread,
            _ => Self::Other(s),
        }
    }
}

impl From<SignalType> for String {
    fn from(t: SignalType) -> Self {
        t.as_str().to_string()
    }
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed event produced by a collector. Immutable once persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: SignalId,
    pub signal_type: SignalType,
    /// Collector name that produced this signal.
    pub source: String,
    pub event_id: Option<EventId>,
    pub market_id: Option<MarketId>,
    pub token_id: Option<TokenId>,
    /// Strength in `[0, 1]`. Float: a statistic.
    pub strength: f64,
    pub direction: Direction,
    /// Collector-specific payload, passed through opaquely by the core.
    pub payload: serde_json::Value,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Signal {
    /// Start building a signal of the given type from the given source.
    #[must_use]
    pub fn builder(signal_type: SignalType, source: impl Into<String>) -> SignalBuilder {
        SignalBuilder::new(signal_type, source)
    }
}

/// Builder for [`Signal`]; collectors set only the fields they know and the
/// hub normalizes the rest.
#[derive(Debug)]
pub struct SignalBuilder {
    signal: Signal,
}

impl SignalBuilder {
    fn new(signal_type: SignalType, source: impl Into<String>) -> Self {
        Self {
            signal: Signal {
                id: SignalId::generate(),
                signal_type,
                source: source.into(),
                event_id: None,
                market_id: None,
                token_id: None,
                strength: 0.0,
                direction: Direction::Neutral,
                payload: serde_json::Value::Null,
                expires_at: None,
                created_at: None,
            },
        }
    }

    #[must_use]
    pub fn event(mut self, id: EventId) -> Self {
        self.signal.event_id = Some(id);
        self
    }

    #[must_use]
    pub fn market(mut self, id: MarketId) -> Self {
        self.signal.market_id = Some(id);
        self
    }

    #[must_use]
    pub fn token(mut self, id: TokenId) -> Self {
        self.signal.token_id = Some(id);
        self
    }

    #[must_use]
    pub fn strength(mut self, strength: f64) -> Self {
        self.signal.strength = strength.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub fn direction(mut self, direction: Direction) -> Self {
        self.signal.direction = direction;
        self
    }

    #[must_use]
    pub fn payload(mut self, payload: serde_json::Value) -> Self {
        self.signal.payload = payload;
        self
    }

    #[must_use]
    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.signal.expires_at = Some(at);
        self
    }

    #[must_use]
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.signal.created_at = Some(at);
        self
    }

    #[must_use]
    pub fn build(self) -> Signal {
        self.signal
    }
}

/// Collector liveness as reported on every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Down,
    Unknown,
}

impl HealthStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Down => "down",
            Self::Unknown => "unknown",
        }
    }
}

/// Kind of upstream a collector reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Internal,
    Rest,
    Websocket,
    Aggregate,
}

impl SourceType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::Rest => "rest",
            Self::Websocket => "websocket",
            Self::Aggregate => "aggregate",
        }
    }
}

/// Static description of a collector's upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    pub source_type: SourceType,
    pub endpoint: String,
    pub poll_interval: Duration,
}

/// Persisted per-collector health row, upserted on every health tick.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSource {
    pub name: String,
    pub source_type: SourceType,
    pub endpoint: String,
    pub poll_interval: Duration,
    pub enabled: bool,
    pub health_status: HealthStatus,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_type_string_roundtrip() {
        for t in [
            SignalType::LiquidityGap,
            SignalType::ArbSumDeviation,
            SignalType::NoBias,
            SignalType::CertaintySweep,
            SignalType::Other("custom_feed".into()),
        ] {
            let s: String = t.clone().into();
            assert_eq!(SignalType::from(s), t);
        }
    }

    #[test]
    fn default_ttl_table() {
        assert_eq!(
            SignalType::ArbSumDeviation.default_ttl(),
            Duration::from_secs(120)
        );
        assert_eq!(SignalType::NoBias.default_ttl(), Duration::from_secs(7200));
        assert_eq!(
            SignalType::LiquidityGap.default_ttl(),
            Duration::from_secs(600)
        );
        assert_eq!(
            SignalType::FearSpike.default_ttl(),
            Duration::from_secs(600)
        );
    }

    #[test]
    fn builder_clamps_strength() {
        let signal = Signal::builder(SignalType::LiquidityGap, "internal_scan")
            .strength(3.2)
            .build();
        assert_eq!(signal.strength, 1.0);
    }
}
