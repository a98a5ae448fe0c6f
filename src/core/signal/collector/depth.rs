//! External market-depth collector (WebSocket).
//!
//! Streams depth snapshots from an external venue and emits a
//! `btc_depth_imbalance` signal from the bid/ask notional ratio over the
//! published levels. Emission is rate-limited; reconnects use exponential
//! backoff with jitter.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::StreamExt;
use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::{Collector, HealthCell, HealthSnapshot, SignalEmitter};
use crate::core::domain::{clamp01, Direction, Signal, SignalType, SourceInfo, SourceType};
use crate::core::shutdown::ShutdownToken;
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct DepthConfig {
    pub url: String,
    /// Bid/ask ratio at or above which the signal leans YES.
    pub yes_ratio: f64,
    /// Bid/ask ratio at or below which the signal leans NO.
    pub no_ratio: f64,
    /// Minimum gap between emissions.
    pub min_emit_gap: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for DepthConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            yes_ratio: 1.25,
            no_ratio: 0.80,
            min_emit_gap: Duration::from_secs(2),
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
        }
    }
}

/// Depth snapshot as published by the venue: `[price, qty]` string pairs.
#[derive(Debug, Deserialize)]
struct DepthMessage {
    #[serde(default, alias = "b")]
    bids: Vec<[String; 2]>,
    #[serde(default, alias = "a")]
    asks: Vec<[String; 2]>,
}

impl DepthMessage {
    fn notional(levels: &[[String; 2]]) -> f64 {
        levels
            .iter()
            .filter_map(|l| Some(l[0].parse::<f64>().ok()? * l[1].parse::<f64>().ok()?))
            .sum()
    }
}

pub struct DepthCollector {
    config: DepthConfig,
    health: HealthCell,
}

impl DepthCollector {
    #[must_use]
    pub fn new(config: DepthConfig) -> Self {
        Self {
            config,
            health: HealthCell::new(),
        }
    }

    /// Classify a bid/ask notional ratio into a signal, if any side is
    /// meaningfully heavier.
    fn classify(&self, bid_notional: f64, ask_notional: f64) -> Option<(Direction, f64)> {
        if ask_notional <= 0.0 || bid_notional <= 0.0 {
            return None;
        }
        let ratio = bid_notional / ask_notional;
        let direction = if ratio >= self.config.yes_ratio {
            Direction::Yes
        } else if ratio <= self.config.no_ratio {
            Direction::No
        } else {
            Direction::Neutral
        };
        Some((direction, ratio))
    }

    async fn run_connection(&self, out: &SignalEmitter, shutdown: &ShutdownToken) -> Result<()> {
        info!(url = %self.config.url, "connecting to depth stream");
        let (mut ws, _) = connect_async(&self.config.url).await?;
        self.health.healthy();

        let mut last_emit: Option<Instant> = None;
        loop {
            tokio::select! {
                () = shutdown.cancelled() => return Ok(()),
                frame = ws.next() => {
                    let Some(frame) = frame else {
                        return Err(crate::error::Error::Connection("depth stream ended".into()));
                    };
                    match frame? {
                        Message::Text(text) => {
                            let Ok(depth) = serde_json::from_str::<DepthMessage>(&text) else {
                                debug!("unparseable depth frame");
                                continue;
                            };
                            if last_emit.is_some_and(|t| t.elapsed() < self.config.min_emit_gap) {
                                continue;
                            }
                            let bid_notional = DepthMessage::notional(&depth.bids);
                            let ask_notional = DepthMessage::notional(&depth.asks);
                            let Some((direction, ratio)) =
                                self.classify(bid_notional, ask_notional)
                            else {
                                continue;
                            };
                            last_emit = Some(Instant::now());
                            self.health.healthy();
                            let signal =
                                Signal::builder(SignalType::BtcDepthImbalance, self.name())
                                    .direction(direction)
                                    .strength(clamp01((ratio - 1.0).abs()))
                                    .payload(json!({
                                        "bid_notional": bid_notional,
                                        "ask_notional": ask_notional,
                                        "ratio": ratio,
                                    }))
                                    .build();
                            out.emit(signal);
                        }
                        Message::Ping(data) => {
                            use futures_util::SinkExt;
                            ws.send(Message::Pong(data)).await?;
                        }
                        Message::Close(_) => {
                            return Err(crate::error::Error::Connection("server close".into()));
                        }
                        _ => {}
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Collector for DepthCollector {
    fn name(&self) -> &'static str {
        "external_depth"
    }

    fn source_info(&self) -> SourceInfo {
        SourceInfo {
            source_type: SourceType::Websocket,
            endpoint: self.config.url.clone(),
            poll_interval: self.config.min_emit_gap,
        }
    }

    async fn produce(&self, out: SignalEmitter, shutdown: ShutdownToken) -> Result<()> {
        let mut failures: u32 = 0;
        loop {
            if shutdown.is_cancelled() {
                return Ok(());
            }
            match self.run_connection(&out, &shutdown).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    failures += 1;
                    self.health.down(e.to_string());
                    let exp = failures.saturating_sub(1).min(8);
                    let scaled = self.config.backoff_base.saturating_mul(2u32.pow(exp));
                    let capped = scaled.min(self.config.backoff_max);
                    let jitter_cap = (self.config.backoff_base.as_millis() as u64 / 2).max(1);
                    let jitter = rand::thread_rng().gen_range(0..jitter_cap);
                    let delay = capped + Duration::from_millis(jitter);
                    warn!(error = %e, delay_ms = delay.as_millis(), "depth stream reconnecting");
                    tokio::select! {
                        () = sleep(delay) => {}
                        () = shutdown.cancelled() => return Ok(()),
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

    #[test]
    fn ratio_classification_bands() {
        let c = DepthCollector::new(DepthConfig::default());
        assert_eq!(c.classify(125.0, 100.0).unwrap().0, Direction::Yes);
        assert_eq!(c.classify(80.0, 100.0).unwrap().0, Direction::No);
        assert_eq!(c.classify(100.0, 100.0).unwrap().0, Direction::Neutral);
        assert!(c.classify(0.0, 100.0).is_none());
    }

    #[test]
    fn notional_sums_price_times_qty() {
        let levels = vec![
            ["100.0".to_string(), "2.0".to_string()],
            ["99.0".to_string(), "1.0".to_string()],
        ];
        assert!((DepthMessage::notional(&levels) - 299.0).abs() < 1e-9);
    }

    #[test]
    fn depth_message_accepts_short_field_names() {
        let msg: DepthMessage =
            serde_json::from_str(r#"{"b": [["1", "2"]], "a": [["3", "4"]]}"#).unwrap();
        assert_eq!(msg.bids.len(), 1);
        assert_eq!(msg.asks.len(), 1);
    }
}
