//! External spot-price collector (REST poll).
//!
//! Keeps a sliding window of samples and emits `btc_price_change` when the
//! move across the window exceeds the trigger threshold.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::json;
use tokio::time::{interval, MissedTickBehavior};
use tracing::warn;

use super::{Collector, HealthCell, HealthSnapshot, SignalEmitter};
use crate::core::domain::{clamp01, Direction, Signal, SignalType, SourceInfo, SourceType};
use crate::core::shutdown::ShutdownToken;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct PricePollConfig {
    pub url: String,
    pub poll_interval: Duration,
    /// Window the percent change is measured over.
    pub window: Duration,
    /// Absolute percent change that triggers a signal.
    pub trigger_pct: f64,
}

impl Default for PricePollConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            poll_interval: Duration::from_secs(10),
            window: Duration::from_secs(5 * 60),
            trigger_pct: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    at: DateTime<Utc>,
    price: f64,
}

pub struct PricePollCollector {
    config: PricePollConfig,
    http: reqwest::Client,
    health: HealthCell,
    window: Mutex<VecDeque<Sample>>,
}

impl PricePollCollector {
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: PricePollConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(Error::Http)?;
        Ok(Self {
            config,
            http,
            health: HealthCell::new(),
            window: Mutex::new(VecDeque::new()),
        })
    }

    async fn fetch_price(&self) -> Result<f64> {
        let response = self.http.get(&self.config.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let body: serde_json::Value = response.json().await?;
        // Common venue shapes: {"price": "..."} or {"last": ...}.
        body.get("price")
            .or_else(|| body.get("last"))
            .and_then(|v| {
                v.as_f64()
                    .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
            })
            .ok_or_else(|| Error::Parse("price field missing".into()))
    }

    /// Push a sample and return the percent change across the window once
    /// it exceeds the trigger.
    fn record(&self, price: f64, now: DateTime<Utc>) -> Option<f64> {
        let horizon = chrono::Duration::from_std(self.config.window)
            .unwrap_or_else(|_| chrono::Duration::minutes(5));
        let mut window = self.window.lock();
        window.push_back(Sample { at: now, price });
        while window
            .front()
            .is_some_and(|s| now - s.at > horizon)
        {
            window.pop_front();
        }
        let oldest = window.front()?;
        if oldest.price <= 0.0 {
            return None;
        }
        let pct_change = (price - oldest.price) / oldest.price * 100.0;
        (pct_change.abs() >= self.config.trigger_pct).then_some(pct_change)
    }

    fn poll_once_signal(&self, price: f64, now: DateTime<Utc>) -> Option<Signal> {
        let pct_change = self.record(price, now)?;
        let direction = if pct_change > 0.0 {
            Direction::Yes
        } else {
            Direction::No
        };
        Some(
            Signal::builder(SignalType::BtcPriceChange, self.name())
                .direction(direction)
                .strength(clamp01(pct_change.abs() / 10.0))
                .payload(json!({ "price": price, "pct_change": pct_change }))
                .build(),
        )
    }
}

#[async_trait]
impl Collector for PricePollCollector {
    fn name(&self) -> &'static str {
        "external_price"
    }

    fn source_info(&self) -> SourceInfo {
        SourceInfo {
            source_type: SourceType::Rest,
            endpoint: self.config.url.clone(),
            poll_interval: self.config.poll_interval,
        }
    }

    async fn produce(&self, out: SignalEmitter, shutdown: ShutdownToken) -> Result<()> {
        let mut tick = interval(self.config.poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => return Ok(()),
                _ = tick.tick() => {
                    match self.fetch_price().await {
                        Ok(price) => {
                            self.health.healthy();
                            if let Some(signal) = self.poll_once_signal(price, Utc::now()) {
                                out.emit(signal);
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "price poll failed");
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

    fn collector(trigger_pct: f64) -> PricePollCollector {
        PricePollCollector::new(PricePollConfig {
            trigger_pct,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn no_signal_below_trigger() {
        let c = collector(1.0);
        let now = Utc::now();
        assert!(c.poll_once_signal(100.0, now).is_none());
        assert!(c
            .poll_once_signal(100.5, now + chrono::Duration::seconds(10))
            .is_none());
    }

    #[test]
    fn upward_move_is_yes() {
        let c = collector(1.0);
        let now = Utc::now();
        assert!(c.poll_once_signal(100.0, now).is_none());
        let signal = c
            .poll_once_signal(102.0, now + chrono::Duration::seconds(10))
            .expect("2% move should trigger");
        assert_eq!(signal.direction, Direction::Yes);
        let pct = signal.payload["pct_change"].as_f64().unwrap();
        assert!((pct - 2.0).abs() < 1e-9);
    }

    #[test]
    fn downward_move_is_no() {
        let c = collector(1.0);
        let now = Utc::now();
        assert!(c.poll_once_signal(100.0, now).is_none());
        let signal = c
            .poll_once_signal(98.0, now + chrono::Duration::seconds(10))
            .expect("-2% move should trigger");
        assert_eq!(signal.direction, Direction::No);
    }

    #[test]
    fn samples_outside_window_are_discarded() {
        let c = collector(1.0);
        let now = Utc::now();
        assert!(c.poll_once_signal(100.0, now).is_none());
        // Ten minutes later the old sample is gone; a fresh baseline forms.
        assert!(c
            .poll_once_signal(110.0, now + chrono::Duration::minutes(10))
            .is_none());
    }
}
