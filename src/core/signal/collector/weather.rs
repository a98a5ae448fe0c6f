//! Weather collector (REST poll, multi-source).
//!
//! Polls each configured endpoint with API-key substitution and blends a
//! weighted forecast temperature per city, emitting a city-scoped
//! `weather_deviation` signal when the blend strays from the baseline.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::time::{interval, MissedTickBehavior};
use tracing::warn;

use super::{Collector, HealthCell, HealthSnapshot, SignalEmitter};
use crate::core::domain::{clamp01, Direction, Signal, SignalType, SourceInfo, SourceType};
use crate::core::shutdown::ShutdownToken;
use crate::error::{Error, Result};

/// One upstream forecast source. `{city}` and `{api_key}` placeholders in
/// the URL are substituted per request.
#[derive(Debug, Clone)]
pub struct WeatherEndpoint {
    pub url_template: String,
    pub api_key: String,
    pub weight: f64,
    /// JSON pointer to the forecast temperature in the response.
    pub temperature_pointer: String,
}

#[derive(Debug, Clone)]
pub struct WeatherConfig {
    pub poll_interval: Duration,
    pub endpoints: Vec<WeatherEndpoint>,
    pub cities: Vec<String>,
    /// Baseline temperature per city against which deviation is measured.
    pub baselines: HashMap<String, f64>,
    /// Minimum absolute deviation (°C) worth a signal.
    pub min_deviation: f64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(15 * 60),
            endpoints: Vec::new(),
            cities: Vec::new(),
            baselines: HashMap::new(),
            min_deviation: 3.0,
        }
    }
}

pub struct WeatherCollector {
    config: WeatherConfig,
    http: reqwest::Client,
    health: HealthCell,
}

impl WeatherCollector {
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: WeatherConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(Error::Http)?;
        Ok(Self {
            config,
            http,
            health: HealthCell::new(),
        })
    }

    fn substitute(template: &str, city: &str, api_key: &str) -> String {
        template.replace("{city}", city).replace("{api_key}", api_key)
    }

    async fn fetch_temperature(&self, endpoint: &WeatherEndpoint, city: &str) -> Result<f64> {
        let url = Self::substitute(&endpoint.url_template, city, &endpoint.api_key);
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let body: serde_json::Value = response.json().await?;
        body.pointer(&endpoint.temperature_pointer)
            .and_then(serde_json::Value::as_f64)
            .ok_or_else(|| {
                Error::Parse(format!(
                    "temperature missing at {}",
                    endpoint.temperature_pointer
                ))
            })
    }

    /// Weight-blend per-source temperatures; `None` when nothing answered.
    fn blend(samples: &[(f64, f64)]) -> Option<f64> {
        let total_weight: f64 = samples.iter().map(|(_, w)| w).sum();
        if total_weight <= 0.0 {
            return None;
        }
        Some(samples.iter().map(|(t, w)| t * w).sum::<f64>() / total_weight)
    }

    async fn poll_city(&self, city: &str, out: &SignalEmitter) -> Result<()> {
        let mut samples = Vec::new();
        let mut errors = Vec::new();
        for endpoint in &self.config.endpoints {
            match self.fetch_temperature(endpoint, city).await {
                Ok(temp) => samples.push((temp, endpoint.weight)),
                Err(e) => errors.push(e.to_string()),
            }
        }
        let Some(forecast) = Self::blend(&samples) else {
            return Err(Error::Upstream(format!(
                "no weather source answered for {city}: {}",
                errors.join("; ")
            )));
        };
        if !errors.is_empty() {
            self.health.degraded(errors.join("; "));
        }

        let Some(baseline) = self.config.baselines.get(city).copied() else {
            return Ok(());
        };
        let deviation = forecast - baseline;
        if deviation.abs() < self.config.min_deviation {
            return Ok(());
        }
        let direction = if deviation > 0.0 {
            Direction::Yes
        } else {
            Direction::No
        };
        let signal = Signal::builder(SignalType::WeatherDeviation, self.name())
            .direction(direction)
            .strength(clamp01(deviation.abs() / 10.0))
            .payload(json!({
                "city": city,
                "forecast": forecast,
                "baseline": baseline,
                "deviation": deviation,
                "sources": samples.len(),
            }))
            .build();
        out.emit(signal);
        Ok(())
    }
}

#[async_trait]
impl Collector for WeatherCollector {
    fn name(&self) -> &'static str {
        "weather"
    }

    fn source_info(&self) -> SourceInfo {
        SourceInfo {
            source_type: SourceType::Rest,
            endpoint: self
                .config
                .endpoints
                .first()
                .map(|e| e.url_template.clone())
                .unwrap_or_default(),
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
                    let mut any_failed = false;
                    for city in &self.config.cities {
                        if let Err(e) = self.poll_city(city, &out).await {
                            warn!(city = %city, error = %e, "weather poll failed");
                            any_failed = true;
                        }
                    }
                    if any_failed {
                        self.health.degraded("one or more cities failed");
                    } else {
                        self.health.healthy();
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
    fn url_substitution() {
        let url = WeatherCollector::substitute(
            "https://api.example.com/forecast?q={city}&appid={api_key}",
            "nyc",
            "k123",
        );
        assert_eq!(url, "https://api.example.com/forecast?q=nyc&appid=k123");
    }

    #[test]
    fn blend_is_weighted_average() {
        let blended = WeatherCollector::blend(&[(10.0, 1.0), (20.0, 3.0)]).unwrap();
        assert!((blended - 17.5).abs() < 1e-9);
    }

    #[test]
    fn blend_of_nothing_is_none() {
        assert!(WeatherCollector::blend(&[]).is_none());
    }
}
