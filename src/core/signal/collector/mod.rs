//! Collector contract and shared plumbing.
//!
//! A collector is a pluggable signal producer. Each one runs as its own
//! long-lived task, emits into the hub's bounded inbound stream without
//! blocking, and keeps a health cell up to date on every cycle. Errors
//! degrade health; they never tear the task down.

mod depth;
mod internal;
mod pattern;
mod price;
mod settlement;
mod sweep;
mod weather;

pub use depth::{DepthCollector, DepthConfig};
pub use internal::{InternalScanCollector, InternalScanConfig};
pub use pattern::{OrderbookPatternCollector, OrderbookPatternConfig};
pub use price::{PricePollCollector, PricePollConfig};
pub use settlement::{SettlementAggregator, SettlementAggregatorConfig};
pub use sweep::{CertaintySweepCollector, CertaintySweepConfig};
pub use weather::{WeatherCollector, WeatherConfig, WeatherEndpoint};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::core::domain::{HealthStatus, Signal, SourceInfo};
use crate::core::shutdown::ShutdownToken;
use crate::error::Result;

/// A pluggable signal producer.
#[async_trait]
pub trait Collector: Send + Sync + 'static {
    /// Unique collector name; doubles as the signal `source`.
    fn name(&self) -> &'static str;

    /// Static description of the upstream this collector reads.
    fn source_info(&self) -> SourceInfo;

    /// Produce signals until cancelled. Implementations loop on their own
    /// ticker, emit through `out`, and update health each cycle.
    async fn produce(&self, out: SignalEmitter, shutdown: ShutdownToken) -> Result<()>;

    /// Collector-specific teardown; default is nothing.
    fn stop(&self) {}

    /// Current health view.
    fn health(&self) -> HealthSnapshot;
}

/// Point-in-time collector health.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Default for HealthSnapshot {
    fn default() -> Self {
        Self {
            status: HealthStatus::Unknown,
            last_poll_at: None,
            last_error: None,
        }
    }
}

/// Shared mutable health cell; collectors update it, the hub reads it.
#[derive(Clone, Default)]
pub struct HealthCell {
    inner: Arc<Mutex<HealthSnapshot>>,
}

impl HealthCell {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful cycle.
    pub fn healthy(&self) {
        let mut inner = self.inner.lock();
        inner.status = HealthStatus::Healthy;
        inner.last_poll_at = Some(Utc::now());
        inner.last_error = None;
    }

    /// Record a cycle that produced partial results.
    pub fn degraded(&self, error: impl Into<String>) {
        let mut inner = self.inner.lock();
        inner.status = HealthStatus::Degraded;
        inner.last_poll_at = Some(Utc::now());
        inner.last_error = Some(error.into());
    }

    /// Record a failed cycle.
    pub fn down(&self, error: impl Into<String>) {
        let mut inner = self.inner.lock();
        inner.status = HealthStatus::Down;
        inner.last_poll_at = Some(Utc::now());
        inner.last_error = Some(error.into());
    }

    #[must_use]
    pub fn snapshot(&self) -> HealthSnapshot {
        self.inner.lock().clone()
    }
}

/// Non-blocking sender into the hub's inbound stream.
///
/// Signals are continuous enough that loss under back-pressure is
/// tolerable; a full queue drops the sample and counts it.
#[derive(Clone)]
pub struct SignalEmitter {
    tx: mpsc::Sender<Signal>,
    dropped: Arc<std::sync::atomic::AtomicU64>,
}

impl SignalEmitter {
    #[must_use]
    pub fn new(tx: mpsc::Sender<Signal>) -> Self {
        Self {
            tx,
            dropped: Arc::new(std::sync::atomic::AtomicU64::new(0)),
        }
    }

    /// Emit a signal; returns whether it was accepted.
    pub fn emit(&self, signal: Signal) -> bool {
        match self.tx.try_send(signal) {
            Ok(()) => true,
            Err(e) => {
                self.dropped
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                debug!(error = %e, "hub inbound full, dropping signal");
                false
            }
        }
    }

    /// Samples dropped because the inbound queue was full.
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(std::sync::atomic::Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::SignalType;

    #[test]
    fn health_cell_transitions() {
        let cell = HealthCell::new();
        assert_eq!(cell.snapshot().status, HealthStatus::Unknown);

        cell.healthy();
        assert_eq!(cell.snapshot().status, HealthStatus::Healthy);
        assert!(cell.snapshot().last_error.is_none());

        cell.down("connection refused");
        let snap = cell.snapshot();
        assert_eq!(snap.status, HealthStatus::Down);
        assert_eq!(snap.last_error.as_deref(), Some("connection refused"));
    }

    #[tokio::test]
    async fn emitter_drops_when_full() {
        let (tx, _rx) = mpsc::channel(1);
        let emitter = SignalEmitter::new(tx);

        let make = || Signal::builder(SignalType::LiquidityGap, "test").build();
        assert!(emitter.emit(make()));
        assert!(!emitter.emit(make()));
        assert_eq!(emitter.dropped_count(), 1);
    }
}
