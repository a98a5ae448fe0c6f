//! The signal hub: central bus between collectors and strategy evaluators.
//!
//! Each produced signal is normalized (timestamps and TTL), deduplicated,
//! persisted best-effort, and fanned out to per-type subscribers. The hub
//! never blocks on a subscriber: a full queue drops that copy and counts
//! the drop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::collector::{Collector, SignalEmitter};
use super::dedup::DedupCache;
use crate::core::domain::{Signal, SignalSource, SignalType};
use crate::core::shutdown::ShutdownToken;
use crate::core::store::{Repository, SharedRepository};
use crate::error::Result;

/// Capacity of the hub's inbound stream.
const INBOUND_CAPACITY: usize = 128;
/// Cadence of the per-collector health upsert.
const HEALTH_INTERVAL: Duration = Duration::from_secs(30);
/// Cadence of the drop-counter stats log.
const STATS_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    dropped_dedup: AtomicU64,
    dropped_fanout: AtomicU64,
    persist_failures: AtomicU64,
}

/// Central signal bus. Register collectors, then call [`SignalHub::run`].
pub struct SignalHub {
    repo: SharedRepository,
    collectors: Mutex<Vec<Arc<dyn Collector>>>,
    subscribers: Mutex<HashMap<SignalType, Vec<mpsc::Sender<Signal>>>>,
    dedup: DedupCache,
    counters: Counters,
}

impl SignalHub {
    #[must_use]
    pub fn new(repo: SharedRepository) -> Self {
        Self {
            repo,
            collectors: Mutex::new(Vec::new()),
            subscribers: Mutex::new(HashMap::new()),
            dedup: DedupCache::new(),
            counters: Counters::default(),
        }
    }

    /// Register a collector. Must happen before [`SignalHub::run`].
    pub fn register(&self, collector: Arc<dyn Collector>) {
        info!(collector = collector.name(), "collector registered");
        self.collectors.lock().push(collector);
    }

    /// Subscribe to signals of one type with a bounded buffer.
    pub fn subscribe(&self, signal_type: SignalType, buffer: usize) -> mpsc::Receiver<Signal> {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        self.subscribers
            .lock()
            .entry(signal_type)
            .or_default()
            .push(tx);
        rx
    }

    /// Start all collectors and process signals until cancelled.
    pub async fn run(self: Arc<Self>, shutdown: ShutdownToken) -> Result<()> {
        let (tx, mut rx) = mpsc::channel::<Signal>(INBOUND_CAPACITY);
        let emitter = SignalEmitter::new(tx);

        let collectors: Vec<Arc<dyn Collector>> = self.collectors.lock().clone();
        info!(collectors = collectors.len(), "signal hub starting");

        for collector in &collectors {
            let collector = Arc::clone(collector);
            let out = emitter.clone();
            let token = shutdown.clone();
            tokio::spawn(async move {
                let name = collector.name();
                match collector.produce(out, token).await {
                    Ok(()) => info!(collector = name, "collector stopped"),
                    Err(e) if e.is_cancelled() => {
                        info!(collector = name, "collector cancelled");
                    }
                    Err(e) => warn!(collector = name, error = %e, "collector exited with error"),
                }
                collector.stop();
            });
        }
        // The hub keeps no sender of its own; when every collector is gone
        // the channel closes and the loop drains out.
        drop(emitter);

        let mut health_tick = interval(HEALTH_INTERVAL);
        health_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stats_tick = interval(STATS_INTERVAL);
        stats_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("signal hub shutting down");
                    return Ok(());
                }
                signal = rx.recv() => {
                    match signal {
                        Some(signal) => self.process(signal).await,
                        None => {
                            info!("all collectors finished, signal hub stopping");
                            return Ok(());
                        }
                    }
                }
                _ = health_tick.tick() => {
                    self.upsert_health(&collectors).await;
                    let pruned = self.dedup.prune(Utc::now());
                    if pruned > 0 {
                        debug!(pruned, "dedup cache pruned");
                    }
                }
                _ = stats_tick.tick() => {
                    info!(
                        received = self.counters.received.load(Ordering::Relaxed),
                        dropped_dedup = self.counters.dropped_dedup.load(Ordering::Relaxed),
                        dropped_fanout = self.counters.dropped_fanout.load(Ordering::Relaxed),
                        persist_failures = self.counters.persist_failures.load(Ordering::Relaxed),
                        dedup_entries = self.dedup.len(),
                        "signal hub stats"
                    );
                }
            }
        }
    }

    /// Normalize, dedup, persist, fan out.
    async fn process(&self, mut signal: Signal) {
        self.counters.received.fetch_add(1, Ordering::Relaxed);
        let now = Utc::now();

        // Normalize timestamps and TTL.
        let created_at = signal.created_at.get_or_insert(now);
        let created_at = *created_at;
        if signal.expires_at.is_none() {
            let ttl = chrono::Duration::from_std(signal.signal_type.default_ttl())
                .unwrap_or_else(|_| chrono::Duration::minutes(10));
            signal.expires_at = Some(created_at + ttl);
        }

        if self.dedup.is_duplicate(&signal, now) {
            self.counters.dropped_dedup.fetch_add(1, Ordering::Relaxed);
            return;
        }

        // Best effort: a persistence failure is counted, not fatal, and
        // does not block fan-out.
        if let Err(e) = self.repo.insert_signal(&signal).await {
            self.counters
                .persist_failures
                .fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, signal_type = %signal.signal_type, "failed to persist signal");
        }

        self.fan_out(&signal);
    }

    fn fan_out(&self, signal: &Signal) {
        let mut subscribers = self.subscribers.lock();
        let Some(queues) = subscribers.get_mut(&signal.signal_type) else {
            return;
        };
        queues.retain(|tx| !tx.is_closed());
        for tx in queues.iter() {
            if tx.try_send(signal.clone()).is_err() {
                self.counters.dropped_fanout.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    async fn upsert_health(&self, collectors: &[Arc<dyn Collector>]) {
        for collector in collectors {
            let info = collector.source_info();
            let snapshot = collector.health();
            let row = SignalSource {
                name: collector.name().to_string(),
                source_type: info.source_type,
                endpoint: info.endpoint,
                poll_interval: info.poll_interval,
                enabled: true,
                health_status: snapshot.status,
                last_poll_at: snapshot.last_poll_at,
                last_error: snapshot.last_error,
            };
            if let Err(e) = self.repo.upsert_signal_source(&row).await {
                warn!(collector = collector.name(), error = %e, "health upsert failed");
            }
        }
    }

    /// Current drop counters `(dedup, fanout)`; used by tests and stats.
    #[must_use]
    pub fn drop_counts(&self) -> (u64, u64) {
        (
            self.counters.dropped_dedup.load(Ordering::Relaxed),
            self.counters.dropped_fanout.load(Ordering::Relaxed),
        )
    }

    /// Process one signal synchronously. Test seam; the daemon path goes
    /// through [`SignalHub::run`].
    #[cfg(any(test, feature = "testkit"))]
    pub async fn process_one(&self, signal: Signal) {
        self.process(signal).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{Direction, MarketId, TokenId};
    use crate::core::store::{MemoryRepository, Repository};

    fn hub() -> (Arc<SignalHub>, SharedRepository) {
        let repo: SharedRepository = Arc::new(MemoryRepository::new());
        (Arc::new(SignalHub::new(Arc::clone(&repo))), repo)
    }

    fn gap_signal(token: &str) -> Signal {
        Signal::builder(SignalType::LiquidityGap, "internal_scan")
            .market(MarketId::from("m1"))
            .token(TokenId::from(token))
            .direction(Direction::Yes)
            .strength(0.5)
            .build()
    }

    #[tokio::test]
    async fn normalization_fills_timestamps_and_ttl() {
        let (hub, repo) = hub();
        hub.process_one(gap_signal("t1")).await;

        let stored = repo
            .list_signals_since(None, Utc::now() - chrono::Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        let signal = &stored[0];
        let created = signal.created_at.expect("created_at normalized");
        let expires = signal.expires_at.expect("expires_at normalized");
        assert_eq!(expires - created, chrono::Duration::minutes(10));
    }

    #[tokio::test]
    async fn duplicates_are_dropped_before_persistence() {
        let (hub, repo) = hub();
        hub.process_one(gap_signal("t1")).await;
        hub.process_one(gap_signal("t1")).await;

        let stored = repo
            .list_signals_since(None, Utc::now() - chrono::Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(hub.drop_counts().0, 1);
    }

    #[tokio::test]
    async fn fanout_reaches_matching_subscribers_only() {
        let (hub, _repo) = hub();
        let mut gap_rx = hub.subscribe(SignalType::LiquidityGap, 8);
        let mut bias_rx = hub.subscribe(SignalType::NoBias, 8);

        hub.process_one(gap_signal("t1")).await;

        assert!(gap_rx.try_recv().is_ok());
        assert!(bias_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_subscriber_queue_drops_and_counts() {
        let (hub, _repo) = hub();
        let _rx = hub.subscribe(SignalType::LiquidityGap, 1);

        hub.process_one(gap_signal("t1")).await;
        hub.process_one(gap_signal("t2")).await;
        hub.process_one(gap_signal("t3")).await;

        // Queue held one; the other two copies were dropped.
        assert_eq!(hub.drop_counts().1, 2);
    }

    #[tokio::test]
    async fn run_terminates_on_shutdown() {
        let (hub, _repo) = hub();
        let handle = tokio::spawn(Arc::clone(&hub).run(ShutdownToken::already_cancelled()));
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("hub should stop on cancelled token")
            .unwrap()
            .unwrap();
    }
}
