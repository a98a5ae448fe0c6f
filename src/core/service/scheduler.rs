//! Seconds-granular periodic scheduler.
//!
//! Entries are `(spec, job)` pairs sharing the root shutdown token. The
//! overlap policy is skip-if-running per entry: a tick that lands while
//! the previous run is still going is dropped, not queued. On shutdown
//! the scheduler waits for in-flight jobs up to a bounded deadline.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::core::shutdown::ShutdownToken;
use crate::error::{Error, Result};

type JobFn = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync>;

/// Parse a period spec like `"30s"`, `"5m"`, `"1h"`.
pub fn parse_spec(spec: &str) -> Result<Duration> {
    let spec = spec.trim();
    if !spec.is_ascii() || spec.is_empty() {
        return Err(Error::Config(format!("bad schedule spec {spec:?}")));
    }
    let (value, unit) = spec.split_at(spec.len() - 1);
    let value: u64 = value
        .parse()
        .map_err(|_| Error::Config(format!("bad schedule spec {spec:?}")))?;
    if value == 0 {
        return Err(Error::Config(format!("zero period in spec {spec:?}")));
    }
    let seconds = match unit {
        "s" => value,
        "m" => value * 60,
        "h" => value * 60 * 60,
        _ => return Err(Error::Config(format!("bad schedule unit {spec:?}"))),
    };
    Ok(Duration::from_secs(seconds))
}

struct Entry {
    name: &'static str,
    period: Duration,
    job: JobFn,
}

/// Periodic job registry.
#[derive(Default)]
pub struct Scheduler {
    entries: Vec<Entry>,
    /// How long shutdown waits for in-flight jobs.
    drain_deadline: Duration,
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            drain_deadline: Duration::from_secs(10),
        }
    }

    /// Register a job under a period spec (e.g. `"30s"`).
    ///
    /// # Errors
    /// Returns a config error for an unparseable spec.
    pub fn add<F, Fut>(&mut self, name: &'static str, spec: &str, job: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let period = parse_spec(spec)?;
        self.entries.push(Entry {
            name,
            period,
            job: Arc::new(move || Box::pin(job())),
        });
        Ok(())
    }

    /// Run all entries until shutdown, then drain in-flight jobs bounded
    /// by the deadline.
    pub async fn run(self, shutdown: ShutdownToken) -> Result<()> {
        info!(jobs = self.entries.len(), "scheduler started");
        let mut handles = Vec::new();
        for entry in self.entries {
            let token = shutdown.clone();
            handles.push(tokio::spawn(run_entry(entry, token)));
        }

        shutdown.cancelled().await;
        let drain = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(self.drain_deadline, drain).await.is_err() {
            warn!("scheduler drain deadline exceeded, abandoning in-flight jobs");
        } else {
            info!("scheduler drained");
        }
        Ok(())
    }
}

async fn run_entry(entry: Entry, shutdown: ShutdownToken) {
    let mut tick = interval(entry.period);
    // Skip, don't burst: a job running past its next tick swallows the
    // overlapping firings.
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tick.tick().await; // interval fires immediately; wait one period
    loop {
        tokio::select! {
            () = shutdown.cancelled() => return,
            _ = tick.tick() => {
                if let Err(e) = (entry.job)().await {
                    if e.is_cancelled() {
                        debug!(job = entry.name, "job cancelled");
                    } else {
                        warn!(job = entry.name, error = %e, "job failed");
                    }
                }
            }
        }
    }
}
