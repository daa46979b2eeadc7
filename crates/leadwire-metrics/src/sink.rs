// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory counters with periodic persisted snapshots.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use leadwire_core::{MetricsSnapshot, MetricsStore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::health::PipelineHealth;
use crate::names::{PIPELINE_ALIVE, PREFIX, SESSIONS_ALIVE};

/// Counter sink shared by every stage.
///
/// `increment` touches an atomic and never waits on I/O. Counters are also
/// mirrored to the `metrics` facade so an installed recorder sees them.
#[derive(Debug, Default)]
pub struct MetricsSink {
    counters: DashMap<String, AtomicU64>,
    health: Option<Arc<PipelineHealth>>,
}

impl MetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Include liveness gauges from `health` in every snapshot.
    pub fn with_health(mut self, health: Arc<PipelineHealth>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn increment(&self, name: &str, amount: u64) {
        if let Some(counter) = self.counters.get(name) {
            counter.fetch_add(amount, Ordering::Relaxed);
        } else {
            self.counters
                .entry(name.to_string())
                .or_default()
                .fetch_add(amount, Ordering::Relaxed);
        }
        metrics::counter!(format!("{PREFIX}{name}")).increment(amount);
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counters
            .get(name)
            .map_or(0, |counter| counter.load(Ordering::Relaxed))
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut counters: BTreeMap<String, u64> = self
            .counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect();
        if let Some(health) = &self.health {
            let alive = health.alive_sessions();
            counters.insert(SESSIONS_ALIVE.to_string(), alive as u64);
            counters.insert(PIPELINE_ALIVE.to_string(), u64::from(alive > 0));
            metrics::gauge!(format!("{PREFIX}{SESSIONS_ALIVE}")).set(alive as f64);
            metrics::gauge!(format!("{PREFIX}{PIPELINE_ALIVE}")).set(if alive > 0 { 1.0 } else { 0.0 });
        }
        MetricsSnapshot {
            counters,
            written_at: None,
        }
    }

    /// Persist the current snapshot. Failures are logged and dropped.
    pub async fn flush(&self, store: &dyn MetricsStore) -> bool {
        let snapshot = self.snapshot();
        match store.write_snapshot(&snapshot).await {
            Ok(()) => {
                debug!(counters = snapshot.counters.len(), "metrics snapshot written");
                true
            }
            Err(e) => {
                warn!(error = %e, "metrics flush failed, snapshot dropped");
                false
            }
        }
    }

    /// Flush every `interval` until `cancel` fires, then flush once more.
    pub fn spawn_flusher(
        self: Arc<Self>,
        store: Arc<dyn MetricsStore>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        self.flush(store.as_ref()).await;
                    }
                }
            }
            self.flush(store.as_ref()).await;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use leadwire_core::LeadwireError;
    use tracing_test::traced_test;

    #[derive(Default)]
    struct MemoryStore {
        written: Mutex<Vec<MetricsSnapshot>>,
    }

    #[async_trait]
    impl MetricsStore for MemoryStore {
        async fn write_snapshot(&self, snapshot: &MetricsSnapshot) -> Result<(), LeadwireError> {
            self.written.lock().unwrap().push(snapshot.clone());
            Ok(())
        }

        async fn read_snapshot(&self) -> Result<Option<MetricsSnapshot>, LeadwireError> {
            Ok(self.written.lock().unwrap().last().cloned())
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl MetricsStore for BrokenStore {
        async fn write_snapshot(&self, _snapshot: &MetricsSnapshot) -> Result<(), LeadwireError> {
            Err(LeadwireError::Internal("disk on fire".into()))
        }

        async fn read_snapshot(&self) -> Result<Option<MetricsSnapshot>, LeadwireError> {
            Ok(None)
        }
    }

    #[test]
    fn counters_accumulate() {
        let sink = MetricsSink::new();
        sink.increment("delivered", 1);
        sink.increment("delivered", 2);
        sink.increment("enqueued", 1);
        assert_eq!(sink.get("delivered"), 3);
        assert_eq!(sink.get("missing"), 0);

        let snapshot = sink.snapshot();
        assert_eq!(snapshot.counters.len(), 2);
        assert_eq!(snapshot.counters["enqueued"], 1);
    }

    #[test]
    fn snapshot_carries_liveness() {
        let health = Arc::new(PipelineHealth::new());
        health.set_alive("main", true);
        let sink = MetricsSink::new().with_health(health.clone());

        assert_eq!(sink.snapshot().counters[PIPELINE_ALIVE], 1);
        health.set_alive("main", false);
        assert_eq!(sink.snapshot().counters[PIPELINE_ALIVE], 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn failed_flush_is_logged_and_dropped() {
        let sink = MetricsSink::new();
        sink.increment("delivered", 1);
        assert!(!sink.flush(&BrokenStore).await);
        assert!(logs_contain("metrics flush failed"));
        // counters survive a failed flush
        assert_eq!(sink.get("delivered"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn flusher_writes_periodically_and_on_cancel() {
        let sink = Arc::new(MetricsSink::new());
        let store = Arc::new(MemoryStore::default());
        let cancel = CancellationToken::new();

        let handle = sink.clone().spawn_flusher(
            store.clone(),
            Duration::from_secs(10),
            cancel.clone(),
        );
        sink.increment("enqueued", 4);
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(store.written.lock().unwrap().len(), 2);

        cancel.cancel();
        handle.await.unwrap();
        let written = store.written.lock().unwrap();
        assert_eq!(written.len(), 3);
        assert_eq!(written[2].counters["enqueued"], 4);
    }
}
