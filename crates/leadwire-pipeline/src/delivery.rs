// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery pool: a fixed set of workers that lease queue entries and
//! dispatch them to every active subscriber wanting the entry's category.
//!
//! Cancellation interrupts a dispatch in progress. The worker then returns
//! its lease to `pending` without spending an attempt; receipts keep the
//! subscribers already served from getting the entry twice.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::Utc;
use leadwire_core::{
    DeliveryEntry, DeliveryError, DeliverySink, DeliveryStatus, LeadwireError, QueueStore,
    Subscriber,
};
use leadwire_metrics::MetricsSink;
use leadwire_metrics::names::{
    DELIVERED, DELIVERY_DEAD, DELIVERY_FAILED, PURGED, SUBSCRIBERS_EXPIRED,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Subscriber list swapped atomically on reload.
pub type SharedSubscribers = Arc<ArcSwap<Vec<Subscriber>>>;

pub fn shared_subscribers(subscribers: Vec<Subscriber>) -> SharedSubscribers {
    Arc::new(ArcSwap::from_pointee(subscribers))
}

#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub workers: usize,
    /// Idle wait between lease attempts when the queue is empty.
    pub poll_interval: Duration,
    /// Bound on one subscriber dispatch.
    pub dispatch_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            poll_interval: Duration::from_millis(500),
            dispatch_timeout: Duration::from_secs(30),
        }
    }
}

pub struct DeliveryPool {
    queue: Arc<dyn QueueStore>,
    sink: Arc<dyn DeliverySink>,
    subscribers: SharedSubscribers,
    metrics: Arc<MetricsSink>,
    settings: PoolSettings,
}

impl DeliveryPool {
    pub fn new(
        queue: Arc<dyn QueueStore>,
        sink: Arc<dyn DeliverySink>,
        subscribers: SharedSubscribers,
        metrics: Arc<MetricsSink>,
        settings: PoolSettings,
    ) -> Self {
        Self {
            queue,
            sink,
            subscribers,
            metrics,
            settings,
        }
    }

    /// Start the workers. Each returns its leases to `pending` on cancel.
    pub fn spawn(self, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        let pool = Arc::new(self);
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        (0..pool.settings.workers.max(1))
            .map(|n| {
                let pool = pool.clone();
                let worker_id = format!("worker-{n}-{}", &run_id[..8]);
                let cancel = cancel.clone();
                tokio::spawn(async move { pool.work(worker_id, cancel).await })
            })
            .collect()
    }

    async fn work(self: Arc<Self>, worker_id: String, cancel: CancellationToken) {
        debug!(worker = %worker_id, "delivery worker started");
        loop {
            if cancel.is_cancelled() {
                break;
            }
            match self.queue.lease(&worker_id).await {
                Ok(Some(entry)) => {
                    let id = entry.id;
                    tokio::select! {
                        () = cancel.cancelled() => {
                            debug!(worker = %worker_id, id, "dispatch interrupted by shutdown");
                            break;
                        }
                        () = self.deliver(&worker_id, entry) => {}
                    }
                }
                Ok(None) => {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(self.settings.poll_interval) => {}
                    }
                }
                Err(e) => {
                    error!(worker = %worker_id, error = %e, "lease failed");
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(self.settings.poll_interval) => {}
                    }
                }
            }
        }

        match self.queue.release(&worker_id).await {
            Ok(0) => {}
            Ok(released) => info!(worker = %worker_id, released, "returned leases to pending"),
            Err(e) => error!(worker = %worker_id, error = %e, "failed to release leases"),
        }
        debug!(worker = %worker_id, "delivery worker stopped");
    }

    /// Dispatch one entry leased by `worker_id`, then settle it with `ack`
    /// or `fail`.
    pub async fn deliver(&self, worker_id: &str, entry: DeliveryEntry) {
        let served: HashSet<String> = match self.queue.receipts(entry.id).await {
            Ok(receipts) => receipts.into_iter().collect(),
            Err(e) => {
                self.settle_failure(worker_id, &entry, &format!("reading receipts: {e}"))
                    .await;
                return;
            }
        };

        let now = Utc::now();
        let subscribers = self.subscribers.load_full();
        let mut targets: Vec<&Subscriber> = Vec::new();
        for subscriber in subscribers.iter() {
            if !subscriber.wants(&entry.category) || served.contains(&subscriber.id) {
                continue;
            }
            if !subscriber.is_active(now) {
                self.metrics.increment(SUBSCRIBERS_EXPIRED, 1);
                debug!(id = entry.id, subscriber = %subscriber.id, "subscription expired, skipping");
                continue;
            }
            targets.push(subscriber);
        }
        if targets.is_empty() && served.is_empty() {
            debug!(id = entry.id, category = %entry.category, "no subscriber wants this category");
        }

        let mut failure: Option<DeliveryError> = None;
        for subscriber in targets {
            let dispatched = tokio::time::timeout(
                self.settings.dispatch_timeout,
                self.sink.deliver(subscriber, &entry),
            )
            .await
            .unwrap_or_else(|_| {
                Err(DeliveryError::Timeout {
                    subscriber: subscriber.id.clone(),
                    after: self.settings.dispatch_timeout,
                })
            });

            match dispatched {
                Ok(()) => {
                    if let Err(e) = self.queue.record_receipt(entry.id, &subscriber.id).await {
                        warn!(id = entry.id, subscriber = %subscriber.id, error = %e, "failed to record receipt");
                    }
                }
                Err(e) => {
                    warn!(id = entry.id, error = %e, "dispatch failed");
                    failure = Some(e);
                }
            }
        }

        match failure {
            None => match self.queue.ack(entry.id, worker_id).await {
                Ok(()) => {
                    self.metrics.increment(DELIVERED, 1);
                    info!(id = entry.id, category = %entry.category, "entry delivered");
                }
                Err(e @ LeadwireError::LeaseLost { .. }) => {
                    warn!(id = entry.id, error = %e, "lease expired during dispatch")
                }
                Err(e) => error!(id = entry.id, error = %e, "ack failed"),
            },
            Some(e) => self.settle_failure(worker_id, &entry, &e.to_string()).await,
        }
    }

    async fn settle_failure(&self, worker_id: &str, entry: &DeliveryEntry, reason: &str) {
        match self.queue.fail(entry.id, worker_id, reason).await {
            Ok(DeliveryStatus::Dead) => {
                self.metrics.increment(DELIVERY_DEAD, 1);
                error!(
                    id = entry.id,
                    attempts = entry.attempt_count + 1,
                    error = reason,
                    "delivery attempts exhausted, entry is dead"
                );
            }
            Ok(status) => {
                self.metrics.increment(DELIVERY_FAILED, 1);
                debug!(id = entry.id, %status, "delivery will be retried");
            }
            Err(e @ LeadwireError::LeaseLost { .. }) => {
                warn!(id = entry.id, error = %e, "lease expired during dispatch")
            }
            Err(e) => error!(id = entry.id, error = %e, "failed to record delivery failure"),
        }
    }
}

/// Periodically delete delivered entries older than `retention`.
pub fn spawn_purger(
    queue: Arc<dyn QueueStore>,
    metrics: Arc<MetricsSink>,
    retention: Duration,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match queue.purge_delivered(retention).await {
                Ok(0) => {}
                Ok(purged) => {
                    metrics.increment(PURGED, purged as u64);
                    info!(purged, "purged delivered entries past retention");
                }
                Err(e) => warn!(error = %e, "retention purge failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::TimeDelta;
    use leadwire_config::model::StorageConfig;
    use leadwire_core::{
        AdapterType, Classification, DeliveryPayload, HealthStatus, PluginAdapter, QueuePolicy,
    };
    use leadwire_metrics::names::SUBSCRIBERS_EXPIRED;
    use leadwire_storage::SqliteStore;
    use leadwire_test_utils::MockSink;
    use tempfile::TempDir;
    use tokio::sync::Notify;

    /// Parks every dispatch forever.
    #[derive(Default)]
    struct StuckSink {
        entered: Notify,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PluginAdapter for StuckSink {
        fn name(&self) -> &str {
            "stuck"
        }

        fn version(&self) -> semver::Version {
            semver::Version::new(0, 1, 0)
        }

        fn adapter_type(&self) -> AdapterType {
            AdapterType::Sink
        }

        async fn health_check(&self) -> Result<HealthStatus, LeadwireError> {
            Ok(HealthStatus::Healthy)
        }

        async fn shutdown(&self) -> Result<(), LeadwireError> {
            Ok(())
        }
    }

    #[async_trait]
    impl DeliverySink for StuckSink {
        async fn deliver(
            &self,
            _subscriber: &Subscriber,
            _entry: &DeliveryEntry,
        ) -> Result<(), DeliveryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            std::future::pending().await
        }
    }

    async fn store(dir: &TempDir) -> Arc<SqliteStore> {
        let config = StorageConfig {
            database_path: dir.path().join("queue.db").display().to_string(),
            ..StorageConfig::default()
        };
        let store = Arc::new(SqliteStore::new(config, QueuePolicy::default()));
        store.initialize().await.unwrap();
        store
    }

    async fn enqueue(store: &SqliteStore, message_id: &str) -> DeliveryEntry {
        let classification = Classification {
            message_id: message_id.into(),
            category: "job-lead".into(),
            confidence: 0.9,
            raw_response: "{}".into(),
            relevant: true,
        };
        let payload = DeliveryPayload {
            session: "main".into(),
            channel_id: -100,
            channel_title: None,
            author_id: None,
            text: "React contract".into(),
            received_at: Utc::now(),
        };
        store.enqueue(&classification, &payload).await.unwrap()
    }

    fn subscriber(id: &str, active_until: Option<chrono::DateTime<Utc>>) -> Subscriber {
        Subscriber {
            id: id.into(),
            destination: 1,
            categories: vec![],
            active_until,
        }
    }

    fn settings() -> PoolSettings {
        PoolSettings {
            workers: 1,
            poll_interval: Duration::from_millis(10),
            dispatch_timeout: Duration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn cancel_during_dispatch_returns_entry_to_pending() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        let entry = enqueue(&store, "-100:1").await;
        let sink = Arc::new(StuckSink::default());
        let cancel = CancellationToken::new();

        let workers = DeliveryPool::new(
            store.clone(),
            sink.clone(),
            shared_subscribers(vec![subscriber("alice", None)]),
            Arc::new(MetricsSink::new()),
            settings(),
        )
        .spawn(cancel.clone());

        tokio::time::timeout(Duration::from_secs(5), sink.entered.notified())
            .await
            .expect("dispatch should start");
        let leased = store.get(entry.id).await.unwrap().unwrap();
        assert_eq!(leased.status, DeliveryStatus::InFlight);

        cancel.cancel();
        for worker in workers {
            tokio::time::timeout(Duration::from_secs(5), worker)
                .await
                .expect("worker should stop")
                .unwrap();
        }

        let stored = store.get(entry.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DeliveryStatus::Pending);
        assert_eq!(stored.attempt_count, 0);
        assert!(stored.leased_by.is_none());
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_subscription_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        let entry = enqueue(&store, "-100:2").await;
        let sink = Arc::new(MockSink::new());
        let metrics = Arc::new(MetricsSink::new());
        let ended = Utc::now() - TimeDelta::days(1);
        let pool = DeliveryPool::new(
            store.clone(),
            sink.clone(),
            shared_subscribers(vec![subscriber("alice", None), subscriber("lapsed", Some(ended))]),
            metrics.clone(),
            settings(),
        );

        let leased = store.lease("w1").await.unwrap().unwrap();
        pool.deliver("w1", leased).await;

        assert_eq!(sink.delivered_to("alice").len(), 1);
        assert!(sink.delivered_to("lapsed").is_empty());
        assert_eq!(metrics.get(SUBSCRIBERS_EXPIRED), 1);
        let stored = store.get(entry.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DeliveryStatus::Delivered);
    }

    #[tokio::test]
    async fn dispatch_under_a_lost_lease_leaves_entry_to_its_holder() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        let entry = enqueue(&store, "-100:3").await;
        let metrics = Arc::new(MetricsSink::new());
        let pool = DeliveryPool::new(
            store.clone(),
            Arc::new(MockSink::new()),
            shared_subscribers(vec![subscriber("alice", None)]),
            metrics.clone(),
            settings(),
        );

        let leased = store.lease("current").await.unwrap().unwrap();
        pool.deliver("stale", leased).await;

        let stored = store.get(entry.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DeliveryStatus::InFlight);
        assert_eq!(stored.leased_by.as_deref(), Some("current"));
        assert_eq!(metrics.get(DELIVERED), 0);
    }
}
