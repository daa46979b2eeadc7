// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the pipeline store traits.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::OnceCell;
use tracing::debug;

use leadwire_config::model::StorageConfig;
use leadwire_core::types::format_timestamp;
use leadwire_core::{
    AdapterType, CategoryWeights, Classification, DeadLetter, DeadLetterCause, DeadLetterStore,
    DeliveryEntry, DeliveryPayload, DeliveryStatus, FeedbackRecord, FeedbackStats, FeedbackStore,
    HealthStatus, LeadwireError, MetricsSnapshot, MetricsStore, PluginAdapter, QueuePolicy,
    QueueStore, WeightPolicy,
};

use crate::database::{Database, map_tr_err};
use crate::queries;

/// SQLite-backed store for the queue, dead letters, feedback and metrics.
///
/// The database is opened by [`SqliteStore::initialize`]; every other call
/// fails with a storage error until then.
pub struct SqliteStore {
    config: StorageConfig,
    policy: QueuePolicy,
    db: OnceCell<Database>,
}

impl SqliteStore {
    pub fn new(config: StorageConfig, policy: QueuePolicy) -> Self {
        Self {
            config,
            policy,
            db: OnceCell::new(),
        }
    }

    /// Opens the database and applies migrations.
    pub async fn initialize(&self) -> Result<(), LeadwireError> {
        let db = Database::open_with(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| LeadwireError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite store initialized");
        Ok(())
    }

    pub fn policy(&self) -> &QueuePolicy {
        &self.policy
    }

    fn db(&self) -> Result<&Database, LeadwireError> {
        self.db.get().ok_or_else(|| LeadwireError::Storage {
            source: "storage not initialized, call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, LeadwireError> {
        self.db()?
            .connection()
            .call(|conn| conn.execute_batch("SELECT 1;"))
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), LeadwireError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl QueueStore for SqliteStore {
    async fn enqueue(
        &self,
        classification: &Classification,
        payload: &DeliveryPayload,
    ) -> Result<DeliveryEntry, LeadwireError> {
        queries::queue::enqueue(self.db()?, classification, payload, &self.policy, Utc::now()).await
    }

    async fn lease(&self, worker_id: &str) -> Result<Option<DeliveryEntry>, LeadwireError> {
        queries::queue::lease(self.db()?, worker_id, &self.policy, Utc::now()).await
    }

    async fn ack(&self, id: i64, worker_id: &str) -> Result<(), LeadwireError> {
        queries::queue::ack(self.db()?, id, worker_id).await
    }

    async fn fail(
        &self,
        id: i64,
        worker_id: &str,
        error: &str,
    ) -> Result<DeliveryStatus, LeadwireError> {
        queries::queue::fail(self.db()?, id, worker_id, error, &self.policy, Utc::now()).await
    }

    async fn release(&self, worker_id: &str) -> Result<usize, LeadwireError> {
        queries::queue::release(self.db()?, worker_id).await
    }

    async fn get(&self, id: i64) -> Result<Option<DeliveryEntry>, LeadwireError> {
        queries::queue::get(self.db()?, id).await
    }

    async fn list_by_status(
        &self,
        status: DeliveryStatus,
        limit: usize,
    ) -> Result<Vec<DeliveryEntry>, LeadwireError> {
        queries::queue::list_by_status(self.db()?, status, limit).await
    }

    async fn record_receipt(&self, id: i64, subscriber_id: &str) -> Result<(), LeadwireError> {
        queries::queue::record_receipt(self.db()?, id, subscriber_id, Utc::now()).await
    }

    async fn receipts(&self, id: i64) -> Result<Vec<String>, LeadwireError> {
        queries::queue::receipts(self.db()?, id).await
    }

    async fn purge_delivered(&self, retention: Duration) -> Result<usize, LeadwireError> {
        queries::queue::purge_delivered(self.db()?, retention, Utc::now()).await
    }
}

#[async_trait]
impl DeadLetterStore for SqliteStore {
    async fn dead_letter(
        &self,
        message_id: &str,
        category_hint: Option<&str>,
        payload: &DeliveryPayload,
        cause: &DeadLetterCause,
        attempts: u32,
    ) -> Result<i64, LeadwireError> {
        queries::dead_letters::insert(
            self.db()?,
            message_id,
            category_hint,
            payload,
            cause,
            attempts,
            Utc::now(),
        )
        .await
    }

    async fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>, LeadwireError> {
        queries::dead_letters::list(self.db()?, limit).await
    }
}

#[async_trait]
impl FeedbackStore for SqliteStore {
    async fn record(&self, record: &FeedbackRecord) -> Result<i64, LeadwireError> {
        queries::feedback::record(self.db()?, record).await
    }

    async fn aggregate_weights(
        &self,
        policy: &WeightPolicy,
    ) -> Result<CategoryWeights, LeadwireError> {
        queries::feedback::aggregate_weights(self.db()?, policy, Utc::now()).await
    }

    async fn current_weights(&self) -> Result<CategoryWeights, LeadwireError> {
        queries::feedback::current_weights(self.db()?).await
    }

    async fn feedback_stats(&self) -> Result<Vec<FeedbackStats>, LeadwireError> {
        queries::feedback::stats(self.db()?).await
    }
}

#[async_trait]
impl MetricsStore for SqliteStore {
    async fn write_snapshot(&self, snapshot: &MetricsSnapshot) -> Result<(), LeadwireError> {
        queries::metrics::write_snapshot(self.db()?, snapshot, Utc::now()).await
    }

    async fn read_snapshot(&self) -> Result<Option<MetricsSnapshot>, LeadwireError> {
        queries::metrics::read_snapshot(self.db()?).await
    }
}

/// Build a feedback record stamped with the current time.
pub fn feedback_now(
    delivery_id: i64,
    subscriber_id: impl Into<String>,
    verdict: leadwire_core::Verdict,
) -> FeedbackRecord {
    FeedbackRecord {
        delivery_id,
        subscriber_id: subscriber_id.into(),
        verdict,
        recorded_at: format_timestamp(Utc::now()),
    }
}
