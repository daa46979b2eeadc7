// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable store traits.
//!
//! The pipeline only talks to these traits. Any transactional backend works as
//! long as `lease`, `ack` and `fail` are atomic per entry.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{DeadLetterCause, LeadwireError};
use crate::types::{
    CategoryWeights, Classification, DeadLetter, DeliveryEntry, DeliveryPayload, DeliveryStatus,
    FeedbackRecord, FeedbackStats, MetricsSnapshot, WeightPolicy,
};

/// Durable per-category FIFO with lease/ack/fail semantics.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Inserts an entry, or refreshes the existing one for the same message
    /// while it is still `pending` or `failed`.
    async fn enqueue(
        &self,
        classification: &Classification,
        payload: &DeliveryPayload,
    ) -> Result<DeliveryEntry, LeadwireError>;

    /// Leases the oldest eligible entry to `worker_id`, if any.
    async fn lease(&self, worker_id: &str) -> Result<Option<DeliveryEntry>, LeadwireError>;

    /// Marks an entry leased by `worker_id` delivered.
    ///
    /// Fails with [`LeadwireError::LeaseLost`] when the lease expired and
    /// another worker holds the entry now.
    async fn ack(&self, id: i64, worker_id: &str) -> Result<(), LeadwireError>;

    /// Records a failed attempt by the lease holder `worker_id`. Returns the
    /// resulting status (`failed` while budget remains, `dead` otherwise).
    async fn fail(
        &self,
        id: i64,
        worker_id: &str,
        error: &str,
    ) -> Result<DeliveryStatus, LeadwireError>;

    /// Returns every entry leased by `worker_id` to `pending` without
    /// consuming an attempt.
    async fn release(&self, worker_id: &str) -> Result<usize, LeadwireError>;

    async fn get(&self, id: i64) -> Result<Option<DeliveryEntry>, LeadwireError>;

    async fn list_by_status(
        &self,
        status: DeliveryStatus,
        limit: usize,
    ) -> Result<Vec<DeliveryEntry>, LeadwireError>;

    /// Notes that `subscriber_id` already received entry `id`.
    async fn record_receipt(&self, id: i64, subscriber_id: &str) -> Result<(), LeadwireError>;

    async fn receipts(&self, id: i64) -> Result<Vec<String>, LeadwireError>;

    /// Deletes delivered entries older than `retention`.
    async fn purge_delivered(&self, retention: Duration) -> Result<usize, LeadwireError>;
}

/// Terminal storage for messages that never made it into the queue.
#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    async fn dead_letter(
        &self,
        message_id: &str,
        category_hint: Option<&str>,
        payload: &DeliveryPayload,
        cause: &DeadLetterCause,
        attempts: u32,
    ) -> Result<i64, LeadwireError>;

    async fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>, LeadwireError>;
}

/// Append-only feedback with periodic weight aggregation.
#[async_trait]
pub trait FeedbackStore: Send + Sync {
    async fn record(&self, record: &FeedbackRecord) -> Result<i64, LeadwireError>;

    /// Folds feedback recorded since the previous cycle into category weights
    /// and returns the full weight map.
    async fn aggregate_weights(
        &self,
        policy: &WeightPolicy,
    ) -> Result<CategoryWeights, LeadwireError>;

    async fn current_weights(&self) -> Result<CategoryWeights, LeadwireError>;

    async fn feedback_stats(&self) -> Result<Vec<FeedbackStats>, LeadwireError>;
}

/// Flat counter snapshot, overwritten on every flush.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    async fn write_snapshot(&self, snapshot: &MetricsSnapshot) -> Result<(), LeadwireError>;

    async fn read_snapshot(&self) -> Result<Option<MetricsSnapshot>, LeadwireError>;
}
