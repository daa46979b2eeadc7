// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Feedback intake and the periodic weight aggregation cycle.

use std::sync::Arc;
use std::time::Duration;

use leadwire_core::{FeedbackRecord, FeedbackStore, SharedWeights, WeightPolicy};
use leadwire_metrics::MetricsSink;
use leadwire_metrics::names::FEEDBACK_RECORDED;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct FeedbackCycle {
    store: Arc<dyn FeedbackStore>,
    weights: SharedWeights,
    policy: WeightPolicy,
    every: Duration,
}

impl FeedbackCycle {
    pub fn new(
        store: Arc<dyn FeedbackStore>,
        weights: SharedWeights,
        policy: WeightPolicy,
        every: Duration,
    ) -> Self {
        Self {
            store,
            weights,
            policy,
            every,
        }
    }

    /// Publish the persisted weights, so a restart does not forget them.
    pub async fn load(&self) {
        match self.store.current_weights().await {
            Ok(weights) => {
                info!(categories = weights.len(), "category weights loaded");
                self.weights.store(Arc::new(weights));
            }
            Err(e) => warn!(error = %e, "failed to load category weights, using neutral weights"),
        }
    }

    /// Fold new feedback into the weights and publish them.
    pub async fn run_once(&self) {
        match self.store.aggregate_weights(&self.policy).await {
            Ok(weights) => {
                debug!(categories = weights.len(), "feedback cycle complete");
                self.weights.store(Arc::new(weights));
            }
            Err(e) => error!(error = %e, "feedback aggregation failed"),
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.load().await;
            let mut ticker = tokio::time::interval(self.every);
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => self.run_once().await,
                }
            }
        })
    }
}

/// Persist verdicts arriving from subscriber-facing listeners.
pub fn spawn_recorder(
    store: Arc<dyn FeedbackStore>,
    metrics: Arc<MetricsSink>,
    mut rx: mpsc::Receiver<FeedbackRecord>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let record = tokio::select! {
                () = cancel.cancelled() => break,
                record = rx.recv() => match record {
                    Some(record) => record,
                    None => break,
                },
            };
            match store.record(&record).await {
                Ok(id) => {
                    metrics.increment(FEEDBACK_RECORDED, 1);
                    debug!(
                        id,
                        delivery_id = record.delivery_id,
                        subscriber = %record.subscriber_id,
                        verdict = %record.verdict,
                        "feedback recorded"
                    );
                }
                Err(e) => warn!(delivery_id = record.delivery_id, error = %e, "feedback dropped"),
            }
        }
    })
}
