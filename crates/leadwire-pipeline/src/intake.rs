// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Intake: filter every message in arrival order, classify the survivors on
//! a bounded pool, then enqueue or dead-letter them.
//!
//! A classified message the queue refuses, or that storage keeps failing to
//! write, is dead-lettered too. The session window already marked it seen,
//! so nothing upstream would bring it back.

use std::sync::Arc;
use std::time::Duration;

use leadwire_classifier::Classifier;
use leadwire_core::{
    Backoff, Classification, ClassificationRequest, DeadLetterCause, DeadLetterStore,
    DeliveryPayload, FilterResult, LeadwireError, QueueStore, RawMessage,
};
use leadwire_filter::FilterEngine;
use leadwire_metrics::MetricsSink;
use leadwire_metrics::names::{
    CLASSIFIED, DEAD_LETTERED, ENQUEUED, FILTER_DROPPED, FILTER_PASSED, IRRELEVANT_DROPPED,
    QUEUE_FULL,
};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How long shutdown waits for in-flight classifications.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Enqueue attempts before a storage failure dead-letters the message.
const ENQUEUE_ATTEMPTS: u32 = 3;
const ENQUEUE_RETRY_BASE: Duration = Duration::from_millis(100);
const ENQUEUE_RETRY_MAX: Duration = Duration::from_secs(2);

pub struct Intake {
    filter: Arc<FilterEngine>,
    classifier: Arc<Classifier>,
    queue: Arc<dyn QueueStore>,
    dead_letters: Arc<dyn DeadLetterStore>,
    metrics: Arc<MetricsSink>,
    permits: Arc<Semaphore>,
    drain_timeout: Duration,
}

impl Intake {
    pub fn new(
        filter: Arc<FilterEngine>,
        classifier: Arc<Classifier>,
        queue: Arc<dyn QueueStore>,
        dead_letters: Arc<dyn DeadLetterStore>,
        metrics: Arc<MetricsSink>,
        workers: usize,
    ) -> Self {
        Self {
            filter,
            classifier,
            queue,
            dead_letters,
            metrics,
            permits: Arc::new(Semaphore::new(workers.max(1))),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn spawn(
        self,
        rx: mpsc::Receiver<RawMessage>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(Arc::new(self).run(rx, cancel))
    }

    async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<RawMessage>, cancel: CancellationToken) {
        let mut tasks = JoinSet::new();

        loop {
            let message = tokio::select! {
                () = cancel.cancelled() => break,
                message = rx.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            let result = self.filter.evaluate(message);
            if !result.passed {
                self.metrics.increment(FILTER_DROPPED, 1);
                debug!(message_id = %result.message.message_id(), "message dropped by filter");
                continue;
            }
            self.metrics.increment(FILTER_PASSED, 1);

            let permit = tokio::select! {
                () = cancel.cancelled() => break,
                permit = self.permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            let this = self.clone();
            tasks.spawn(async move {
                let _permit = permit;
                this.process(result).await;
            });

            while let Some(finished) = tasks.try_join_next() {
                if let Err(e) = finished {
                    error!(error = %e, "classification task panicked");
                }
            }
        }

        if !tasks.is_empty() {
            info!(in_flight = tasks.len(), "waiting for in-flight classifications");
        }
        let drained = tokio::time::timeout(self.drain_timeout, async {
            while let Some(finished) = tasks.join_next().await {
                if let Err(e) = finished {
                    error!(error = %e, "classification task panicked");
                }
            }
        })
        .await;
        if drained.is_err() {
            warn!(remaining = tasks.len(), "classification drain timed out, aborting");
            tasks.abort_all();
        }
        info!("intake stopped");
    }

    /// Classify one filtered message and route the outcome.
    pub async fn process(&self, result: FilterResult) {
        let hint = result.category_hint().map(str::to_string);
        let message = result.message;
        let message_id = message.message_id();
        let payload = message.payload();
        let mut request = ClassificationRequest::new(message, hint);

        match self.classifier.classify(&mut request).await {
            Ok(classification) if !classification.relevant => {
                self.metrics.increment(IRRELEVANT_DROPPED, 1);
                debug!(
                    %message_id,
                    category = %classification.category,
                    confidence = classification.confidence,
                    "message classified as not relevant"
                );
            }
            Ok(classification) => {
                self.metrics.increment(CLASSIFIED, 1);
                if let Err(cause) = self.enqueue(&classification, &payload).await {
                    self.dead_letter(
                        &message_id,
                        Some(&classification.category),
                        &payload,
                        &cause,
                        request.attempt_count,
                    )
                    .await;
                }
            }
            Err(err) => {
                self.dead_letter(
                    &message_id,
                    request.category_hint.as_deref(),
                    &payload,
                    &err.into(),
                    request.attempt_count,
                )
                .await;
            }
        }
    }

    /// Write the entry, retrying storage errors with backoff. A full queue is
    /// not retried.
    async fn enqueue(
        &self,
        classification: &Classification,
        payload: &DeliveryPayload,
    ) -> Result<(), DeadLetterCause> {
        let mut backoff = Backoff::new(ENQUEUE_RETRY_BASE, ENQUEUE_RETRY_MAX, 0.0);
        loop {
            match self.queue.enqueue(classification, payload).await {
                Ok(entry) => {
                    self.metrics.increment(ENQUEUED, 1);
                    debug!(
                        id = entry.id,
                        message_id = %entry.message_id,
                        category = %entry.category,
                        "message enqueued"
                    );
                    return Ok(());
                }
                Err(LeadwireError::QueueFull { capacity }) => {
                    self.metrics.increment(QUEUE_FULL, 1);
                    return Err(DeadLetterCause::QueueFull { capacity });
                }
                Err(e) if backoff.failures() + 1 >= ENQUEUE_ATTEMPTS => {
                    return Err(DeadLetterCause::Storage {
                        message: e.to_string(),
                    });
                }
                Err(e) => {
                    let delay = backoff.next_delay(None);
                    warn!(
                        message_id = %classification.message_id,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "enqueue failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn dead_letter(
        &self,
        message_id: &str,
        hint: Option<&str>,
        payload: &DeliveryPayload,
        cause: &DeadLetterCause,
        attempts: u32,
    ) {
        self.metrics.increment(DEAD_LETTERED, 1);
        warn!(%message_id, attempts, code = cause.code(), error = %cause, "dead-lettering message");
        if let Err(e) = self
            .dead_letters
            .dead_letter(message_id, hint, payload, cause, attempts)
            .await
        {
            error!(%message_id, error = %e, "failed to record dead letter");
        }
    }
}
