// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Leadwire pipeline stages and their assembly.
//!
//! Sessions feed one ordered intake channel. Intake filters, classifies on a
//! bounded pool and writes to the durable queue. A delivery pool drains the
//! queue to subscribers. Feedback flows back into category weights read by
//! the filter and the classifier.

pub mod dedup;
pub mod delivery;
pub mod feedback;
pub mod intake;
pub mod session;
pub mod shutdown;

use std::sync::Arc;
use std::time::Duration;

use leadwire_classifier::Classifier;
use leadwire_config::model::LeadwireConfig;
use leadwire_core::{
    ChatSource, DeadLetterStore, DeliverySink, FeedbackRecord, FeedbackStore, LeadwireError,
    MetricsStore, QueueStore, SharedWeights,
};
use leadwire_filter::FilterEngine;
use leadwire_metrics::{MetricsSink, PipelineHealth};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub use leadwire_core::Backoff;
pub use dedup::{ContentWindow, RecentWindow};
pub use delivery::{DeliveryPool, PoolSettings, SharedSubscribers, shared_subscribers};
pub use feedback::FeedbackCycle;
pub use intake::Intake;
pub use session::{SessionHandles, SessionManager};
pub use shutdown::install_signal_handler;

const PURGE_INTERVAL: Duration = Duration::from_secs(3600);

/// Everything the pipeline needs from the outside world.
pub struct PipelineParts {
    pub sources: Vec<Box<dyn ChatSource>>,
    pub filter: Arc<FilterEngine>,
    pub classifier: Arc<Classifier>,
    pub queue: Arc<dyn QueueStore>,
    pub dead_letters: Arc<dyn DeadLetterStore>,
    pub feedback: Arc<dyn FeedbackStore>,
    pub metrics_store: Arc<dyn MetricsStore>,
    pub sink: Arc<dyn DeliverySink>,
    pub subscribers: SharedSubscribers,
    pub weights: SharedWeights,
    /// Verdicts from subscriber-facing listeners, if any.
    pub feedback_rx: Option<mpsc::Receiver<FeedbackRecord>>,
}

/// A running pipeline.
pub struct Pipeline {
    sessions: SessionHandles,
    intake: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
    background: Vec<JoinHandle<()>>,
    flusher: JoinHandle<()>,
    flush_cancel: CancellationToken,
    health: Arc<PipelineHealth>,
    metrics: Arc<MetricsSink>,
}

impl Pipeline {
    /// Connect sessions and start every stage.
    ///
    /// Fails when a session's credentials are rejected at startup.
    pub async fn start(
        parts: PipelineParts,
        config: &LeadwireConfig,
        cancel: CancellationToken,
    ) -> Result<Self, LeadwireError> {
        let health = Arc::new(PipelineHealth::new());
        let metrics = Arc::new(MetricsSink::new().with_health(health.clone()));

        let (tx, rx) = mpsc::channel(config.pipeline.intake_buffer.max(1));
        let poll = config
            .sessions
            .iter()
            .map(|s| s.poll_timeout_secs)
            .max()
            .unwrap_or(30);
        let sessions = SessionManager::new(
            tx,
            config.pipeline.dedup_window,
            health.clone(),
            metrics.clone(),
            config.reconnect.clone(),
            cancel.clone(),
        )
        .with_receive_timeout(Duration::from_secs(poll + 30))
        .with_content_window(ContentWindow::new(
            Duration::from_secs(config.pipeline.content_dedup_secs),
            config.pipeline.content_dedup_capacity,
        ))
        .start(parts.sources)
        .await?;
        info!(sessions = sessions.len(), "sessions started");

        let intake = Intake::new(
            parts.filter,
            parts.classifier,
            parts.queue.clone(),
            parts.dead_letters,
            metrics.clone(),
            config.pipeline.classify_workers,
        )
        .spawn(rx, cancel.clone());

        let delivery = &config.delivery;
        let workers = DeliveryPool::new(
            parts.queue.clone(),
            parts.sink,
            parts.subscribers,
            metrics.clone(),
            PoolSettings {
                workers: delivery.workers,
                poll_interval: Duration::from_millis(delivery.poll_interval_ms),
                dispatch_timeout: Duration::from_secs(delivery.dispatch_timeout_secs),
            },
        )
        .spawn(cancel.clone());
        info!(workers = workers.len(), "delivery pool started");

        let mut background = vec![
            delivery::spawn_purger(
                parts.queue,
                metrics.clone(),
                delivery.retention(),
                PURGE_INTERVAL,
                cancel.clone(),
            ),
            FeedbackCycle::new(
                parts.feedback.clone(),
                parts.weights,
                config.feedback.weight_policy(),
                Duration::from_secs(config.feedback.cycle_secs),
            )
            .spawn(cancel.clone()),
        ];
        if let Some(rx) = parts.feedback_rx {
            background.push(feedback::spawn_recorder(
                parts.feedback,
                metrics.clone(),
                rx,
                cancel.clone(),
            ));
        }

        let flush_cancel = CancellationToken::new();
        let flusher = metrics.clone().spawn_flusher(
            parts.metrics_store,
            Duration::from_secs(config.metrics.flush_interval_secs.max(1)),
            flush_cancel.clone(),
        );

        Ok(Self {
            sessions,
            intake,
            workers,
            background,
            flusher,
            flush_cancel,
            health,
            metrics,
        })
    }

    pub fn health(&self) -> &Arc<PipelineHealth> {
        &self.health
    }

    pub fn metrics(&self) -> &Arc<MetricsSink> {
        &self.metrics
    }

    /// Wait for every stage to stop after cancellation, then write a final
    /// metrics snapshot.
    pub async fn wait(self) {
        self.sessions.join().await;
        join("intake", self.intake).await;
        for worker in self.workers {
            join("delivery worker", worker).await;
        }
        for task in self.background {
            join("background task", task).await;
        }
        self.flush_cancel.cancel();
        join("metrics flusher", self.flusher).await;
        info!("pipeline stopped");
    }
}

async fn join(what: &str, handle: JoinHandle<()>) {
    if let Err(e) = handle.await {
        error!(task = what, error = %e, "task panicked");
    }
}
