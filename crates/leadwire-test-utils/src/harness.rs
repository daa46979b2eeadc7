// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end harness: a running pipeline over a temp SQLite file with a
//! mock session, backend and sink.

use std::sync::Arc;
use std::time::Duration;

use leadwire_classifier::Classifier;
use leadwire_config::model::{LeadwireConfig, RuleConfig, RuleKind, SubscriberConfig};
use leadwire_core::{
    CategoryWeights, DeadLetter, DeadLetterStore, DeliveryEntry, DeliveryStatus, LeadwireError,
    QueueStore, RawMessage, SharedWeights, Subscriber, shared_weights,
};
use leadwire_filter::{FilterEngine, RuleSet};
use leadwire_pipeline::{Pipeline, PipelineParts, SharedSubscribers, shared_subscribers};
use leadwire_storage::SqliteStore;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::mock_backend::MockBackend;
use crate::mock_sink::MockSink;
use crate::mock_source::{MockSource, MockSourceHandle};

const POLL_STEP: Duration = Duration::from_millis(20);

/// Builder for [`TestHarness`]. Defaults favour fast tests: no rate limit to
/// speak of, one-second classification deadline, millisecond retries.
pub struct TestHarnessBuilder {
    config: LeadwireConfig,
    backend: Option<MockBackend>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = LeadwireConfig::default();
        config.classifier.requests_per_second = 1000.0;
        config.classifier.burst = 100;
        config.classifier.timeout_secs = 1;
        config.classifier.retry_base_ms = 10;
        config.classifier.retry_max_ms = 50;
        config.delivery.workers = 2;
        config.delivery.poll_interval_ms = 20;
        config.delivery.retry_delay_secs = 0;
        config.metrics.flush_interval_secs = 3600;
        Self {
            config,
            backend: None,
        }
    }

    /// Append a keyword rule.
    pub fn rule(mut self, pattern: &str, category: &str) -> Self {
        self.config.filter.rules.push(RuleConfig {
            pattern: pattern.into(),
            category: category.into(),
            kind: RuleKind::Keyword,
        });
        self
    }

    pub fn subscriber(mut self, id: &str, destination: i64, categories: &[&str]) -> Self {
        self.config.subscribers.push(SubscriberConfig {
            id: id.into(),
            destination,
            categories: categories.iter().map(|c| c.to_string()).collect(),
            active_until: None,
        });
        self
    }

    pub fn backend(mut self, backend: MockBackend) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Adjust any other setting.
    pub fn configure(mut self, f: impl FnOnce(&mut LeadwireConfig)) -> Self {
        f(&mut self.config);
        self
    }

    pub async fn build(self) -> Result<TestHarness, LeadwireError> {
        let mut config = self.config;
        let dir = tempfile::tempdir()
            .map_err(|e| LeadwireError::Internal(format!("temp dir: {e}")))?;
        config.storage.database_path = dir.path().join("leadwire.db").display().to_string();

        let store = Arc::new(SqliteStore::new(
            config.storage.clone(),
            config.delivery.queue_policy(),
        ));
        store.initialize().await?;

        let weights = shared_weights(CategoryWeights::new());
        let filter = Arc::new(FilterEngine::new(
            RuleSet::compile(&config.filter)?,
            weights.clone(),
        ));
        let backend = Arc::new(self.backend.unwrap_or_default());
        let classifier = Arc::new(Classifier::new(
            backend.clone(),
            &config.classifier,
            weights.clone(),
        ));
        let sink = Arc::new(MockSink::new());
        let subscribers =
            shared_subscribers(config.subscribers.iter().map(Subscriber::from).collect());
        let (source, source_handle) = MockSource::new("main");

        let cancel = CancellationToken::new();
        let parts = PipelineParts {
            sources: vec![Box::new(source)],
            filter: filter.clone(),
            classifier,
            queue: store.clone(),
            dead_letters: store.clone(),
            feedback: store.clone(),
            metrics_store: store.clone(),
            sink: sink.clone(),
            subscribers: subscribers.clone(),
            weights: weights.clone(),
            feedback_rx: None,
        };
        let pipeline = Pipeline::start(parts, &config, cancel.clone()).await?;

        Ok(TestHarness {
            config,
            store,
            sink,
            backend,
            source: source_handle,
            weights,
            subscribers,
            filter,
            cancel,
            pipeline: Some(pipeline),
            _dir: dir,
        })
    }
}

/// A running pipeline with handles on every mock.
pub struct TestHarness {
    pub config: LeadwireConfig,
    pub store: Arc<SqliteStore>,
    pub sink: Arc<MockSink>,
    pub backend: Arc<MockBackend>,
    pub source: MockSourceHandle,
    pub weights: SharedWeights,
    pub subscribers: SharedSubscribers,
    pub filter: Arc<FilterEngine>,
    cancel: CancellationToken,
    pipeline: Option<Pipeline>,
    _dir: TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    pub fn pipeline(&self) -> Option<&Pipeline> {
        self.pipeline.as_ref()
    }

    /// Deliver a batch through the mock session.
    pub fn push(&self, messages: Vec<RawMessage>) {
        self.source.push(messages);
    }

    /// Poll until the entry for `message_id` reaches `status`.
    pub async fn wait_for_status(
        &self,
        message_id: &str,
        status: DeliveryStatus,
        timeout: Duration,
    ) -> Option<DeliveryEntry> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Ok(entries) = self.store.list_by_status(status, 1000).await {
                if let Some(entry) = entries.into_iter().find(|e| e.message_id == message_id) {
                    return Some(entry);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(POLL_STEP).await;
        }
    }

    /// Poll until at least `count` dead letters exist.
    pub async fn wait_for_dead_letters(&self, count: usize, timeout: Duration) -> Vec<DeadLetter> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let letters = self.store.list_dead_letters(1000).await.unwrap_or_default();
            if letters.len() >= count || tokio::time::Instant::now() >= deadline {
                return letters;
            }
            tokio::time::sleep(POLL_STEP).await;
        }
    }

    /// Poll until `counter` reaches `value`.
    pub async fn wait_for_counter(&self, counter: &str, value: u64, timeout: Duration) -> bool {
        let Some(pipeline) = self.pipeline.as_ref() else {
            return false;
        };
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if pipeline.metrics().get(counter) >= value {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(POLL_STEP).await;
        }
    }

    /// Cancel every stage and wait for it to stop.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.wait().await;
        }
    }
}
