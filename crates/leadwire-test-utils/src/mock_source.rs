// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scriptable chat session.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use leadwire_core::{
    AdapterType, ChatSource, ConnectionError, HealthStatus, LeadwireError, PluginAdapter,
    RawMessage,
};
use tokio::sync::mpsc;

enum SourceEvent {
    Batch(Vec<RawMessage>),
    Fail(ConnectionError),
}

#[derive(Default)]
struct Shared {
    connect_failures: Mutex<VecDeque<ConnectionError>>,
    connects: AtomicU32,
}

/// A [`ChatSource`] fed through its [`MockSourceHandle`].
///
/// Messages it yields are stamped with its own session name. Once every
/// handle is dropped, `receive` waits forever.
pub struct MockSource {
    name: String,
    events: mpsc::UnboundedReceiver<SourceEvent>,
    shared: Arc<Shared>,
}

/// Drives a [`MockSource`] from the test body.
#[derive(Clone)]
pub struct MockSourceHandle {
    events: mpsc::UnboundedSender<SourceEvent>,
    shared: Arc<Shared>,
}

impl MockSource {
    pub fn new(name: &str) -> (Self, MockSourceHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());
        (
            Self {
                name: name.to_string(),
                events: rx,
                shared: shared.clone(),
            },
            MockSourceHandle { events: tx, shared },
        )
    }
}

impl MockSourceHandle {
    /// Queue a batch for the next `receive`.
    pub fn push(&self, batch: Vec<RawMessage>) {
        let _ = self.events.send(SourceEvent::Batch(batch));
    }

    /// Make a later `receive` fail, in order with pushed batches.
    pub fn fail_receive(&self, error: ConnectionError) {
        let _ = self.events.send(SourceEvent::Fail(error));
    }

    /// Make the next `connect` fail.
    pub fn fail_next_connect(&self, error: ConnectionError) {
        self.shared
            .connect_failures
            .lock()
            .unwrap()
            .push_back(error);
    }

    /// Number of `connect` calls so far.
    pub fn connects(&self) -> u32 {
        self.shared.connects.load(Ordering::SeqCst)
    }
}

/// A text message in `channel_id` with upstream id `source_id`.
pub fn raw_message(channel_id: i64, source_id: i64, text: &str) -> RawMessage {
    RawMessage {
        session: "main".into(),
        source_id,
        channel_id,
        channel_title: Some("Test chat".into()),
        author_id: Some(1000 + source_id),
        text: text.into(),
        received_at: Utc::now(),
    }
}

#[async_trait]
impl PluginAdapter for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Source
    }

    async fn health_check(&self) -> Result<HealthStatus, LeadwireError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), LeadwireError> {
        Ok(())
    }
}

#[async_trait]
impl ChatSource for MockSource {
    async fn connect(&mut self) -> Result<(), ConnectionError> {
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        match self.shared.connect_failures.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn receive(&mut self) -> Result<Vec<RawMessage>, ConnectionError> {
        match self.events.recv().await {
            Some(SourceEvent::Batch(mut batch)) => {
                for message in &mut batch {
                    message.session = self.name.clone();
                }
                Ok(batch)
            }
            Some(SourceEvent::Fail(error)) => Err(error),
            None => std::future::pending().await,
        }
    }
}
