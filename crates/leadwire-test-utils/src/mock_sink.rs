// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery sink that records what it was given.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use leadwire_core::{
    AdapterType, DeliveryEntry, DeliveryError, DeliverySink, HealthStatus, LeadwireError,
    PluginAdapter, Subscriber,
};

/// One successful dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivered {
    pub subscriber_id: String,
    pub entry_id: i64,
    pub message_id: String,
    pub category: String,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct MockSink {
    delivered: Mutex<Vec<Delivered>>,
    failures: Mutex<VecDeque<DeliveryError>>,
    failing: AtomicBool,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next dispatch with `error`.
    pub fn fail_next(&self, error: DeliveryError) {
        self.failures.lock().unwrap().push_back(error);
    }

    /// Fail every dispatch with a transient error while set.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn delivered(&self) -> Vec<Delivered> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn delivered_to(&self, subscriber_id: &str) -> Vec<Delivered> {
        self.delivered()
            .into_iter()
            .filter(|d| d.subscriber_id == subscriber_id)
            .collect()
    }
}

#[async_trait]
impl PluginAdapter for MockSink {
    fn name(&self) -> &str {
        "mock-sink"
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
impl DeliverySink for MockSink {
    async fn deliver(
        &self,
        subscriber: &Subscriber,
        entry: &DeliveryEntry,
    ) -> Result<(), DeliveryError> {
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(DeliveryError::Transient {
                subscriber: subscriber.id.clone(),
                message: "sink unavailable".into(),
            });
        }
        self.delivered.lock().unwrap().push(Delivered {
            subscriber_id: subscriber.id.clone(),
            entry_id: entry.id,
            message_id: entry.message_id.clone(),
            category: entry.category.clone(),
            text: entry.payload.text.clone(),
        });
        Ok(())
    }
}
