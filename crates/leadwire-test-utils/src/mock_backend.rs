// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Classification backend with scripted replies.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use leadwire_core::{
    AdapterType, BackendVerdict, ClassificationRequest, ClassifierBackend, ClassifierError,
    HealthStatus, LeadwireError, PluginAdapter,
};

#[derive(Debug, Clone)]
enum Step {
    Verdict(BackendVerdict),
    Fail(ClassifierError),
    Hang,
    /// Relevant, with the rule hint as category.
    EchoHint(f64),
}

/// A [`ClassifierBackend`] that pops scripted steps, falling back to a
/// default step once the script runs out.
#[derive(Debug)]
pub struct MockBackend {
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    calls: AtomicU32,
}

impl MockBackend {
    /// Echo the rule hint as a confident, relevant verdict.
    pub fn new() -> Self {
        Self::with_fallback(Step::EchoHint(0.95))
    }

    /// Never answer; every call runs into the classifier deadline.
    pub fn hanging() -> Self {
        Self::with_fallback(Step::Hang)
    }

    /// Always fail with `error`.
    pub fn failing(error: ClassifierError) -> Self {
        Self::with_fallback(Step::Fail(error))
    }

    fn with_fallback(fallback: Step) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            calls: AtomicU32::new(0),
        }
    }

    pub fn push_verdict(&self, category: &str, confidence: f64) -> &Self {
        self.push(Step::Verdict(BackendVerdict {
            relevant: true,
            category: Some(category.to_string()),
            confidence,
            raw_response: format!(
                r#"{{"relevant": true, "category": "{category}", "confidence": {confidence}}}"#
            ),
        }))
    }

    pub fn push_irrelevant(&self) -> &Self {
        self.push(Step::Verdict(BackendVerdict {
            relevant: false,
            category: None,
            confidence: 0.2,
            raw_response: r#"{"relevant": false}"#.into(),
        }))
    }

    pub fn push_error(&self, error: ClassifierError) -> &Self {
        self.push(Step::Fail(error))
    }

    pub fn push_hang(&self) -> &Self {
        self.push(Step::Hang)
    }

    fn push(&self, step: Step) -> &Self {
        self.script.lock().unwrap().push_back(step);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockBackend {
    fn name(&self) -> &str {
        "mock-backend"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Classifier
    }

    async fn health_check(&self) -> Result<HealthStatus, LeadwireError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), LeadwireError> {
        Ok(())
    }
}

#[async_trait]
impl ClassifierBackend for MockBackend {
    async fn classify(
        &self,
        request: &ClassificationRequest,
        _categories: &[String],
    ) -> Result<BackendVerdict, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match step {
            Step::Verdict(verdict) => Ok(verdict),
            Step::Fail(error) => Err(error),
            Step::Hang => std::future::pending().await,
            Step::EchoHint(confidence) => Ok(BackendVerdict {
                relevant: true,
                category: request.category_hint.clone(),
                confidence,
                raw_response: String::new(),
            }),
        }
    }
}
