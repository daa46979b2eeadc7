// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The classification stage: limiter, deadline, retries and thresholds
//! around a [`ClassifierBackend`].

use std::sync::Arc;
use std::time::Duration;

use leadwire_config::model::ClassifierConfig;
use leadwire_core::{
    BackendVerdict, Classification, ClassificationRequest, ClassifierBackend, ClassifierError,
    LeadwireError, SharedWeights,
};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::hint::HintBackend;
use crate::limiter::TokenBucket;
use crate::openai::OpenAiBackend;
use crate::response::calibrate;
use crate::retry::RetryConfig;

/// Confidence a category needs once its feedback weight is applied.
///
/// Weight `1.0` keeps `base`; lower weights move the bar toward `1.0`.
pub fn effective_threshold(base: f64, weight: f64) -> f64 {
    let weight = weight.clamp(0.0, 1.0);
    base + (1.0 - weight) * (1.0 - base)
}

pub struct Classifier {
    backend: Arc<dyn ClassifierBackend>,
    limiter: Option<Arc<TokenBucket>>,
    retry: RetryConfig,
    timeout: Duration,
    threshold: f64,
    low_confidence_category: String,
    calibrate: bool,
    categories: Vec<String>,
    weights: SharedWeights,
}

impl Classifier {
    /// Wrap `backend` with the limiter, deadline and retry policy from `config`.
    pub fn new(
        backend: Arc<dyn ClassifierBackend>,
        config: &ClassifierConfig,
        weights: SharedWeights,
    ) -> Self {
        Self {
            backend,
            limiter: Some(Arc::new(TokenBucket::new(
                config.requests_per_second,
                config.burst,
            ))),
            retry: RetryConfig::from(config),
            timeout: config.timeout(),
            threshold: config.confidence_threshold,
            low_confidence_category: config.low_confidence_category.clone(),
            calibrate: config.calibrate,
            categories: config.categories.clone(),
            weights,
        }
    }

    /// Build the stage described by `config`: the HTTP backend when enabled,
    /// otherwise rule hints without any rate limit.
    pub fn from_config(
        config: &ClassifierConfig,
        weights: SharedWeights,
    ) -> Result<Self, LeadwireError> {
        if config.enabled {
            let backend = OpenAiBackend::new(config)?;
            Ok(Self::new(Arc::new(backend), config, weights))
        } else {
            let backend = HintBackend::new(config.low_confidence_category.clone());
            let mut classifier = Self::new(Arc::new(backend), config, weights);
            classifier.limiter = None;
            Ok(classifier)
        }
    }

    /// Share a limiter with other classifier instances.
    pub fn with_limiter(mut self, limiter: Arc<TokenBucket>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn max_attempts(&self) -> u32 {
        self.retry.max_attempts
    }

    /// Classify one message, retrying retryable failures.
    ///
    /// `request.attempt_count` is advanced for every attempt made, so after an
    /// error it holds the number of attempts spent on the message.
    pub async fn classify(
        &self,
        request: &mut ClassificationRequest,
    ) -> Result<Classification, ClassifierError> {
        loop {
            request.attempt_count += 1;
            let attempt = request.attempt_count;

            match self.attempt(request).await {
                Ok(verdict) => {
                    metrics::counter!("leadwire_classifier_calls_total", "outcome" => "ok")
                        .increment(1);
                    return Ok(self.finish(request, verdict));
                }
                Err(err) => {
                    metrics::counter!("leadwire_classifier_calls_total", "outcome" => err.code())
                        .increment(1);
                    if !err.is_retryable() || attempt >= self.retry.max_attempts {
                        return Err(err);
                    }
                    let delay = self.retry.delay(attempt - 1);
                    warn!(
                        message_id = %request.message.message_id(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "classification failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// One call: wait for a token, then call the backend within what is left
    /// of the deadline.
    async fn attempt(&self, request: &ClassificationRequest) -> Result<BackendVerdict, ClassifierError> {
        let started = Instant::now();
        if let Some(limiter) = &self.limiter {
            limiter.acquire(self.timeout).await?;
        }
        let remaining = self.timeout.saturating_sub(started.elapsed());
        match tokio::time::timeout(remaining, self.backend.classify(request, &self.categories)).await
        {
            Ok(result) => result,
            Err(_) => Err(ClassifierError::Timeout {
                after: self.timeout,
            }),
        }
    }

    fn finish(&self, request: &ClassificationRequest, verdict: BackendVerdict) -> Classification {
        let hint = request.category_hint.as_deref();
        let mut confidence = verdict.confidence.clamp(0.0, 1.0);
        if self.calibrate {
            confidence = calibrate(confidence);
        }

        let named = verdict.category.filter(|category| {
            self.categories.is_empty()
                || self.categories.iter().any(|c| c == category)
                || hint == Some(category.as_str())
        });
        let mut category = named
            .or_else(|| hint.map(str::to_string))
            .unwrap_or_else(|| self.low_confidence_category.clone());

        let weight = self.weights.load().get(&category);
        let threshold = effective_threshold(self.threshold, weight);
        if confidence < threshold {
            debug!(
                %category,
                confidence,
                threshold,
                "confidence below threshold"
            );
            category = self.low_confidence_category.clone();
        }

        Classification {
            message_id: request.message.message_id(),
            category,
            confidence,
            raw_response: verdict.raw_response,
            relevant: verdict.relevant,
        }
    }
}
