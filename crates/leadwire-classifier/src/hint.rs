// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use async_trait::async_trait;
use leadwire_core::{
    AdapterType, BackendVerdict, ClassificationRequest, ClassifierBackend, ClassifierError,
    HealthStatus, LeadwireError, PluginAdapter,
};

/// Backend used when AI classification is switched off.
///
/// Trusts the filter: the matching rule's category stands with full
/// confidence. Pass-through messages without a rule get `fallback`.
#[derive(Debug, Clone)]
pub struct HintBackend {
    fallback: String,
}

impl HintBackend {
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            fallback: fallback.into(),
        }
    }
}

#[async_trait]
impl PluginAdapter for HintBackend {
    fn name(&self) -> &str {
        "rule-hint"
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
impl ClassifierBackend for HintBackend {
    async fn classify(
        &self,
        request: &ClassificationRequest,
        _categories: &[String],
    ) -> Result<BackendVerdict, ClassifierError> {
        let category = request
            .category_hint
            .clone()
            .unwrap_or_else(|| self.fallback.clone());
        Ok(BackendVerdict {
            relevant: true,
            category: Some(category),
            confidence: 1.0,
            raw_response: String::new(),
        })
    }
}
