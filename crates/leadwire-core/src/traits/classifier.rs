// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Classification backend trait.

use async_trait::async_trait;

use crate::error::ClassifierError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{BackendVerdict, ClassificationRequest};

/// A single-shot classification service.
///
/// Implementations perform exactly one upstream call. Rate limiting, timeouts
/// and retries are layered on top by the classifier.
#[async_trait]
pub trait ClassifierBackend: PluginAdapter {
    async fn classify(
        &self,
        request: &ClassificationRequest,
        categories: &[String],
    ) -> Result<BackendVerdict, ClassifierError>;
}
