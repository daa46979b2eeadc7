// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Leadwire pipeline.
//!
//! This crate provides the trait definitions, error types, and domain types
//! shared by every stage: sessions, filter, classifier, delivery queue,
//! feedback and metrics.

pub mod backoff;
pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use backoff::Backoff;
pub use error::{
    ClassifierError, ConnectionError, DeadLetterCause, DeliveryError, LeadwireError,
};
pub use types::{
    AdapterType, BackendVerdict, CategoryWeights, Classification, ClassificationRequest,
    DeadLetter, DeliveryEntry, DeliveryPayload, DeliveryStatus, FeedbackRecord, FeedbackStats,
    FilterResult, HealthStatus, MatchedRule, MessageKey, MetricsSnapshot, QueuePolicy, RawMessage,
    SharedWeights, Subscriber, Verdict, WeightPolicy, shared_weights,
};

pub use traits::{
    ChatSource, ClassifierBackend, DeadLetterStore, DeliverySink, FeedbackStore, MetricsStore,
    PluginAdapter, QueueStore,
};
