// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! AI classification stage for Leadwire.
//!
//! A [`Classifier`] wraps any [`leadwire_core::ClassifierBackend`] with a
//! global [`TokenBucket`], a per-attempt deadline, exponential retry and
//! feedback-weighted confidence thresholds. [`OpenAiBackend`] talks to any
//! OpenAI-compatible chat completion endpoint.

pub mod classifier;
pub mod hint;
pub mod limiter;
pub mod openai;
pub mod response;
pub mod retry;

pub use classifier::{Classifier, effective_threshold};
pub use hint::HintBackend;
pub use limiter::TokenBucket;
pub use openai::OpenAiBackend;
pub use response::{calibrate, parse_verdict};
pub use retry::RetryConfig;
