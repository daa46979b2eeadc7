// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter and store trait definitions.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod classifier;
pub mod sink;
pub mod source;
pub mod storage;

pub use adapter::PluginAdapter;
pub use classifier::ClassifierBackend;
pub use sink::DeliverySink;
pub use source::ChatSource;
pub use storage::{DeadLetterStore, FeedbackStore, MetricsStore, QueueStore};
