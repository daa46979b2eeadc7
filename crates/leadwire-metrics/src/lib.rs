// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Counters, session liveness and periodic snapshots for Leadwire.

pub mod health;
pub mod names;
pub mod sink;

pub use health::PipelineHealth;
pub use names::register_metrics;
pub use sink::MetricsSink;
