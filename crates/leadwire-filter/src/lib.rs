// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rule-based pre-filter.
//!
//! Decides pass or drop before any classification call is spent. Rules are
//! ordered (pattern, category-hint) pairs; the first match wins.

pub mod engine;
pub mod rules;

pub use engine::FilterEngine;
pub use rules::{Rule, RuleSet};
