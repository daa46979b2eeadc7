// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The filter engine: a rule snapshot behind an atomic pointer swap.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use leadwire_core::{FilterResult, RawMessage, SharedWeights};
use tracing::{debug, info};

use crate::rules::RuleSet;

/// Evaluates messages against the current rule snapshot.
///
/// Readers never block and always see one complete snapshot. [`reload`]
/// replaces the snapshot for every subsequent call.
///
/// Suppression is soft: every `sample_every`-th suppressed match passes
/// anyway, so a suppressed category still reaches subscribers now and then
/// and can earn its weight back.
///
/// [`reload`]: FilterEngine::reload
pub struct FilterEngine {
    rules: ArcSwap<RuleSet>,
    weights: SharedWeights,
    suppressed: AtomicU64,
}

impl FilterEngine {
    pub fn new(rules: RuleSet, weights: SharedWeights) -> Self {
        Self {
            rules: ArcSwap::from_pointee(rules),
            weights,
            suppressed: AtomicU64::new(0),
        }
    }

    /// Synchronous: reads the current snapshots, performs no I/O.
    pub fn evaluate(&self, message: RawMessage) -> FilterResult {
        let rules = self.rules.load();
        let weights = self.weights.load();
        let mut result = rules.evaluate(message, &weights);

        if !result.passed && result.matched_rule.is_some() {
            let seen = self.suppressed.fetch_add(1, Ordering::Relaxed) + 1;
            if seen % u64::from(rules.sample_every()) == 0 {
                result.passed = true;
                debug!(
                    category = result.category_hint().unwrap_or_default(),
                    "suppressed category sampled through"
                );
            }
        }
        result
    }

    /// Atomically install a new rule set.
    pub fn reload(&self, rules: RuleSet) {
        let count = rules.len();
        let pass_through = rules.pass_through();
        self.rules.store(Arc::new(rules));
        info!(rules = count, pass_through, "filter rules reloaded");
    }

    /// The snapshot currently in use.
    pub fn snapshot(&self) -> Arc<RuleSet> {
        self.rules.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use leadwire_config::model::{FilterConfig, RuleConfig, RuleKind};
    use leadwire_core::{CategoryWeights, shared_weights};
    use proptest::prelude::*;

    fn message(text: &str) -> RawMessage {
        RawMessage {
            session: "main".into(),
            source_id: 1,
            channel_id: -100,
            channel_title: None,
            author_id: Some(9),
            text: text.into(),
            received_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn rule(pattern: &str, category: &str, kind: RuleKind) -> RuleConfig {
        RuleConfig {
            pattern: pattern.into(),
            category: category.into(),
            kind,
        }
    }

    fn config() -> FilterConfig {
        FilterConfig {
            pass_through: false,
            min_pass_weight: 0.5,
            suppressed_sample_every: 3,
            exclusions: vec![r"promo\s*code".into()],
            rules: vec![
                rule("react", "job-lead", RuleKind::Keyword),
                rule(r"\$\d+\s*/\s*hr", "rate", RuleKind::Regex),
                rule("remote", "remote", RuleKind::Keyword),
            ],
        }
    }

    fn engine() -> FilterEngine {
        FilterEngine::new(
            RuleSet::compile(&config()).unwrap(),
            shared_weights(CategoryWeights::new()),
        )
    }

    #[test]
    fn first_matching_rule_wins() {
        let result = engine().evaluate(message("Looking for a React dev, remote, $50/hr"));
        assert!(result.passed);
        let matched = result.matched_rule.unwrap();
        assert_eq!(matched.index, 0);
        assert_eq!(matched.category, "job-lead");
    }

    #[test]
    fn later_rule_used_when_earlier_ones_miss() {
        let result = engine().evaluate(message("paying $40/hr for design"));
        assert_eq!(result.category_hint(), Some("rate"));
    }

    #[test]
    fn no_match_drops_without_pass_through() {
        let result = engine().evaluate(message("good morning everyone"));
        assert!(!result.passed);
        assert!(result.matched_rule.is_none());
    }

    #[test]
    fn pass_through_keeps_unmatched() {
        let mut cfg = config();
        cfg.pass_through = true;
        let engine = FilterEngine::new(
            RuleSet::compile(&cfg).unwrap(),
            shared_weights(CategoryWeights::new()),
        );
        assert!(engine.evaluate(message("good morning everyone")).passed);
    }

    #[test]
    fn exclusions_beat_rules() {
        let result = engine().evaluate(message("React course, use PROMO CODE 50"));
        assert!(!result.passed);
        assert!(result.matched_rule.is_none());
    }

    #[test]
    fn blank_text_drops() {
        assert!(!engine().evaluate(message("   ")).passed);
    }

    #[test]
    fn low_weight_category_is_suppressed() {
        let weights = shared_weights(CategoryWeights::new());
        let engine = FilterEngine::new(RuleSet::compile(&config()).unwrap(), weights.clone());

        let mut lowered = CategoryWeights::new();
        lowered.set("job-lead", 0.3);
        weights.store(Arc::new(lowered));

        let result = engine.evaluate(message("React dev wanted"));
        assert!(!result.passed);
        assert_eq!(result.category_hint(), Some("job-lead"));
    }

    #[test]
    fn suppressed_category_still_passes_at_reduced_rate() {
        let mut floor = CategoryWeights::new();
        floor.set("job-lead", 0.1);
        let engine = FilterEngine::new(RuleSet::compile(&config()).unwrap(), shared_weights(floor));

        let passed: Vec<bool> = (0..6)
            .map(|_| engine.evaluate(message("React dev wanted")).passed)
            .collect();
        assert_eq!(passed, [false, false, true, false, false, true]);
    }

    #[test]
    fn unmatched_drops_are_never_sampled() {
        let engine = engine();
        for _ in 0..6 {
            assert!(!engine.evaluate(message("good morning everyone")).passed);
        }
    }

    #[test]
    fn reload_swaps_rules() {
        let engine = engine();
        assert!(!engine.evaluate(message("need a plumber")).passed);

        let mut cfg = config();
        cfg.rules.insert(0, rule("plumber", "trades", RuleKind::Keyword));
        engine.reload(RuleSet::compile(&cfg).unwrap());

        let result = engine.evaluate(message("need a plumber"));
        assert!(result.passed);
        assert_eq!(result.category_hint(), Some("trades"));
        assert_eq!(engine.snapshot().len(), 4);
    }

    proptest! {
        #[test]
        fn evaluation_is_deterministic(text in "\\PC{0,120}") {
            let engine = engine();
            let first = engine.evaluate(message(&text));
            let second = engine.evaluate(message(&text));
            prop_assert_eq!(first, second);
        }
    }
}
