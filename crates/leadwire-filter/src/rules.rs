// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Compiled, immutable rule sets.

use leadwire_config::model::{FilterConfig, RuleConfig, RuleKind};
use leadwire_core::{CategoryWeights, FilterResult, LeadwireError, MatchedRule, RawMessage};
use regex::{Regex, RegexBuilder};

/// One compiled (pattern, category-hint) rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pub pattern: String,
    pub category: String,
    matcher: Regex,
}

impl Rule {
    pub fn compile(config: &RuleConfig) -> Result<Self, regex::Error> {
        let source = match config.kind {
            RuleKind::Keyword => keyword_pattern(&config.pattern),
            RuleKind::Regex => config.pattern.clone(),
        };
        Ok(Self {
            pattern: config.pattern.clone(),
            category: config.category.clone(),
            matcher: case_insensitive(&source)?,
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.matcher.is_match(text)
    }
}

/// Whole-word, literal match. Word boundaries are only asserted on sides
/// that start or end with a word character, so `c++` still matches.
fn keyword_pattern(keyword: &str) -> String {
    let keyword = keyword.trim();
    let is_word = |c: Option<char>| c.is_some_and(|c| c.is_alphanumeric() || c == '_');
    let lead = if is_word(keyword.chars().next()) { r"\b" } else { "" };
    let tail = if is_word(keyword.chars().last()) { r"\b" } else { "" };
    format!("{lead}{}{tail}", regex::escape(keyword))
}

fn case_insensitive(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

/// An immutable snapshot of the filter configuration.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
    exclusions: Vec<Regex>,
    pass_through: bool,
    min_pass_weight: f64,
    sample_every: u32,
}

impl RuleSet {
    /// Compile every rule and exclusion, failing on the first bad pattern.
    pub fn compile(config: &FilterConfig) -> Result<Self, LeadwireError> {
        let rules = config
            .rules
            .iter()
            .enumerate()
            .map(|(i, rule)| {
                Rule::compile(rule).map_err(|e| {
                    LeadwireError::Config(format!("filter.rules[{i}] `{}`: {e}", rule.pattern))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let exclusions = config
            .exclusions
            .iter()
            .enumerate()
            .map(|(i, pattern)| {
                case_insensitive(pattern).map_err(|e| {
                    LeadwireError::Config(format!("filter.exclusions[{i}] `{pattern}`: {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            rules,
            exclusions,
            pass_through: config.pass_through,
            min_pass_weight: config.min_pass_weight,
            sample_every: config.suppressed_sample_every.max(1),
        })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn pass_through(&self) -> bool {
        self.pass_through
    }

    /// One in this many suppressed matches is let through by the engine.
    pub fn sample_every(&self) -> u32 {
        self.sample_every
    }

    /// Decide pass or drop for one message.
    ///
    /// Order: blank text drops, any exclusion drops, then the first matching
    /// rule decides. A match whose category weight is below
    /// `min_pass_weight` is suppressed: it drops but still reports the rule.
    /// Sampling suppressed matches back in is up to the caller.
    pub fn evaluate(&self, message: RawMessage, weights: &CategoryWeights) -> FilterResult {
        let text = message.text.trim();
        if text.is_empty() || self.exclusions.iter().any(|re| re.is_match(text)) {
            return FilterResult {
                message,
                matched_rule: None,
                passed: false,
            };
        }

        let hit = self
            .rules
            .iter()
            .enumerate()
            .find(|(_, rule)| rule.is_match(text));

        match hit {
            Some((index, rule)) => FilterResult {
                passed: weights.get(&rule.category) >= self.min_pass_weight,
                matched_rule: Some(MatchedRule {
                    index,
                    pattern: rule.pattern.clone(),
                    category: rule.category.clone(),
                }),
                message,
            },
            None => FilterResult {
                message,
                matched_rule: None,
                passed: self.pass_through,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_respects_word_boundaries() {
        let rule = Rule::compile(&RuleConfig {
            pattern: "react".into(),
            category: "job-lead".into(),
            kind: RuleKind::Keyword,
        })
        .unwrap();
        assert!(rule.is_match("Looking for a React dev"));
        assert!(!rule.is_match("nuclear reactor maintenance"));
    }

    #[test]
    fn keyword_with_symbols_is_literal() {
        let rule = Rule::compile(&RuleConfig {
            pattern: "c++".into(),
            category: "job-lead".into(),
            kind: RuleKind::Keyword,
        })
        .unwrap();
        assert!(rule.is_match("senior C++ engineer"));
        assert!(!rule.is_match("c and c# only"));
    }

    #[test]
    fn bad_regex_is_a_config_error() {
        let config = FilterConfig {
            rules: vec![RuleConfig {
                pattern: "([".into(),
                category: "x".into(),
                kind: RuleKind::Regex,
            }],
            ..FilterConfig::default()
        };
        assert!(matches!(
            RuleSet::compile(&config),
            Err(LeadwireError::Config(msg)) if msg.contains("filter.rules[0]")
        ));
    }
}
