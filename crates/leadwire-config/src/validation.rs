// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Collects every problem instead of failing on the first one.

use std::collections::HashSet;

use regex::Regex;

use crate::diagnostic::ConfigError;
use crate::model::{LeadwireConfig, RuleKind};

/// Validate a deserialized configuration for semantic correctness.
pub fn validate_config(config: &LeadwireConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation(
            "storage.database_path must not be empty",
        ));
    }

    if config.pipeline.classify_workers == 0 {
        errors.push(ConfigError::validation(
            "pipeline.classify_workers must be at least 1",
        ));
    }
    if config.pipeline.intake_buffer == 0 {
        errors.push(ConfigError::validation(
            "pipeline.intake_buffer must be at least 1",
        ));
    }

    validate_sessions(config, &mut errors);
    validate_filter(config, &mut errors);
    validate_classifier(config, &mut errors);
    validate_delivery(config, &mut errors);
    validate_feedback(config, &mut errors);

    if config.reconnect.base_delay_ms == 0 {
        errors.push(ConfigError::validation(
            "reconnect.base_delay_ms must be positive",
        ));
    }
    if config.reconnect.max_delay_ms < config.reconnect.base_delay_ms {
        errors.push(ConfigError::validation(format!(
            "reconnect.max_delay_ms ({}) must not be below base_delay_ms ({})",
            config.reconnect.max_delay_ms, config.reconnect.base_delay_ms
        )));
    }
    check_unit_interval("reconnect.jitter", config.reconnect.jitter, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_sessions(config: &LeadwireConfig, errors: &mut Vec<ConfigError>) {
    let mut names = HashSet::new();
    for (i, session) in config.sessions.iter().enumerate() {
        if session.name.trim().is_empty() {
            errors.push(ConfigError::validation(format!(
                "sessions[{i}].name must not be empty"
            )));
        }
        if !names.insert(session.name.as_str()) {
            errors.push(ConfigError::validation(format!(
                "duplicate session name `{}` in [[sessions]] array",
                session.name
            )));
        }
        if session.bot_token.trim().is_empty() {
            errors.push(ConfigError::validation(format!(
                "sessions[{i}].bot_token must not be empty"
            )));
        }
        if let Some(token) = config.delivery.bot_token.as_deref() {
            if token == session.bot_token {
                errors.push(ConfigError::validation(format!(
                    "delivery.bot_token must differ from the token of session `{}`",
                    session.name
                )));
            }
        }
    }

    let mut ids = HashSet::new();
    for subscriber in &config.subscribers {
        if !ids.insert(subscriber.id.as_str()) {
            errors.push(ConfigError::validation(format!(
                "duplicate subscriber id `{}` in [[subscribers]] array",
                subscriber.id
            )));
        }
    }
}

fn validate_filter(config: &LeadwireConfig, errors: &mut Vec<ConfigError>) {
    for (i, rule) in config.filter.rules.iter().enumerate() {
        if rule.pattern.trim().is_empty() {
            errors.push(ConfigError::validation(format!(
                "filter.rules[{i}].pattern must not be empty"
            )));
        }
        if rule.category.trim().is_empty() {
            errors.push(ConfigError::validation(format!(
                "filter.rules[{i}].category must not be empty"
            )));
        }
        if rule.kind == RuleKind::Regex {
            if let Err(e) = Regex::new(&rule.pattern) {
                errors.push(ConfigError::validation(format!(
                    "filter.rules[{i}].pattern is not a valid regex: {e}"
                )));
            }
        }
    }
    for (i, pattern) in config.filter.exclusions.iter().enumerate() {
        if let Err(e) = Regex::new(pattern) {
            errors.push(ConfigError::validation(format!(
                "filter.exclusions[{i}] is not a valid regex: {e}"
            )));
        }
    }
    check_unit_interval(
        "filter.min_pass_weight",
        config.filter.min_pass_weight,
        errors,
    );
    if config.filter.suppressed_sample_every == 0 {
        errors.push(ConfigError::validation(
            "filter.suppressed_sample_every must be at least 1",
        ));
    }
}

fn validate_classifier(config: &LeadwireConfig, errors: &mut Vec<ConfigError>) {
    let classifier = &config.classifier;
    if !(classifier.requests_per_second.is_finite() && classifier.requests_per_second > 0.0) {
        errors.push(ConfigError::validation(format!(
            "classifier.requests_per_second must be positive, got {}",
            classifier.requests_per_second
        )));
    }
    if classifier.burst == 0 {
        errors.push(ConfigError::validation("classifier.burst must be at least 1"));
    }
    if classifier.timeout_secs == 0 {
        errors.push(ConfigError::validation(
            "classifier.timeout_secs must be positive",
        ));
    }
    if classifier.max_attempts == 0 {
        errors.push(ConfigError::validation(
            "classifier.max_attempts must be at least 1",
        ));
    }
    check_unit_interval(
        "classifier.confidence_threshold",
        classifier.confidence_threshold,
        errors,
    );
    if classifier.low_confidence_category.trim().is_empty() {
        errors.push(ConfigError::validation(
            "classifier.low_confidence_category must not be empty",
        ));
    }
    if classifier.enabled && classifier.endpoint.trim().is_empty() {
        errors.push(ConfigError::validation(
            "classifier.endpoint must not be empty when the classifier is enabled",
        ));
    }
}

fn validate_delivery(config: &LeadwireConfig, errors: &mut Vec<ConfigError>) {
    let delivery = &config.delivery;
    if delivery.workers == 0 {
        errors.push(ConfigError::validation("delivery.workers must be at least 1"));
    }
    if delivery.max_attempts == 0 {
        errors.push(ConfigError::validation(
            "delivery.max_attempts must be at least 1",
        ));
    }
    if delivery.lease_timeout_secs == 0 {
        errors.push(ConfigError::validation(
            "delivery.lease_timeout_secs must be positive",
        ));
    }
    if delivery.dispatch_timeout_secs == 0 {
        errors.push(ConfigError::validation(
            "delivery.dispatch_timeout_secs must be positive",
        ));
    }
}

fn validate_feedback(config: &LeadwireConfig, errors: &mut Vec<ConfigError>) {
    let feedback = &config.feedback;
    if feedback.cycle_secs == 0 {
        errors.push(ConfigError::validation("feedback.cycle_secs must be positive"));
    }
    check_unit_interval(
        "feedback.suppression_threshold",
        feedback.suppression_threshold,
        errors,
    );
    check_unit_interval(
        "feedback.recovery_threshold",
        feedback.recovery_threshold,
        errors,
    );
    if feedback.recovery_threshold > feedback.suppression_threshold {
        errors.push(ConfigError::validation(
            "feedback.recovery_threshold must not exceed suppression_threshold",
        ));
    }
    if !(feedback.decay > 0.0 && feedback.decay < 1.0) {
        errors.push(ConfigError::validation(format!(
            "feedback.decay must be between 0 and 1 (exclusive), got {}",
            feedback.decay
        )));
    }
    if !(feedback.min_weight > 0.0 && feedback.min_weight <= 1.0) {
        errors.push(ConfigError::validation(format!(
            "feedback.min_weight must be in (0, 1], got {}",
            feedback.min_weight
        )));
    }
}

fn check_unit_interval(key: &str, value: f64, errors: &mut Vec<ConfigError>) {
    if !(0.0..=1.0).contains(&value) {
        errors.push(ConfigError::validation(format!(
            "{key} must be between 0.0 and 1.0, got {value}"
        )));
    }
}
