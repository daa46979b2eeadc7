// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Leadwire configuration system.

use std::io::Write;

use leadwire_config::diagnostic::ConfigError;
use leadwire_config::model::RuleKind;
use leadwire_config::{
    load_and_validate_path, load_and_validate_str, load_config_from_path, load_config_from_str,
};

const FULL: &str = r#"
[pipeline]
log_level = "debug"
classify_workers = 2
dedup_window = 500
content_dedup_secs = 120

[storage]
database_path = "/tmp/leadwire-test.db"

[[sessions]]
name = "main"
bot_token = "111:AAA"
channels = [-1001, -1002]

[filter]
pass_through = false
exclusions = ["(?i)promo code"]

[[filter.rules]]
pattern = "react"
category = "job-lead"

[[filter.rules]]
pattern = "\\$\\d+/hr"
category = "job-lead"
kind = "regex"

[classifier]
endpoint = "http://localhost:9999/v1"
api_key = "sk-test"
requests_per_second = 2.0
timeout_secs = 5
max_attempts = 3
confidence_threshold = 0.79
categories = ["job-lead", "review"]

[[subscribers]]
id = "alice"
destination = 42
categories = ["job-lead"]

[[subscribers]]
id = "trial"
destination = 43
active_until = "2026-12-31T00:00:00Z"

[delivery]
bot_token = "222:BBB"
workers = 2
max_attempts = 4
"#;

#[test]
fn full_config_deserializes() {
    let config = load_config_from_str(FULL).expect("valid TOML should deserialize");
    assert_eq!(config.pipeline.log_level, "debug");
    assert_eq!(config.pipeline.classify_workers, 2);
    assert_eq!(config.pipeline.content_dedup_secs, 120);
    assert_eq!(config.pipeline.content_dedup_capacity, 20_000);
    assert_eq!(config.sessions.len(), 1);
    assert_eq!(config.sessions[0].channels, vec![-1001, -1002]);
    assert_eq!(config.filter.rules.len(), 2);
    assert_eq!(config.filter.rules[0].kind, RuleKind::Keyword);
    assert_eq!(config.filter.rules[1].kind, RuleKind::Regex);
    assert_eq!(config.classifier.requests_per_second, 2.0);
    assert_eq!(config.classifier.api_key.as_deref(), Some("sk-test"));
    assert_eq!(config.subscribers[0].destination, 42);
    assert!(config.subscribers[0].active_until.is_none());
    assert_eq!(
        config.subscribers[1].active_until.map(|t| t.to_rfc3339()),
        Some("2026-12-31T00:00:00+00:00".to_string())
    );
    assert_eq!(config.delivery.queue_policy().max_attempts, 4);
    // untouched sections keep their defaults
    assert_eq!(config.feedback.cycle_secs, 3600);
    assert_eq!(config.delivery.retention_days, 7);
}

#[test]
fn full_config_validates() {
    assert!(load_and_validate_str(FULL).is_ok());
}

#[test]
fn empty_config_uses_defaults() {
    let config = load_config_from_str("").unwrap();
    assert!(config.sessions.is_empty());
    assert_eq!(config.classifier.max_attempts, 3);
    assert_eq!(config.classifier.requests_per_second, 3.0);
    assert_eq!(config.classifier.low_confidence_category, "review");
    assert_eq!(config.delivery.lease_timeout_secs, 300);
    assert_eq!(config.pipeline.content_dedup_secs, 600);
}

#[test]
fn unknown_key_gets_suggestion() {
    let toml = r#"
[classifier]
max_atempts = 3
"#;
    let errors = load_and_validate_str(toml).unwrap_err();
    let found = errors.iter().any(|e| {
        matches!(
            e,
            ConfigError::UnknownKey { key, suggestion: Some(s), .. }
                if key == "max_atempts" && s == "max_attempts"
        )
    });
    assert!(found, "expected suggestion for max_atempts, got: {errors:?}");
}

#[test]
fn wrong_type_is_reported() {
    let toml = r#"
[delivery]
workers = "four"
"#;
    let errors = load_and_validate_str(toml).unwrap_err();
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidType { .. })),
        "got: {errors:?}"
    );
}

#[test]
fn session_without_token_is_missing_key() {
    let toml = r#"
[[sessions]]
name = "main"
"#;
    let errors = load_and_validate_str(toml).unwrap_err();
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::MissingKey { key } if key.contains("bot_token"))),
        "got: {errors:?}"
    );
}

#[test]
fn env_overrides_file_values() {
    figment::Jail::expect_with(|jail| {
        jail.create_file(
            "custom.toml",
            r#"
[classifier]
requests_per_second = 1.0
"#,
        )?;
        jail.set_env("LEADWIRE_CLASSIFIER_REQUESTS_PER_SECOND", "5.0");
        jail.set_env("LEADWIRE_DELIVERY_WORKERS", "8");
        jail.set_env("LEADWIRE_VERBOSE", "1");

        let config = load_config_from_path(std::path::Path::new("custom.toml"))
            .expect("env overrides should merge");
        assert_eq!(config.classifier.requests_per_second, 5.0);
        assert_eq!(config.delivery.workers, 8);
        Ok(())
    });
}

#[test]
fn explicit_path_must_exist() {
    let errors =
        load_and_validate_path(std::path::Path::new("/definitely/not/here.toml")).unwrap_err();
    assert!(matches!(errors[0], ConfigError::Other(_)));
}

#[test]
fn explicit_path_loads_and_validates() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(FULL.as_bytes()).unwrap();
    let config = load_and_validate_path(file.path()).unwrap();
    assert_eq!(config.subscribers[0].id, "alice");
}
