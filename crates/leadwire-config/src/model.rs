// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Leadwire pipeline.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use chrono::{DateTime, Utc};
use leadwire_core::{Backoff, QueuePolicy, Subscriber, WeightPolicy};
use serde::{Deserialize, Serialize};

/// Top-level Leadwire configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LeadwireConfig {
    /// Intake and worker pool settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Upstream chat sessions.
    #[serde(default)]
    pub sessions: Vec<SessionConfig>,

    /// Reconnect backoff shared by all sessions.
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Rule-based pre-filter.
    #[serde(default)]
    pub filter: FilterConfig,

    /// External classification service.
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Delivery destinations.
    #[serde(default)]
    pub subscribers: Vec<SubscriberConfig>,

    /// Delivery queue and worker settings.
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Feedback aggregation cycle.
    #[serde(default)]
    pub feedback: FeedbackConfig,

    /// Metrics flush settings.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Intake and concurrency configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Capacity of the channel between sessions and the intake task.
    #[serde(default = "default_intake_buffer")]
    pub intake_buffer: usize,

    /// Maximum concurrent classification calls.
    #[serde(default = "default_classify_workers")]
    pub classify_workers: usize,

    /// Number of recent message keys remembered for deduplication.
    #[serde(default = "default_dedup_window")]
    pub dedup_window: usize,

    /// Seconds a message text stays in the repost window. `0` disables
    /// text-based duplicate suppression.
    #[serde(default = "default_content_dedup_secs")]
    pub content_dedup_secs: u64,

    /// Number of distinct recent texts remembered for repost detection.
    #[serde(default = "default_content_dedup_capacity")]
    pub content_dedup_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            intake_buffer: default_intake_buffer(),
            classify_workers: default_classify_workers(),
            dedup_window: default_dedup_window(),
            content_dedup_secs: default_content_dedup_secs(),
            content_dedup_capacity: default_content_dedup_capacity(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_intake_buffer() -> usize {
    512
}

fn default_classify_workers() -> usize {
    4
}

fn default_dedup_window() -> usize {
    10_000
}

fn default_content_dedup_secs() -> u64 {
    600
}

fn default_content_dedup_capacity() -> usize {
    20_000
}

/// SQLite storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: true,
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("leadwire").join("leadwire.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("leadwire.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_true() -> bool {
    true
}

/// One upstream chat session.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Unique session name, used in logs and metrics.
    pub name: String,

    /// Bot token used to authenticate the session.
    pub bot_token: String,

    /// Channel ids to listen to. Empty listens to every chat the bot sees.
    #[serde(default)]
    pub channels: Vec<i64>,

    /// Long-poll timeout per receive call.
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
}

fn default_poll_timeout_secs() -> u64 {
    30
}

/// Exponential reconnect backoff.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReconnectConfig {
    #[serde(default = "default_reconnect_base_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_reconnect_max_ms")]
    pub max_delay_ms: u64,

    /// Fraction of the delay randomly added or removed (0.25 = ±25%).
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_reconnect_base_ms(),
            max_delay_ms: default_reconnect_max_ms(),
            jitter: default_jitter(),
        }
    }
}

fn default_reconnect_base_ms() -> u64 {
    1_000
}

fn default_reconnect_max_ms() -> u64 {
    300_000
}

fn default_jitter() -> f64 {
    0.25
}

/// How a rule pattern is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    /// Case-insensitive whole-word match.
    #[default]
    Keyword,
    /// Case-insensitive regular expression.
    Regex,
}

/// A single (pattern, category-hint) filter rule.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    pub pattern: String,
    pub category: String,
    #[serde(default)]
    pub kind: RuleKind,
}

/// Rule-based pre-filter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    /// Let unmatched messages through to classification.
    #[serde(default)]
    pub pass_through: bool,

    /// Matches whose category weight fell below this value are suppressed.
    #[serde(default = "default_min_pass_weight")]
    pub min_pass_weight: f64,

    /// One in this many suppressed matches still passes, so the category
    /// keeps collecting the feedback it needs to recover.
    #[serde(default = "default_suppressed_sample_every")]
    pub suppressed_sample_every: u32,

    /// Regular expressions that drop a message before any rule is tried.
    #[serde(default)]
    pub exclusions: Vec<String>,

    /// Ordered rules. First match wins.
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            pass_through: false,
            min_pass_weight: default_min_pass_weight(),
            suppressed_sample_every: default_suppressed_sample_every(),
            exclusions: Vec::new(),
            rules: Vec::new(),
        }
    }
}

fn default_min_pass_weight() -> f64 {
    0.0
}

fn default_suppressed_sample_every() -> u32 {
    5
}

/// External classification service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ClassifierConfig {
    /// When disabled, the matching rule's category is used with full confidence.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    /// Global ceiling shared by every concurrent caller.
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,

    /// Tokens that may accumulate while idle.
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Deadline of a single attempt, including the wait for a token.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempts per message before it is dead-lettered.
    #[serde(default = "default_classifier_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,

    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,

    /// Minimum confidence for the backend's category to stand.
    #[serde(default)]
    pub confidence_threshold: f64,

    /// Category assigned when confidence falls below the threshold.
    #[serde(default = "default_low_confidence_category")]
    pub low_confidence_category: String,

    /// Map raw model confidence onto fixed calibration bands.
    #[serde(default)]
    pub calibrate: bool,

    /// Taxonomy offered to the model.
    #[serde(default)]
    pub categories: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_endpoint(),
            api_key: None,
            model: default_model(),
            requests_per_second: default_requests_per_second(),
            burst: default_burst(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_classifier_attempts(),
            retry_base_ms: default_retry_base_ms(),
            retry_max_ms: default_retry_max_ms(),
            confidence_threshold: 0.0,
            low_confidence_category: default_low_confidence_category(),
            calibrate: false,
            categories: Vec::new(),
        }
    }
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_requests_per_second() -> f64 {
    3.0
}

fn default_burst() -> u32 {
    1
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_classifier_attempts() -> u32 {
    3
}

fn default_retry_base_ms() -> u64 {
    500
}

fn default_retry_max_ms() -> u64 {
    10_000
}

fn default_low_confidence_category() -> String {
    "review".to_string()
}

/// A delivery destination.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SubscriberConfig {
    pub id: String,
    /// Destination chat id.
    pub destination: i64,
    /// Categories to receive. Empty receives everything.
    #[serde(default)]
    pub categories: Vec<String>,
    /// RFC 3339 end of the subscription. Omit for no expiry.
    #[serde(default)]
    pub active_until: Option<DateTime<Utc>>,
}

impl From<&ReconnectConfig> for Backoff {
    fn from(config: &ReconnectConfig) -> Self {
        Self::new(
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            config.jitter,
        )
    }
}

impl From<&SubscriberConfig> for Subscriber {
    fn from(cfg: &SubscriberConfig) -> Self {
        Subscriber {
            id: cfg.id.clone(),
            destination: cfg.destination,
            categories: cfg.categories.clone(),
            active_until: cfg.active_until,
        }
    }
}

/// Delivery queue and worker pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DeliveryConfig {
    /// Bot token used to send to subscribers. Must not belong to a source session.
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Fixed delivery pool size.
    #[serde(default = "default_delivery_workers")]
    pub workers: usize,

    #[serde(default = "default_lease_timeout_secs")]
    pub lease_timeout_secs: u64,

    /// Dead-letter threshold for delivery attempts.
    #[serde(default = "default_delivery_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Idle wait between empty leases.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Deadline of a single dispatch to one subscriber.
    #[serde(default = "default_dispatch_timeout_secs")]
    pub dispatch_timeout_secs: u64,

    /// Pending entries allowed before enqueue is refused. `0` disables the cap.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Days a delivered entry is kept before purge.
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            workers: default_delivery_workers(),
            lease_timeout_secs: default_lease_timeout_secs(),
            max_attempts: default_delivery_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            dispatch_timeout_secs: default_dispatch_timeout_secs(),
            max_queue_size: default_max_queue_size(),
            retention_days: default_retention_days(),
        }
    }
}

impl DeliveryConfig {
    pub fn queue_policy(&self) -> QueuePolicy {
        QueuePolicy {
            lease_timeout: Duration::from_secs(self.lease_timeout_secs),
            max_attempts: self.max_attempts,
            retry_delay: Duration::from_secs(self.retry_delay_secs),
            max_queue_size: self.max_queue_size,
        }
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_days * 24 * 60 * 60)
    }
}

fn default_delivery_workers() -> usize {
    4
}

fn default_lease_timeout_secs() -> u64 {
    300
}

fn default_delivery_attempts() -> u32 {
    5
}

fn default_retry_delay_secs() -> u64 {
    30
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_dispatch_timeout_secs() -> u64 {
    30
}

fn default_max_queue_size() -> usize {
    10_000
}

fn default_retention_days() -> u64 {
    7
}

/// Feedback aggregation cycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FeedbackConfig {
    #[serde(default = "default_cycle_secs")]
    pub cycle_secs: u64,

    #[serde(default = "default_min_samples")]
    pub min_samples: u64,

    #[serde(default = "default_suppression_threshold")]
    pub suppression_threshold: f64,

    #[serde(default = "default_recovery_threshold")]
    pub recovery_threshold: f64,

    #[serde(default = "default_decay")]
    pub decay: f64,

    #[serde(default = "default_recovery_step")]
    pub recovery_step: f64,

    /// Floor the weight approaches under sustained rejection.
    #[serde(default = "default_min_weight")]
    pub min_weight: f64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            cycle_secs: default_cycle_secs(),
            min_samples: default_min_samples(),
            suppression_threshold: default_suppression_threshold(),
            recovery_threshold: default_recovery_threshold(),
            decay: default_decay(),
            recovery_step: default_recovery_step(),
            min_weight: default_min_weight(),
        }
    }
}

impl FeedbackConfig {
    pub fn weight_policy(&self) -> WeightPolicy {
        WeightPolicy {
            min_samples: self.min_samples,
            suppression_threshold: self.suppression_threshold,
            recovery_threshold: self.recovery_threshold,
            decay: self.decay,
            recovery_step: self.recovery_step,
            min_weight: self.min_weight,
        }
    }
}

fn default_cycle_secs() -> u64 {
    3_600
}

fn default_min_samples() -> u64 {
    5
}

fn default_suppression_threshold() -> f64 {
    0.6
}

fn default_recovery_threshold() -> f64 {
    0.3
}

fn default_decay() -> f64 {
    0.8
}

fn default_recovery_step() -> f64 {
    0.1
}

fn default_min_weight() -> f64 {
    0.1
}

/// Metrics sink configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            flush_interval_secs: default_flush_interval_secs(),
        }
    }
}

fn default_flush_interval_secs() -> u64 {
    60
}
