// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by every pipeline stage.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Identity of an inbound message: `(channel_id, source_id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageKey {
    pub channel_id: i64,
    pub source_id: i64,
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel_id, self.source_id)
    }
}

/// A message captured from an upstream chat session. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    /// Name of the session that received the message.
    pub session: String,
    /// Upstream message id, unique within its channel.
    pub source_id: i64,
    pub channel_id: i64,
    pub channel_title: Option<String>,
    /// Absent for anonymous channel posts.
    pub author_id: Option<i64>,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

impl RawMessage {
    pub fn key(&self) -> MessageKey {
        MessageKey {
            channel_id: self.channel_id,
            source_id: self.source_id,
        }
    }

    /// The persisted form of [`RawMessage::key`].
    pub fn message_id(&self) -> String {
        self.key().to_string()
    }

    pub fn payload(&self) -> DeliveryPayload {
        DeliveryPayload {
            session: self.session.clone(),
            channel_id: self.channel_id,
            channel_title: self.channel_title.clone(),
            author_id: self.author_id,
            text: self.text.clone(),
            received_at: self.received_at,
        }
    }
}

/// The rule that let a message through the filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedRule {
    /// Position of the rule in the configured list.
    pub index: usize,
    pub pattern: String,
    pub category: String,
}

/// Outcome of running a message through the filter engine.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterResult {
    pub message: RawMessage,
    pub matched_rule: Option<MatchedRule>,
    pub passed: bool,
}

impl FilterResult {
    pub fn category_hint(&self) -> Option<&str> {
        self.matched_rule.as_ref().map(|r| r.category.as_str())
    }
}

/// A message waiting for, or undergoing, classification.
#[derive(Debug, Clone)]
pub struct ClassificationRequest {
    pub message: RawMessage,
    /// Attempts already made for this message.
    pub attempt_count: u32,
    pub enqueued_at: DateTime<Utc>,
    /// Category suggested by the matching filter rule.
    pub category_hint: Option<String>,
}

impl ClassificationRequest {
    pub fn new(message: RawMessage, category_hint: Option<String>) -> Self {
        Self {
            message,
            attempt_count: 0,
            enqueued_at: Utc::now(),
            category_hint,
        }
    }
}

/// What a classification backend returned for one call, before thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendVerdict {
    pub relevant: bool,
    /// `None` when the backend could not name a category.
    pub category: Option<String>,
    /// Clamped to `0.0..=1.0`.
    pub confidence: f64,
    pub raw_response: String,
}

/// Final classification of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub message_id: String,
    pub category: String,
    pub confidence: f64,
    pub raw_response: String,
    /// `false` when the backend judged the message off-topic.
    pub relevant: bool,
}

/// Message data persisted with a queue entry and rendered for subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryPayload {
    pub session: String,
    pub channel_id: i64,
    pub channel_title: Option<String>,
    pub author_id: Option<i64>,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

/// Lifecycle of a delivery queue entry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    InFlight,
    Delivered,
    Failed,
    Dead,
}

impl DeliveryStatus {
    /// No transition leaves a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Dead)
    }

    /// Edges of the queue state machine.
    ///
    /// `InFlight -> Pending` is lease release (expiry or shutdown drain), not
    /// a retry; `InFlight -> Dead` covers an expired lease on the last attempt.
    pub fn can_transition_to(self, next: Self) -> bool {
        use DeliveryStatus::*;
        matches!(
            (self, next),
            (Pending, InFlight)
                | (InFlight, Delivered)
                | (InFlight, Failed)
                | (InFlight, Pending)
                | (InFlight, Dead)
                | (Failed, Pending)
                | (Failed, Dead)
        )
    }
}

/// A row of the durable delivery queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryEntry {
    pub id: i64,
    pub message_id: String,
    pub category: String,
    pub confidence: f64,
    pub payload: DeliveryPayload,
    pub status: DeliveryStatus,
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub leased_by: Option<String>,
    pub lease_expires_at: Option<String>,
    pub retry_at: Option<String>,
    pub last_error: Option<String>,
    pub created_at: String,
    pub last_attempt_at: Option<String>,
}

/// Knobs of the delivery queue state machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueuePolicy {
    /// How long a lease protects an entry before another worker may take it.
    pub lease_timeout: Duration,
    /// Attempts before an entry is declared dead.
    pub max_attempts: u32,
    /// Delay between a failure and the entry becoming leasable again.
    pub retry_delay: Duration,
    /// Pending entries allowed before enqueue is refused. `0` disables the cap.
    pub max_queue_size: usize,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            lease_timeout: Duration::from_secs(300),
            max_attempts: 5,
            retry_delay: Duration::from_secs(30),
            max_queue_size: 10_000,
        }
    }
}

/// A classification failure that exhausted its retry budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub id: i64,
    pub message_id: String,
    pub category_hint: Option<String>,
    pub payload: DeliveryPayload,
    pub error_code: String,
    pub error_message: String,
    pub attempts: u32,
    pub created_at: String,
}

/// A subscriber's verdict on a delivered item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Accept,
    Reject,
}

/// Append-only feedback row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub delivery_id: i64,
    pub subscriber_id: String,
    pub verdict: Verdict,
    pub recorded_at: String,
}

/// Accept/reject totals for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackStats {
    pub category: String,
    pub accepts: u64,
    pub rejects: u64,
}

/// How feedback moves a category weight during one aggregation cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightPolicy {
    /// Feedback rows a category needs in a cycle before its weight moves.
    pub min_samples: u64,
    /// Reject rate above which the weight decays.
    pub suppression_threshold: f64,
    /// Reject rate below which the weight recovers.
    pub recovery_threshold: f64,
    /// Multiplier applied on suppression.
    pub decay: f64,
    /// Amount added on recovery.
    pub recovery_step: f64,
    /// Floor the weight approaches under sustained rejection. Each decay
    /// shrinks the distance to it, so the weight keeps falling without ever
    /// reaching it.
    pub min_weight: f64,
}

impl Default for WeightPolicy {
    fn default() -> Self {
        Self {
            min_samples: 5,
            suppression_threshold: 0.6,
            recovery_threshold: 0.3,
            decay: 0.8,
            recovery_step: 0.1,
            min_weight: 0.1,
        }
    }
}

impl WeightPolicy {
    /// Returns the next weight for a category, or `None` when the sample is too small.
    pub fn apply(&self, current: f64, accepts: u64, rejects: u64) -> Option<f64> {
        let total = accepts + rejects;
        if total == 0 || total < self.min_samples {
            return None;
        }
        let reject_rate = rejects as f64 / total as f64;
        let next = if reject_rate > self.suppression_threshold {
            self.decayed(current)
        } else if reject_rate < self.recovery_threshold {
            (current + self.recovery_step).min(1.0)
        } else {
            current
        };
        Some(next)
    }

    fn decayed(&self, current: f64) -> f64 {
        if current > self.min_weight {
            self.min_weight + (current - self.min_weight) * self.decay
        } else {
            current * self.decay
        }
    }
}

/// Feedback-derived weight per category. Unknown categories weigh `1.0`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryWeights(BTreeMap<String, f64>);

impl CategoryWeights {
    pub const NEUTRAL: f64 = 1.0;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, category: &str) -> f64 {
        self.0.get(category).copied().unwrap_or(Self::NEUTRAL)
    }

    pub fn set(&mut self, category: impl Into<String>, weight: f64) {
        self.0.insert(category.into(), weight);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, f64)> for CategoryWeights {
    fn from_iter<T: IntoIterator<Item = (String, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Weights published by the feedback cycle and read lock-free by the filter
/// and classifier.
pub type SharedWeights = Arc<ArcSwap<CategoryWeights>>;

pub fn shared_weights(weights: CategoryWeights) -> SharedWeights {
    Arc::new(ArcSwap::from_pointee(weights))
}

/// A delivery destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: String,
    /// Destination chat identifier.
    pub destination: i64,
    /// Categories this subscriber wants. Empty means all.
    pub categories: Vec<String>,
    /// End of the subscription. `None` never expires.
    #[serde(default)]
    pub active_until: Option<DateTime<Utc>>,
}

impl Subscriber {
    pub fn wants(&self, category: &str) -> bool {
        self.categories.is_empty() || self.categories.iter().any(|c| c == category)
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.active_until.is_none_or(|end| now <= end)
    }
}

/// Point-in-time copy of all counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub counters: BTreeMap<String, u64>,
    pub written_at: Option<String>,
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the role an adapter plays in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
pub enum AdapterType {
    Source,
    Classifier,
    Sink,
    Storage,
}

/// Timestamp format used for every persisted time column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Formats a UTC instant the way the stores persist it.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn message() -> RawMessage {
        RawMessage {
            session: "main".into(),
            source_id: 42,
            channel_id: -100123,
            channel_title: Some("jobs".into()),
            author_id: Some(7),
            text: "hello".into(),
            received_at: Utc::now(),
        }
    }

    #[test]
    fn message_id_combines_channel_and_source() {
        assert_eq!(message().message_id(), "-100123:42");
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            DeliveryStatus::Pending,
            DeliveryStatus::InFlight,
            DeliveryStatus::Delivered,
            DeliveryStatus::Failed,
            DeliveryStatus::Dead,
        ] {
            let s = status.to_string();
            assert_eq!(DeliveryStatus::from_str(&s).unwrap(), status);
        }
        assert_eq!(DeliveryStatus::InFlight.to_string(), "in_flight");
    }

    #[test]
    fn delivered_and_dead_have_no_outgoing_edges() {
        use DeliveryStatus::*;
        for next in [Pending, InFlight, Delivered, Failed, Dead] {
            assert!(!Delivered.can_transition_to(next));
            assert!(!Dead.can_transition_to(next));
        }
        assert!(Failed.can_transition_to(Pending));
        assert!(Failed.can_transition_to(Dead));
        assert!(!Pending.can_transition_to(Delivered));
    }

    #[test]
    fn weight_policy_decays_on_high_reject_rate() {
        let policy = WeightPolicy::default();
        let next = policy.apply(1.0, 1, 9).unwrap();
        assert!(next < 1.0);
    }

    #[test]
    fn sustained_rejection_keeps_lowering_weight_above_floor() {
        let policy = WeightPolicy::default();
        let mut weight = CategoryWeights::NEUTRAL;
        for cycle in 0..40 {
            let next = policy.apply(weight, 0, 10).unwrap();
            assert!(next < weight, "cycle {cycle}: {next} not below {weight}");
            assert!(next > policy.min_weight);
            weight = next;
        }
    }

    #[test]
    fn weight_policy_recovers_and_caps_at_one() {
        let policy = WeightPolicy::default();
        let next = policy.apply(0.5, 10, 0).unwrap();
        assert!((next - 0.6).abs() < 1e-9);
        assert_eq!(policy.apply(0.95, 10, 0), Some(1.0));
    }

    #[test]
    fn weight_policy_ignores_small_samples() {
        let policy = WeightPolicy::default();
        assert_eq!(policy.apply(1.0, 0, 4), None);
        assert_eq!(policy.apply(1.0, 0, 0), None);
    }

    #[test]
    fn unknown_category_weighs_neutral() {
        let mut weights = CategoryWeights::new();
        weights.set("spam", 0.4);
        assert_eq!(weights.get("spam"), 0.4);
        assert_eq!(weights.get("job-lead"), CategoryWeights::NEUTRAL);
    }

    #[test]
    fn subscriber_with_no_categories_wants_everything() {
        let all = Subscriber {
            id: "a".into(),
            destination: 1,
            categories: vec![],
            active_until: None,
        };
        let jobs = Subscriber {
            id: "b".into(),
            destination: 2,
            categories: vec!["job-lead".into()],
            active_until: None,
        };
        assert!(all.wants("anything"));
        assert!(jobs.wants("job-lead"));
        assert!(!jobs.wants("review"));
    }

    #[test]
    fn expired_subscriber_is_inactive() {
        let now = Utc::now();
        let mut sub = Subscriber {
            id: "a".into(),
            destination: 1,
            categories: vec![],
            active_until: None,
        };
        assert!(sub.is_active(now));
        sub.active_until = Some(now + chrono::TimeDelta::days(1));
        assert!(sub.is_active(now));
        sub.active_until = Some(now - chrono::TimeDelta::seconds(1));
        assert!(!sub.is_active(now));
    }
}
