// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Leadwire pipeline.
//!
//! [`LeadwireError`] is the error returned across store and adapter boundaries.
//! The stage-specific enums ([`ConnectionError`], [`ClassifierError`],
//! [`DeliveryError`]) carry enough detail for the caller to decide between
//! retrying, dead-lettering, or stopping a session.

use std::time::Duration;

use thiserror::Error;

use crate::types::DeliveryStatus;

/// The primary error type used across all Leadwire stores, adapters and stages.
#[derive(Debug, Error)]
pub enum LeadwireError {
    /// Configuration errors (invalid TOML, missing required fields, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Upstream chat session failure.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Classification failure after the retry policy gave up.
    #[error(transparent)]
    Classifier(#[from] ClassifierError),

    /// Subscriber delivery failure.
    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    /// A queue entry was asked to move along an edge the state machine forbids.
    #[error("delivery entry {id}: cannot move from {from} to {to}")]
    InvalidTransition {
        id: i64,
        from: DeliveryStatus,
        to: DeliveryStatus,
    },

    /// The entry is in flight under another worker's lease.
    #[error("delivery entry {id}: lease is no longer held by {worker}")]
    LeaseLost { id: i64, worker: String },

    /// Referenced row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The delivery queue reached its configured pending capacity.
    #[error("delivery queue is full ({capacity} pending entries)")]
    QueueFull { capacity: usize },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Failures of an upstream chat session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    /// Credentials were rejected. Never retried.
    #[error("session {session}: authentication failed: {message}")]
    Auth { session: String, message: String },

    /// Network or upstream hiccup. Retried with backoff.
    #[error("session {session}: transient failure: {message}")]
    Transient {
        session: String,
        message: String,
        /// Upstream asked us to wait at least this long before the next call.
        retry_after: Option<Duration>,
    },

    /// The session was closed by shutdown.
    #[error("session {session}: closed")]
    Closed { session: String },
}

impl ConnectionError {
    /// Returns `true` when the session must stop instead of reconnecting.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth { .. } | Self::Closed { .. })
    }

    /// Name of the session that produced the error.
    pub fn session(&self) -> &str {
        match self {
            Self::Auth { session, .. }
            | Self::Transient { session, .. }
            | Self::Closed { session } => session,
        }
    }
}

/// Failures of a single classification call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClassifierError {
    /// The call did not finish within its deadline.
    #[error("classification timed out after {after:?}")]
    Timeout { after: Duration },

    /// No rate limiter token became available within the call deadline.
    #[error("rate limited: no token within {waited:?}")]
    RateLimited { waited: Duration },

    /// The classification service answered with an error.
    #[error("upstream error{}: {message}", status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    Upstream {
        message: String,
        status: Option<u16>,
        retryable: bool,
    },
}

impl ClassifierError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::RateLimited { .. } => true,
            Self::Upstream { retryable, .. } => *retryable,
        }
    }

    /// Stable short code persisted with dead letters.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::RateLimited { .. } => "rate_limited",
            Self::Upstream { .. } => "upstream",
        }
    }
}

/// Why a classified or unclassifiable message was dead-lettered.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DeadLetterCause {
    #[error(transparent)]
    Classifier(#[from] ClassifierError),

    /// The queue size cap refused the entry.
    #[error("delivery queue full ({capacity} open entries)")]
    QueueFull { capacity: usize },

    /// The queue write kept failing.
    #[error("enqueue failed: {message}")]
    Storage { message: String },
}

impl DeadLetterCause {
    /// Stable short code persisted with the dead letter.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Classifier(e) => e.code(),
            Self::QueueFull { .. } => "queue_full",
            Self::Storage { .. } => "storage",
        }
    }
}

/// Failures while dispatching a queue entry to a subscriber.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// The destination refused the message (blocked bot, chat not found).
    #[error("subscriber {subscriber}: rejected: {message}")]
    Rejected { subscriber: String, message: String },

    /// Transport failure worth retrying.
    #[error("subscriber {subscriber}: transient failure: {message}")]
    Transient { subscriber: String, message: String },

    /// The dispatch call exceeded its deadline.
    #[error("subscriber {subscriber}: dispatch timed out after {after:?}")]
    Timeout { subscriber: String, after: Duration },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifier_retry_policy_per_variant() {
        assert!(
            ClassifierError::Timeout {
                after: Duration::from_secs(1)
            }
            .is_retryable()
        );
        assert!(
            ClassifierError::RateLimited {
                waited: Duration::from_secs(1)
            }
            .is_retryable()
        );
        let bad_request = ClassifierError::Upstream {
            message: "bad request".into(),
            status: Some(400),
            retryable: false,
        };
        assert!(!bad_request.is_retryable());
        assert_eq!(bad_request.code(), "upstream");
        assert_eq!(
            bad_request.to_string(),
            "upstream error (status 400): bad request"
        );
    }

    #[test]
    fn auth_and_closed_are_fatal() {
        let auth = ConnectionError::Auth {
            session: "main".into(),
            message: "invalid token".into(),
        };
        assert!(auth.is_fatal());
        assert_eq!(auth.session(), "main");

        let transient = ConnectionError::Transient {
            session: "main".into(),
            message: "reset".into(),
            retry_after: None,
        };
        assert!(!transient.is_fatal());
    }

    #[test]
    fn stage_errors_convert_into_leadwire_error() {
        let err: LeadwireError = ClassifierError::Timeout {
            after: Duration::from_millis(500),
        }
        .into();
        assert!(matches!(err, LeadwireError::Classifier(_)));
        assert_eq!(err.to_string(), "classification timed out after 500ms");
    }

    #[test]
    fn dead_letter_cause_codes() {
        let classifier: DeadLetterCause = ClassifierError::RateLimited {
            waited: Duration::from_secs(2),
        }
        .into();
        assert_eq!(classifier.code(), "rate_limited");
        assert_eq!(DeadLetterCause::QueueFull { capacity: 10 }.code(), "queue_full");
        let storage = DeadLetterCause::Storage {
            message: "disk I/O error".into(),
        };
        assert_eq!(storage.code(), "storage");
        assert_eq!(storage.to_string(), "enqueue failed: disk I/O error");
    }
}
