// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stage interaction tests over a real SQLite store.

use std::time::Duration;

use leadwire_core::{
    ClassifierError, DeliveryError, DeliveryStatus, FeedbackRecord, FeedbackStore, QueueStore,
    Verdict,
};
use leadwire_metrics::names::{
    DELIVERED, DELIVERY_DEAD, FILTER_DROPPED, IRRELEVANT_DROPPED, MESSAGES_RECEIVED,
};
use leadwire_test_utils::{MockBackend, TestHarness, raw_message};

const WAIT: Duration = Duration::from_secs(10);

#[tokio::test]
async fn unmatched_message_never_reaches_classifier() {
    let mut harness = TestHarness::builder()
        .rule("react", "job-lead")
        .subscriber("alice", 1, &[])
        .build()
        .await
        .unwrap();

    harness.push(vec![raw_message(-100, 1, "good morning everyone")]);
    assert!(harness.wait_for_counter(FILTER_DROPPED, 1, WAIT).await);
    assert_eq!(harness.backend.calls(), 0);

    harness.shutdown().await;
    let pending = harness
        .store
        .list_by_status(DeliveryStatus::Pending, 10)
        .await
        .unwrap();
    assert!(pending.is_empty());
}

#[tokio::test]
async fn irrelevant_verdict_is_dropped() {
    let backend = MockBackend::new();
    backend.push_irrelevant();
    let mut harness = TestHarness::builder()
        .rule("react", "job-lead")
        .subscriber("alice", 1, &[])
        .backend(backend)
        .build()
        .await
        .unwrap();

    harness.push(vec![raw_message(-100, 1, "React course, 50% off")]);
    assert!(harness.wait_for_counter(IRRELEVANT_DROPPED, 1, WAIT).await);
    harness.shutdown().await;

    assert!(harness.sink.delivered().is_empty());
    assert!(harness.store.get(1).await.unwrap().is_none());
}

#[tokio::test]
async fn subscribers_only_get_wanted_categories() {
    let mut harness = TestHarness::builder()
        .rule("react", "job-lead")
        .rule("per hour", "rate")
        .subscriber("leads-only", 1, &["job-lead"])
        .subscriber("everything", 2, &[])
        .build()
        .await
        .unwrap();

    harness.push(vec![
        raw_message(-100, 1, "Hiring a React developer"),
        raw_message(-100, 2, "I charge 40 per hour"),
    ]);
    assert!(harness.wait_for_counter(DELIVERED, 2, WAIT).await);
    harness.shutdown().await;

    let leads_only = harness.sink.delivered_to("leads-only");
    assert_eq!(leads_only.len(), 1);
    assert_eq!(leads_only[0].category, "job-lead");
    assert_eq!(harness.sink.delivered_to("everything").len(), 2);
}

#[tokio::test]
async fn retry_skips_subscribers_already_served() {
    let mut harness = TestHarness::builder()
        .rule("react", "job-lead")
        .subscriber("alice", 1, &[])
        .subscriber("bob", 2, &[])
        .build()
        .await
        .unwrap();
    harness.sink.fail_next(DeliveryError::Transient {
        subscriber: "alice".into(),
        message: "connection reset".into(),
    });

    harness.push(vec![raw_message(-100, 7, "React contract, remote")]);
    let entry = harness
        .wait_for_status("-100:7", DeliveryStatus::Delivered, WAIT)
        .await
        .expect("entry delivered after retry");
    harness.shutdown().await;

    assert_eq!(entry.attempt_count, 1);
    assert_eq!(harness.sink.delivered_to("alice").len(), 1);
    assert_eq!(harness.sink.delivered_to("bob").len(), 1);
    let mut receipts = harness.store.receipts(entry.id).await.unwrap();
    receipts.sort();
    assert_eq!(receipts, vec!["alice".to_string(), "bob".to_string()]);
}

#[tokio::test]
async fn exhausted_delivery_goes_dead() {
    let mut harness = TestHarness::builder()
        .rule("react", "job-lead")
        .subscriber("alice", 1, &[])
        .configure(|c| c.delivery.max_attempts = 2)
        .build()
        .await
        .unwrap();
    harness.sink.set_failing(true);

    harness.push(vec![raw_message(-100, 3, "React gig")]);
    let entry = harness
        .wait_for_status("-100:3", DeliveryStatus::Dead, WAIT)
        .await
        .expect("entry dead after two failures");
    assert!(harness.wait_for_counter(DELIVERY_DEAD, 1, WAIT).await);
    harness.shutdown().await;

    assert_eq!(entry.attempt_count, 2);
    assert!(entry.last_error.unwrap().contains("sink unavailable"));
    assert!(harness.sink.delivered().is_empty());
}

#[tokio::test]
async fn non_retryable_upstream_error_dead_letters_after_one_attempt() {
    let backend = MockBackend::failing(ClassifierError::Upstream {
        message: "model not found".into(),
        status: Some(404),
        retryable: false,
    });
    let mut harness = TestHarness::builder()
        .rule("react", "job-lead")
        .backend(backend)
        .build()
        .await
        .unwrap();

    harness.push(vec![raw_message(-100, 9, "React dev")]);
    let letters = harness.wait_for_dead_letters(1, WAIT).await;
    harness.shutdown().await;

    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].error_code, "upstream");
    assert_eq!(letters[0].attempts, 1);
    assert_eq!(letters[0].category_hint.as_deref(), Some("job-lead"));
    assert_eq!(harness.backend.calls(), 1);
}

#[tokio::test]
async fn duplicate_upstream_delivery_is_processed_once() {
    let mut harness = TestHarness::builder()
        .rule("react", "job-lead")
        .subscriber("alice", 1, &[])
        .build()
        .await
        .unwrap();

    let message = raw_message(-100, 5, "React freelancer wanted");
    harness.push(vec![message.clone()]);
    harness.push(vec![message]);
    assert!(harness.wait_for_counter(MESSAGES_RECEIVED, 2, WAIT).await);
    assert!(harness.wait_for_counter(DELIVERED, 1, WAIT).await);
    harness.shutdown().await;

    assert_eq!(harness.backend.calls(), 1);
    assert_eq!(harness.sink.delivered().len(), 1);
}

#[tokio::test]
async fn rejected_feedback_suppresses_category() {
    let mut harness = TestHarness::builder()
        .rule("react", "job-lead")
        .subscriber("alice", 1, &[])
        .configure(|c| {
            c.filter.min_pass_weight = 0.5;
            c.feedback.min_samples = 3;
        })
        .build()
        .await
        .unwrap();

    harness.push(vec![raw_message(-100, 1, "React role")]);
    let entry = harness
        .wait_for_status("-100:1", DeliveryStatus::Delivered, WAIT)
        .await
        .unwrap();

    let policy = harness.config.feedback.weight_policy();
    for cycle in 0..4 {
        for n in 0..5 {
            harness
                .store
                .record(&FeedbackRecord {
                    delivery_id: entry.id,
                    subscriber_id: format!("sub-{cycle}-{n}"),
                    verdict: Verdict::Reject,
                    recorded_at: leadwire_core::types::format_timestamp(chrono::Utc::now()),
                })
                .await
                .unwrap();
        }
        let weights = harness.store.aggregate_weights(&policy).await.unwrap();
        harness.weights.store(std::sync::Arc::new(weights));
    }
    assert!(harness.weights.load().get("job-lead") < 0.5);

    harness.push(vec![raw_message(-100, 2, "Another React role")]);
    assert!(harness.wait_for_counter(FILTER_DROPPED, 1, WAIT).await);
    harness.shutdown().await;
    assert_eq!(harness.sink.delivered().len(), 1);
}
