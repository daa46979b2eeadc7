// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end scenarios for the complete Leadwire pipeline.
//!
//! Each test creates an isolated TestHarness with a temp SQLite file and mock
//! session, backend and sink. Tests are independent and order-insensitive.

use std::time::Duration;

use leadwire_core::{DeadLetterStore, DeliveryStatus, QueueStore};
use leadwire_metrics::names::{DEAD_LETTERED, DELIVERED, ENQUEUED};
use leadwire_test_utils::{MockBackend, TestHarness, raw_message};

const WAIT: Duration = Duration::from_secs(15);

// ---- Scenario 1: job lead reaches every subscriber ----

#[tokio::test]
async fn job_lead_is_delivered_to_all_subscribers() {
    let backend = MockBackend::new();
    backend.push_verdict("job-lead", 0.92);
    let mut harness = TestHarness::builder()
        .rule("react", "job-lead")
        .subscriber("alice", 101, &[])
        .subscriber("bob", 102, &["job-lead"])
        .backend(backend)
        .build()
        .await
        .unwrap();

    harness.push(vec![raw_message(
        -100,
        1,
        "Looking for a React dev, remote, $50/hr",
    )]);

    let entry = harness
        .wait_for_status("-100:1", DeliveryStatus::Delivered, WAIT)
        .await
        .expect("entry should be delivered");
    assert_eq!(entry.category, "job-lead");
    assert!((entry.confidence - 0.92).abs() < 1e-9);

    let mut recipients: Vec<String> = harness
        .sink
        .delivered()
        .into_iter()
        .map(|d| d.subscriber_id)
        .collect();
    recipients.sort();
    assert_eq!(recipients, vec!["alice", "bob"]);
    assert_eq!(
        harness.store.receipts(entry.id).await.unwrap().len(),
        2
    );

    assert!(harness.wait_for_counter(DELIVERED, 1, WAIT).await);
    assert_eq!(harness.backend.calls(), 1);
    harness.shutdown().await;
    assert!(harness.store.list_dead_letters(10).await.unwrap().is_empty());
}

// ---- Scenario 2: classifier keeps timing out ----

#[tokio::test]
async fn classifier_timeouts_dead_letter_the_message() {
    let mut harness = TestHarness::builder()
        .rule("react", "job-lead")
        .subscriber("alice", 101, &[])
        .backend(MockBackend::hanging())
        .configure(|c| c.classifier.max_attempts = 3)
        .build()
        .await
        .unwrap();

    harness.push(vec![raw_message(
        -100,
        7,
        "Looking for a React dev, remote, $50/hr",
    )]);

    let letters = harness.wait_for_dead_letters(1, WAIT).await;
    assert_eq!(letters.len(), 1);
    let letter = &letters[0];
    assert_eq!(letter.message_id, "-100:7");
    assert_eq!(letter.error_code, "timeout");
    assert_eq!(letter.attempts, 3);
    assert_eq!(letter.category_hint.as_deref(), Some("job-lead"));
    assert!(harness.wait_for_counter(DEAD_LETTERED, 1, WAIT).await);
    assert_eq!(harness.backend.calls(), 3);
    let enqueued = harness.pipeline().map(|p| p.metrics().get(ENQUEUED));
    assert_eq!(enqueued, Some(0));

    harness.shutdown().await;

    for status in [
        DeliveryStatus::Pending,
        DeliveryStatus::InFlight,
        DeliveryStatus::Delivered,
        DeliveryStatus::Failed,
        DeliveryStatus::Dead,
    ] {
        assert!(
            harness.store.list_by_status(status, 10).await.unwrap().is_empty(),
            "nothing should be queued as {status}"
        );
    }
    assert!(harness.sink.delivered().is_empty());
}
