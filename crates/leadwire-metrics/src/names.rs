// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Counter names and their descriptions.

use metrics::{describe_counter, describe_gauge};

pub const MESSAGES_RECEIVED: &str = "messages_received";
pub const DUPLICATES_DROPPED: &str = "duplicates_dropped";
pub const NEAR_DUPLICATES_DROPPED: &str = "near_duplicates_dropped";
pub const FILTER_PASSED: &str = "filter_passed";
pub const FILTER_DROPPED: &str = "filter_dropped";
pub const CLASSIFIED: &str = "classified";
pub const IRRELEVANT_DROPPED: &str = "irrelevant_dropped";
pub const DEAD_LETTERED: &str = "dead_lettered";
pub const ENQUEUED: &str = "enqueued";
pub const QUEUE_FULL: &str = "queue_full";
pub const DELIVERED: &str = "delivered";
pub const DELIVERY_FAILED: &str = "delivery_failed";
pub const DELIVERY_DEAD: &str = "delivery_dead";
pub const SUBSCRIBERS_EXPIRED: &str = "subscribers_expired";
pub const FEEDBACK_RECORDED: &str = "feedback_recorded";
pub const SESSION_RECONNECTS: &str = "session_reconnects";
pub const PURGED: &str = "purged";

/// Names of the liveness gauges written into every snapshot.
pub const PIPELINE_ALIVE: &str = "pipeline_alive";
pub const SESSIONS_ALIVE: &str = "sessions_alive";

/// Prefix applied when mirroring counters to the `metrics` facade.
pub const PREFIX: &str = "leadwire_";

/// Register descriptions with whatever recorder is installed.
pub fn register_metrics() {
    describe_counter!("leadwire_messages_received", "Messages received from all sessions");
    describe_counter!("leadwire_duplicates_dropped", "Messages dropped as already seen");
    describe_counter!(
        "leadwire_near_duplicates_dropped",
        "Messages dropped because the same text was seen recently"
    );
    describe_counter!("leadwire_filter_passed", "Messages passed by the rule filter");
    describe_counter!("leadwire_filter_dropped", "Messages dropped by the rule filter");
    describe_counter!("leadwire_classified", "Messages classified successfully");
    describe_counter!("leadwire_irrelevant_dropped", "Messages judged off-topic by the classifier");
    describe_counter!("leadwire_dead_lettered", "Messages dead-lettered after classification failures");
    describe_counter!("leadwire_enqueued", "Entries written to the delivery queue");
    describe_counter!("leadwire_queue_full", "Enqueues refused by the queue size cap");
    describe_counter!("leadwire_delivered", "Entries delivered to all subscribers");
    describe_counter!("leadwire_delivery_failed", "Delivery attempts that failed");
    describe_counter!("leadwire_delivery_dead", "Entries that exhausted their delivery attempts");
    describe_counter!(
        "leadwire_subscribers_expired",
        "Dispatches skipped because the subscription ended"
    );
    describe_counter!("leadwire_feedback_recorded", "Subscriber verdicts recorded");
    describe_counter!("leadwire_session_reconnects", "Session reconnect attempts");
    describe_counter!("leadwire_purged", "Delivered entries removed by retention");
    describe_gauge!("leadwire_pipeline_alive", "1 while at least one session is connected");
    describe_gauge!("leadwire_sessions_alive", "Sessions currently connected");
}
