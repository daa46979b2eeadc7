// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery queue operations.
//!
//! Status transitions happen inside single transactions on the writer
//! connection, so a lease is held by at most one worker at a time. Only the
//! current lease holder may settle an entry. An entry is
//! only leased while no other entry of its category is in flight, which keeps
//! each category in enqueue order until a retry reorders it.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use leadwire_core::{
    Classification, DeliveryEntry, DeliveryPayload, DeliveryStatus, LeadwireError, QueuePolicy,
};
use rusqlite::{OptionalExtension, params};
use tracing::{debug, warn};

use super::{conversion_err, json_err, ts, ts_after, ts_before};
use crate::database::{Database, map_tr_err};

const ENTRY_COLUMNS: &str = "id, message_id, category, confidence, payload, status, \
     attempt_count, max_attempts, leased_by, lease_expires_at, retry_at, last_error, \
     created_at, last_attempt_at";

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<DeliveryEntry> {
    let payload: String = row.get(4)?;
    let status: String = row.get(5)?;
    Ok(DeliveryEntry {
        id: row.get(0)?,
        message_id: row.get(1)?,
        category: row.get(2)?,
        confidence: row.get(3)?,
        payload: serde_json::from_str(&payload).map_err(|e| conversion_err(4, e))?,
        status: DeliveryStatus::from_str(&status).map_err(|e| conversion_err(5, e))?,
        attempt_count: row.get(6)?,
        max_attempts: row.get(7)?,
        leased_by: row.get(8)?,
        lease_expires_at: row.get(9)?,
        retry_at: row.get(10)?,
        last_error: row.get(11)?,
        created_at: row.get(12)?,
        last_attempt_at: row.get(13)?,
    })
}

/// Result of trying to move an in-flight entry.
enum Settle {
    Applied(DeliveryStatus),
    Missing,
    Blocked(String),
    /// In flight under someone else's lease.
    Lost,
}

fn settle_result(
    id: i64,
    worker_id: &str,
    to: DeliveryStatus,
    settle: Settle,
) -> Result<DeliveryStatus, LeadwireError> {
    match settle {
        Settle::Applied(status) => Ok(status),
        Settle::Missing => Err(LeadwireError::NotFound {
            entity: "delivery entry",
            id: id.to_string(),
        }),
        Settle::Lost => Err(LeadwireError::LeaseLost {
            id,
            worker: worker_id.to_string(),
        }),
        Settle::Blocked(current) => {
            let from = DeliveryStatus::from_str(&current).map_err(|e| LeadwireError::Storage {
                source: Box::new(e),
            })?;
            Err(LeadwireError::InvalidTransition { id, from, to })
        }
    }
}

/// Insert an entry for the classified message, or refresh the existing one.
///
/// An existing entry is only updated while `pending` or `failed`; entries
/// that are in flight or settled are returned untouched. A new entry is
/// refused with [`LeadwireError::QueueFull`] once the open entries reach
/// `policy.max_queue_size`.
pub async fn enqueue(
    db: &Database,
    classification: &Classification,
    payload: &DeliveryPayload,
    policy: &QueuePolicy,
    now: DateTime<Utc>,
) -> Result<DeliveryEntry, LeadwireError> {
    let payload = serde_json::to_string(payload).map_err(json_err)?;
    let c = classification.clone();
    let capacity = policy.max_queue_size;
    let max_attempts = policy.max_attempts;
    let created_at = ts(now);

    let stored = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM delivery_queue WHERE message_id = ?1)",
                params![c.message_id],
                |row| row.get(0),
            )?;
            if !exists && capacity > 0 {
                let open: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM delivery_queue
                     WHERE status IN ('pending', 'in_flight', 'failed')",
                    [],
                    |row| row.get(0),
                )?;
                if open >= capacity as i64 {
                    return Ok(None);
                }
            }

            tx.execute(
                "INSERT INTO delivery_queue
                     (message_id, category, confidence, raw_response, payload, max_attempts, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (message_id) DO UPDATE SET
                     category = excluded.category,
                     confidence = excluded.confidence,
                     raw_response = excluded.raw_response,
                     payload = excluded.payload
                 WHERE delivery_queue.status IN ('pending', 'failed')",
                params![
                    c.message_id,
                    c.category,
                    c.confidence,
                    c.raw_response,
                    payload,
                    max_attempts,
                    created_at
                ],
            )?;

            let entry = tx.query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM delivery_queue WHERE message_id = ?1"),
                params![c.message_id],
                row_to_entry,
            )?;
            tx.commit()?;
            Ok(Some(entry))
        })
        .await
        .map_err(map_tr_err)?;

    stored.ok_or(LeadwireError::QueueFull { capacity })
}

/// Lease the oldest eligible entry to `worker_id`.
///
/// Before picking, expired leases are reclaimed (consuming an attempt, so a
/// message that keeps crashing its worker eventually dies) and failed entries
/// whose retry time has come are returned to `pending`.
pub async fn lease(
    db: &Database,
    worker_id: &str,
    policy: &QueuePolicy,
    now: DateTime<Utc>,
) -> Result<Option<DeliveryEntry>, LeadwireError> {
    let worker = worker_id.to_string();
    let now_s = ts(now);
    let expires_at = ts_after(now, policy.lease_timeout);

    let (reclaimed, leased) = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let reclaimed = tx.execute(
                "UPDATE delivery_queue SET
                     attempt_count = attempt_count + 1,
                     status = CASE WHEN attempt_count + 1 >= max_attempts THEN 'dead' ELSE 'pending' END,
                     leased_by = NULL,
                     lease_expires_at = NULL,
                     last_error = 'lease expired'
                 WHERE status = 'in_flight' AND lease_expires_at <= ?1",
                params![now_s],
            )?;

            tx.execute(
                "UPDATE delivery_queue SET status = 'pending', retry_at = NULL
                 WHERE status = 'failed' AND retry_at <= ?1",
                params![now_s],
            )?;

            let candidate = tx
                .query_row(
                    &format!(
                        "SELECT {ENTRY_COLUMNS} FROM delivery_queue q
                         WHERE q.status = 'pending'
                           AND NOT EXISTS (
                               SELECT 1 FROM delivery_queue b
                               WHERE b.category = q.category AND b.status = 'in_flight'
                           )
                         ORDER BY q.id ASC
                         LIMIT 1"
                    ),
                    [],
                    row_to_entry,
                )
                .optional()?;

            let Some(mut entry) = candidate else {
                tx.commit()?;
                return Ok((reclaimed, None));
            };

            tx.execute(
                "UPDATE delivery_queue SET
                     status = 'in_flight', leased_by = ?2, lease_expires_at = ?3, last_attempt_at = ?4
                 WHERE id = ?1",
                params![entry.id, worker, expires_at, now_s],
            )?;
            tx.commit()?;

            entry.status = DeliveryStatus::InFlight;
            entry.leased_by = Some(worker);
            entry.lease_expires_at = Some(expires_at);
            entry.last_attempt_at = Some(now_s);
            Ok((reclaimed, Some(entry)))
        })
        .await
        .map_err(map_tr_err)?;

    if reclaimed > 0 {
        warn!(reclaimed, "reclaimed expired delivery leases");
    }
    if let Some(entry) = &leased {
        debug!(id = entry.id, category = %entry.category, worker = worker_id, "leased entry");
    }
    Ok(leased)
}

/// Mark an entry leased by `worker_id` delivered. Terminal.
pub async fn ack(db: &Database, id: i64, worker_id: &str) -> Result<(), LeadwireError> {
    let worker = worker_id.to_string();
    let settle = db
        .connection()
        .call(move |conn| {
            let updated = conn.execute(
                "UPDATE delivery_queue SET
                     status = 'delivered', leased_by = NULL, lease_expires_at = NULL, last_error = NULL
                 WHERE id = ?1 AND status = 'in_flight' AND leased_by = ?2",
                params![id, worker],
            )?;
            if updated == 1 {
                return Ok(Settle::Applied(DeliveryStatus::Delivered));
            }
            current_status(conn, id)
        })
        .await
        .map_err(map_tr_err)?;

    settle_result(id, worker_id, DeliveryStatus::Delivered, settle).map(|_| ())
}

/// Record a failed delivery attempt on an entry leased by `worker_id`.
///
/// Returns `failed` (leasable again after `policy.retry_delay`) while the
/// attempt budget lasts, `dead` once it is spent.
pub async fn fail(
    db: &Database,
    id: i64,
    worker_id: &str,
    error: &str,
    policy: &QueuePolicy,
    now: DateTime<Utc>,
) -> Result<DeliveryStatus, LeadwireError> {
    let worker = worker_id.to_string();
    let error = error.to_string();
    let retry_at = ts_after(now, policy.retry_delay);

    let settle = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let row: Option<(String, Option<String>, u32, u32)> = tx
                .query_row(
                    "SELECT status, leased_by, attempt_count, max_attempts
                     FROM delivery_queue WHERE id = ?1",
                    params![id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )
                .optional()?;

            let Some((status, holder, attempts, max_attempts)) = row else {
                return Ok(Settle::Missing);
            };
            if status != DeliveryStatus::InFlight.to_string() {
                return Ok(Settle::Blocked(status));
            }
            if holder.as_deref() != Some(worker.as_str()) {
                return Ok(Settle::Lost);
            }

            let attempts = attempts + 1;
            let (next, retry_at) = if attempts >= max_attempts {
                (DeliveryStatus::Dead, None)
            } else {
                (DeliveryStatus::Failed, Some(retry_at))
            };
            tx.execute(
                "UPDATE delivery_queue SET
                     status = ?2, attempt_count = ?3, retry_at = ?4, last_error = ?5,
                     leased_by = NULL, lease_expires_at = NULL
                 WHERE id = ?1",
                params![id, next.to_string(), attempts, retry_at, error],
            )?;
            tx.commit()?;
            Ok(Settle::Applied(next))
        })
        .await
        .map_err(map_tr_err)?;

    settle_result(id, worker_id, DeliveryStatus::Failed, settle)
}

/// Why a settle by the lease holder did not apply. An entry still in flight
/// here belongs to another worker.
fn current_status(conn: &rusqlite::Connection, id: i64) -> rusqlite::Result<Settle> {
    let status: Option<String> = conn
        .query_row(
            "SELECT status FROM delivery_queue WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(match status {
        None => Settle::Missing,
        Some(status) if status == DeliveryStatus::InFlight.to_string() => Settle::Lost,
        Some(status) => Settle::Blocked(status),
    })
}

/// Return every entry leased by `worker_id` to `pending` without consuming
/// an attempt. Used when a worker stops gracefully.
pub async fn release(db: &Database, worker_id: &str) -> Result<usize, LeadwireError> {
    let worker = worker_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE delivery_queue SET status = 'pending', leased_by = NULL, lease_expires_at = NULL
                 WHERE status = 'in_flight' AND leased_by = ?1",
                params![worker],
            )
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get(db: &Database, id: i64) -> Result<Option<DeliveryEntry>, LeadwireError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM delivery_queue WHERE id = ?1"),
                params![id],
                row_to_entry,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Entries in `status`, oldest first.
pub async fn list_by_status(
    db: &Database,
    status: DeliveryStatus,
    limit: usize,
) -> Result<Vec<DeliveryEntry>, LeadwireError> {
    let status = status.to_string();
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM delivery_queue WHERE status = ?1 ORDER BY id ASC LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![status, limit], row_to_entry)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn record_receipt(
    db: &Database,
    id: i64,
    subscriber_id: &str,
    now: DateTime<Utc>,
) -> Result<(), LeadwireError> {
    let subscriber_id = subscriber_id.to_string();
    let now = ts(now);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO delivery_receipts (entry_id, subscriber_id, delivered_at)
                 VALUES (?1, ?2, ?3)",
                params![id, subscriber_id, now],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Subscribers that already received entry `id`.
pub async fn receipts(db: &Database, id: i64) -> Result<Vec<String>, LeadwireError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT subscriber_id FROM delivery_receipts WHERE entry_id = ?1 ORDER BY subscriber_id",
            )?;
            let rows = stmt.query_map(params![id], |row| row.get(0))?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Delete delivered entries whose last attempt is older than `retention`.
pub async fn purge_delivered(
    db: &Database,
    retention: Duration,
    now: DateTime<Utc>,
) -> Result<usize, LeadwireError> {
    let cutoff = ts_before(now, retention);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM delivery_queue
                 WHERE status = 'delivered' AND COALESCE(last_attempt_at, created_at) < ?1",
                params![cutoff],
            )
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use tempfile::{TempDir, tempdir};

    fn policy() -> QueuePolicy {
        QueuePolicy {
            lease_timeout: Duration::from_secs(60),
            max_attempts: 3,
            retry_delay: Duration::from_secs(10),
            max_queue_size: 100,
        }
    }

    async fn open() -> (TempDir, Database) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        (dir, db)
    }

    fn payload(text: &str) -> DeliveryPayload {
        DeliveryPayload {
            session: "main".into(),
            channel_id: -100,
            channel_title: Some("jobs".into()),
            author_id: Some(1),
            text: text.into(),
            received_at: Utc::now(),
        }
    }

    fn classified(message_id: &str, category: &str) -> Classification {
        Classification {
            message_id: message_id.into(),
            category: category.into(),
            confidence: 0.9,
            raw_response: "{}".into(),
            relevant: true,
        }
    }

    async fn put(db: &Database, message_id: &str, category: &str) -> DeliveryEntry {
        enqueue(
            db,
            &classified(message_id, category),
            &payload("text"),
            &policy(),
            Utc::now(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn same_message_yields_one_entry() {
        let (_dir, db) = open().await;
        let first = put(&db, "-100:1", "job-lead").await;
        let second = enqueue(
            &db,
            &classified("-100:1", "review"),
            &payload("edited"),
            &policy(),
            Utc::now(),
        )
        .await
        .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.category, "review");
        assert_eq!(second.payload.text, "edited");
        let pending = list_by_status(&db, DeliveryStatus::Pending, 10).await.unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn settled_entry_is_not_rewritten() {
        let (_dir, db) = open().await;
        let entry = put(&db, "-100:1", "job-lead").await;
        lease(&db, "w1", &policy(), Utc::now()).await.unwrap().unwrap();
        ack(&db, entry.id, "w1").await.unwrap();

        let again = put(&db, "-100:1", "review").await;
        assert_eq!(again.status, DeliveryStatus::Delivered);
        assert_eq!(again.category, "job-lead");
    }

    #[tokio::test]
    async fn full_queue_refuses_new_messages() {
        let (_dir, db) = open().await;
        let small = QueuePolicy {
            max_queue_size: 1,
            ..policy()
        };
        enqueue(&db, &classified("a", "x"), &payload("1"), &small, Utc::now())
            .await
            .unwrap();
        let err = enqueue(&db, &classified("b", "x"), &payload("2"), &small, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, LeadwireError::QueueFull { capacity: 1 }));
        // refreshing the existing entry is still allowed
        enqueue(&db, &classified("a", "y"), &payload("1"), &small, Utc::now())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn lease_then_ack_is_terminal() {
        let (_dir, db) = open().await;
        let entry = put(&db, "m1", "job-lead").await;

        let leased = lease(&db, "w1", &policy(), Utc::now()).await.unwrap().unwrap();
        assert_eq!(leased.id, entry.id);
        assert_eq!(leased.status, DeliveryStatus::InFlight);
        assert_eq!(leased.leased_by.as_deref(), Some("w1"));

        ack(&db, entry.id, "w1").await.unwrap();
        let stored = get(&db, entry.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DeliveryStatus::Delivered);

        let err = ack(&db, entry.id, "w1").await.unwrap_err();
        assert!(matches!(
            err,
            LeadwireError::InvalidTransition {
                from: DeliveryStatus::Delivered,
                to: DeliveryStatus::Delivered,
                ..
            }
        ));
        let err = fail(&db, entry.id, "w1", "late", &policy(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, LeadwireError::InvalidTransition { .. }));
        assert!(lease(&db, "w2", &policy(), Utc::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ack_of_unknown_entry_is_not_found() {
        let (_dir, db) = open().await;
        let err = ack(&db, 999, "w1").await.unwrap_err();
        assert!(matches!(err, LeadwireError::NotFound { .. }));
    }

    #[tokio::test]
    async fn category_in_flight_blocks_its_successors() {
        let (_dir, db) = open().await;
        let a1 = put(&db, "a1", "alpha").await;
        let a2 = put(&db, "a2", "alpha").await;
        let b1 = put(&db, "b1", "beta").await;
        let now = Utc::now();

        let first = lease(&db, "w1", &policy(), now).await.unwrap().unwrap();
        let second = lease(&db, "w2", &policy(), now).await.unwrap().unwrap();
        assert_eq!(first.id, a1.id);
        assert_eq!(second.id, b1.id);
        assert!(lease(&db, "w3", &policy(), now).await.unwrap().is_none());

        ack(&db, a1.id, "w1").await.unwrap();
        let third = lease(&db, "w1", &policy(), now).await.unwrap().unwrap();
        assert_eq!(third.id, a2.id);
    }

    #[tokio::test]
    async fn abandoned_lease_becomes_leasable_after_timeout() {
        let (_dir, db) = open().await;
        let entry = put(&db, "m1", "job-lead").await;
        let t0 = Utc::now();

        lease(&db, "crashed", &policy(), t0).await.unwrap().unwrap();
        let early = t0 + TimeDelta::seconds(59);
        assert!(lease(&db, "w2", &policy(), early).await.unwrap().is_none());

        let late = t0 + TimeDelta::seconds(61);
        let again = lease(&db, "w2", &policy(), late).await.unwrap().unwrap();
        assert_eq!(again.id, entry.id);
        assert_eq!(again.attempt_count, 1);
        assert_eq!(again.leased_by.as_deref(), Some("w2"));

        ack(&db, entry.id, "w2").await.unwrap();
        assert!(
            lease(&db, "w3", &policy(), late + TimeDelta::hours(1))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn worker_whose_lease_was_reclaimed_cannot_settle() {
        let (_dir, db) = open().await;
        let entry = put(&db, "m1", "job-lead").await;
        let t0 = Utc::now();

        lease(&db, "w1", &policy(), t0).await.unwrap().unwrap();
        let reclaimed = lease(&db, "w2", &policy(), t0 + TimeDelta::seconds(61))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reclaimed.id, entry.id);

        let late = t0 + TimeDelta::seconds(62);
        let err = fail(&db, entry.id, "w1", "slow subscriber", &policy(), late)
            .await
            .unwrap_err();
        assert!(matches!(err, LeadwireError::LeaseLost { ref worker, .. } if worker == "w1"));
        let err = ack(&db, entry.id, "w1").await.unwrap_err();
        assert!(matches!(err, LeadwireError::LeaseLost { .. }));

        let stored = get(&db, entry.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DeliveryStatus::InFlight);
        assert_eq!(stored.leased_by.as_deref(), Some("w2"));
        assert_eq!(stored.attempt_count, 1);

        ack(&db, entry.id, "w2").await.unwrap();
        let stored = get(&db, entry.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DeliveryStatus::Delivered);
    }

    #[tokio::test]
    async fn failed_entry_waits_for_retry_delay() {
        let (_dir, db) = open().await;
        let entry = put(&db, "m1", "job-lead").await;
        let t0 = Utc::now();

        lease(&db, "w1", &policy(), t0).await.unwrap().unwrap();
        let status = fail(&db, entry.id, "w1", "boom", &policy(), t0).await.unwrap();
        assert_eq!(status, DeliveryStatus::Failed);

        assert!(lease(&db, "w1", &policy(), t0 + TimeDelta::seconds(5)).await.unwrap().is_none());
        let retried = lease(&db, "w1", &policy(), t0 + TimeDelta::seconds(11))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(retried.id, entry.id);
        assert_eq!(retried.attempt_count, 1);
        assert_eq!(retried.last_error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn exhausted_budget_is_dead_and_never_leased() {
        let (_dir, db) = open().await;
        let entry = put(&db, "m1", "job-lead").await;
        let mut now = Utc::now();

        let mut last = DeliveryStatus::Pending;
        for _ in 0..3 {
            let leased = lease(&db, "w1", &policy(), now).await.unwrap().unwrap();
            assert_eq!(leased.id, entry.id);
            last = fail(&db, entry.id, "w1", "down", &policy(), now).await.unwrap();
            now += TimeDelta::seconds(11);
        }
        assert_eq!(last, DeliveryStatus::Dead);

        let stored = get(&db, entry.id).await.unwrap().unwrap();
        assert_eq!(stored.attempt_count, 3);
        assert!(
            lease(&db, "w1", &policy(), now + TimeDelta::days(1))
                .await
                .unwrap()
                .is_none()
        );
        let dead = list_by_status(&db, DeliveryStatus::Dead, 10).await.unwrap();
        assert_eq!(dead.len(), 1);
    }

    #[tokio::test]
    async fn expired_lease_on_last_attempt_dies() {
        let (_dir, db) = open().await;
        let single = QueuePolicy {
            max_attempts: 1,
            ..policy()
        };
        let entry = enqueue(&db, &classified("m1", "x"), &payload("t"), &single, Utc::now())
            .await
            .unwrap();
        let t0 = Utc::now();
        lease(&db, "crashed", &single, t0).await.unwrap().unwrap();
        assert!(
            lease(&db, "w2", &single, t0 + TimeDelta::seconds(61))
                .await
                .unwrap()
                .is_none()
        );
        let stored = get(&db, entry.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DeliveryStatus::Dead);
    }

    #[tokio::test]
    async fn release_returns_leases_without_spending_attempts() {
        let (_dir, db) = open().await;
        let entry = put(&db, "m1", "job-lead").await;
        lease(&db, "w1", &policy(), Utc::now()).await.unwrap().unwrap();

        assert_eq!(release(&db, "other").await.unwrap(), 0);
        assert_eq!(release(&db, "w1").await.unwrap(), 1);

        let stored = get(&db, entry.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DeliveryStatus::Pending);
        assert_eq!(stored.attempt_count, 0);
        assert!(stored.leased_by.is_none());
    }

    #[tokio::test]
    async fn receipts_are_recorded_once() {
        let (_dir, db) = open().await;
        let entry = put(&db, "m1", "job-lead").await;
        record_receipt(&db, entry.id, "bob", Utc::now()).await.unwrap();
        record_receipt(&db, entry.id, "alice", Utc::now()).await.unwrap();
        record_receipt(&db, entry.id, "bob", Utc::now()).await.unwrap();
        assert_eq!(receipts(&db, entry.id).await.unwrap(), vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn purge_removes_only_old_delivered_entries() {
        let (_dir, db) = open().await;
        let old = put(&db, "old", "a").await;
        let open_entry = put(&db, "open", "b").await;
        let t0 = Utc::now();
        lease(&db, "w1", &policy(), t0).await.unwrap().unwrap();
        ack(&db, old.id, "w1").await.unwrap();
        record_receipt(&db, old.id, "bob", t0).await.unwrap();

        let week = Duration::from_secs(7 * 24 * 3600);
        assert_eq!(purge_delivered(&db, week, t0).await.unwrap(), 0);
        let later = t0 + TimeDelta::days(8);
        assert_eq!(purge_delivered(&db, week, later).await.unwrap(), 1);

        assert!(get(&db, old.id).await.unwrap().is_none());
        assert!(receipts(&db, old.id).await.unwrap().is_empty());
        assert!(get(&db, open_entry.id).await.unwrap().is_some());
    }
}
