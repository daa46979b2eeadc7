// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dead-letter rows for messages that exhausted classification retries or
//! could not be written to the delivery queue.

use chrono::{DateTime, Utc};
use leadwire_core::{DeadLetter, DeadLetterCause, DeliveryPayload, LeadwireError};
use rusqlite::params;

use super::{conversion_err, json_err, ts};
use crate::database::{Database, map_tr_err};

/// Store a dead letter. A second failure for the same message overwrites the
/// error details and keeps the original row id.
pub async fn insert(
    db: &Database,
    message_id: &str,
    category_hint: Option<&str>,
    payload: &DeliveryPayload,
    cause: &DeadLetterCause,
    attempts: u32,
    now: DateTime<Utc>,
) -> Result<i64, LeadwireError> {
    let message_id = message_id.to_string();
    let category_hint = category_hint.map(str::to_string);
    let payload = serde_json::to_string(payload).map_err(json_err)?;
    let code = cause.code().to_string();
    let message = cause.to_string();
    let now = ts(now);

    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO dead_letters
                     (message_id, category_hint, payload, error_code, error_message, attempts, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (message_id) DO UPDATE SET
                     error_code = excluded.error_code,
                     error_message = excluded.error_message,
                     attempts = excluded.attempts",
                params![message_id, category_hint, payload, code, message, attempts, now],
            )?;
            conn.query_row(
                "SELECT id FROM dead_letters WHERE message_id = ?1",
                params![message_id],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Most recent dead letters first.
pub async fn list(db: &Database, limit: usize) -> Result<Vec<DeadLetter>, LeadwireError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, message_id, category_hint, payload, error_code, error_message,
                        attempts, created_at
                 FROM dead_letters ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], |row| {
                let payload: String = row.get(3)?;
                Ok(DeadLetter {
                    id: row.get(0)?,
                    message_id: row.get(1)?,
                    category_hint: row.get(2)?,
                    payload: serde_json::from_str(&payload).map_err(|e| conversion_err(3, e))?,
                    error_code: row.get(4)?,
                    error_message: row.get(5)?,
                    attempts: row.get(6)?,
                    created_at: row.get(7)?,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}
