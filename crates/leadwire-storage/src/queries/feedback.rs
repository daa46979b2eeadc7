// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only feedback and the category weights derived from it.
//!
//! A vote is one subscriber's verdict on one delivery. Pressing again
//! replaces the verdict instead of adding a vote, so one noisy subscriber
//! counts once per item.
//!
//! Each category keeps a cursor: the id of the last feedback row folded into
//! its weight. A cycle only counts votes first cast past the cursor, and only
//! moves the weight (and cursor) once enough new votes have accumulated.

use chrono::{DateTime, Utc};
use leadwire_core::{
    CategoryWeights, FeedbackRecord, FeedbackStats, LeadwireError, WeightPolicy,
};
use rusqlite::{OptionalExtension, params};
use tracing::info;

use super::ts;
use crate::database::{Database, map_tr_err};

/// Every vote with its latest verdict.
const VOTES: &str = "SELECT f.category, MIN(f.id) AS first_id, MAX(f.id) AS last_id
     FROM feedback f
     GROUP BY f.category, f.delivery_id, f.subscriber_id";

/// Append a feedback row. The category is taken from the delivery entry.
pub async fn record(db: &Database, record: &FeedbackRecord) -> Result<i64, LeadwireError> {
    let delivery_id = record.delivery_id;
    let subscriber_id = record.subscriber_id.clone();
    let verdict = record.verdict.to_string();
    let recorded_at = record.recorded_at.clone();

    let inserted = db
        .connection()
        .call(move |conn| {
            let category: Option<String> = conn
                .query_row(
                    "SELECT category FROM delivery_queue WHERE id = ?1",
                    params![delivery_id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(category) = category else {
                return Ok(None);
            };
            conn.execute(
                "INSERT INTO feedback (delivery_id, subscriber_id, category, verdict, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![delivery_id, subscriber_id, category, verdict, recorded_at],
            )?;
            Ok(Some(conn.last_insert_rowid()))
        })
        .await
        .map_err(map_tr_err)?;

    inserted.ok_or_else(|| LeadwireError::NotFound {
        entity: "delivery entry",
        id: delivery_id.to_string(),
    })
}

/// Run one aggregation cycle and return the resulting weights.
pub async fn aggregate_weights(
    db: &Database,
    policy: &WeightPolicy,
    now: DateTime<Utc>,
) -> Result<CategoryWeights, LeadwireError> {
    let policy = *policy;
    let now = ts(now);

    let (changes, weights) = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let pending: Vec<(String, i64, i64, i64, Option<f64>)> = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT v.category,
                            SUM(CASE WHEN latest.verdict = 'accept' THEN 1 ELSE 0 END),
                            SUM(CASE WHEN latest.verdict = 'reject' THEN 1 ELSE 0 END),
                            MAX(v.last_id),
                            w.weight
                     FROM ({VOTES}) v
                     JOIN feedback latest ON latest.id = v.last_id
                     LEFT JOIN category_weights w ON w.category = v.category
                     WHERE v.first_id > COALESCE(w.cursor, 0)
                     GROUP BY v.category"
                ))?;
                let rows = stmt.query_map([], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
                })?;
                rows.collect::<Result<_, _>>()?
            };

            let mut changes = Vec::new();
            for (category, accepts, rejects, last_id, current) in pending {
                let current = current.unwrap_or(CategoryWeights::NEUTRAL);
                let (accepts, rejects) = (accepts.max(0) as u64, rejects.max(0) as u64);
                let Some(next) = policy.apply(current, accepts, rejects) else {
                    continue;
                };
                tx.execute(
                    "INSERT INTO category_weights (category, weight, cursor, updated_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT (category) DO UPDATE SET
                         weight = excluded.weight,
                         cursor = excluded.cursor,
                         updated_at = excluded.updated_at",
                    params![category, next, last_id, now],
                )?;
                changes.push((category, current, next, accepts, rejects));
            }

            let weights = load_weights(&tx)?;
            tx.commit()?;
            Ok((changes, weights))
        })
        .await
        .map_err(map_tr_err)?;

    for (category, from, to, accepts, rejects) in changes {
        info!(%category, from, to, accepts, rejects, "category weight updated");
    }
    Ok(weights)
}

pub async fn current_weights(db: &Database) -> Result<CategoryWeights, LeadwireError> {
    db.connection()
        .call(|conn| load_weights(conn))
        .await
        .map_err(map_tr_err)
}

fn load_weights(conn: &rusqlite::Connection) -> rusqlite::Result<CategoryWeights> {
    let mut stmt = conn.prepare("SELECT category, weight FROM category_weights")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)))?;
    rows.collect()
}

/// Lifetime vote totals per category, each vote at its latest verdict.
pub async fn stats(db: &Database) -> Result<Vec<FeedbackStats>, LeadwireError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT v.category,
                        SUM(CASE WHEN latest.verdict = 'accept' THEN 1 ELSE 0 END),
                        SUM(CASE WHEN latest.verdict = 'reject' THEN 1 ELSE 0 END)
                 FROM ({VOTES}) v
                 JOIN feedback latest ON latest.id = v.last_id
                 GROUP BY v.category ORDER BY v.category"
            ))?;
            let rows = stmt.query_map([], |row| {
                Ok(FeedbackStats {
                    category: row.get(0)?,
                    accepts: row.get::<_, i64>(1)?.max(0) as u64,
                    rejects: row.get::<_, i64>(2)?.max(0) as u64,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}
