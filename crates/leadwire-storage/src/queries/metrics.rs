// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Single-row counter snapshot, overwritten on every flush.

use chrono::{DateTime, Utc};
use leadwire_core::{LeadwireError, MetricsSnapshot};
use rusqlite::{OptionalExtension, params};

use super::{json_err, ts};
use crate::database::{Database, map_tr_err};

pub async fn write_snapshot(
    db: &Database,
    snapshot: &MetricsSnapshot,
    now: DateTime<Utc>,
) -> Result<(), LeadwireError> {
    let counters = serde_json::to_string(&snapshot.counters).map_err(json_err)?;
    let written_at = ts(now);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO metrics_snapshot (id, counters, written_at) VALUES (1, ?1, ?2)
                 ON CONFLICT (id) DO UPDATE SET
                     counters = excluded.counters, written_at = excluded.written_at",
                params![counters, written_at],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn read_snapshot(db: &Database) -> Result<Option<MetricsSnapshot>, LeadwireError> {
    let row: Option<(String, String)> = db
        .connection()
        .call(|conn| {
            conn.query_row(
                "SELECT counters, written_at FROM metrics_snapshot WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)?;

    row.map(|(counters, written_at)| {
        Ok(MetricsSnapshot {
            counters: serde_json::from_str(&counters).map_err(json_err)?,
            written_at: Some(written_at),
        })
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    #[tokio::test]
    async fn snapshot_is_overwritten() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("m.db").to_str().unwrap())
            .await
            .unwrap();
        assert!(read_snapshot(&db).await.unwrap().is_none());

        let mut counters = BTreeMap::new();
        counters.insert("messages_received".to_string(), 3u64);
        write_snapshot(&db, &MetricsSnapshot { counters: counters.clone(), written_at: None }, Utc::now())
            .await
            .unwrap();

        counters.insert("messages_received".to_string(), 5u64);
        write_snapshot(&db, &MetricsSnapshot { counters, written_at: None }, Utc::now())
            .await
            .unwrap();

        let stored = read_snapshot(&db).await.unwrap().unwrap();
        assert_eq!(stored.counters["messages_received"], 5);
        assert!(stored.written_at.is_some());
    }
}
