// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All reads and writes go through one `tokio_rusqlite::Connection`, whose
//! background thread serializes every call. Do not open a second connection
//! for writes.

use std::path::Path;

use leadwire_core::LeadwireError;
use tracing::{debug, info};

use crate::migrations;

/// Per-connection settings applied after every open.
const CONNECTION_PRAGMAS: &str = "
    PRAGMA foreign_keys = ON;
    PRAGMA busy_timeout = 5000;
    PRAGMA synchronous = NORMAL;
    PRAGMA temp_store = MEMORY;
";

/// Convert a tokio-rusqlite error into [`LeadwireError::Storage`].
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> LeadwireError {
    LeadwireError::Storage {
        source: Box::new(e),
    }
}

pub(crate) fn map_sql_err(e: rusqlite::Error) -> LeadwireError {
    LeadwireError::Storage {
        source: Box::new(e),
    }
}

/// Handle to the pipeline database.
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (creating if needed) the database at `path` in WAL mode and
    /// apply pending migrations.
    pub async fn open(path: &str) -> Result<Self, LeadwireError> {
        Self::open_with(path, true).await
    }

    /// Like [`Database::open`] with an explicit journal mode choice.
    pub async fn open_with(path: &str, wal_mode: bool) -> Result<Self, LeadwireError> {
        let owned = path.to_string();
        run_blocking(move || prepare(&owned, wal_mode, false)).await?;

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| LeadwireError::Storage {
                source: Box::new(e),
            })?;
        conn.call(|conn| conn.execute_batch(CONNECTION_PRAGMAS))
            .await
            .map_err(map_tr_err)?;

        debug!(path, wal_mode, "database opened");
        Ok(Self { conn })
    }

    /// Drop every pipeline table and rebuild the schema from scratch.
    ///
    /// Must not run while a pipeline holds the database open.
    pub async fn reset(path: &str, wal_mode: bool) -> Result<(), LeadwireError> {
        let owned = path.to_string();
        run_blocking(move || prepare(&owned, wal_mode, true)).await?;
        info!(path, "database schema rebuilt");
        Ok(())
    }

    /// The underlying single-writer connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Flush the WAL into the main file.
    pub async fn checkpoint(&self) -> Result<(), LeadwireError> {
        self.conn
            .call(|conn| conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);"))
            .await
            .map_err(map_tr_err)
    }

    /// Checkpoint and close the connection.
    pub async fn close(self) -> Result<(), LeadwireError> {
        self.checkpoint().await?;
        self.conn.close().await.map_err(|e| LeadwireError::Storage {
            source: Box::new(e),
        })
    }
}

async fn run_blocking<F>(f: F) -> Result<(), LeadwireError>
where
    F: FnOnce() -> Result<(), LeadwireError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| LeadwireError::Internal(format!("database setup task failed: {e}")))?
}

/// Create the parent directory, set the journal mode, optionally drop the
/// schema, then migrate. Runs on a short-lived synchronous connection.
fn prepare(path: &str, wal_mode: bool, reset: bool) -> Result<(), LeadwireError> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| LeadwireError::Storage {
                source: Box::new(e),
            })?;
        }
    }

    let mut conn = rusqlite::Connection::open(path).map_err(map_sql_err)?;
    let journal = if wal_mode { "WAL" } else { "DELETE" };
    conn.pragma_update_and_check(None, "journal_mode", journal, |row| row.get::<_, String>(0))
        .map_err(map_sql_err)?;

    if reset {
        let drops: String = migrations::PIPELINE_TABLES
            .iter()
            .map(|table| format!("DROP TABLE IF EXISTS {table};\n"))
            .collect();
        conn.execute_batch(&drops).map_err(map_sql_err)?;
    }

    migrations::run_migrations(&mut conn)
}
