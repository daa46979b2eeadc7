// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedded database migrations using refinery.
//!
//! SQL files under `migrations/` are compiled into the binary and applied on
//! every open. Refinery records applied versions in `refinery_schema_history`.

use leadwire_core::LeadwireError;

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Tables created by the migrations, in drop order.
pub(crate) const PIPELINE_TABLES: &[&str] = &[
    "delivery_receipts",
    "delivery_queue",
    "dead_letters",
    "feedback",
    "category_weights",
    "metrics_snapshot",
    "refinery_schema_history",
];

/// Run all pending migrations against the given connection.
pub fn run_migrations(conn: &mut rusqlite::Connection) -> Result<(), LeadwireError> {
    let report = embedded::migrations::runner()
        .run(conn)
        .map_err(|e| LeadwireError::Storage {
            source: Box::new(e),
        })?;
    for migration in report.applied_migrations() {
        tracing::info!(version = migration.version(), name = %migration.name(), "applied migration");
    }
    Ok(())
}
