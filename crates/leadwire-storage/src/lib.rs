// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for the Leadwire pipeline.
//!
//! WAL-mode SQLite with embedded migrations and a single-writer connection
//! via `tokio-rusqlite`. Holds the durable delivery queue, delivery receipts,
//! classifier dead letters, append-only feedback with derived category
//! weights, and the flat metrics snapshot.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod queries;

pub use adapter::{SqliteStore, feedback_now};
pub use database::Database;
