// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules. Every function takes `&Database` and an explicit
//! `now` where time matters, so state transitions are testable without sleeping.

pub mod dead_letters;
pub mod feedback;
pub mod metrics;
pub mod queue;

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use leadwire_core::types::format_timestamp;

/// Stored in place of timestamps that would overflow.
const FAR_FUTURE: &str = "9999-12-31T23:59:59.999Z";

pub(crate) fn ts(at: DateTime<Utc>) -> String {
    format_timestamp(at)
}

pub(crate) fn ts_after(at: DateTime<Utc>, delay: Duration) -> String {
    TimeDelta::from_std(delay)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .map(format_timestamp)
        .unwrap_or_else(|| FAR_FUTURE.to_string())
}

pub(crate) fn ts_before(at: DateTime<Utc>, delay: Duration) -> String {
    TimeDelta::from_std(delay)
        .ok()
        .and_then(|delta| at.checked_sub_signed(delta))
        .map(format_timestamp)
        .unwrap_or_else(|| "0000-01-01T00:00:00.000Z".to_string())
}

/// Wrap a decode failure of column `idx` as a rusqlite conversion error.
pub(crate) fn conversion_err<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

pub(crate) fn json_err(e: serde_json::Error) -> leadwire_core::LeadwireError {
    leadwire_core::LeadwireError::Storage {
        source: Box::new(e),
    }
}
