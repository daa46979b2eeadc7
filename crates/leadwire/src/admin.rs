// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `leadwire reset-db`, `leadwire dead-letters` and `leadwire feedback-stats`.

use leadwire_config::model::LeadwireConfig;
use leadwire_core::{
    CategoryWeights, DeadLetter, DeadLetterStore, DeliveryEntry, DeliveryStatus, FeedbackStats,
    FeedbackStore, LeadwireError, QueueStore,
};
use leadwire_storage::{Database, SqliteStore};
use tracing::info;

const PREVIEW_CHARS: usize = 60;

/// Rebuilds the schema. Refuses without `--yes`.
pub async fn reset_db(config: &LeadwireConfig, confirmed: bool) -> Result<(), LeadwireError> {
    let path = &config.storage.database_path;
    if !confirmed {
        return Err(LeadwireError::Config(format!(
            "reset-db deletes every queued item, dead letter and weight in {path}; \
             re-run with --yes to confirm"
        )));
    }
    Database::reset(path, config.storage.wal_mode).await?;
    info!(path = %path, "database reset");
    println!("database {path} reset");
    Ok(())
}

/// Prints dead-lettered messages, newest first. With `delivery`, prints
/// queue entries that ran out of delivery attempts instead.
pub async fn dead_letters(
    config: &LeadwireConfig,
    limit: usize,
    json: bool,
    delivery: bool,
) -> Result<(), LeadwireError> {
    let store = SqliteStore::new(config.storage.clone(), config.delivery.queue_policy());
    store.initialize().await?;
    if delivery {
        let entries = store.list_by_status(DeliveryStatus::Dead, limit).await?;
        return print_dead_entries(&entries, json);
    }
    let letters = store.list_dead_letters(limit).await?;

    if json {
        let rendered = serde_json::to_string_pretty(&letters)
            .map_err(|e| LeadwireError::Internal(format!("serialize dead letters: {e}")))?;
        println!("{rendered}");
        return Ok(());
    }

    if letters.is_empty() {
        println!("no dead letters");
        return Ok(());
    }
    for letter in &letters {
        println!("{}", format_line(letter));
    }
    Ok(())
}

fn print_dead_entries(entries: &[DeliveryEntry], json: bool) -> Result<(), LeadwireError> {
    if json {
        let rendered = serde_json::to_string_pretty(entries)
            .map_err(|e| LeadwireError::Internal(format!("serialize dead entries: {e}")))?;
        println!("{rendered}");
        return Ok(());
    }

    if entries.is_empty() {
        println!("no dead delivery entries");
        return Ok(());
    }
    for entry in entries {
        println!("{}", format_entry(entry));
    }
    Ok(())
}

/// Prints lifetime accept/reject totals next to each category's weight.
pub async fn feedback_stats(config: &LeadwireConfig) -> Result<(), LeadwireError> {
    let store = SqliteStore::new(config.storage.clone(), config.delivery.queue_policy());
    store.initialize().await?;
    let stats = store.feedback_stats().await?;
    let weights = store.current_weights().await?;

    if stats.is_empty() {
        println!("no feedback recorded");
        return Ok(());
    }
    for row in &stats {
        println!("{}", format_stats(row, &weights));
    }
    Ok(())
}

fn format_stats(row: &FeedbackStats, weights: &CategoryWeights) -> String {
    let total = row.accepts + row.rejects;
    let reject_rate = if total == 0 {
        0.0
    } else {
        row.rejects as f64 / total as f64 * 100.0
    };
    format!(
        "{:<20} accept {:>5}  reject {:>5}  ({reject_rate:.0}% rejected)  weight {:.2}",
        row.category,
        row.accepts,
        row.rejects,
        weights.get(&row.category),
    )
}

fn format_entry(entry: &DeliveryEntry) -> String {
    format!(
        "#{id} {message} [{category}] x{attempts}/{max}: {error}",
        id = entry.id,
        message = entry.message_id,
        category = entry.category,
        attempts = entry.attempt_count,
        max = entry.max_attempts,
        error = entry.last_error.as_deref().unwrap_or("-"),
    )
}

fn format_line(letter: &DeadLetter) -> String {
    let text: String = letter.payload.text.chars().take(PREVIEW_CHARS).collect();
    let ellipsis = if letter.payload.text.chars().count() > PREVIEW_CHARS {
        "…"
    } else {
        ""
    };
    format!(
        "#{id} {at} {message} [{hint}] {code} x{attempts}: {error} | {text}{ellipsis}",
        id = letter.id,
        at = letter.created_at,
        message = letter.message_id,
        hint = letter.category_hint.as_deref().unwrap_or("-"),
        code = letter.error_code,
        attempts = letter.attempts,
        error = letter.error_message,
        text = text.replace('\n', " "),
    )
}
