// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parsing of model replies into [`BackendVerdict`]s.
//!
//! Models are asked for a single JSON object but routinely wrap it in code
//! fences or prose. The parser pulls out the outermost object and reads each
//! field leniently.

use leadwire_core::{BackendVerdict, ClassifierError};
use serde_json::Value;

/// Parse a model reply. Unreadable replies are retryable upstream errors.
pub fn parse_verdict(reply: &str) -> Result<BackendVerdict, ClassifierError> {
    let json = extract_object(reply).ok_or_else(|| unreadable("no JSON object in reply"))?;
    let value: Value =
        serde_json::from_str(json).map_err(|e| unreadable(&format!("invalid JSON: {e}")))?;
    let object = value
        .as_object()
        .ok_or_else(|| unreadable("reply is not a JSON object"))?;

    let relevant = object.get("relevant").map(read_bool).unwrap_or(false);
    let category = object
        .get("category")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string);
    let confidence = object.get("confidence").map(read_confidence).unwrap_or(0.0);

    Ok(BackendVerdict {
        relevant,
        category,
        confidence,
        raw_response: reply.to_string(),
    })
}

/// Piecewise calibration of raw model confidence into fixed bands.
pub fn calibrate(raw: f64) -> f64 {
    if raw >= 0.9 {
        0.92
    } else if raw >= 0.8 {
        0.85
    } else if raw >= 0.6 {
        0.70
    } else if raw >= 0.5 {
        0.55
    } else {
        raw
    }
}

fn extract_object(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (end > start).then(|| &reply[start..=end])
}

fn read_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    }
}

fn read_confidence(value: &Value) -> f64 {
    let raw = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().trim_end_matches('%').parse().unwrap_or(0.0),
        _ => 0.0,
    };
    if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 1.0) }
}

fn unreadable(detail: &str) -> ClassifierError {
    ClassifierError::Upstream {
        message: format!("unreadable model reply: {detail}"),
        status: None,
        retryable: true,
    }
}
