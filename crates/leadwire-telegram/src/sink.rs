// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subscriber delivery through a dedicated bot.

use std::str::FromStr;

use async_trait::async_trait;
use leadwire_core::{
    AdapterType, DeliveryEntry, DeliveryError, DeliverySink, HealthStatus, LeadwireError,
    PluginAdapter, Subscriber, Verdict,
};
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use tracing::debug;

use crate::errors::delivery_error;

/// Bot API hard limit on message text, in characters.
const MAX_MESSAGE_CHARS: usize = 4096;

/// Room kept for the header lines above the forwarded text.
const HEADER_RESERVE: usize = 256;

const CALLBACK_PREFIX: &str = "fb";

/// Sends queue entries to subscriber chats with accept/reject buttons.
pub struct TelegramSink {
    bot: Bot,
}

impl TelegramSink {
    pub fn new(bot_token: &str) -> Result<Self, LeadwireError> {
        if bot_token.trim().is_empty() {
            return Err(LeadwireError::Config(
                "delivery.bot_token is required to deliver to subscribers".into(),
            ));
        }
        Ok(Self {
            bot: Bot::new(bot_token),
        })
    }

    /// The bot used for delivery. The feedback listener polls the same bot.
    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }
}

/// Renders the message a subscriber sees for one entry.
pub fn render(entry: &DeliveryEntry) -> String {
    let payload = &entry.payload;
    let source = payload
        .channel_title
        .clone()
        .unwrap_or_else(|| payload.channel_id.to_string());
    let confidence = (entry.confidence * 100.0).round() as i64;
    let body = truncate_chars(&payload.text, MAX_MESSAGE_CHARS - HEADER_RESERVE);
    format!(
        "[{}] {confidence}% confidence\nFrom: {source}\n\n{body}",
        entry.category
    )
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

/// Callback payload for a feedback button: `fb:<entry id>:a|r`.
pub fn callback_data(entry_id: i64, verdict: Verdict) -> String {
    let code = match verdict {
        Verdict::Accept => "a",
        Verdict::Reject => "r",
    };
    format!("{CALLBACK_PREFIX}:{entry_id}:{code}")
}

/// Parses a feedback button payload. Foreign or malformed data yields `None`.
pub fn parse_callback(data: &str) -> Option<(i64, Verdict)> {
    let mut parts = data.split(':');
    if parts.next()? != CALLBACK_PREFIX {
        return None;
    }
    let entry_id = i64::from_str(parts.next()?).ok()?;
    let verdict = match parts.next()? {
        "a" => Verdict::Accept,
        "r" => Verdict::Reject,
        _ => return None,
    };
    if parts.next().is_some() {
        return None;
    }
    Some((entry_id, verdict))
}

fn keyboard(entry_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("👍 Relevant", callback_data(entry_id, Verdict::Accept)),
        InlineKeyboardButton::callback("👎 Not relevant", callback_data(entry_id, Verdict::Reject)),
    ]])
}

#[async_trait]
impl PluginAdapter for TelegramSink {
    fn name(&self) -> &str {
        "telegram"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Sink
    }

    async fn health_check(&self) -> Result<HealthStatus, LeadwireError> {
        match self.bot.get_me().await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(format!("delivery bot unreachable: {e}"))),
        }
    }

    async fn shutdown(&self) -> Result<(), LeadwireError> {
        Ok(())
    }
}

#[async_trait]
impl DeliverySink for TelegramSink {
    async fn deliver(
        &self,
        subscriber: &Subscriber,
        entry: &DeliveryEntry,
    ) -> Result<(), DeliveryError> {
        self.bot
            .send_message(ChatId(subscriber.destination), render(entry))
            .reply_markup(keyboard(entry.id))
            .await
            .map_err(|e| delivery_error(&subscriber.id, &e))?;
        debug!(
            subscriber = %subscriber.id,
            entry_id = entry.id,
            category = %entry.category,
            "entry sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use leadwire_core::{DeliveryPayload, DeliveryStatus};

    fn entry(text: &str, title: Option<&str>) -> DeliveryEntry {
        DeliveryEntry {
            id: 7,
            message_id: "-100:12".into(),
            category: "job-lead".into(),
            confidence: 0.874,
            payload: DeliveryPayload {
                session: "main".into(),
                channel_id: -100,
                channel_title: title.map(str::to_string),
                author_id: Some(5),
                text: text.into(),
                received_at: Utc::now(),
            },
            status: DeliveryStatus::InFlight,
            attempt_count: 1,
            max_attempts: 5,
            leased_by: Some("worker-0".into()),
            lease_expires_at: None,
            retry_at: None,
            last_error: None,
            created_at: "2026-01-01T00:00:00.000Z".into(),
            last_attempt_at: None,
        }
    }

    #[test]
    fn render_includes_category_confidence_and_source() {
        let text = render(&entry("Need a React dev", Some("Remote Jobs")));
        assert_eq!(
            text,
            "[job-lead] 87% confidence\nFrom: Remote Jobs\n\nNeed a React dev"
        );
    }

    #[test]
    fn render_falls_back_to_channel_id() {
        let text = render(&entry("hi", None));
        assert!(text.contains("From: -100"));
    }

    #[test]
    fn long_text_is_cut_on_char_boundary() {
        let long = "я".repeat(MAX_MESSAGE_CHARS);
        let text = render(&entry(&long, Some("x")));
        assert!(text.chars().count() <= MAX_MESSAGE_CHARS);
        assert!(text.ends_with('…'));
    }

    #[test]
    fn callback_data_parses_back() {
        assert_eq!(parse_callback(&callback_data(42, Verdict::Accept)), Some((42, Verdict::Accept)));
        assert_eq!(parse_callback("fb:3:r"), Some((3, Verdict::Reject)));
    }

    #[test]
    fn malformed_callback_data_is_ignored() {
        for data in ["", "fb", "fb:x:a", "fb:1:z", "fb:1:a:extra", "askuser:1:0"] {
            assert_eq!(parse_callback(data), None, "{data}");
        }
    }

    #[test]
    fn blank_token_is_rejected() {
        assert!(TelegramSink::new("").is_err());
    }
}
