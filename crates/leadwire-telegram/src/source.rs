// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Long-polling chat session over the Bot API.

use std::collections::HashSet;

use async_trait::async_trait;
use leadwire_config::model::SessionConfig;
use leadwire_core::{
    AdapterType, ChatSource, ConnectionError, HealthStatus, LeadwireError, PluginAdapter,
    RawMessage,
};
use teloxide::prelude::*;
use teloxide::types::{AllowedUpdate, UpdateKind};
use tracing::{debug, info, warn};

use crate::errors::connection_error;

/// One bot account reading the groups and channels it has been added to.
pub struct TelegramSource {
    name: String,
    bot: Bot,
    channels: HashSet<i64>,
    poll_timeout: u32,
    offset: i32,
}

impl TelegramSource {
    pub fn new(config: &SessionConfig) -> Result<Self, LeadwireError> {
        if config.bot_token.trim().is_empty() {
            return Err(LeadwireError::Config(format!(
                "session {}: bot_token cannot be empty",
                config.name
            )));
        }
        Ok(Self {
            name: config.name.clone(),
            bot: Bot::new(&config.bot_token),
            channels: config.channels.iter().copied().collect(),
            poll_timeout: u32::try_from(config.poll_timeout_secs).unwrap_or(u32::MAX),
            offset: 0,
        })
    }

    fn convert(&self, message: &Message) -> Option<RawMessage> {
        let chat_id = message.chat.id.0;
        if !accepts_chat(&self.channels, chat_id) {
            return None;
        }
        let text = message.text().or_else(|| message.caption())?;
        Some(RawMessage {
            session: self.name.clone(),
            source_id: i64::from(message.id.0),
            channel_id: chat_id,
            channel_title: message.chat.title().map(str::to_string),
            author_id: message.from.as_ref().map(|user| user.id.0 as i64),
            text: text.to_string(),
            received_at: message.date,
        })
    }
}

/// An empty allow-list accepts every chat the bot sees.
pub fn accepts_chat(channels: &HashSet<i64>, chat_id: i64) -> bool {
    channels.is_empty() || channels.contains(&chat_id)
}

#[async_trait]
impl PluginAdapter for TelegramSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Source
    }

    async fn health_check(&self) -> Result<HealthStatus, LeadwireError> {
        match self.bot.get_me().await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(format!("Telegram bot unreachable: {e}"))),
        }
    }

    async fn shutdown(&self) -> Result<(), LeadwireError> {
        debug!(session = %self.name, "telegram session shutting down");
        Ok(())
    }
}

#[async_trait]
impl ChatSource for TelegramSource {
    async fn connect(&mut self) -> Result<(), ConnectionError> {
        let me = self
            .bot
            .get_me()
            .await
            .map_err(|e| connection_error(&self.name, &e))?;
        info!(
            session = %self.name,
            bot = %me.username(),
            channels = self.channels.len(),
            "telegram session authenticated"
        );
        Ok(())
    }

    async fn receive(&mut self) -> Result<Vec<RawMessage>, ConnectionError> {
        let updates = self
            .bot
            .get_updates()
            .offset(self.offset)
            .timeout(self.poll_timeout)
            .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::ChannelPost])
            .await
            .map_err(|e| connection_error(&self.name, &e))?;

        let mut messages = Vec::with_capacity(updates.len());
        for update in updates {
            self.offset = next_offset(self.offset, update.id.0);
            match &update.kind {
                UpdateKind::Message(message) | UpdateKind::ChannelPost(message) => {
                    if let Some(raw) = self.convert(message) {
                        messages.push(raw);
                    }
                }
                _ => {}
            }
        }
        if !messages.is_empty() {
            debug!(session = %self.name, count = messages.len(), "received messages");
        }
        Ok(messages)
    }
}

/// Offset acknowledging `update_id`. Never moves backwards; an id past
/// the range the Bot API accepts leaves the offset unchanged.
pub(crate) fn next_offset(current: i32, update_id: u32) -> i32 {
    match i32::try_from(update_id).ok().and_then(|id| id.checked_add(1)) {
        Some(next) => current.max(next),
        None => {
            warn!(update_id, "update id out of offset range");
            current
        }
    }
}
