// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns presses of the accept/reject buttons into feedback records.
//!
//! Only configured subscribers vote. A press counts for the subscriber whose
//! destination is the presser's private chat, or else the chat the button
//! was pressed in.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::Utc;
use leadwire_core::{Backoff, FeedbackRecord, Subscriber, types::format_timestamp};
use teloxide::prelude::*;
use teloxide::types::{AllowedUpdate, UpdateKind};
use teloxide::RequestError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::sink::parse_callback;
use crate::source::next_offset;

const POLL_TIMEOUT_SECS: u32 = 30;
const MIN_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Why a button press produced no feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressRejected {
    UnknownAction,
    NotSubscriber,
}

impl PressRejected {
    fn answer(self) -> &'static str {
        match self {
            Self::UnknownAction => "Unknown action",
            Self::NotSubscriber => "Only subscribers can rate leads",
        }
    }
}

/// Long-polls callback queries on the delivery bot.
pub struct FeedbackListener {
    bot: Bot,
    tx: mpsc::Sender<FeedbackRecord>,
    subscribers: Arc<ArcSwap<Vec<Subscriber>>>,
    offset: i32,
}

impl FeedbackListener {
    pub fn new(
        bot: Bot,
        tx: mpsc::Sender<FeedbackRecord>,
        subscribers: Arc<ArcSwap<Vec<Subscriber>>>,
    ) -> Self {
        Self {
            bot,
            tx,
            subscribers,
            offset: 0,
        }
    }

    pub fn spawn(mut self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("feedback listener started");
            let mut backoff = Backoff::new(MIN_BACKOFF, MAX_BACKOFF, 0.0);
            loop {
                let polled = tokio::select! {
                    () = cancel.cancelled() => break,
                    polled = self.poll() => polled,
                };
                match polled {
                    Ok(()) => backoff.reset(),
                    Err(e) => {
                        let retry_after = match &e {
                            RequestError::RetryAfter(wait) => Some(wait.duration()),
                            _ => None,
                        };
                        let delay = backoff.next_delay(retry_after);
                        warn!(
                            error = %e,
                            failures = backoff.failures(),
                            delay_ms = delay.as_millis() as u64,
                            "callback poll failed"
                        );
                        tokio::select! {
                            () = cancel.cancelled() => break,
                            () = tokio::time::sleep(delay) => {}
                        }
                    }
                }
                if self.tx.is_closed() {
                    break;
                }
            }
            info!("feedback listener stopped");
        })
    }

    async fn poll(&mut self) -> Result<(), RequestError> {
        let updates = self
            .bot
            .get_updates()
            .offset(self.offset)
            .timeout(POLL_TIMEOUT_SECS)
            .allowed_updates(vec![AllowedUpdate::CallbackQuery])
            .await?;

        for update in updates {
            self.offset = next_offset(self.offset, update.id.0);
            if let UpdateKind::CallbackQuery(query) = update.kind {
                self.handle(query).await;
            }
        }
        Ok(())
    }

    async fn handle(&self, query: CallbackQuery) {
        let chat_id = query.message.as_ref().map(|message| message.chat().id.0);
        let subscribers = self.subscribers.load();
        let record = match query.data.as_deref() {
            Some(data) => feedback_record(data, query.from.id.0, chat_id, &subscribers),
            None => Err(PressRejected::UnknownAction),
        };

        let answer = match record {
            Ok(record) => {
                debug!(
                    delivery_id = record.delivery_id,
                    subscriber = %record.subscriber_id,
                    verdict = %record.verdict,
                    "feedback received"
                );
                if self.tx.send(record).await.is_err() {
                    warn!("feedback recorder gone, dropping feedback");
                }
                "Thanks, noted"
            }
            Err(rejected) => {
                debug!(user_id = query.from.id.0, ?rejected, "button press ignored");
                rejected.answer()
            }
        };

        if let Err(e) = self.bot.answer_callback_query(query.id.clone()).text(answer).await {
            debug!(error = %e, "failed to answer callback query");
        }
    }
}

/// Builds the feedback row for a button press by `user_id` in `chat_id`.
pub fn feedback_record(
    data: &str,
    user_id: u64,
    chat_id: Option<i64>,
    subscribers: &[Subscriber],
) -> Result<FeedbackRecord, PressRejected> {
    let (delivery_id, verdict) = parse_callback(data).ok_or(PressRejected::UnknownAction)?;
    let subscriber = voter(user_id, chat_id, subscribers).ok_or(PressRejected::NotSubscriber)?;
    Ok(FeedbackRecord {
        delivery_id,
        subscriber_id: subscriber.id.clone(),
        verdict,
        recorded_at: format_timestamp(Utc::now()),
    })
}

fn voter(
    user_id: u64,
    chat_id: Option<i64>,
    subscribers: &[Subscriber],
) -> Option<&Subscriber> {
    let private = i64::try_from(user_id).ok();
    subscribers
        .iter()
        .find(|s| Some(s.destination) == private)
        .or_else(|| subscribers.iter().find(|s| Some(s.destination) == chat_id))
}
