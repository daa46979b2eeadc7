// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session manager: one reconnecting task per upstream chat session.
//!
//! Each task pulls batches from its [`ChatSource`], drops keys already seen
//! in the shared recent-message window, optionally drops reposted texts, and
//! forwards the rest, in arrival order, into the single intake channel.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use leadwire_config::model::ReconnectConfig;
use leadwire_core::{Backoff, ChatSource, ConnectionError, RawMessage};
use leadwire_metrics::names::{
    DUPLICATES_DROPPED, MESSAGES_RECEIVED, NEAR_DUPLICATES_DROPPED, SESSION_RECONNECTS,
};
use leadwire_metrics::{MetricsSink, PipelineHealth};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dedup::{ContentWindow, RecentWindow};

/// Default bound on a single connect or receive call.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(90);

pub struct SessionManager {
    intake: mpsc::Sender<RawMessage>,
    window: Mutex<RecentWindow>,
    content: Option<Mutex<ContentWindow>>,
    health: Arc<PipelineHealth>,
    metrics: Arc<MetricsSink>,
    reconnect: ReconnectConfig,
    receive_timeout: Duration,
    cancel: CancellationToken,
}

/// Running session tasks.
pub struct SessionHandles {
    handles: Vec<(String, JoinHandle<()>)>,
}

impl SessionHandles {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handles.iter().map(|(name, _)| name.as_str())
    }

    /// Wait for every session task to stop.
    pub async fn join(self) {
        for (name, handle) in self.handles {
            if let Err(e) = handle.await {
                error!(session = %name, error = %e, "session task panicked");
            }
        }
    }
}

impl SessionManager {
    pub fn new(
        intake: mpsc::Sender<RawMessage>,
        dedup_window: usize,
        health: Arc<PipelineHealth>,
        metrics: Arc<MetricsSink>,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            intake,
            window: Mutex::new(RecentWindow::new(dedup_window)),
            content: None,
            health,
            metrics,
            reconnect,
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            cancel,
        }
    }

    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    /// Also drop messages whose text repeats one seen within the window.
    pub fn with_content_window(mut self, window: ContentWindow) -> Self {
        self.content = Some(Mutex::new(window));
        self
    }

    /// Connect every source, then spawn its receive loop.
    ///
    /// Rejected credentials on the initial connect fail the whole start.
    /// Transient initial failures are left to the reconnect loop.
    pub async fn start(
        self,
        sources: Vec<Box<dyn ChatSource>>,
    ) -> Result<SessionHandles, ConnectionError> {
        let mut ready: Vec<(Box<dyn ChatSource>, bool)> = Vec::with_capacity(sources.len());

        for mut source in sources {
            let name = source.name().to_string();
            let outcome = match tokio::time::timeout(self.receive_timeout, source.connect()).await {
                Ok(result) => result,
                Err(_) => Err(ConnectionError::Transient {
                    session: name.clone(),
                    message: "connect timed out".into(),
                    retry_after: None,
                }),
            };

            match outcome {
                Ok(()) => {
                    info!(session = %name, "session connected");
                    self.health.set_alive(&name, true);
                    ready.push((source, true));
                }
                Err(e) if e.is_fatal() => {
                    error!(session = %name, error = %e, "session failed to start");
                    for (other, _) in ready {
                        if let Err(e) = other.shutdown().await {
                            warn!(session = %other.name(), error = %e, "session shutdown failed");
                        }
                    }
                    return Err(e);
                }
                Err(e) => {
                    warn!(session = %name, error = %e, "initial connect failed, will retry");
                    self.health.set_alive(&name, false);
                    ready.push((source, false));
                }
            }
        }

        let manager = Arc::new(self);
        let handles = ready
            .into_iter()
            .map(|(source, connected)| {
                let name = source.name().to_string();
                let manager = manager.clone();
                let handle = tokio::spawn(async move { manager.run(source, connected).await });
                (name, handle)
            })
            .collect();

        Ok(SessionHandles { handles })
    }

    async fn run(self: Arc<Self>, mut source: Box<dyn ChatSource>, mut connected: bool) {
        let name = source.name().to_string();
        let mut backoff = Backoff::from(&self.reconnect);
        let mut retry_after = None;

        loop {
            if !connected {
                let delay = backoff.next_delay(retry_after.take());
                self.metrics.increment(SESSION_RECONNECTS, 1);
                info!(
                    session = %name,
                    attempt = backoff.failures(),
                    delay_ms = delay.as_millis() as u64,
                    "reconnecting session"
                );
                tokio::select! {
                    () = self.cancel.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }

                let outcome = tokio::select! {
                    () = self.cancel.cancelled() => break,
                    outcome = tokio::time::timeout(self.receive_timeout, source.connect()) => outcome,
                };
                match outcome {
                    Ok(Ok(())) => {
                        connected = true;
                        backoff.reset();
                        self.health.set_alive(&name, true);
                        info!(session = %name, "session reconnected");
                    }
                    Ok(Err(e)) if e.is_fatal() => {
                        error!(session = %name, error = %e, "session stopped");
                        break;
                    }
                    Ok(Err(e)) => {
                        warn!(session = %name, error = %e, "reconnect failed");
                        retry_after = flood_wait(&e);
                        continue;
                    }
                    Err(_) => {
                        warn!(session = %name, "reconnect timed out");
                        continue;
                    }
                }
            }

            let received = tokio::select! {
                () = self.cancel.cancelled() => break,
                received = tokio::time::timeout(self.receive_timeout, source.receive()) => received,
            };
            match received {
                Ok(Ok(messages)) => {
                    if !self.forward(&name, messages).await {
                        break;
                    }
                }
                Ok(Err(e)) if e.is_fatal() => {
                    error!(session = %name, error = %e, "session stopped");
                    break;
                }
                Ok(Err(e)) => {
                    warn!(session = %name, error = %e, "session disconnected");
                    retry_after = flood_wait(&e);
                    connected = false;
                    self.health.set_alive(&name, false);
                }
                Err(_) => {
                    warn!(session = %name, "receive timed out");
                    connected = false;
                    self.health.set_alive(&name, false);
                }
            }
        }

        self.health.set_alive(&name, false);
        if let Err(e) = source.shutdown().await {
            warn!(session = %name, error = %e, "session shutdown failed");
        }
        info!(session = %name, "session task finished");
    }

    /// Forward fresh messages to intake. Returns `false` once intake is gone.
    async fn forward(&self, session: &str, messages: Vec<RawMessage>) -> bool {
        for message in messages {
            self.metrics.increment(MESSAGES_RECEIVED, 1);
            let fresh = self
                .window
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(message.key());
            if !fresh {
                self.metrics.increment(DUPLICATES_DROPPED, 1);
                debug!(session, key = %message.key(), "duplicate message dropped");
                continue;
            }
            if self.is_repost(&message) {
                self.metrics.increment(NEAR_DUPLICATES_DROPPED, 1);
                debug!(session, key = %message.key(), "reposted text dropped");
                continue;
            }

            let sent = tokio::select! {
                () = self.cancel.cancelled() => return false,
                sent = self.intake.send(message) => sent,
            };
            if sent.is_err() {
                warn!(session, "intake channel closed");
                return false;
            }
        }
        true
    }

    fn is_repost(&self, message: &RawMessage) -> bool {
        self.content.as_ref().is_some_and(|content| {
            content
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_repost(&message.text, Instant::now())
        })
    }
}

fn flood_wait(error: &ConnectionError) -> Option<Duration> {
    match error {
        ConnectionError::Transient { retry_after, .. } => *retry_after,
        _ => None,
    }
}
