// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;

/// Liveness flags, one per chat session.
///
/// The pipeline is alive while at least one session is connected.
#[derive(Debug, Default)]
pub struct PipelineHealth {
    sessions: DashMap<String, AtomicBool>,
}

impl PipelineHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_alive(&self, session: &str, alive: bool) {
        if let Some(flag) = self.sessions.get(session) {
            flag.store(alive, Ordering::Relaxed);
            return;
        }
        self.sessions
            .entry(session.to_string())
            .or_insert_with(|| AtomicBool::new(alive))
            .store(alive, Ordering::Relaxed);
    }

    pub fn session_alive(&self, session: &str) -> bool {
        self.sessions
            .get(session)
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    pub fn alive_sessions(&self) -> usize {
        self.sessions
            .iter()
            .filter(|entry| entry.value().load(Ordering::Relaxed))
            .count()
    }

    pub fn is_alive(&self) -> bool {
        self.alive_sessions() > 0
    }
}
