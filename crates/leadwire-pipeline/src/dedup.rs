// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Duplicate suppression in front of intake: by upstream key, and by
//! normalized text for reposts of the same content under new ids.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use leadwire_core::MessageKey;
use tokio::time::Instant;

/// Bounded memory of recently seen message keys.
///
/// Once `capacity` keys are held, remembering a new key forgets the oldest.
#[derive(Debug)]
pub struct RecentWindow {
    capacity: usize,
    seen: HashSet<MessageKey>,
    order: VecDeque<MessageKey>,
}

impl RecentWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            seen: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    /// Returns `true` the first time `key` is seen within the window.
    pub fn insert(&mut self, key: MessageKey) -> bool {
        if !self.seen.insert(key) {
            return false;
        }
        self.order.push_back(key);
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Recently seen message texts, compared after lowercasing and collapsing
/// whitespace.
///
/// A text counts as a repost when the same normalized text was seen less
/// than `window` ago. Every sighting refreshes the text's timestamp, so a
/// steady stream of reposts stays suppressed.
#[derive(Debug)]
pub struct ContentWindow {
    window: Duration,
    capacity: usize,
    last_seen: HashMap<String, Instant>,
    order: VecDeque<(Instant, String)>,
}

impl ContentWindow {
    pub fn new(window: Duration, capacity: usize) -> Self {
        Self {
            window,
            capacity: capacity.max(1),
            last_seen: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Returns `true` when `text` repeats a text seen within the window.
    /// Empty text is never a repost.
    pub fn is_repost(&mut self, text: &str, now: Instant) -> bool {
        let normalized = normalize(text);
        if normalized.is_empty() || self.window.is_zero() {
            return false;
        }

        while let Some((seen, _)) = self.order.front() {
            if now.saturating_duration_since(*seen) < self.window {
                break;
            }
            if let Some((seen, text)) = self.order.pop_front() {
                self.forget(&text, seen);
            }
        }

        let repost = self
            .last_seen
            .get(&normalized)
            .is_some_and(|seen| now.saturating_duration_since(*seen) < self.window);

        self.last_seen.insert(normalized.clone(), now);
        self.order.push_back((now, normalized));
        while self.order.len() > self.capacity {
            if let Some((seen, text)) = self.order.pop_front() {
                self.forget(&text, seen);
            }
        }
        repost
    }

    /// Drops `text` unless a later sighting refreshed it.
    fn forget(&mut self, text: &str, seen: Instant) {
        if self.last_seen.get(text) == Some(&seen) {
            self.last_seen.remove(text);
        }
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
