// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Global token bucket shared by every classification caller.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use leadwire_core::ClassifierError;
use tokio::time::Instant;
use tracing::debug;

/// Token bucket refilled continuously at `rate` tokens per second.
///
/// At most `capacity` tokens accumulate while idle, so a burst of callers
/// after a quiet period gets at most `capacity` immediate calls. Over any
/// window the number of granted calls never exceeds `capacity + rate * t`.
pub struct TokenBucket {
    rate: f64,
    capacity: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    refilled_at: Instant,
}

impl TokenBucket {
    /// The bucket starts full.
    pub fn new(rate_per_second: f64, burst: u32) -> Self {
        let capacity = f64::from(burst.max(1));
        Self {
            rate: rate_per_second,
            capacity,
            state: Mutex::new(BucketState {
                tokens: capacity,
                refilled_at: Instant::now(),
            }),
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Take a token, or report how long until one is available.
    fn try_take(&self) -> Result<(), Duration> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let elapsed = now.duration_since(state.refilled_at).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.capacity);
        state.refilled_at = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - state.tokens;
            Err(Duration::from_secs_f64(missing / self.rate))
        }
    }

    /// Wait for a token for at most `deadline`.
    ///
    /// Gives up with [`ClassifierError::RateLimited`] as soon as it is clear
    /// no token can arrive in time.
    pub async fn acquire(&self, deadline: Duration) -> Result<(), ClassifierError> {
        let started = Instant::now();
        loop {
            let wait = match self.try_take() {
                Ok(()) => return Ok(()),
                Err(wait) => wait,
            };
            let waited = started.elapsed();
            if waited + wait > deadline {
                debug!(waited_ms = waited.as_millis() as u64, "rate limiter deadline exceeded");
                return Err(ClassifierError::RateLimited { waited });
            }
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn sequential_calls_respect_rate() {
        let bucket = TokenBucket::new(2.0, 1);
        let started = Instant::now();
        for _ in 0..5 {
            bucket.acquire(Duration::from_secs(10)).await.unwrap();
        }
        // (N - 1) / R seconds at minimum
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_budget() {
        let bucket = Arc::new(TokenBucket::new(4.0, 1));
        let started = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..9 {
            let bucket = bucket.clone();
            handles.push(tokio::spawn(async move {
                bucket.acquire(Duration::from_secs(30)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn burst_allows_immediate_calls() {
        let bucket = TokenBucket::new(1.0, 3);
        let started = Instant::now();
        for _ in 0..3 {
            bucket.acquire(Duration::from_millis(1)).await.unwrap();
        }
        assert!(started.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn starved_caller_is_rate_limited() {
        let bucket = TokenBucket::new(0.1, 1);
        bucket.acquire(Duration::from_secs(1)).await.unwrap();
        let err = bucket.acquire(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, ClassifierError::RateLimited { .. }));
        assert!(err.is_retryable());
    }
}
