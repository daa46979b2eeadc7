// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retry backoff shared by sessions and pollers.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff with a ceiling and multiplicative jitter.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: f64,
    failures: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, jitter: f64) -> Self {
        Self {
            base,
            max: max.max(base),
            jitter: jitter.clamp(0.0, 1.0),
            failures: 0,
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Delay before the next attempt. Never shorter than `at_least`, which
    /// carries an upstream flood-wait request.
    pub fn next_delay(&mut self, at_least: Option<Duration>) -> Duration {
        let factor = 2u32.saturating_pow(self.failures.min(31));
        self.failures = self.failures.saturating_add(1);
        let capped = self.base.saturating_mul(factor).min(self.max);

        let spread = capped.as_secs_f64() * self.jitter;
        let jittered = if spread > 0.0 {
            let offset = rand::thread_rng().gen_range(-spread..=spread);
            Duration::from_secs_f64((capped.as_secs_f64() + offset).max(0.0)).min(self.max)
        } else {
            capped
        };

        match at_least {
            Some(floor) => jittered.max(floor),
            None => jittered,
        }
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_exponentially_to_cap() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(8), 0.0);
        let delays: Vec<_> = (0..6).map(|_| backoff.next_delay(None)).collect();
        assert_eq!(
            delays,
            [1, 2, 4, 8, 8, 8].map(Duration::from_secs).to_vec()
        );
        assert_eq!(backoff.failures(), 6);
    }

    #[test]
    fn reset_starts_over() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(60), 0.0);
        backoff.next_delay(None);
        backoff.next_delay(None);
        backoff.reset();
        assert_eq!(backoff.next_delay(None), Duration::from_secs(1));
    }

    #[test]
    fn jitter_stays_in_band_and_under_cap() {
        let mut backoff = Backoff::new(Duration::from_secs(4), Duration::from_secs(5), 0.25);
        for _ in 0..50 {
            backoff.reset();
            let delay = backoff.next_delay(None);
            assert!(delay >= Duration::from_secs(3));
            assert!(delay <= Duration::from_secs(5));
        }
    }

    #[test]
    fn flood_wait_is_a_floor() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(10), 0.0);
        let delay = backoff.next_delay(Some(Duration::from_secs(42)));
        assert_eq!(delay, Duration::from_secs(42));
    }
}
