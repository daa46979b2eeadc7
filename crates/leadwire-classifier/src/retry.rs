// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exponential backoff between classification attempts.

use std::time::Duration;

use leadwire_config::model::ClassifierConfig;
use rand::Rng;

/// Retry budget and delay curve for one message.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Total attempts, the first call included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Up to this fraction of the delay is added at random.
    pub jitter_fraction: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            jitter_fraction: 0.25,
        }
    }
}

impl From<&ClassifierConfig> for RetryConfig {
    fn from(config: &ClassifierConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_base_ms),
            max_delay: Duration::from_millis(config.retry_max_ms),
            ..Self::default()
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `retry` (0-indexed):
    /// `min(base * 2^retry, max)` plus random jitter.
    pub fn delay(&self, retry: u32) -> Duration {
        let capped = self.capped(retry);
        let jitter_max = (capped.as_millis() as f64 * self.jitter_fraction) as u64;
        let jitter = if jitter_max > 0 {
            rand::thread_rng().gen_range(0..=jitter_max)
        } else {
            0
        };
        capped + Duration::from_millis(jitter)
    }

    fn capped(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_then_caps() {
        let config = RetryConfig {
            jitter_fraction: 0.0,
            ..RetryConfig::default()
        };
        assert_eq!(config.delay(0), Duration::from_millis(500));
        assert_eq!(config.delay(1), Duration::from_secs(1));
        assert_eq!(config.delay(2), Duration::from_secs(2));
        assert_eq!(config.delay(10), Duration::from_secs(10));
        assert_eq!(config.delay(40), Duration::from_secs(10));
    }

    #[test]
    fn jitter_stays_within_fraction() {
        let config = RetryConfig::default();
        for _ in 0..100 {
            let delay = config.delay(1);
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= Duration::from_millis(1250));
        }
    }

    #[test]
    fn built_from_classifier_config() {
        let mut classifier = ClassifierConfig::default();
        classifier.max_attempts = 0;
        classifier.retry_base_ms = 200;
        let config = RetryConfig::from(&classifier);
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.base_delay, Duration::from_millis(200));
    }
}
