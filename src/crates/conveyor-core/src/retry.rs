//! Retry policy: exponential backoff with jitter for transient failures
//!
//! Retry is exclusively the step wrapper's responsibility - the graph never
//! retries at its own layer, which keeps retry semantics local and bounded.
//! A failure is retried in place, without re-invoking upstream agents, and
//! only when it is classified transient (rate limits, timeouts, 5xx,
//! connection errors). Auth failures and bad requests are permanent and
//! abort immediately.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Classification of errors for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// May succeed on retry (rate limits, timeouts, 5xx)
    Transient,
    /// Won't succeed on retry (4xx, invalid auth)
    Permanent,
    /// Unclassifiable; treated as permanent unless the agent marked the
    /// result retryable
    Unknown,
}

/// Retry strategy configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first (default 3)
    pub max_attempts: u32,

    /// Initial backoff delay in milliseconds
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    pub max_backoff_ms: u64,

    /// Multiplier for exponential backoff (typically 2.0)
    pub backoff_multiplier: f64,

    /// Whether to add random jitter to backoff delays
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a retry configuration with a custom attempt ceiling
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Set the initial backoff delay
    pub fn with_initial_backoff(mut self, ms: u64) -> Self {
        self.initial_backoff_ms = ms;
        self
    }

    /// Set the maximum backoff delay
    pub fn with_max_backoff(mut self, ms: u64) -> Self {
        self.max_backoff_ms = ms;
        self
    }

    /// Set the backoff multiplier
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enable or disable jitter
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Calculate the backoff delay before the given retry (0-indexed)
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay_ms = (self.initial_backoff_ms as f64
            * self.backoff_multiplier.powi(attempt as i32)) as u64;

        let delay_ms = delay_ms.min(self.max_backoff_ms);

        let delay_ms = if self.jitter {
            // Add up to 25% random jitter to spread concurrent retries
            let jitter_amount = (delay_ms as f64 * 0.25 * rand::random::<f64>()) as u64;
            delay_ms + jitter_amount
        } else {
            delay_ms
        };

        Duration::from_millis(delay_ms)
    }

    /// Whether another attempt is allowed after `attempts` tries
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

/// Classify an error message for retry decisions
pub fn classify_error(message: &str) -> ErrorClass {
    let msg = message.to_lowercase();

    if msg.contains("rate limit") || msg.contains("too many requests") || msg.contains("429") {
        return ErrorClass::Transient;
    }
    if msg.contains("timeout") || msg.contains("timed out") || msg.contains("deadline exceeded") {
        return ErrorClass::Transient;
    }
    if msg.contains("503")
        || msg.contains("service unavailable")
        || msg.contains("502")
        || msg.contains("bad gateway")
        || msg.contains("500")
        || msg.contains("internal server error")
    {
        return ErrorClass::Transient;
    }
    if msg.contains("connection") || msg.contains("network") || msg.contains("dns") {
        return ErrorClass::Transient;
    }

    if msg.contains("401")
        || msg.contains("unauthorized")
        || msg.contains("invalid api key")
        || msg.contains("authentication failed")
    {
        return ErrorClass::Permanent;
    }
    if msg.contains("403") || msg.contains("forbidden") || msg.contains("access denied") {
        return ErrorClass::Permanent;
    }
    if msg.contains("404") || msg.contains("not found") {
        return ErrorClass::Permanent;
    }
    if msg.contains("400") || msg.contains("bad request") || msg.contains("invalid request") {
        return ErrorClass::Permanent;
    }

    ErrorClass::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.initial_backoff_ms, 500);
        assert_eq!(config.max_backoff_ms, 30_000);
        assert_eq!(config.backoff_multiplier, 2.0);
        assert!(config.jitter);
    }

    #[test]
    fn builder_overrides() {
        let config = RetryConfig::new(5)
            .with_initial_backoff(250)
            .with_max_backoff(10_000)
            .with_multiplier(1.5)
            .with_jitter(false);

        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.initial_backoff_ms, 250);
        assert_eq!(config.max_backoff_ms, 10_000);
        assert_eq!(config.backoff_multiplier, 1.5);
        assert!(!config.jitter);
    }

    #[test]
    fn backoff_is_exponential() {
        let config = RetryConfig::new(4)
            .with_initial_backoff(1000)
            .with_jitter(false);

        assert_eq!(config.backoff_delay(0).as_millis(), 1000);
        assert_eq!(config.backoff_delay(1).as_millis(), 2000);
        assert_eq!(config.backoff_delay(2).as_millis(), 4000);
    }

    #[test]
    fn backoff_is_capped() {
        let config = RetryConfig::new(10)
            .with_initial_backoff(1000)
            .with_max_backoff(5000)
            .with_jitter(false);

        // Would be 32000 without the cap
        assert_eq!(config.backoff_delay(5).as_millis(), 5000);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let config = RetryConfig::new(3)
            .with_initial_backoff(1000)
            .with_jitter(true);

        for _ in 0..20 {
            let delay = config.backoff_delay(1).as_millis() as u64;
            assert!((2000..=2500).contains(&delay), "delay {delay} out of range");
        }
    }

    #[test]
    fn should_retry_respects_ceiling() {
        let config = RetryConfig::new(3);
        assert!(config.should_retry(0));
        assert!(config.should_retry(2));
        assert!(!config.should_retry(3));
        assert!(!config.should_retry(4));
    }

    #[test]
    fn classification_transient() {
        assert_eq!(classify_error("Rate limit exceeded (429)"), ErrorClass::Transient);
        assert_eq!(classify_error("request timed out"), ErrorClass::Transient);
        assert_eq!(classify_error("503 Service Unavailable"), ErrorClass::Transient);
        assert_eq!(classify_error("connection refused"), ErrorClass::Transient);
    }

    #[test]
    fn classification_permanent() {
        assert_eq!(classify_error("401 Unauthorized"), ErrorClass::Permanent);
        assert_eq!(classify_error("invalid api key"), ErrorClass::Permanent);
        assert_eq!(classify_error("400 Bad Request"), ErrorClass::Permanent);
        assert_eq!(classify_error("404 Not Found"), ErrorClass::Permanent);
    }

    #[test]
    fn classification_unknown() {
        assert_eq!(classify_error("something odd happened"), ErrorClass::Unknown);
    }
}
