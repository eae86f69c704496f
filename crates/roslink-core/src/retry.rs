//! Reconnect policy and backoff calculation.
//!
//! Portable, sync-only building blocks for the connection supervisor:
//!
//! - [`ReconnectConfig`]: retry parameters (attempt limit, backoff, jitter)
//! - [`backoff_delay_with_random`]: capped exponential backoff with jitter
//!
//! The async retry loop itself lives in the client crate; randomness is
//! injected by the caller so the math stays deterministic under test.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default attempt limit. `0` means retry forever.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 0;
/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default maximum delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 60_000;
/// Default per-attempt delay multiplier.
pub const DEFAULT_MULTIPLIER: f64 = 2.0;
/// Default jitter factor (0.0–1.0).
pub const DEFAULT_JITTER_FACTOR: f64 = 0.2;

/// Reconnect policy.
///
/// `multiplier` selects the retry shape: values above 1.0 give exponential
/// backoff, exactly 1.0 gives a fixed retry interval. `max_attempts` bounds
/// one disconnected streak; the counter resets on every successful connect.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectConfig {
    /// Maximum consecutive failed attempts before giving up. `0` retries
    /// forever (default).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay before the first retry in ms (default: 1000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Maximum delay between retries in ms (default: 60000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Per-attempt delay multiplier (default: 2.0; 1.0 = fixed interval).
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Jitter factor 0.0–1.0 (default: 0.2).
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}
fn default_multiplier() -> f64 {
    DEFAULT_MULTIPLIER
}
fn default_jitter_factor() -> f64 {
    DEFAULT_JITTER_FACTOR
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            multiplier: DEFAULT_MULTIPLIER,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

impl ReconnectConfig {
    /// Whether `attempt` consecutive failures exhaust the policy.
    pub fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts != 0 && attempt >= self.max_attempts
    }

    /// Delay before retry number `attempt` (zero-based), with jitter drawn
    /// from `random` in `[0.0, 1.0)`.
    #[must_use]
    pub fn delay_ms(&self, attempt: u32, random: f64) -> u64 {
        backoff_delay_with_random(
            attempt,
            self.base_delay_ms,
            self.max_delay_ms,
            self.multiplier,
            self.jitter_factor,
            random,
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backoff calculation
// ─────────────────────────────────────────────────────────────────────────────

/// Calculate a backoff delay with explicit randomness.
///
/// Formula: `min(max_delay, base_delay * multiplier^attempt)`, then jitter
/// `* (1 + (random * 2 - 1) * jitter_factor)`. A `random` in `[0.0, 1.0)`
/// maps to a symmetric ±`jitter_factor` spread.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap
)]
pub fn backoff_delay_with_random(
    attempt: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    multiplier: f64,
    jitter_factor: f64,
    random: f64,
) -> u64 {
    // Attempt is clamped so multiplier^attempt stays finite.
    let grown = (base_delay_ms as f64) * multiplier.powi(attempt.min(512) as i32);
    let capped = if grown.is_finite() {
        grown.min(max_delay_ms as f64)
    } else {
        max_delay_ms as f64
    };

    let jitter = 1.0 + (random * 2.0 - 1.0) * jitter_factor;
    let with_jitter = capped * jitter;

    with_jitter.round().max(0.0) as u64
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // -- ReconnectConfig --

    #[test]
    fn config_defaults() {
        let config = ReconnectConfig::default();
        assert_eq!(config.max_attempts, 0);
        assert_eq!(config.base_delay_ms, 1000);
        assert_eq!(config.max_delay_ms, 60_000);
        assert!((config.multiplier - 2.0).abs() < f64::EPSILON);
        assert!((config.jitter_factor - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn config_serde_roundtrip() {
        let config = ReconnectConfig {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            multiplier: 1.5,
            jitter_factor: 0.1,
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("maxAttempts"));
        let back: ReconnectConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.max_attempts, 3);
        assert_eq!(back.base_delay_ms, 500);
    }

    #[test]
    fn config_serde_defaults() {
        let config: ReconnectConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.max_attempts, 0);
        assert_eq!(config.base_delay_ms, 1000);
    }

    #[test]
    fn unbounded_never_exhausts() {
        let config = ReconnectConfig::default();
        assert!(!config.exhausted(0));
        assert!(!config.exhausted(10_000));
    }

    #[test]
    fn bounded_exhausts_at_limit() {
        let config = ReconnectConfig {
            max_attempts: 3,
            ..ReconnectConfig::default()
        };
        assert!(!config.exhausted(0));
        assert!(!config.exhausted(2));
        assert!(config.exhausted(3));
        assert!(config.exhausted(4));
    }

    // -- backoff_delay_with_random --

    #[test]
    fn backoff_exponential_growth() {
        // random = 0.5 → jitter = 1.0, so delays are the bare curve
        let d0 = backoff_delay_with_random(0, 1000, 60_000, 2.0, 0.2, 0.5);
        let d1 = backoff_delay_with_random(1, 1000, 60_000, 2.0, 0.2, 0.5);
        let d2 = backoff_delay_with_random(2, 1000, 60_000, 2.0, 0.2, 0.5);
        assert_eq!(d0, 1000);
        assert_eq!(d1, 2000);
        assert_eq!(d2, 4000);
    }

    #[test]
    fn backoff_caps_at_max() {
        let delay = backoff_delay_with_random(10, 1000, 60_000, 2.0, 0.0, 0.5);
        assert_eq!(delay, 60_000);
    }

    #[test]
    fn backoff_fixed_interval_with_unit_multiplier() {
        for attempt in [0, 1, 5, 50] {
            let delay = backoff_delay_with_random(attempt, 750, 60_000, 1.0, 0.0, 0.5);
            assert_eq!(delay, 750);
        }
    }

    #[test]
    fn backoff_jitter_bounds() {
        // random = 0.0 → -20%, random = 1.0 → +20%
        assert_eq!(backoff_delay_with_random(0, 1000, 60_000, 2.0, 0.2, 0.0), 800);
        assert_eq!(backoff_delay_with_random(0, 1000, 60_000, 2.0, 0.2, 1.0), 1200);
    }

    #[test]
    fn backoff_high_attempt_no_overflow() {
        let delay = backoff_delay_with_random(10_000, 1000, 60_000, 2.0, 0.2, 1.0);
        assert!(delay > 0);
        assert!(delay <= 72_000); // 60_000 * 1.2
    }

    #[test]
    fn config_delay_uses_all_fields() {
        let config = ReconnectConfig {
            max_attempts: 0,
            base_delay_ms: 100,
            max_delay_ms: 250,
            multiplier: 2.0,
            jitter_factor: 0.0,
        };
        assert_eq!(config.delay_ms(0, 0.5), 100);
        assert_eq!(config.delay_ms(1, 0.5), 200);
        assert_eq!(config.delay_ms(2, 0.5), 250);
    }
}
