//! Exponential backoff with jitter
//!
//! `delay(attempt) = min(initial * 2^attempt, max) * (1 + U(-jf, +jf))`
//!
//! The uniform sample comes from a [`JitterSource`] so tests can pin it;
//! production uses [`ThreadRngJitter`].

use std::time::Duration;

use rand::Rng;
use stowage_core::config::RetryConfig;

/// Source of uniform samples in `[-1.0, 1.0]`, scaled by the jitter factor
pub trait JitterSource: Send + Sync {
    fn sample(&self) -> f64;
}

/// Draws from the thread-local RNG
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngJitter;

impl JitterSource for ThreadRngJitter {
    fn sample(&self) -> f64 {
        rand::thread_rng().gen_range(-1.0..=1.0)
    }
}

/// Always returns the same sample; values outside `[-1, 1]` are clamped
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub f64);

impl JitterSource for FixedJitter {
    fn sample(&self) -> f64 {
        self.0.clamp(-1.0, 1.0)
    }
}

/// Exponent past which `initial * 2^attempt` is certainly above any cap we accept
const MAX_SHIFT: u32 = 32;

/// Delay before retry number `attempt` (0-based).
///
/// Total for every attempt: the doubling saturates instead of overflowing,
/// so very large attempts simply sit at the cap.
pub fn delay(attempt: u32, config: &RetryConfig, jitter: &dyn JitterSource) -> Duration {
    let base = config
        .initial_backoff_ms
        .saturating_mul(1u64 << attempt.min(MAX_SHIFT));
    let capped = base.min(config.max_backoff_ms);

    let factor = config.jitter_factor.clamp(0.0, 1.0);
    let jittered = capped as f64 * (1.0 + factor * jitter.sample());

    Duration::from_millis(jittered.max(0.0).round() as u64)
}
