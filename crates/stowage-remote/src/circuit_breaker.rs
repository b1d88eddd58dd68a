//! Circuit breaker for remote dependencies
//!
//! Isolates a failing dependency: after `failure_threshold` consecutive
//! failures the breaker opens and rejects calls without running them until
//! the cooldown elapses. The first call after the cooldown runs as a single
//! trial call; its outcome closes the breaker or re-opens it.
//!
//! ## Architecture
//!
//! - [`CircuitBreaker`]: one named breaker, state behind a `std::sync::Mutex`
//! - [`CircuitBreakerRegistry`]: name -> breaker map built once at startup and
//!   shared by the coordinators
//!
//! ## Design Notes
//!
//! - The lock is never held across an `.await`: admission and outcome
//!   recording are two short critical sections around the operation.
//! - Timing uses `tokio::time::Instant` so tests can run on paused time;
//!   the wall-clock `next_retry_time` is only for reporting.
//! - A trial call that is cancelled before it settles releases the half-open slot
//!   so the breaker cannot get stuck.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use stowage_core::config::CircuitBreakerConfig;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

// ============================================================================
// State and stats
// ============================================================================

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through; failures are counted
    Closed,
    /// Calls are rejected until the cooldown elapses
    Open,
    /// A single trial call is deciding whether to close again
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of a breaker.
///
/// `failure_count` and `success_count` are consecutive counts; the `total_*`
/// fields are lifetime counters. `total_requests` includes rejected calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub total_requests: u64,
    pub total_failures: u64,
    pub total_successes: u64,
    pub total_rejections: u64,
    pub next_retry_time: Option<DateTime<Utc>>,
}

/// Error returned by [`CircuitBreaker::execute`]
#[derive(Debug, Error)]
pub enum CircuitError<E> {
    /// The breaker rejected the call without running it
    #[error("circuit '{name}' is open, retry after {retry_at}")]
    Open {
        name: String,
        retry_at: DateTime<Utc>,
    },

    /// The operation ran and failed
    #[error(transparent)]
    Inner(E),
}

impl<E> CircuitError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// The operation's own error, if it ran
    pub fn inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            Self::Open { .. } => None,
        }
    }
}

// ============================================================================
// CircuitBreaker
// ============================================================================

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    total_requests: u64,
    total_failures: u64,
    total_successes: u64,
    total_rejections: u64,
    /// Monotonic deadline of the current cooldown
    reopen_at: Option<Instant>,
    next_retry_time: Option<DateTime<Utc>>,
    trial_in_flight: bool,
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            total_requests: 0,
            total_failures: 0,
            total_successes: 0,
            total_rejections: 0,
            reopen_at: None,
            next_retry_time: None,
            trial_in_flight: false,
        }
    }
}

/// A named circuit breaker
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

/// What admission decided for one call
enum Admission {
    Pass,
    Trial,
    Reject(DateTime<Utc>),
}

/// Releases the half-open slot if the trial future is dropped before it settles
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut inner = self.breaker.lock();
            inner.trial_in_flight = false;
            debug!(breaker = %self.breaker.name, "Trial call cancelled, half-open slot released");
        }
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        // No critical section can leave the state half-updated.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Runs `op` if the breaker admits it and records the outcome.
    pub async fn execute<F, Fut, T, E>(&self, op: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let admission = self.admit();
        let mut guard = TrialGuard {
            breaker: self,
            armed: false,
        };
        match admission {
            Admission::Reject(retry_at) => {
                return Err(CircuitError::Open {
                    name: self.name.clone(),
                    retry_at,
                })
            }
            Admission::Trial => guard.armed = true,
            Admission::Pass => {}
        }
        let is_trial = guard.armed;

        let result = op().await;
        guard.armed = false;

        match result {
            Ok(value) => {
                self.record_success(is_trial);
                Ok(value)
            }
            Err(error) => {
                self.record_failure(is_trial);
                Err(CircuitError::Inner(error))
            }
        }
    }

    fn admit(&self) -> Admission {
        let mut inner = self.lock();
        inner.total_requests += 1;

        match inner.state {
            CircuitState::Closed => Admission::Pass,
            CircuitState::Open => {
                let cooled = inner.reopen_at.map_or(true, |at| Instant::now() >= at);
                if cooled {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    info!(breaker = %self.name, "Cooldown elapsed, circuit half-open");
                    Admission::Trial
                } else {
                    inner.total_rejections += 1;
                    Admission::Reject(inner.next_retry_time.unwrap_or_else(Utc::now))
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    inner.total_rejections += 1;
                    Admission::Reject(inner.next_retry_time.unwrap_or_else(Utc::now))
                } else {
                    inner.trial_in_flight = true;
                    Admission::Trial
                }
            }
        }
    }

    /// Records a success. Only the trial call itself can close a half-open
    /// breaker; calls admitted earlier just update the counters.
    fn record_success(&self, is_trial: bool) {
        let mut inner = self.lock();
        inner.total_successes += 1;
        inner.success_count += 1;
        if inner.state == CircuitState::Closed {
            inner.failure_count = 0;
        }

        if inner.state == CircuitState::HalfOpen && is_trial {
            inner.state = CircuitState::Closed;
            inner.failure_count = 0;
            inner.trial_in_flight = false;
            inner.success_count = 0;
            inner.reopen_at = None;
            inner.next_retry_time = None;
            info!(breaker = %self.name, "Trial call succeeded, circuit closed");
        }
    }

    fn record_failure(&self, is_trial: bool) {
        let mut inner = self.lock();
        inner.total_failures += 1;
        inner.failure_count += 1;
        inner.success_count = 0;

        // Calls admitted before another one tripped the breaker never move it
        let trip = match inner.state {
            CircuitState::HalfOpen => is_trial,
            CircuitState::Closed => inner.failure_count >= self.config.failure_threshold,
            CircuitState::Open => false,
        };

        if trip {
            let cooldown = self.config.cooldown();
            inner.state = CircuitState::Open;
            inner.trial_in_flight = false;
            inner.reopen_at = Some(Instant::now() + cooldown);
            let retry_at = Utc::now()
                + chrono::Duration::from_std(cooldown).unwrap_or(chrono::Duration::zero());
            inner.next_retry_time = Some(retry_at);
            warn!(
                breaker = %self.name,
                failures = inner.failure_count,
                retry_at = %retry_at,
                "Circuit opened"
            );
        }
    }

    /// Snapshot of the current state and counters
    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.lock();
        CircuitBreakerStats {
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            total_requests: inner.total_requests,
            total_failures: inner.total_failures,
            total_successes: inner.total_successes,
            total_rejections: inner.total_rejections,
            next_retry_time: inner.next_retry_time,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Forces the breaker closed and clears the consecutive counters.
    ///
    /// Lifetime totals are kept.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.reopen_at = None;
        inner.next_retry_time = None;
        inner.trial_in_flight = false;
        info!(breaker = %self.name, "Circuit reset");
    }
}

// ============================================================================
// CircuitBreakerRegistry
// ============================================================================

/// Named breakers sharing one configuration
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    /// Returns the breaker called `name`, creating it on first use
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return Arc::clone(existing.value());
        }
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, self.config.clone())))
            .value()
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|b| Arc::clone(b.value()))
    }

    /// Stats of every registered breaker, ordered by name
    pub fn stats(&self) -> BTreeMap<String, CircuitBreakerStats> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().stats()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
