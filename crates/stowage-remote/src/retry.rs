//! Retry executor for remote calls
//!
//! Runs an async operation until it succeeds, fails fatally, or runs out of
//! retries. Each attempt is raced against a per-attempt timeout; between
//! retryable failures the executor sleeps for the backoff delay.
//!
//! ## Design Notes
//!
//! - An attempt that times out is dropped, so a late reply can never touch
//!   any state after the executor has moved on.
//! - Errors are classified by [`classify_remote_error`]: status codes first,
//!   message substrings only when the error carries no status.
//! - The outcome always reports how many attempts were made, including on
//!   failure, so batch results can record retries.

use std::future::Future;
use std::sync::Arc;

use stowage_core::config::RetryConfig;
use stowage_core::ports::{RemoteError, RpcCode};
use thiserror::Error;
use tracing::{debug, warn};

use crate::backoff::{self, JitterSource, ThreadRngJitter};

// ============================================================================
// Classification
// ============================================================================

/// Whether a failed attempt should be retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retry,
    Stop,
}

/// RPC status codes that describe a transient condition
const RETRYABLE_RPC_CODES: &[RpcCode] = &[
    RpcCode::DEADLINE_EXCEEDED,
    RpcCode::RESOURCE_EXHAUSTED,
    RpcCode::ABORTED,
    RpcCode::INTERNAL,
    RpcCode::UNAVAILABLE,
];

/// Message fragments that mark a status-less error as transient
const RETRYABLE_MESSAGE_HINTS: &[&str] = &[
    "network",
    "timeout",
    "unavailable",
    "deadline",
    "internal",
    "aborted",
];

/// Classifies a remote error as retryable or fatal.
pub fn classify_remote_error(error: &RemoteError) -> RetryDisposition {
    let retry = match error {
        RemoteError::Rpc { code, .. } => RETRYABLE_RPC_CODES.contains(code),
        RemoteError::Http { status, .. } => {
            matches!(*status, 408 | 429) || (500..=599).contains(status)
        }
        RemoteError::Transport(_) | RemoteError::Timeout { .. } => true,
        RemoteError::InvalidInput(_) => false,
        RemoteError::Other(message) => {
            let message = message.to_lowercase();
            RETRYABLE_MESSAGE_HINTS
                .iter()
                .any(|hint| message.contains(hint))
        }
    };

    if retry {
        RetryDisposition::Retry
    } else {
        RetryDisposition::Stop
    }
}

// ============================================================================
// RetryError / RetryOutcome
// ============================================================================

/// Terminal failure of a retried operation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RetryError {
    /// A non-retryable error; returned as soon as it is seen
    #[error("{operation} failed on {backend} after {attempts} attempt(s): {error}")]
    Fatal {
        operation: String,
        backend: String,
        attempts: u32,
        #[source]
        error: RemoteError,
    },

    /// Every attempt failed with a retryable error
    #[error("{operation} on {backend} exhausted {retries} retries: {error}")]
    Exhausted {
        operation: String,
        backend: String,
        retries: u32,
        #[source]
        error: RemoteError,
    },
}

impl RetryError {
    /// The last error observed from the remote
    pub fn remote_error(&self) -> &RemoteError {
        match self {
            Self::Fatal { error, .. } | Self::Exhausted { error, .. } => error,
        }
    }

    /// Name of the operation that failed
    pub fn operation(&self) -> &str {
        match self {
            Self::Fatal { operation, .. } | Self::Exhausted { operation, .. } => operation,
        }
    }

    /// Backend the operation ran against
    pub fn backend(&self) -> &str {
        match self {
            Self::Fatal { backend, .. } | Self::Exhausted { backend, .. } => backend,
        }
    }

    /// True when at least one retry happened before giving up
    pub fn retried(&self) -> bool {
        match self {
            Self::Fatal { attempts, .. } => *attempts > 1,
            Self::Exhausted { retries, .. } => *retries > 0,
        }
    }
}

/// Result of [`RetryExecutor::execute`] together with the attempt count
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T, RetryError>,
    /// Attempts made, including the first one
    pub attempts: u32,
}

impl<T> RetryOutcome<T> {
    /// Retries beyond the first attempt
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }

    pub fn into_result(self) -> Result<T, RetryError> {
        self.result
    }
}

// ============================================================================
// RetryExecutor
// ============================================================================

/// Runs remote operations under a [`RetryConfig`]
#[derive(Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
    backend: String,
    jitter: Arc<dyn JitterSource>,
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("config", &self.config)
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl RetryExecutor {
    /// Creates an executor using thread-local randomness for jitter
    pub fn new(config: RetryConfig, backend: impl Into<String>) -> Self {
        Self::with_jitter(config, backend, Arc::new(ThreadRngJitter))
    }

    /// Creates an executor with an explicit jitter source
    pub fn with_jitter(
        config: RetryConfig,
        backend: impl Into<String>,
        jitter: Arc<dyn JitterSource>,
    ) -> Self {
        Self {
            config,
            backend: backend.into(),
            jitter,
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// Executes `op` until success, a fatal error, or retries run out.
    ///
    /// `op` is called once per attempt and must build a fresh future each
    /// time.
    pub async fn execute<F, Fut, T>(&self, operation: &str, mut op: F) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let attempt_timeout = self.config.attempt_timeout();
        let mut attempt: u32 = 0;

        loop {
            let attempts = attempt + 1;

            let error = match tokio::time::timeout(attempt_timeout, op()).await {
                Ok(Ok(value)) => {
                    if attempt > 0 {
                        debug!(operation, attempts, "Operation succeeded after retry");
                    }
                    return RetryOutcome {
                        result: Ok(value),
                        attempts,
                    };
                }
                Ok(Err(error)) => error,
                Err(_) => RemoteError::Timeout {
                    after_ms: attempt_timeout.as_millis() as u64,
                },
            };

            if classify_remote_error(&error) == RetryDisposition::Stop {
                debug!(operation, attempts, error = %error, "Fatal error, not retrying");
                return RetryOutcome {
                    result: Err(RetryError::Fatal {
                        operation: operation.to_string(),
                        backend: self.backend.clone(),
                        attempts,
                        error,
                    }),
                    attempts,
                };
            }

            if attempt >= self.config.max_retries {
                warn!(
                    operation,
                    attempts,
                    error = %error,
                    "Retries exhausted"
                );
                return RetryOutcome {
                    result: Err(RetryError::Exhausted {
                        operation: operation.to_string(),
                        backend: self.backend.clone(),
                        retries: self.config.max_retries,
                        error,
                    }),
                    attempts,
                };
            }

            let delay = backoff::delay(attempt, &self.config, self.jitter.as_ref());
            warn!(
                operation,
                attempt = attempts,
                max_retries = self.config.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Transient error, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
