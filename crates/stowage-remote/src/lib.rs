//! Stowage Remote - resilient access to the remote store
//!
//! Provides:
//! - Exponential backoff with injectable jitter
//! - A retry executor with per-attempt timeouts and error classification
//! - Named circuit breakers and their registry
//! - The HTTP client implementing the document and object store ports
//!
//! ## Modules
//!
//! - [`backoff`] - Delay calculation
//! - [`retry`] - Retry executor and [`retry::classify_remote_error`]
//! - [`circuit_breaker`] - Circuit breaker state machine and registry
//! - [`client`] - HTTP remote client

pub mod backoff;
pub mod circuit_breaker;
pub mod client;
pub mod retry;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerRegistry, CircuitBreakerStats, CircuitError, CircuitState,
};
pub use client::RemoteClient;
pub use retry::{RetryError, RetryExecutor, RetryOutcome};
