//! Domain error types
//!
//! Validation failures raised while building write units and date filters,
//! before anything reaches the network.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A write unit has no attribution key
    #[error("Write unit has an empty key")]
    EmptyKey,

    /// A write unit has no document path
    #[error("Write unit '{0}' has an empty document path")]
    EmptyPath(String),

    /// A write unit payload exceeds the per-operation size cap
    #[error("Write unit '{key}' payload is {size} bytes, limit is {limit}")]
    PayloadTooLarge {
        /// Key of the offending unit
        key: String,
        /// Serialized payload size in bytes
        size: usize,
        /// Configured maximum
        limit: usize,
    },

    /// A payload could not be serialized to measure its size
    #[error("Write unit '{key}' payload is not serializable: {reason}")]
    UnserializablePayload {
        /// Key of the offending unit
        key: String,
        /// Serializer message
        reason: String,
    },

    /// Invalid date filter bound
    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),
}
