//! Remote store ports (driven/secondary ports)
//!
//! The engine only assumes a remote that accepts bounded-size batched
//! document writes and single-object uploads over an authenticated channel.
//! [`IDocumentStore`] and [`IObjectStore`] capture exactly that; the concrete
//! protocol lives in `stowage-remote`.
//!
//! ## Design Notes
//!
//! - Unlike the other ports these return a typed [`RemoteError`] instead of
//!   `anyhow::Error`: the retry executor must tell transient failures from
//!   fatal ones, and that needs the status code when there is one.
//! - Uses `#[async_trait]` for async trait methods.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Completeness, WriteUnit};

// ============================================================================
// RpcCode
// ============================================================================

/// Numeric status code reported by the document database (gRPC numbering).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RpcCode(pub i32);

impl RpcCode {
    pub const CANCELLED: RpcCode = RpcCode(1);
    pub const UNKNOWN: RpcCode = RpcCode(2);
    pub const INVALID_ARGUMENT: RpcCode = RpcCode(3);
    pub const DEADLINE_EXCEEDED: RpcCode = RpcCode(4);
    pub const NOT_FOUND: RpcCode = RpcCode(5);
    pub const ALREADY_EXISTS: RpcCode = RpcCode(6);
    pub const PERMISSION_DENIED: RpcCode = RpcCode(7);
    pub const RESOURCE_EXHAUSTED: RpcCode = RpcCode(8);
    pub const FAILED_PRECONDITION: RpcCode = RpcCode(9);
    pub const ABORTED: RpcCode = RpcCode(10);
    pub const INTERNAL: RpcCode = RpcCode(13);
    pub const UNAVAILABLE: RpcCode = RpcCode(14);
    pub const UNAUTHENTICATED: RpcCode = RpcCode(16);

    /// Canonical upper-snake name, or `CODE_<n>` for codes we do not name
    pub fn name(&self) -> String {
        let name = match *self {
            Self::CANCELLED => "CANCELLED",
            Self::UNKNOWN => "UNKNOWN",
            Self::INVALID_ARGUMENT => "INVALID_ARGUMENT",
            Self::DEADLINE_EXCEEDED => "DEADLINE_EXCEEDED",
            Self::NOT_FOUND => "NOT_FOUND",
            Self::ALREADY_EXISTS => "ALREADY_EXISTS",
            Self::PERMISSION_DENIED => "PERMISSION_DENIED",
            Self::RESOURCE_EXHAUSTED => "RESOURCE_EXHAUSTED",
            Self::FAILED_PRECONDITION => "FAILED_PRECONDITION",
            Self::ABORTED => "ABORTED",
            Self::INTERNAL => "INTERNAL",
            Self::UNAVAILABLE => "UNAVAILABLE",
            Self::UNAUTHENTICATED => "UNAUTHENTICATED",
            RpcCode(other) => return format!("CODE_{other}"),
        };
        name.to_string()
    }
}

impl fmt::Display for RpcCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.0)
    }
}

// ============================================================================
// RemoteError
// ============================================================================

/// Errors reported by a remote store adapter
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// The document database answered with a status code
    #[error("{code}: {message}")]
    Rpc {
        /// Numeric status
        code: RpcCode,
        /// Server message
        message: String,
    },

    /// The object store answered with a non-success HTTP status
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body or reason phrase
        message: String,
    },

    /// Connection-level failure (DNS, refused, reset)
    #[error("Network error: {0}")]
    Transport(String),

    /// An attempt did not settle within its per-attempt timeout
    #[error("Attempt timed out after {after_ms}ms")]
    Timeout {
        /// The timeout that expired
        after_ms: u64,
    },

    /// The request was rejected locally as malformed
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Failure without a status field; classified by its message
    #[error("{0}")]
    Other(String),
}

impl RemoteError {
    /// Returns true for authentication/authorization failures.
    ///
    /// Retrying these cannot help; an upload run aborts on the first one.
    pub fn is_auth(&self) -> bool {
        match self {
            Self::Rpc { code, .. } => {
                *code == RpcCode::UNAUTHENTICATED || *code == RpcCode::PERMISSION_DENIED
            }
            Self::Http { status, .. } => *status == 401 || *status == 403,
            _ => false,
        }
    }
}

// ============================================================================
// IDocumentStore
// ============================================================================

/// Document database port: batched writes plus the snapshot status document
#[async_trait]
pub trait IDocumentStore: Send + Sync {
    /// Short backend name used in logs and error reports
    fn backend_name(&self) -> &str;

    /// Commits all writes as a single request.
    ///
    /// The remote applies the batch atomically or not at all.
    async fn commit_batch(&self, writes: &[WriteUnit]) -> Result<(), RemoteError>;

    /// Flags a snapshot as incomplete and records which units failed
    async fn mark_partial(&self, snapshot_id: &str, failed_keys: &[String])
        -> Result<(), RemoteError>;

    /// Reads the completeness flag of a stored snapshot
    async fn fetch_completeness(&self, snapshot_id: &str) -> Result<Completeness, RemoteError>;
}

// ============================================================================
// IObjectStore
// ============================================================================

/// Object store port: single-object uploads
#[async_trait]
pub trait IObjectStore: Send + Sync {
    /// Short backend name used in logs and error reports
    fn backend_name(&self) -> &str;

    /// Uploads `content` to `remote_path`, replacing any existing object
    async fn upload_object(
        &self,
        remote_path: &str,
        content: &[u8],
        content_type: &str,
    ) -> Result<(), RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_code_display() {
        assert_eq!(RpcCode::UNAVAILABLE.to_string(), "UNAVAILABLE (14)");
        assert_eq!(RpcCode(42).to_string(), "CODE_42 (42)");
    }

    #[test]
    fn test_remote_error_display() {
        let err = RemoteError::Rpc {
            code: RpcCode::DEADLINE_EXCEEDED,
            message: "commit took too long".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "DEADLINE_EXCEEDED (4): commit took too long"
        );

        let err = RemoteError::Timeout { after_ms: 1500 };
        assert_eq!(err.to_string(), "Attempt timed out after 1500ms");
    }

    #[test]
    fn test_is_auth() {
        assert!(RemoteError::Rpc {
            code: RpcCode::UNAUTHENTICATED,
            message: String::new()
        }
        .is_auth());
        assert!(RemoteError::Rpc {
            code: RpcCode::PERMISSION_DENIED,
            message: String::new()
        }
        .is_auth());
        assert!(RemoteError::Http {
            status: 403,
            message: String::new()
        }
        .is_auth());
        assert!(!RemoteError::Http {
            status: 503,
            message: String::new()
        }
        .is_auth());
        assert!(!RemoteError::Other("permission denied".to_string()).is_auth());
    }
}
