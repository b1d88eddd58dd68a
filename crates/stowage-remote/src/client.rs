//! HTTP remote client
//!
//! Typed client for the document and object endpoints of the remote API.
//! Implements [`IDocumentStore`] and [`IObjectStore`] so the coordinators
//! never see HTTP.
//!
//! ## Endpoints
//!
//! | Operation | Request |
//! |---|---|
//! | commit a batch | `POST /documents:commit` |
//! | flag a snapshot partial | `PATCH /documents/{collection}/{id}` |
//! | read completeness | `GET /documents/{collection}/{id}` |
//! | upload an object | `PUT /objects/{prefix}/{path}` |
//!
//! ## Usage
//!
//! ```rust,no_run
//! use stowage_remote::client::RemoteClient;
//!
//! let client = RemoteClient::new("https://store.example.com/v1", "access-token")
//!     .with_collection("snapshots");
//! ```

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::{Deserialize, Serialize};
use stowage_core::config::RemoteConfig;
use stowage_core::domain::{Completeness, WriteUnit};
use stowage_core::ports::{IDocumentStore, IObjectStore, RemoteError, RpcCode};
use tracing::debug;

/// Collection used when none is configured
const DEFAULT_COLLECTION: &str = "snapshots";

/// Status codes of the RPC numbering; anything else in an envelope is HTTP
const RPC_CODE_RANGE: std::ops::RangeInclusive<i32> = 0..=16;

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct CommitRequest<'a> {
    collection: &'a str,
    writes: Vec<CommitWrite<'a>>,
}

#[derive(Debug, Serialize)]
struct CommitWrite<'a> {
    path: &'a str,
    fields: &'a serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MarkPartialRequest<'a> {
    complete: bool,
    failed_keys: &'a [String],
}

/// Snapshot document as returned by `GET /documents/...`
#[derive(Debug, Deserialize)]
struct SnapshotDocument {
    /// Absent on snapshots written before the flag existed
    #[serde(default)]
    complete: Option<bool>,
}

/// Error envelope `{"error": {"code": 14, "message": "..."}}`
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: i32,
    #[serde(default)]
    message: String,
}

// ============================================================================
// RemoteClient
// ============================================================================

/// HTTP client for the remote document and object store
#[derive(Debug, Clone)]
pub struct RemoteClient {
    client: Client,
    base_url: String,
    access_token: String,
    collection: String,
    object_prefix: String,
}

impl RemoteClient {
    /// Creates a client for `base_url` authenticating with `access_token`
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            collection: DEFAULT_COLLECTION.to_string(),
            object_prefix: String::new(),
        }
    }

    /// Builds a client from configuration, reading the token from the
    /// environment variable named by `access_token_env`.
    pub fn from_config(config: &RemoteConfig) -> anyhow::Result<Self> {
        let token = std::env::var(&config.access_token_env).with_context(|| {
            format!(
                "Access token not found: set the {} environment variable",
                config.access_token_env
            )
        })?;
        Ok(Self::new(&config.base_url, token)
            .with_collection(&config.document_collection)
            .with_object_prefix(&config.object_prefix))
    }

    /// Sets the collection receiving snapshot documents
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Sets the prefix prepended to uploaded object paths
    pub fn with_object_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.object_prefix = prefix.into().trim_matches('/').to_string();
        self
    }

    /// Creates an authenticated request for the given path segments.
    ///
    /// Each segment is percent-encoded on its own, so `/`, `?`, `#` and `%`
    /// inside a segment can never change the route.
    pub fn request<'a, I>(
        &self,
        method: Method,
        segments: I,
    ) -> Result<RequestBuilder, RemoteError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let url = self.url(segments)?;
        Ok(self
            .client
            .request(method, url)
            .bearer_auth(&self.access_token))
    }

    fn url<'a, I>(&self, segments: I) -> Result<Url, RemoteError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let invalid = || RemoteError::InvalidInput(format!("invalid base URL: {}", self.base_url));
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn document_segments<'a>(&'a self, snapshot_id: &'a str) -> [&'a str; 3] {
        ["documents", self.collection.as_str(), snapshot_id]
    }

    fn object_segments<'a>(&'a self, remote_path: &'a str) -> Vec<&'a str> {
        let prefix = self.object_prefix.split('/').filter(|s| !s.is_empty());
        let path = remote_path.trim_start_matches('/').split('/');
        std::iter::once("objects").chain(prefix).chain(path).collect()
    }

    async fn send(
        &self,
        request: Result<RequestBuilder, RemoteError>,
    ) -> Result<Response, RemoteError> {
        let response = request?.send().await.map_err(map_send_error)?;
        check_status(response).await
    }
}

fn map_send_error(error: reqwest::Error) -> RemoteError {
    if error.is_timeout() {
        RemoteError::Transport(format!("request timeout: {error}"))
    } else {
        RemoteError::Transport(error.to_string())
    }
}

/// Maps a non-success response to a [`RemoteError`].
///
/// A JSON error envelope whose code is an RPC status (0 to 16) wins over the
/// HTTP status. Any other envelope code is ignored and the HTTP status kept,
/// with the envelope message.
async fn check_status(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&body) {
        let ErrorBody { code, message } = envelope.error;
        if RPC_CODE_RANGE.contains(&code) {
            return Err(RemoteError::Rpc {
                code: RpcCode(code),
                message,
            });
        }
        return Err(RemoteError::Http {
            status: status.as_u16(),
            message,
        });
    }

    let message = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("unknown").to_string()
    } else {
        body
    };
    Err(RemoteError::Http {
        status: status.as_u16(),
        message,
    })
}

// ============================================================================
// Port implementations
// ============================================================================

#[async_trait]
impl IDocumentStore for RemoteClient {
    fn backend_name(&self) -> &str {
        "document-db"
    }

    async fn commit_batch(&self, writes: &[WriteUnit]) -> Result<(), RemoteError> {
        let body = CommitRequest {
            collection: &self.collection,
            writes: writes
                .iter()
                .map(|w| CommitWrite {
                    path: &w.path,
                    fields: &w.payload,
                })
                .collect(),
        };
        debug!(writes = writes.len(), collection = %self.collection, "Committing batch");

        self.send(
            self.request(Method::POST, ["documents:commit"])
                .map(|r| r.json(&body)),
        )
            .await?;
        Ok(())
    }

    async fn mark_partial(
        &self,
        snapshot_id: &str,
        failed_keys: &[String],
    ) -> Result<(), RemoteError> {
        let body = MarkPartialRequest {
            complete: false,
            failed_keys,
        };
        debug!(snapshot_id, failed = failed_keys.len(), "Marking snapshot partial");

        self.send(
            self.request(Method::PATCH, self.document_segments(snapshot_id))
                .map(|r| r.json(&body)),
        )
        .await?;
        Ok(())
    }

    async fn fetch_completeness(&self, snapshot_id: &str) -> Result<Completeness, RemoteError> {
        debug!(snapshot_id, "Fetching snapshot completeness");
        let response = self
            .send(self.request(Method::GET, self.document_segments(snapshot_id)))
            .await?;
        let document: SnapshotDocument = response
            .json()
            .await
            .map_err(|e| RemoteError::Other(format!("invalid snapshot document: {e}")))?;
        Ok(Completeness::from_flag(document.complete))
    }
}

#[async_trait]
impl IObjectStore for RemoteClient {
    fn backend_name(&self) -> &str {
        "object-store"
    }

    async fn upload_object(
        &self,
        remote_path: &str,
        content: &[u8],
        content_type: &str,
    ) -> Result<(), RemoteError> {
        debug!(remote_path, bytes = content.len(), content_type, "Uploading object");
        self.send(
            self.request(Method::PUT, self.object_segments(remote_path))
                .map(|r| {
                    r.header(reqwest::header::CONTENT_TYPE, content_type)
                        .body(content.to_vec())
                }),
        )
        .await?;
        Ok(())
    }
}
