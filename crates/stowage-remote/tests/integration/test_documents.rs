//! Integration tests for document operations
//!
//! Covers batch commits, the partial flag side write and completeness reads.

use stowage_core::domain::{Completeness, WriteUnit};
use stowage_core::ports::{IDocumentStore, RemoteError, RpcCode};
use stowage_remote::retry::{classify_remote_error, RetryDisposition};
use wiremock::{
    matchers::{body_json, header, method, path},
    Mock, ResponseTemplate,
};

use crate::common;

fn units() -> Vec<WriteUnit> {
    vec![
        WriteUnit::new("d1", "2024-05-01/districts/d1", serde_json::json!({"score": 1})),
        WriteUnit::new("d2", "2024-05-01/districts/d2", serde_json::json!({"score": 2})),
    ]
}

// ============================================================================
// Commit
// ============================================================================

#[tokio::test]
async fn test_commit_batch_sends_writes_with_auth() {
    let (server, client) = common::setup_remote_mock().await;

    Mock::given(method("POST"))
        .and(path("/documents:commit"))
        .and(header("authorization", "Bearer test-access-token"))
        .and(body_json(serde_json::json!({
            "collection": "snapshots",
            "writes": [
                {"path": "2024-05-01/districts/d1", "fields": {"score": 1}},
                {"path": "2024-05-01/districts/d2", "fields": {"score": 2}}
            ]
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client
        .commit_batch(&units())
        .await
        .expect("commit should succeed");
}

#[tokio::test]
async fn test_commit_error_envelope_maps_to_rpc() {
    let (server, client) = common::setup_remote_mock().await;

    Mock::given(method("POST"))
        .and(path("/documents:commit"))
        .respond_with(
            ResponseTemplate::new(503).set_body_json(common::rpc_error(14, "backend unavailable")),
        )
        .mount(&server)
        .await;

    let err = client.commit_batch(&units()).await.unwrap_err();
    assert_eq!(
        err,
        RemoteError::Rpc {
            code: RpcCode::UNAVAILABLE,
            message: "backend unavailable".to_string()
        }
    );
}

#[tokio::test]
async fn test_commit_envelope_with_http_code_keeps_http_status() {
    let (server, client) = common::setup_remote_mock().await;

    Mock::given(method("POST"))
        .and(path("/documents:commit"))
        .respond_with(
            ResponseTemplate::new(503).set_body_json(common::rpc_error(503, "overloaded")),
        )
        .mount(&server)
        .await;

    let err = client.commit_batch(&units()).await.unwrap_err();
    assert_eq!(
        err,
        RemoteError::Http {
            status: 503,
            message: "overloaded".to_string()
        }
    );
    assert_eq!(classify_remote_error(&err), RetryDisposition::Retry);
}

#[tokio::test]
async fn test_commit_plain_error_maps_to_http() {
    let (server, client) = common::setup_remote_mock().await;

    Mock::given(method("POST"))
        .and(path("/documents:commit"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad batch"))
        .mount(&server)
        .await;

    let err = client.commit_batch(&units()).await.unwrap_err();
    assert_eq!(
        err,
        RemoteError::Http {
            status: 400,
            message: "bad batch".to_string()
        }
    );
}

#[tokio::test]
async fn test_commit_to_unreachable_server_is_transport_error() {
    let client = common::closed_port_client();

    let err = client.commit_batch(&units()).await.unwrap_err();
    assert!(matches!(err, RemoteError::Transport(_)), "got {err:?}");
}

// ============================================================================
// Partial flag
// ============================================================================

#[tokio::test]
async fn test_mark_partial_patches_snapshot_document() {
    let (server, client) = common::setup_remote_mock().await;

    Mock::given(method("PATCH"))
        .and(path("/documents/snapshots/2024-05-01"))
        .and(body_json(serde_json::json!({
            "complete": false,
            "failedKeys": ["d7", "d9"]
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client
        .mark_partial("2024-05-01", &["d7".to_string(), "d9".to_string()])
        .await
        .expect("mark_partial should succeed");
}

#[tokio::test]
async fn test_snapshot_id_is_a_single_escaped_segment() {
    let (server, client) = common::setup_remote_mock().await;

    Mock::given(method("PATCH"))
        .and(path("/documents/snapshots/run%201%3Fv%3D2"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client
        .mark_partial("run 1?v=2", &["d1".to_string()])
        .await
        .expect("escaped snapshot id should be routed");
}

// ============================================================================
// Completeness
// ============================================================================

#[tokio::test]
async fn test_fetch_completeness_three_states() {
    let (server, client) = common::setup_remote_mock().await;

    common::mount_snapshot_document(&server, "full", serde_json::json!({"complete": true}))
        .await;
    common::mount_snapshot_document(&server, "half", serde_json::json!({"complete": false}))
        .await;
    common::mount_snapshot_document(&server, "legacy", serde_json::json!({"id": "legacy"}))
        .await;

    assert_eq!(
        client.fetch_completeness("full").await.unwrap(),
        Completeness::Complete
    );
    assert_eq!(
        client.fetch_completeness("half").await.unwrap(),
        Completeness::Partial
    );
    assert_eq!(
        client.fetch_completeness("legacy").await.unwrap(),
        Completeness::Unknown
    );
}

#[tokio::test]
async fn test_fetch_completeness_not_found() {
    let (server, client) = common::setup_remote_mock().await;

    Mock::given(method("GET"))
        .and(path("/documents/snapshots/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(common::rpc_error(5, "no such")))
        .mount(&server)
        .await;

    let err = client.fetch_completeness("missing").await.unwrap_err();
    assert!(matches!(
        err,
        RemoteError::Rpc {
            code: RpcCode::NOT_FOUND,
            ..
        }
    ));
}
