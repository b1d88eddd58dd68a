//! Integration tests for object uploads

use stowage_core::ports::{IObjectStore, RemoteError};
use stowage_remote::client::RemoteClient;
use wiremock::{
    matchers::{body_bytes, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::common;

#[tokio::test]
async fn test_upload_object_puts_raw_bytes() {
    let (server, client) = common::setup_remote_mock().await;

    let content = br#"{"station":"A1","pm25":12.5}"#;
    Mock::given(method("PUT"))
        .and(path("/objects/2024-05-01/stations/A1.json"))
        .and(header("content-type", "application/json"))
        .and(header("authorization", "Bearer test-access-token"))
        .and(body_bytes(content.to_vec()))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    client
        .upload_object("2024-05-01/stations/A1.json", content, "application/json")
        .await
        .expect("upload should succeed");
}

#[tokio::test]
async fn test_upload_object_applies_prefix() {
    let server = MockServer::start().await;
    let client = RemoteClient::new(server.uri(), common::TEST_TOKEN).with_object_prefix("cache");

    Mock::given(method("PUT"))
        .and(path("/objects/cache/a.csv"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client
        .upload_object("a.csv", b"x,y\n1,2\n", "text/csv")
        .await
        .expect("upload should succeed");
}

#[tokio::test]
async fn test_upload_forbidden_is_auth_error() {
    let (server, client) = common::setup_remote_mock().await;

    Mock::given(method("PUT"))
        .and(path("/objects/a.json"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let err = client
        .upload_object("a.json", b"{}", "application/json")
        .await
        .unwrap_err();
    assert!(err.is_auth());
    assert!(matches!(err, RemoteError::Http { status: 403, .. }));
}

#[tokio::test]
async fn test_upload_unauthorized_envelope_is_auth_error() {
    let (server, client) = common::setup_remote_mock().await;

    Mock::given(method("PUT"))
        .and(path("/objects/a.json"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(common::rpc_error(401, "token expired")),
        )
        .mount(&server)
        .await;

    let err = client
        .upload_object("a.json", b"{}", "application/json")
        .await
        .unwrap_err();
    assert!(err.is_auth(), "got {err:?}");
    assert_eq!(
        err,
        RemoteError::Http {
            status: 401,
            message: "token expired".to_string()
        }
    );
}

#[tokio::test]
async fn test_reserved_characters_stay_inside_the_object_path() {
    let server = MockServer::start().await;
    let client =
        RemoteClient::new(server.uri(), common::TEST_TOKEN).with_object_prefix("reports");

    let cases = [
        ("q1#draft.json", "/objects/reports/q1%23draft.json", b"draft".as_slice()),
        ("a?b.json", "/objects/reports/a%3Fb.json", b"query".as_slice()),
        ("100%.csv", "/objects/reports/100%25.csv", b"percent".as_slice()),
        ("q1 final.json", "/objects/reports/q1%20final.json", b"space".as_slice()),
    ];
    for (_, expected_path, content) in cases {
        Mock::given(method("PUT"))
            .and(path(expected_path))
            .and(body_bytes(content.to_vec()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
    }

    for (remote_path, _, content) in cases {
        client
            .upload_object(remote_path, content, "application/octet-stream")
            .await
            .unwrap_or_else(|e| panic!("{remote_path} was misrouted: {e}"));
    }

    let received = server.received_requests().await.unwrap_or_default();
    assert_eq!(received.len(), 4);
    assert!(received.iter().all(|r| r.url.query().is_none()));
}
