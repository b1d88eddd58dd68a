//! Shared test helpers for remote API integration tests
//!
//! Each helper mounts the endpoints a test needs and returns a client
//! pointing at the mock server.

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use stowage_remote::client::RemoteClient;

pub const TEST_TOKEN: &str = "test-access-token";
pub const TEST_COLLECTION: &str = "snapshots";

/// Starts a mock server and returns a client configured against it
pub async fn setup_remote_mock() -> (MockServer, RemoteClient) {
    let server = MockServer::start().await;
    let client = RemoteClient::new(server.uri(), TEST_TOKEN).with_collection(TEST_COLLECTION);
    (server, client)
}

/// Returns a client pointing at a local port nothing listens on.
///
/// The port is taken from a listener that is closed again right away.
pub fn closed_port_client() -> RemoteClient {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let addr = listener.local_addr().expect("listener address");
    drop(listener);
    RemoteClient::new(format!("http://{addr}"), TEST_TOKEN).with_collection(TEST_COLLECTION)
}

/// Mounts a commit endpoint that always succeeds
pub async fn mount_commit_ok(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/documents:commit"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(server)
        .await;
}

/// Mounts a snapshot document with the given body
pub async fn mount_snapshot_document(server: &MockServer, id: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(format!("/documents/{TEST_COLLECTION}/{id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Error envelope in the remote API's format
pub fn rpc_error(code: i32, message: &str) -> serde_json::Value {
    serde_json::json!({"error": {"code": code, "message": message}})
}
