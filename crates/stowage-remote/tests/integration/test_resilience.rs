//! Integration tests for the client running under retry and circuit breaking

use std::sync::Arc;

use stowage_core::config::{CircuitBreakerConfig, RetryConfig};
use stowage_core::domain::WriteUnit;
use stowage_core::ports::IDocumentStore;
use stowage_remote::backoff::FixedJitter;
use stowage_remote::{CircuitBreaker, CircuitError, RetryError, RetryExecutor};
use wiremock::{
    matchers::{method, path},
    Mock, ResponseTemplate,
};

use crate::common;

fn fast_retry(max_retries: u32) -> RetryExecutor {
    let config = RetryConfig {
        max_retries,
        initial_backoff_ms: 1,
        max_backoff_ms: 5,
        jitter_factor: 0.0,
        attempt_timeout_ms: 5_000,
    };
    RetryExecutor::with_jitter(config, "document-db", Arc::new(FixedJitter(0.0)))
}

fn units() -> Vec<WriteUnit> {
    vec![WriteUnit::new("d1", "s/d1", serde_json::json!({"v": 1}))]
}

#[tokio::test]
async fn test_transient_failures_are_retried_until_success() {
    let (server, client) = common::setup_remote_mock().await;

    Mock::given(method("POST"))
        .and(path("/documents:commit"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    common::mount_commit_ok(&server).await;

    let writes = units();
    let outcome = fast_retry(3)
        .execute("commit_batch", || client.commit_batch(&writes))
        .await;

    assert_eq!(outcome.attempts, 3);
    outcome.into_result().expect("third attempt succeeds");
}

#[tokio::test]
async fn test_fatal_status_is_not_retried() {
    let (server, client) = common::setup_remote_mock().await;

    Mock::given(method("POST"))
        .and(path("/documents:commit"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(common::rpc_error(3, "invalid argument")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let writes = units();
    let outcome = fast_retry(3)
        .execute("commit_batch", || client.commit_batch(&writes))
        .await;

    assert_eq!(outcome.attempts, 1);
    assert!(matches!(
        outcome.into_result(),
        Err(RetryError::Fatal { .. })
    ));
}

#[tokio::test]
async fn test_breaker_opens_after_exhausted_calls() {
    let (server, client) = common::setup_remote_mock().await;

    Mock::given(method("POST"))
        .and(path("/documents:commit"))
        .respond_with(ResponseTemplate::new(500))
        .expect(4)
        .mount(&server)
        .await;

    let breaker = CircuitBreaker::new(
        "document-db",
        CircuitBreakerConfig {
            failure_threshold: 2,
            cooldown_ms: 60_000,
        },
    );
    let retry = fast_retry(1);
    let writes = units();

    for _ in 0..2 {
        let result = breaker
            .execute(|| async {
                retry
                    .execute("commit_batch", || client.commit_batch(&writes))
                    .await
                    .into_result()
            })
            .await;
        assert!(matches!(
            result,
            Err(CircuitError::Inner(RetryError::Exhausted { .. }))
        ));
    }

    let rejected = breaker
        .execute(|| async {
            retry
                .execute("commit_batch", || client.commit_batch(&writes))
                .await
                .into_result()
        })
        .await;
    assert!(rejected.unwrap_err().is_open());
}
