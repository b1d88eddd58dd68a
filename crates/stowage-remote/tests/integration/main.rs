//! Integration tests for stowage-remote
//!
//! Uses wiremock to simulate the remote document and object endpoints and
//! verifies the HTTP client, its error mapping, and its composition with the
//! retry executor and circuit breaker.

mod common;

mod test_documents;
mod test_objects;
mod test_resilience;
