//! Port definitions (hexagonal architecture interfaces)
//!
//! - [`IDocumentStore`] - Batched document writes and snapshot status
//! - [`IObjectStore`] - Single-object uploads

pub mod remote_store;

pub use remote_store::{IDocumentStore, IObjectStore, RemoteError, RpcCode};
