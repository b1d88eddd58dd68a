//! Stowage Core - Domain types, ports and configuration
//!
//! This crate holds everything the data-movement engine shares:
//! - **Domain types** - `WriteUnit`, `Batch`, write and upload results, `ManifestEntry`
//! - **Port definitions** - `IDocumentStore` and `IObjectStore`, the seams the
//!   remote client implements, plus the `RemoteError` they report
//! - **Configuration** - YAML-backed `Config` with validation and a builder
//!
//! # Architecture
//!
//! Like a hexagonal core, nothing here talks to the network or the disk
//! (apart from loading the configuration file). Adapter crates implement the
//! ports and coordinators in `stowage-sync` drive them.

pub mod config;
pub mod domain;
pub mod ports;
