//! # Infra SDK
//!
//! A unified client SDK for the infrastructure services an application
//! depends on.
//!
//! This crate provides:
//!
//! - Typed clients for a database, file storage, a message queue, a search
//!   index and a configuration/service discovery store
//! - A single facade that validates configuration and coordinates the
//!   lifecycle of every client
//! - A closed error taxonomy with per-service aggregation
//! - Pluggable drivers: in-memory, local filesystem and HTTP backends
//!
//! ## Architecture
//!
//! The SDK is designed around the following key abstractions:
//!
//! - `Capability`: configure / connect / healthcheck / close, implemented by every client
//! - `Handle`: the lifecycle state machine shared by all clients
//! - `Driver` and `Session`: how a client reaches its backend
//! - `Sdk`: the facade owning one client per service
//! - `SdkError`: seven error kinds, each carrying the backend-native cause
//!
//! ## Example
//!
//! ```no_run
//! use infra_sdk::Sdk;
//! use serde_json::json;
//!
//! # async fn run() -> infra_sdk::Result<()> {
//! let sdk = Sdk::new(json!({
//!     "database": { "endpoint": "memory://", "timeout_seconds": 5 },
//!     "files": { "endpoint": "/var/lib/app/blobs", "timeout_seconds": 5 },
//!     "messages": { "endpoint": "memory://", "timeout_seconds": 5 },
//!     "search": { "endpoint": "http://localhost:9200", "timeout_seconds": 5 },
//!     "config": { "endpoint": "http://localhost:8500", "timeout_seconds": 5 },
//! }))?;
//!
//! sdk.connect_all().await?;
//! let health = sdk.health_summary().await;
//! println!("{}", health);
//! sdk.close_all().await?;
//! # Ok(())
//! # }
//! ```

pub mod clients;
pub use clients::{DatabaseClient, DiscoveryClient, FileClient, MessageClient, SearchClient, ServiceKind};

pub mod config;
pub use config::{validate, Credentials, EnvConfigSource, RawConfig, SdkConfig, ServiceSettings};

pub mod core;
pub use core::{Capability, Driver, Handle, HealthStatus, LifecycleState, Session};

pub mod drivers;

pub mod error;
pub use error::{ErrorKind, Result, SdkError, ServiceFailures};

pub mod sdk;
pub use sdk::{HealthReport, Sdk, SdkBuilder};

// Utility module for common functionality
mod util;

#[cfg(test)]
mod tests;
