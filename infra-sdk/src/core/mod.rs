//! Core abstractions for the Infra SDK
//!
//! This module provides the contract shared by every backend client:
//!
//! - `Capability`: configure / connect / healthcheck / close, implemented by every client
//! - `Session`: a live backend session produced by a driver
//! - `Driver`: opens sessions against a backend
//! - `Handle`: the lifecycle state machine every client is built on

mod handle;
pub use handle::Handle;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::clients::ServiceKind;
use crate::config::ServiceSettings;
use crate::error::{BoxError, Result};

/// Lifecycle state of a client handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// No settings bound yet
    Unconfigured,
    /// Settings bound, no session
    Configured,
    /// Live session established
    Connected,
    /// The last connection attempt failed; only `close` and `configure` are valid
    Failed,
    /// Resources released
    Closed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Unconfigured => "unconfigured",
            LifecycleState::Configured => "configured",
            LifecycleState::Connected => "connected",
            LifecycleState::Failed => "failed",
            LifecycleState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Result of a health probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy(String),
}

impl HealthStatus {
    pub fn unhealthy(reason: impl Into<String>) -> Self {
        HealthStatus::Unhealthy(reason.into())
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    /// The reason for an unhealthy status
    pub fn reason(&self) -> Option<&str> {
        match self {
            HealthStatus::Healthy => None,
            HealthStatus::Unhealthy(reason) => Some(reason),
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Unhealthy(reason) => write!(f, "unhealthy: {}", reason),
        }
    }
}

/// The lifecycle contract every client handle implements
#[async_trait]
pub trait Capability: Send + Sync {
    /// The service this handle fronts
    fn service(&self) -> ServiceKind;

    /// Current lifecycle state
    fn state(&self) -> LifecycleState;

    /// Bind settings; performs no I/O
    fn configure(&self, settings: ServiceSettings) -> Result<()>;

    /// Establish the backend session; a no-op when already connected
    async fn connect(&self) -> Result<()>;

    /// Probe the backend; never fails
    async fn healthcheck(&self) -> HealthStatus;

    /// Release every held resource; a no-op when already closed
    async fn close(&self) -> Result<()>;
}

/// A live backend session.
///
/// Dropping a session must release whatever it holds, so a session abandoned
/// halfway through a connection attempt leaks nothing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Session: Send + Sync {
    /// Cheap liveness probe
    async fn ping(&self) -> std::result::Result<(), BoxError>;

    /// Release the session's resources
    async fn close(&self) -> std::result::Result<(), BoxError>;
}

/// Opens sessions of type `S` against a backend
#[async_trait]
pub trait Driver<S: ?Sized + Session>: Send + Sync {
    /// Registry name of the driver
    fn name(&self) -> &str;

    /// Open a session.
    ///
    /// On failure every resource acquired along the way must already be
    /// released when the error is returned.
    async fn open(&self, settings: &ServiceSettings) -> std::result::Result<Arc<S>, BoxError>;
}
