//! The SDK facade
//!
//! [`Sdk`] owns one client per backend service and coordinates their
//! lifecycles. Lifecycle calls fan out to every handle concurrently and their
//! failures are aggregated per service; a single service failing never hides
//! the outcome of the others.

mod builder;

pub use builder::SdkBuilder;

use std::collections::BTreeMap;
use std::fmt;

use futures::future::join_all;
use log::{info, warn};
use serde::Serialize;

use crate::clients::{DatabaseClient, DiscoveryClient, FileClient, MessageClient, SearchClient, ServiceKind};
use crate::config::{RawConfig, SdkConfig};
use crate::core::{Capability, HealthStatus, LifecycleState};
use crate::error::{ErrorKind, Result, SdkError, ServiceFailures};

/// Health of every service, keyed by service name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct HealthReport {
    statuses: BTreeMap<ServiceKind, HealthStatus>,
}

impl HealthReport {
    /// Status of one service
    pub fn get(&self, service: ServiceKind) -> Option<&HealthStatus> {
        self.statuses.get(&service)
    }

    /// Whether every service is healthy
    pub fn is_healthy(&self) -> bool {
        self.statuses.values().all(HealthStatus::is_healthy)
    }

    /// Services reporting `Unhealthy`, in name order
    pub fn unhealthy_services(&self) -> Vec<ServiceKind> {
        self.statuses
            .iter()
            .filter(|(_, status)| !status.is_healthy())
            .map(|(service, _)| *service)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ServiceKind, &HealthStatus)> {
        self.statuses.iter().map(|(service, status)| (*service, status))
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}

impl fmt::Display for HealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, (service, status)) in self.statuses.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", service, status)?;
        }
        Ok(())
    }
}

/// Unified entry point to every backend service
pub struct Sdk {
    config: SdkConfig,
    database: DatabaseClient,
    files: FileClient,
    messages: MessageClient,
    search: SearchClient,
    service: DiscoveryClient,
    lifecycle: tokio::sync::Mutex<()>,
}

impl Sdk {
    /// Validate `raw` and configure a client for every service, using the
    /// drivers selected by each service's `driver` option.
    ///
    /// Construction is atomic: if any service cannot be configured, nothing is
    /// returned and the error names every failing service.
    pub fn new(raw: impl Into<RawConfig>) -> Result<Self> {
        SdkBuilder::new().build(raw)
    }

    /// Build from `INFRA_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(RawConfig::from_env())
    }

    /// Start a builder, for overriding drivers
    pub fn builder() -> SdkBuilder {
        SdkBuilder::new()
    }

    /// The validated configuration
    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    pub fn database(&self) -> &DatabaseClient {
        &self.database
    }

    pub fn files(&self) -> &FileClient {
        &self.files
    }

    pub fn messages(&self) -> &MessageClient {
        &self.messages
    }

    pub fn search(&self) -> &SearchClient {
        &self.search
    }

    /// Configuration store and service discovery client
    pub fn service(&self) -> &DiscoveryClient {
        &self.service
    }

    /// Lifecycle state of every service
    pub fn states(&self) -> BTreeMap<ServiceKind, LifecycleState> {
        self.handles()
            .into_iter()
            .map(|handle| (handle.service(), handle.state()))
            .collect()
    }

    /// Connect every service concurrently.
    ///
    /// Every handle is attempted even when others fail; the error names each
    /// service that could not connect. Fails immediately if another
    /// `connect_all` or `close_all` is running on this instance.
    #[tracing::instrument(skip_all)]
    pub async fn connect_all(&self) -> Result<()> {
        let _lifecycle = self.lock_lifecycle()?;
        info!("Connecting {} services", ServiceKind::ALL.len());

        let outcomes = join_all(
            self.handles()
                .into_iter()
                .map(|handle| async move { (handle.service(), handle.connect().await) }),
        )
        .await;

        let failures = collect_failures(outcomes);
        if failures.is_empty() {
            info!("All services connected");
        } else {
            warn!("{} of {} services failed to connect", failures.len(), ServiceKind::ALL.len());
        }
        failures.into_result(ErrorKind::Connection, "failed to connect services")
    }

    /// Probe every service concurrently. Never fails.
    #[tracing::instrument(skip_all)]
    pub async fn health_summary(&self) -> HealthReport {
        let statuses = join_all(
            self.handles()
                .into_iter()
                .map(|handle| async move { (handle.service(), handle.healthcheck().await) }),
        )
        .await;

        HealthReport {
            statuses: statuses.into_iter().collect(),
        }
    }

    /// Close every service concurrently.
    ///
    /// `close` is called on each handle exactly once regardless of earlier
    /// failures; the error names exactly the services whose close failed.
    #[tracing::instrument(skip_all)]
    pub async fn close_all(&self) -> Result<()> {
        let _lifecycle = self.lock_lifecycle()?;
        info!("Closing {} services", ServiceKind::ALL.len());

        let outcomes = join_all(
            self.handles()
                .into_iter()
                .map(|handle| async move { (handle.service(), handle.close().await) }),
        )
        .await;

        let failures = collect_failures(outcomes);
        if !failures.is_empty() {
            warn!("{} of {} services failed to close", failures.len(), ServiceKind::ALL.len());
        }
        failures.into_result(ErrorKind::Connection, "failed to close services")
    }

    fn lock_lifecycle(&self) -> Result<tokio::sync::MutexGuard<'_, ()>> {
        self.lifecycle
            .try_lock()
            .map_err(|_| SdkError::connection("lifecycle operation already in progress"))
    }

    fn handles(&self) -> [&dyn Capability; 5] {
        [
            &self.database,
            &self.files,
            &self.messages,
            &self.search,
            &self.service,
        ]
    }
}

impl fmt::Debug for Sdk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sdk")
            .field("config", &self.config)
            .field("states", &self.states())
            .finish()
    }
}

fn collect_failures(outcomes: Vec<(ServiceKind, Result<()>)>) -> ServiceFailures {
    outcomes
        .into_iter()
        .filter_map(|(service, outcome)| outcome.err().map(|error| (service, error)))
        .collect()
}
