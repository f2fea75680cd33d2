//! Facade builder
//!
//! Resolves one driver per service, either an explicit override or the
//! registry entry selected by the service's `driver` option, then builds and
//! configures the clients.

use std::sync::Arc;

use log::{debug, error};

use super::Sdk;
use crate::clients::{
    DatabaseClient, DatabaseSession, DiscoveryClient, DiscoverySession, FileClient, FileSession, MessageClient,
    MessageSession, SearchClient, SearchSession, ServiceKind,
};
use crate::config::{validate, RawConfig, SdkConfig};
use crate::core::{Capability, Driver, Session};
use crate::drivers::{DriverTable, REGISTRY};
use crate::error::{ErrorKind, Result, SdkError, ServiceFailures};

/// Builder for [`Sdk`] with optional per-service driver overrides
#[derive(Default)]
pub struct SdkBuilder {
    database: Option<Arc<dyn Driver<dyn DatabaseSession>>>,
    files: Option<Arc<dyn Driver<dyn FileSession>>>,
    messages: Option<Arc<dyn Driver<dyn MessageSession>>>,
    search: Option<Arc<dyn Driver<dyn SearchSession>>>,
    service: Option<Arc<dyn Driver<dyn DiscoverySession>>>,
}

impl SdkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `driver` for the database instead of the registry
    pub fn database_driver(mut self, driver: Arc<dyn Driver<dyn DatabaseSession>>) -> Self {
        self.database = Some(driver);
        self
    }

    /// Use `driver` for file storage instead of the registry
    pub fn files_driver(mut self, driver: Arc<dyn Driver<dyn FileSession>>) -> Self {
        self.files = Some(driver);
        self
    }

    /// Use `driver` for messaging instead of the registry
    pub fn messages_driver(mut self, driver: Arc<dyn Driver<dyn MessageSession>>) -> Self {
        self.messages = Some(driver);
        self
    }

    /// Use `driver` for search instead of the registry
    pub fn search_driver(mut self, driver: Arc<dyn Driver<dyn SearchSession>>) -> Self {
        self.search = Some(driver);
        self
    }

    /// Use `driver` for the configuration and discovery service instead of the registry
    pub fn service_driver(mut self, driver: Arc<dyn Driver<dyn DiscoverySession>>) -> Self {
        self.service = Some(driver);
        self
    }

    /// Validate `raw` and build a configured, unconnected [`Sdk`]
    pub fn build(self, raw: impl Into<RawConfig>) -> Result<Sdk> {
        let config = validate(&raw.into())?;
        let mut failures = ServiceFailures::new();

        let database = prepare(
            &config,
            ServiceKind::Database,
            self.database,
            &REGISTRY.database,
            DatabaseClient::new,
            &mut failures,
        );
        let files = prepare(
            &config,
            ServiceKind::Files,
            self.files,
            &REGISTRY.files,
            FileClient::new,
            &mut failures,
        );
        let messages = prepare(
            &config,
            ServiceKind::Messages,
            self.messages,
            &REGISTRY.messages,
            MessageClient::new,
            &mut failures,
        );
        let search = prepare(
            &config,
            ServiceKind::Search,
            self.search,
            &REGISTRY.search,
            SearchClient::new,
            &mut failures,
        );
        let service = prepare(
            &config,
            ServiceKind::Config,
            self.service,
            &REGISTRY.config,
            DiscoveryClient::new,
            &mut failures,
        );

        let (Some(database), Some(files), Some(messages), Some(search), Some(service)) =
            (database, files, messages, search, service)
        else {
            let err = SdkError::aggregate(ErrorKind::Configuration, "failed to configure services", failures);
            error!("{}", err);
            return Err(err);
        };

        Ok(Sdk {
            config,
            database,
            files,
            messages,
            search,
            service,
            lifecycle: tokio::sync::Mutex::new(()),
        })
    }
}

fn prepare<S, C>(
    config: &SdkConfig,
    service: ServiceKind,
    custom: Option<Arc<dyn Driver<S>>>,
    table: &DriverTable<S>,
    make: fn(Arc<dyn Driver<S>>) -> C,
    failures: &mut ServiceFailures,
) -> Option<C>
where
    S: ?Sized + Session + 'static,
    C: Capability,
{
    let settings = config.settings(service);
    let driver = match custom {
        Some(driver) => Ok(driver),
        None => table.resolve(settings),
    };

    let outcome = driver.and_then(|driver| {
        debug!("Using {} driver for {}", driver.name(), service);
        let client = make(driver);
        client.configure(settings.clone())?;
        Ok(client)
    });

    match outcome {
        Ok(client) => Some(client),
        Err(err) => {
            failures.insert(service, err);
            None
        }
    }
}
