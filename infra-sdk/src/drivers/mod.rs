//! Backend drivers and the driver registry
//!
//! The registry is a static table built once at first use: for each service it
//! maps a driver name to a constructor. The facade resolves each service's
//! driver from its `driver` option, falling back to the service default.

pub mod http;
pub mod local;
pub mod memory;

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::clients::{DatabaseSession, DiscoverySession, FileSession, MessageSession, SearchSession, ServiceKind};
use crate::config::ServiceSettings;
use crate::core::{Driver, Session};
use crate::error::{BoxError, Result, SdkError};

/// Option selecting a service's driver
pub const DRIVER_OPTION: &str = "driver";

/// Builds a driver from a service's settings
pub type Constructor<S> = fn(&ServiceSettings) -> std::result::Result<Arc<dyn Driver<S>>, BoxError>;

/// Driver constructors for one service
pub struct DriverTable<S: ?Sized + Session + 'static> {
    service: ServiceKind,
    default: &'static str,
    constructors: BTreeMap<&'static str, Constructor<S>>,
}

impl<S: ?Sized + Session + 'static> DriverTable<S> {
    fn new(service: ServiceKind, default: &'static str) -> Self {
        Self {
            service,
            default,
            constructors: BTreeMap::new(),
        }
    }

    fn with(mut self, name: &'static str, constructor: Constructor<S>) -> Self {
        self.constructors.insert(name, constructor);
        self
    }

    /// Name of the driver used when the `driver` option is absent
    pub fn default_name(&self) -> &'static str {
        self.default
    }

    /// Registered driver names
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.constructors.keys().copied()
    }

    /// Build the driver selected by `settings`
    pub fn resolve(&self, settings: &ServiceSettings) -> Result<Arc<dyn Driver<S>>> {
        let name = match settings.option(DRIVER_OPTION) {
            None => self.default,
            Some(value) => value.as_str().ok_or_else(|| {
                SdkError::configuration(format!("{}.options.{} must be a string", self.service, DRIVER_OPTION))
            })?,
        };

        let constructor = self.constructors.get(name).ok_or_else(|| {
            SdkError::configuration(format!(
                "{}.options.{}: unknown driver '{}' (available: {})",
                self.service,
                DRIVER_OPTION,
                name,
                self.names().collect::<Vec<_>>().join(", ")
            ))
        })?;

        constructor(settings).map_err(|e| {
            SdkError::configuration(format!("{}: cannot initialise {} driver: {}", self.service, name, e)).with_source(e)
        })
    }
}

/// Driver tables of every service
pub struct DriverRegistry {
    pub database: DriverTable<dyn DatabaseSession>,
    pub files: DriverTable<dyn FileSession>,
    pub messages: DriverTable<dyn MessageSession>,
    pub search: DriverTable<dyn SearchSession>,
    pub config: DriverTable<dyn DiscoverySession>,
}

impl DriverRegistry {
    fn builtin() -> Self {
        Self {
            database: DriverTable::new(ServiceKind::Database, "memory")
                .with("memory", |_| Ok(Arc::new(memory::MemoryDatabase::default()))),
            files: DriverTable::new(ServiceKind::Files, "local")
                .with("local", |settings| Ok(Arc::new(local::LocalFileDriver::from_settings(settings)?)))
                .with("memory", |_| Ok(Arc::new(memory::MemoryFiles::default()))),
            messages: DriverTable::new(ServiceKind::Messages, "memory")
                .with("memory", |settings| Ok(Arc::new(memory::MemoryBroker::from_settings(settings)))),
            search: DriverTable::new(ServiceKind::Search, "http")
                .with("http", |settings| Ok(Arc::new(http::search::HttpSearchDriver::from_settings(settings)?)))
                .with("memory", |_| Ok(Arc::new(memory::MemorySearch::default()))),
            config: DriverTable::new(ServiceKind::Config, "http")
                .with("http", |settings| {
                    Ok(Arc::new(http::discovery::HttpDiscoveryDriver::from_settings(settings)?))
                })
                .with("memory", |_| Ok(Arc::new(memory::MemoryDiscovery::default()))),
        }
    }
}

/// The built-in driver registry
pub static REGISTRY: Lazy<DriverRegistry> = Lazy::new(DriverRegistry::builtin);
