//! Configuration store and service discovery client

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ServiceKind;
use crate::core::{Driver, Handle, Session};
use crate::error::{mapping, BoxError, Result, SdkError};

/// A registered service instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// Unique instance id
    pub id: String,

    /// Logical service name shared by all instances
    pub name: String,

    pub address: String,

    pub port: u16,

    #[serde(default)]
    pub tags: Vec<String>,
}

impl ServiceInstance {
    pub fn new(id: impl Into<String>, name: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            address: address.into(),
            port,
            tags: Vec::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// Session operations a service discovery driver provides
#[async_trait]
pub trait DiscoverySession: Session {
    async fn get_value(&self, key: &str) -> std::result::Result<Option<String>, BoxError>;

    async fn put_value(&self, key: &str, value: &str) -> std::result::Result<(), BoxError>;

    async fn register(&self, instance: &ServiceInstance) -> std::result::Result<(), BoxError>;

    async fn deregister(&self, instance_id: &str) -> std::result::Result<(), BoxError>;

    /// Instances registered under `name`, sorted by id
    async fn discover(&self, name: &str) -> std::result::Result<Vec<ServiceInstance>, BoxError>;
}

/// Service discovery client handle
pub struct DiscoveryClient {
    handle: Handle<dyn DiscoverySession>,
}

delegate_capability!(DiscoveryClient);

impl DiscoveryClient {
    pub fn new(driver: Arc<dyn Driver<dyn DiscoverySession>>) -> Self {
        Self {
            handle: Handle::new(ServiceKind::Config, driver),
        }
    }

    pub fn handle(&self) -> &Handle<dyn DiscoverySession> {
        &self.handle
    }

    /// Read a configuration value
    pub async fn get_value(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;
        let session = self.handle.session()?;
        session
            .get_value(key)
            .await
            .map_err(|e| mapping::translate(ServiceKind::Config, "get_value", e))
    }

    /// Write a configuration value
    pub async fn put_value(&self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;
        let session = self.handle.session()?;
        session
            .put_value(key, value)
            .await
            .map_err(|e| mapping::translate(ServiceKind::Config, "put_value", e))
    }

    pub async fn register(&self, instance: &ServiceInstance) -> Result<()> {
        if instance.id.trim().is_empty() || instance.name.trim().is_empty() {
            return Err(SdkError::service_discovery("service instances need a non-empty id and name"));
        }
        let session = self.handle.session()?;
        session
            .register(instance)
            .await
            .map_err(|e| mapping::translate(ServiceKind::Config, "register", e))
    }

    pub async fn deregister(&self, instance_id: &str) -> Result<()> {
        let session = self.handle.session()?;
        session
            .deregister(instance_id)
            .await
            .map_err(|e| mapping::translate(ServiceKind::Config, "deregister", e))
    }

    /// Instances of a service
    pub async fn discover(&self, name: &str) -> Result<Vec<ServiceInstance>> {
        let session = self.handle.session()?;
        session
            .discover(name)
            .await
            .map_err(|e| mapping::translate(ServiceKind::Config, "discover", e))
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.trim().is_empty() || key.starts_with('/') {
        return Err(SdkError::service_discovery(format!("invalid key '{}'", key)));
    }
    Ok(())
}
