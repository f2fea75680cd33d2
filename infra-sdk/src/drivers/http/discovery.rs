//! Consul-compatible configuration and service discovery driver

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use super::{base_url, HttpEndpoint, UserAgent};
use crate::clients::{DiscoverySession, ServiceInstance};
use crate::config::ServiceSettings;
use crate::core::{Driver, Session};
use crate::error::BoxError;

/// Header carrying Consul ACL tokens
pub const TOKEN_HEADER: &str = "X-Consul-Token";

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("cluster has no elected leader")]
    NoLeader,

    #[error("key-value write for '{0}' was rejected")]
    WriteRejected(String),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct Registration<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
    name: &'a str,
    address: &'a str,
    port: u16,
    tags: &'a [String],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CatalogEntry {
    #[serde(rename = "ServiceID")]
    service_id: String,
    service_name: String,
    #[serde(default)]
    service_address: String,
    #[serde(default)]
    address: String,
    service_port: u16,
    #[serde(default)]
    service_tags: Option<Vec<String>>,
}

impl From<CatalogEntry> for ServiceInstance {
    fn from(entry: CatalogEntry) -> Self {
        let address = if entry.service_address.is_empty() {
            entry.address
        } else {
            entry.service_address
        };
        ServiceInstance {
            id: entry.service_id,
            name: entry.service_name,
            address,
            port: entry.service_port,
            tags: entry.service_tags.unwrap_or_default(),
        }
    }
}

/// Driver speaking the Consul KV, agent and catalog HTTP API
#[derive(Debug, Clone)]
pub struct HttpDiscoveryDriver {
    base: Url,
}

impl HttpDiscoveryDriver {
    pub fn from_settings(settings: &ServiceSettings) -> Result<Self, BoxError> {
        Ok(Self {
            base: base_url(&settings.endpoint)?,
        })
    }
}

#[async_trait]
impl Driver<dyn DiscoverySession> for HttpDiscoveryDriver {
    fn name(&self) -> &str {
        "http"
    }

    async fn open(&self, settings: &ServiceSettings) -> Result<Arc<dyn DiscoverySession>, BoxError> {
        let user_agent = UserAgent {
            extra: Some("discovery".to_string()),
            ..UserAgent::default()
        };
        let session = HttpDiscoverySession {
            endpoint: HttpEndpoint::from_settings(self.base.clone(), settings, user_agent, Some(TOKEN_HEADER))?,
        };
        session.ping().await?;
        Ok(Arc::new(session))
    }
}

pub struct HttpDiscoverySession {
    endpoint: HttpEndpoint,
}

fn kv_path(key: &str) -> Vec<&str> {
    let mut segments = vec!["v1", "kv"];
    segments.extend(key.split('/'));
    segments
}

#[async_trait]
impl Session for HttpDiscoverySession {
    async fn ping(&self) -> Result<(), BoxError> {
        let request = self.endpoint.request(Method::GET, &["v1", "status", "leader"])?;
        let leader: String = self.endpoint.send(request).await?.json().await?;
        if leader.is_empty() {
            return Err(DiscoveryError::NoLeader.into());
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

#[async_trait]
impl DiscoverySession for HttpDiscoverySession {
    async fn get_value(&self, key: &str) -> Result<Option<String>, BoxError> {
        let request = self
            .endpoint
            .request(Method::GET, &kv_path(key))?
            .query(&[("raw", "true")]);
        match self.endpoint.send_optional(request).await? {
            Some(response) => Ok(Some(response.text().await?)),
            None => Ok(None),
        }
    }

    async fn put_value(&self, key: &str, value: &str) -> Result<(), BoxError> {
        let request = self
            .endpoint
            .request(Method::PUT, &kv_path(key))?
            .body(value.to_string());
        let accepted: bool = self.endpoint.send(request).await?.json().await?;
        if !accepted {
            return Err(DiscoveryError::WriteRejected(key.to_string()).into());
        }
        Ok(())
    }

    async fn register(&self, instance: &ServiceInstance) -> Result<(), BoxError> {
        let registration = Registration {
            id: &instance.id,
            name: &instance.name,
            address: &instance.address,
            port: instance.port,
            tags: &instance.tags,
        };
        let request = self
            .endpoint
            .request(Method::PUT, &["v1", "agent", "service", "register"])?
            .json(&registration);
        self.endpoint.send(request).await?;
        Ok(())
    }

    async fn deregister(&self, instance_id: &str) -> Result<(), BoxError> {
        let request = self
            .endpoint
            .request(Method::PUT, &["v1", "agent", "service", "deregister", instance_id])?;
        self.endpoint.send(request).await?;
        Ok(())
    }

    async fn discover(&self, name: &str) -> Result<Vec<ServiceInstance>, BoxError> {
        let request = self.endpoint.request(Method::GET, &["v1", "catalog", "service", name])?;
        let entries: Vec<CatalogEntry> = self.endpoint.send(request).await?.json().await?;
        let mut instances: Vec<ServiceInstance> = entries.into_iter().map(ServiceInstance::from).collect();
        instances.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(instances)
    }
}
