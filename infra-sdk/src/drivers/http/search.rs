//! Elasticsearch-compatible search driver

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use url::Url;

use super::{base_url, HttpEndpoint, UserAgent};
use crate::clients::{SearchHit, SearchSession};
use crate::config::ServiceSettings;
use crate::core::{Driver, Session};
use crate::error::BoxError;

#[derive(Error, Debug)]
#[error("cluster health is {0}")]
pub struct ClusterUnhealthy(String);

#[derive(Debug, Deserialize)]
struct ClusterHealth {
    status: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Debug, Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    hits: Vec<RawHit>,
}

#[derive(Debug, Deserialize)]
struct RawHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score", default)]
    score: Option<f64>,
    #[serde(rename = "_source", default)]
    source: Value,
}

/// Driver speaking the Elasticsearch document and search REST API
#[derive(Debug, Clone)]
pub struct HttpSearchDriver {
    base: Url,
}

impl HttpSearchDriver {
    pub fn from_settings(settings: &ServiceSettings) -> Result<Self, BoxError> {
        Ok(Self {
            base: base_url(&settings.endpoint)?,
        })
    }
}

#[async_trait]
impl Driver<dyn SearchSession> for HttpSearchDriver {
    fn name(&self) -> &str {
        "http"
    }

    async fn open(&self, settings: &ServiceSettings) -> Result<Arc<dyn SearchSession>, BoxError> {
        let user_agent = UserAgent {
            extra: Some("search".to_string()),
            ..UserAgent::default()
        };
        let session = HttpSearchSession {
            endpoint: HttpEndpoint::from_settings(self.base.clone(), settings, user_agent, None)?,
            refresh: settings.option_bool("refresh").unwrap_or(false),
        };
        session.ping().await?;
        Ok(Arc::new(session))
    }
}

pub struct HttpSearchSession {
    endpoint: HttpEndpoint,
    refresh: bool,
}

#[async_trait]
impl Session for HttpSearchSession {
    async fn ping(&self) -> Result<(), BoxError> {
        let request = self.endpoint.request(Method::GET, &["_cluster", "health"])?;
        let health: ClusterHealth = self.endpoint.send(request).await?.json().await?;
        if health.status == "red" {
            return Err(ClusterUnhealthy(health.status).into());
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

#[async_trait]
impl SearchSession for HttpSearchSession {
    async fn index(&self, index: &str, id: &str, document: Value) -> Result<(), BoxError> {
        let mut request = self
            .endpoint
            .request(Method::PUT, &[index, "_doc", id])?
            .json(&document);
        if self.refresh {
            request = request.query(&[("refresh", "wait_for")]);
        }
        self.endpoint.send(request).await?;
        Ok(())
    }

    async fn query(&self, index: &str, text: &str, limit: usize) -> Result<Vec<SearchHit>, BoxError> {
        let query = if text.trim().is_empty() {
            json!({ "match_all": {} })
        } else {
            json!({ "query_string": { "query": text } })
        };
        let request = self
            .endpoint
            .request(Method::POST, &[index, "_search"])?
            .json(&json!({ "query": query, "size": limit }));

        let response: SearchResponse = self.endpoint.send(request).await?.json().await?;
        Ok(response
            .hits
            .hits
            .into_iter()
            .map(|hit| SearchHit {
                id: hit.id,
                score: hit.score.unwrap_or(0.0),
                document: hit.source,
            })
            .collect())
    }
}
