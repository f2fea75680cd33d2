//! Search client

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ServiceKind;
use crate::core::{Driver, Handle, Session};
use crate::error::{mapping, BoxError, Result, SdkError};

/// Default number of hits returned by [`SearchClient::query`]
pub const DEFAULT_QUERY_LIMIT: usize = 10;

/// One search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f64,
    pub document: Value,
}

/// Session operations a search driver provides
#[async_trait]
pub trait SearchSession: Session {
    /// Index or replace a document
    async fn index(&self, index: &str, id: &str, document: Value) -> std::result::Result<(), BoxError>;

    /// Full-text query, best hits first
    async fn query(&self, index: &str, text: &str, limit: usize) -> std::result::Result<Vec<SearchHit>, BoxError>;
}

/// Search client handle
pub struct SearchClient {
    handle: Handle<dyn SearchSession>,
}

delegate_capability!(SearchClient);

impl SearchClient {
    pub fn new(driver: Arc<dyn Driver<dyn SearchSession>>) -> Self {
        Self {
            handle: Handle::new(ServiceKind::Search, driver),
        }
    }

    pub fn handle(&self) -> &Handle<dyn SearchSession> {
        &self.handle
    }

    pub async fn index(&self, index: &str, id: &str, document: Value) -> Result<()> {
        validate_name("index", index)?;
        validate_name("document id", id)?;
        let session = self.handle.session()?;
        session
            .index(index, id, document)
            .await
            .map_err(|e| mapping::translate(ServiceKind::Search, "index", e))
    }

    /// Query with the default limit
    pub async fn query(&self, index: &str, text: &str) -> Result<Vec<SearchHit>> {
        self.query_with_limit(index, text, DEFAULT_QUERY_LIMIT).await
    }

    pub async fn query_with_limit(&self, index: &str, text: &str, limit: usize) -> Result<Vec<SearchHit>> {
        validate_name("index", index)?;
        let session = self.handle.session()?;
        session
            .query(index, text, limit)
            .await
            .map_err(|e| mapping::translate(ServiceKind::Search, "query", e))
    }
}

fn validate_name(what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SdkError::search(format!("{} must not be empty", what)));
    }
    Ok(())
}
