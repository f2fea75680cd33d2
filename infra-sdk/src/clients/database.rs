//! Database client
//!
//! Document-oriented access to the database backend: documents are JSON
//! objects grouped in collections and addressed by an `_id` string.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::ServiceKind;
use crate::core::{Driver, Handle, Session};
use crate::error::{mapping, BoxError, Result, SdkError};

/// Field holding a document's identifier
pub const ID_FIELD: &str = "_id";

/// Session operations a database driver provides
#[async_trait]
pub trait DatabaseSession: Session {
    /// Store a document, returning its id
    async fn insert(&self, collection: &str, document: Value) -> std::result::Result<String, BoxError>;

    /// Fetch a document by id
    async fn get(&self, collection: &str, id: &str) -> std::result::Result<Option<Value>, BoxError>;

    /// Remove a document, returning whether it existed
    async fn delete(&self, collection: &str, id: &str) -> std::result::Result<bool, BoxError>;

    /// Documents whose top-level `field` equals `value`
    async fn find(&self, collection: &str, field: &str, value: &Value) -> std::result::Result<Vec<Value>, BoxError>;
}

/// Database client handle
pub struct DatabaseClient {
    handle: Handle<dyn DatabaseSession>,
}

delegate_capability!(DatabaseClient);

impl DatabaseClient {
    /// Create an unconfigured client backed by `driver`
    pub fn new(driver: Arc<dyn Driver<dyn DatabaseSession>>) -> Self {
        Self {
            handle: Handle::new(ServiceKind::Database, driver),
        }
    }

    /// The underlying lifecycle handle
    pub fn handle(&self) -> &Handle<dyn DatabaseSession> {
        &self.handle
    }

    /// Insert a JSON object; its `_id` is kept when present, generated otherwise
    pub async fn insert(&self, collection: &str, document: Value) -> Result<String> {
        validate_collection(collection)?;
        if !document.is_object() {
            return Err(SdkError::database("documents must be JSON objects"));
        }
        let session = self.handle.session()?;
        session
            .insert(collection, document)
            .await
            .map_err(|e| mapping::translate(ServiceKind::Database, "insert", e))
    }

    /// Fetch a document by id
    pub async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        validate_collection(collection)?;
        let session = self.handle.session()?;
        session
            .get(collection, id)
            .await
            .map_err(|e| mapping::translate(ServiceKind::Database, "get", e))
    }

    /// Delete a document by id, returning whether it existed
    pub async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        validate_collection(collection)?;
        let session = self.handle.session()?;
        session
            .delete(collection, id)
            .await
            .map_err(|e| mapping::translate(ServiceKind::Database, "delete", e))
    }

    /// Find documents by exact match on a top-level field
    pub async fn find(&self, collection: &str, field: &str, value: &Value) -> Result<Vec<Value>> {
        validate_collection(collection)?;
        let session = self.handle.session()?;
        session
            .find(collection, field, value)
            .await
            .map_err(|e| mapping::translate(ServiceKind::Database, "find", e))
    }
}

fn validate_collection(collection: &str) -> Result<()> {
    if collection.trim().is_empty() {
        return Err(SdkError::database("collection name must not be empty"));
    }
    Ok(())
}
