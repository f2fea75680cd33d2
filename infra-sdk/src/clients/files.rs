//! File storage client
//!
//! Blobs are addressed by `/`-separated keys.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use super::ServiceKind;
use crate::core::{Driver, Handle, Session};
use crate::error::{mapping, BoxError, Result, SdkError};

/// Session operations a file storage driver provides
#[async_trait]
pub trait FileSession: Session {
    async fn put(&self, key: &str, data: Bytes) -> std::result::Result<(), BoxError>;

    async fn get(&self, key: &str) -> std::result::Result<Option<Bytes>, BoxError>;

    /// Remove a blob, returning whether it existed
    async fn delete(&self, key: &str) -> std::result::Result<bool, BoxError>;

    /// Keys starting with `prefix`, sorted
    async fn list(&self, prefix: &str) -> std::result::Result<Vec<String>, BoxError>;
}

/// File storage client handle
pub struct FileClient {
    handle: Handle<dyn FileSession>,
}

delegate_capability!(FileClient);

impl FileClient {
    pub fn new(driver: Arc<dyn Driver<dyn FileSession>>) -> Self {
        Self {
            handle: Handle::new(ServiceKind::Files, driver),
        }
    }

    pub fn handle(&self) -> &Handle<dyn FileSession> {
        &self.handle
    }

    /// Store a blob under `key`, replacing any previous content
    pub async fn put(&self, key: &str, data: impl Into<Bytes>) -> Result<()> {
        validate_key(key)?;
        let session = self.handle.session()?;
        session
            .put(key, data.into())
            .await
            .map_err(|e| mapping::translate(ServiceKind::Files, "put", e))
    }

    /// Fetch a blob; `None` when the key does not exist
    pub async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        validate_key(key)?;
        let session = self.handle.session()?;
        session
            .get(key)
            .await
            .map_err(|e| mapping::translate(ServiceKind::Files, "get", e))
    }

    pub async fn delete(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        let session = self.handle.session()?;
        session
            .delete(key)
            .await
            .map_err(|e| mapping::translate(ServiceKind::Files, "delete", e))
    }

    pub async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let session = self.handle.session()?;
        session
            .list(prefix)
            .await
            .map_err(|e| mapping::translate(ServiceKind::Files, "list", e))
    }
}

/// Keys are non-empty, relative, and free of `.`/`..` segments
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(SdkError::file_storage("key must not be empty"));
    }
    if key.starts_with('/') || key.contains('\\') {
        return Err(SdkError::file_storage(format!("invalid key '{}': keys are relative and use '/'", key)));
    }
    if key.split('/').any(|segment| segment.is_empty() || segment == "." || segment == "..") {
        return Err(SdkError::file_storage(format!("invalid key '{}': empty or relative segment", key)));
    }
    Ok(())
}
