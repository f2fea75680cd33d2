//! Local filesystem driver for the file storage service
//!
//! The endpoint names the root directory (`/var/lib/blobs` or
//! `file:///var/lib/blobs`); keys map to paths below it.

use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::fs;

use crate::clients::FileSession;
use crate::config::ServiceSettings;
use crate::core::{Driver, Session};
use crate::error::BoxError;

/// Errors raised by the local filesystem driver
#[derive(Error, Debug)]
pub enum LocalFileError {
    #[error("storage root {0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("storage root {0} does not exist")]
    MissingRoot(PathBuf),

    #[error("key '{0}' escapes the storage root")]
    InvalidKey(String),
}

/// Driver storing blobs as files below a root directory
#[derive(Debug, Clone)]
pub struct LocalFileDriver {
    root: PathBuf,
    create_root: bool,
}

impl LocalFileDriver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            create_root: true,
        }
    }

    /// Root from the endpoint; `create_root` option (default true) controls
    /// whether a missing root is created on connect
    pub fn from_settings(settings: &ServiceSettings) -> Result<Self, BoxError> {
        let endpoint = settings.endpoint.trim();
        let root = endpoint.strip_prefix("file://").unwrap_or(endpoint);
        if root.is_empty() {
            return Err("file storage endpoint must name a directory".into());
        }
        Ok(Self {
            root: PathBuf::from(root),
            create_root: settings.option_bool("create_root").unwrap_or(true),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl Driver<dyn FileSession> for LocalFileDriver {
    fn name(&self) -> &str {
        "local"
    }

    async fn open(&self, _settings: &ServiceSettings) -> Result<Arc<dyn FileSession>, BoxError> {
        if self.create_root {
            fs::create_dir_all(&self.root).await?;
        }
        check_root(&self.root).await?;
        Ok(Arc::new(LocalFileSession {
            root: self.root.clone(),
        }))
    }
}

async fn check_root(root: &Path) -> Result<(), BoxError> {
    match fs::metadata(root).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(LocalFileError::NotADirectory(root.to_path_buf()).into()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(LocalFileError::MissingRoot(root.to_path_buf()).into()),
        Err(e) => Err(e.into()),
    }
}

pub struct LocalFileSession {
    root: PathBuf,
}

impl LocalFileSession {
    fn path_of(&self, key: &str) -> Result<PathBuf, BoxError> {
        let relative = Path::new(key);
        let safe = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if key.is_empty() || !safe {
            return Err(LocalFileError::InvalidKey(key.to_string()).into());
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl Session for LocalFileSession {
    async fn ping(&self) -> Result<(), BoxError> {
        check_root(&self.root).await
    }

    async fn close(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

#[async_trait]
impl FileSession for LocalFileSession {
    async fn put(&self, key: &str, data: Bytes) -> Result<(), BoxError> {
        let path = self.path_of(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, &data).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, BoxError> {
        let path = self.path_of(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, BoxError> {
        let path = self.path_of(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, BoxError> {
        let mut keys = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&self.root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}
