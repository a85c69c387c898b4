//! Durable token storage.
//!
//! The session manager never touches storage media directly; it goes through
//! [`TokenStore`] so tests and embedders can swap the backing store.

use crate::api::TokenPair;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs as async_fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt token file {path}: {message}")]
    Corrupt { path: PathBuf, message: String },
}

impl From<StorageError> for crate::error::SyncError {
    fn from(error: StorageError) -> Self {
        crate::error::SyncError::Storage(error.to_string())
    }
}

/// Persistence capability for the access/refresh token pair.
///
/// `save` must persist both tokens in one atomic step: after it returns,
/// a subsequent `load` sees either the complete new pair or the old state.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn load(&self) -> Result<Option<TokenPair>, StorageError>;

    async fn save(&self, tokens: &TokenPair) -> Result<(), StorageError>;

    async fn clear(&self) -> Result<(), StorageError>;
}

/// Volatile store for tests and short-lived processes
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<Option<TokenPair>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(tokens: TokenPair) -> Self {
        Self {
            tokens: RwLock::new(Some(tokens)),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Result<Option<TokenPair>, StorageError> {
        Ok(self.tokens.read().await.clone())
    }

    async fn save(&self, tokens: &TokenPair) -> Result<(), StorageError> {
        *self.tokens.write().await = Some(tokens.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        *self.tokens.write().await = None;
        Ok(())
    }
}

/// JSON file store written through a temp file and rename
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<TokenPair>, StorageError> {
        let content = match async_fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StorageError::Corrupt {
                path: self.path.clone(),
                message: e.to_string(),
            })
    }

    async fn save(&self, tokens: &TokenPair) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            async_fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let content = serde_json::to_vec_pretty(tokens).map_err(|e| StorageError::Corrupt {
            path: self.path.clone(),
            message: e.to_string(),
        })?;

        let temp_path = self.temp_path();
        let mut file = async_fs::File::create(&temp_path)
            .await
            .map_err(|e| self.io_error(e))?;
        file.write_all(&content).await.map_err(|e| self.io_error(e))?;
        file.sync_all().await.map_err(|e| self.io_error(e))?;
        drop(file);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            if let Err(e) = async_fs::set_permissions(&temp_path, permissions).await {
                warn!("Could not restrict token file permissions: {}", e);
            }
        }

        async_fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        debug!("Persisted tokens to {:?}", self.path);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        match async_fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}
