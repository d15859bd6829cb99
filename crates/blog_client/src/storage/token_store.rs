use std::fmt;
use std::path::Path;
use std::sync::Arc;

use blog_core::TokenPair;
use tokio::sync::Mutex;

use super::{FileStore, KeyValueStore, MemoryStore, StorageResult};

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Single source of truth for the access/refresh token pair.
///
/// Cheap to clone; clones share the same backend. Writes through any clone
/// are serialized, so a conditional write never interleaves with a login or
/// logout.
#[derive(Clone)]
pub struct TokenStore {
    backend: Arc<dyn KeyValueStore>,
    write_lock: Arc<Mutex<()>>,
}

impl fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenStore").finish_non_exhaustive()
    }
}

impl TokenStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            backend,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn file<P: AsRef<Path>>(path: P) -> Self {
        Self::new(Arc::new(FileStore::new(path)))
    }

    /// Persist both tokens, replacing any existing pair.
    pub async fn save(&self, pair: &TokenPair) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;
        self.write_pair(pair).await
    }

    /// Replace the pair only while `refresh` is still the stored refresh
    /// token. Returns whether the write happened.
    pub async fn save_if_current(&self, refresh: &str, pair: &TokenPair) -> StorageResult<bool> {
        let _guard = self.write_lock.lock().await;
        if self.refresh().await?.as_deref() != Some(refresh) {
            return Ok(false);
        }
        self.write_pair(pair).await?;
        Ok(true)
    }

    pub async fn access(&self) -> StorageResult<Option<String>> {
        self.backend.get(ACCESS_TOKEN_KEY).await
    }

    pub async fn refresh(&self) -> StorageResult<Option<String>> {
        self.backend.get(REFRESH_TOKEN_KEY).await
    }

    /// Both tokens, if both are stored.
    pub async fn pair(&self) -> StorageResult<Option<TokenPair>> {
        match (self.access().await?, self.refresh().await?) {
            (Some(access), Some(refresh)) => Ok(Some(TokenPair { access, refresh })),
            _ => Ok(None),
        }
    }

    pub async fn has_access(&self) -> StorageResult<bool> {
        Ok(self.access().await?.is_some())
    }

    /// Whether either token is stored.
    pub async fn has_any(&self) -> StorageResult<bool> {
        Ok(self.access().await?.is_some() || self.refresh().await?.is_some())
    }

    pub async fn clear(&self) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;
        self.remove_pair().await
    }

    /// Remove both tokens only while `refresh` is still the stored refresh
    /// token. Returns whether anything was cleared.
    pub async fn clear_if_current(&self, refresh: &str) -> StorageResult<bool> {
        let _guard = self.write_lock.lock().await;
        if self.refresh().await?.as_deref() != Some(refresh) {
            return Ok(false);
        }
        self.remove_pair().await?;
        Ok(true)
    }

    async fn write_pair(&self, pair: &TokenPair) -> StorageResult<()> {
        self.backend
            .set_many(&[
                (ACCESS_TOKEN_KEY, pair.access.as_str()),
                (REFRESH_TOKEN_KEY, pair.refresh.as_str()),
            ])
            .await
    }

    async fn remove_pair(&self) -> StorageResult<()> {
        self.backend
            .remove_many(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY])
            .await
    }
}
