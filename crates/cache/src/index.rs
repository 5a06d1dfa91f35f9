//! Serialized caching with tag-based invalidation.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::store::CacheStore;
use crate::{CacheError, Result};

/// Lifetime of every cached value.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Caches computed results and tracks list-style results in tags.
///
/// Single-entity entries are plain keys. List entries (pages, searches) are
/// also registered in a tag so that a mutation which may change list
/// membership can drop them all at once. A key is tagged only after its value
/// was written; a failed write never leaves a dangling tag member.
///
/// A reader repopulating a page concurrently with an invalidation may leave a
/// stale page behind. That window is bounded by the TTL.
#[derive(Clone)]
pub struct CacheIndex<C: CacheStore> {
    store: C,
    ttl: Duration,
}

impl<C: CacheStore> CacheIndex<C> {
    /// Creates an index over `store` using [`DEFAULT_TTL`].
    pub fn new(store: C) -> Self {
        Self::with_ttl(store, DEFAULT_TTL)
    }

    /// Creates an index over `store` with a custom TTL.
    pub fn with_ttl(store: C, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &C {
        &self.store
    }

    /// Returns the TTL applied to every write.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Reads and deserializes the value under `key`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        if !self.store.exists(key).await? {
            metrics::counter!("cache_misses_total").increment(1);
            return Ok(None);
        }

        // The entry may expire between EXISTS and GET.
        let Some(raw) = self.store.get(key).await? else {
            metrics::counter!("cache_misses_total").increment(1);
            return Ok(None);
        };

        let value = serde_json::from_str(&raw).map_err(|source| CacheError::Serialization {
            key: key.to_string(),
            source,
        })?;
        metrics::counter!("cache_hits_total").increment(1);
        Ok(Some(value))
    }

    /// Serializes `value` and stores it under `key` with the TTL.
    pub async fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value).map_err(|source| CacheError::Serialization {
            key: key.to_string(),
            source,
        })?;
        self.store.set_with_ttl(key, raw, self.ttl).await
    }

    /// Stores a list-style result and then registers its key under `tag`.
    #[tracing::instrument(skip(self, value))]
    pub async fn put_tagged<T: Serialize>(&self, tag: &str, key: &str, value: &T) -> Result<()> {
        self.put(key, value).await?;
        self.store.set_add(tag, key).await
    }

    /// Returns the cached value, or loads, caches and returns it.
    pub async fn get_or_load<T, E, F, Fut>(&self, key: &str, load: F) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        if let Some(value) = self.get(key).await? {
            return Ok(value);
        }

        let value = load().await?;
        self.put(key, &value).await?;
        Ok(value)
    }

    /// Like [`get_or_load`](Self::get_or_load), registering the key under
    /// `tag` once the value is cached.
    pub async fn get_or_load_tagged<T, E, F, Fut>(
        &self,
        tag: &str,
        key: &str,
        load: F,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        if let Some(value) = self.get(key).await? {
            return Ok(value);
        }

        let value = load().await?;
        self.put_tagged(tag, key, &value).await?;
        Ok(value)
    }

    /// Drops single-entity entries. Missing keys are ignored.
    pub async fn invalidate(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.store.delete(keys).await
    }

    /// Drops every key currently registered under `tag`, then the tag itself.
    ///
    /// The next list read rebuilds the tag lazily. Returns the number of
    /// member keys that were still present.
    #[tracing::instrument(skip(self))]
    pub async fn invalidate_tag(&self, tag: &str) -> Result<u64> {
        let members = self.store.set_members(tag).await?;
        let removed = if members.is_empty() {
            0
        } else {
            self.store.delete(&members).await?
        };
        self.store.delete(&[tag.to_string()]).await?;

        metrics::counter!("cache_invalidated_keys_total").increment(removed);
        tracing::debug!(tag, members = members.len(), removed, "cache tag invalidated");
        Ok(removed)
    }
}
