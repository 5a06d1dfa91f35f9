use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{CacheError, Result, store::CacheStore};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Default)]
struct State {
    values: HashMap<String, Entry>,
    sets: HashMap<String, HashSet<String>>,
}

/// In-memory cache store implementation for testing.
///
/// Expired values are treated as absent and purged lazily on access, the way
/// a real store behaves from the client's point of view.
#[derive(Clone, Default)]
pub struct InMemoryCacheStore {
    state: Arc<RwLock<State>>,
    fail_on_write: Arc<AtomicBool>,
}

impl InMemoryCacheStore {
    /// Creates a new empty in-memory cache store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent `set_with_ttl` calls fail.
    pub fn set_fail_on_write(&self, fail: bool) {
        self.fail_on_write.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of live values.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.state
            .read()
            .await
            .values
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    /// Returns true if no live values are stored.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Returns true if a set is stored under `set`.
    pub async fn has_set(&self, set: &str) -> bool {
        self.state.read().await.sets.contains_key(set)
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let mut state = self.state.write().await;
        match state.values.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                state.values.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        if self.fail_on_write.load(Ordering::SeqCst) {
            return Err(CacheError::Store(format!("write rejected for key '{key}'")));
        }

        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.state.write().await.values.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        let mut state = self.state.write().await;
        let mut removed = 0;
        for key in keys {
            let had_value = state.values.remove(key).is_some();
            let had_set = state.sets.remove(key).is_some();
            if had_value || had_set {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn set_add(&self, set: &str, member: &str) -> Result<()> {
        self.state
            .write()
            .await
            .sets
            .entry(set.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn set_members(&self, set: &str) -> Result<Vec<String>> {
        let state = self.state.read().await;
        let mut members: Vec<String> = state
            .sets
            .get(set)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        Ok(members)
    }

    async fn set_remove(&self, set: &str, members: &[String]) -> Result<u64> {
        let mut state = self.state.write().await;
        let Some(current) = state.sets.get_mut(set) else {
            return Ok(0);
        };

        let removed = members.iter().filter(|m| current.remove(*m)).count() as u64;
        if current.is_empty() {
            state.sets.remove(set);
        }
        Ok(removed)
    }
}
