//! Cache store trait.

use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// Boundary to the shared key/value cache.
///
/// Every method maps onto a single atomic store command (EXISTS, GET,
/// SET+EXPIRE, DEL, SADD, SMEMBERS, SREM). Callers never hold locks across
/// calls; correctness relies on each command being atomic on its own.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns true if a live value is stored under `key`.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Returns the value stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`, expiring after `ttl`.
    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Deletes the given keys (values or sets) and returns how many existed.
    async fn delete(&self, keys: &[String]) -> Result<u64>;

    /// Adds `member` to the set stored under `set`.
    async fn set_add(&self, set: &str, member: &str) -> Result<()>;

    /// Returns all members of the set stored under `set`.
    async fn set_members(&self, set: &str) -> Result<Vec<String>>;

    /// Removes `members` from the set stored under `set`.
    async fn set_remove(&self, set: &str, members: &[String]) -> Result<u64>;
}
