//! Counter/cache store used for per-target rolling state.
//!
//! The engine only needs a small key-value contract: small integers and
//! ordered integer lists, each with an optional time-to-live.

mod memory;

pub use memory::*;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Cache error types.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
    #[error("unexpected value type under key {0}")]
    TypeMismatch(String),
}

/// A value held by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CacheValue {
    Counter(i64),
    Samples(Vec<u64>),
}

/// Key-value store with optional expiry.
///
/// No transactional guarantees: a `get` followed by a `set` can interleave
/// with another caller doing the same on the same key.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheValue>, CacheError>;

    async fn set(
        &self,
        key: &str,
        value: CacheValue,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError>;

    async fn remove(&self, key: &str) -> Result<(), CacheError>;

    /// Atomically add `delta` to a counter and return the new value.
    ///
    /// Stores without a native counter primitive return `Ok(None)` and
    /// callers fall back to read-increment-write.
    async fn increment(
        &self,
        _key: &str,
        _delta: i64,
        _ttl: Option<Duration>,
    ) -> Result<Option<i64>, CacheError> {
        Ok(None)
    }
}

/// Read a counter, treating an absent key as zero.
pub async fn get_counter(store: &dyn CacheStore, key: &str) -> Result<i64, CacheError> {
    match store.get(key).await? {
        None => Ok(0),
        Some(CacheValue::Counter(n)) => Ok(n),
        Some(CacheValue::Samples(_)) => Err(CacheError::TypeMismatch(key.to_string())),
    }
}

/// Read a sample list, treating an absent key as empty.
pub async fn get_samples(store: &dyn CacheStore, key: &str) -> Result<Vec<u64>, CacheError> {
    match store.get(key).await? {
        None => Ok(Vec::new()),
        Some(CacheValue::Samples(samples)) => Ok(samples),
        Some(CacheValue::Counter(_)) => Err(CacheError::TypeMismatch(key.to_string())),
    }
}
