//! C1 — the pluggable storage backend. A narrow key/value + lock contract
//! (spec.md §4.1) that the room layer (C2) builds transactional domain
//! operations on top of. Handlers never see backend details; adding a
//! fourth backend means implementing `Store`, nothing else.

pub mod fs;
#[cfg(feature = "storage-redis")]
pub mod redis_backend;
#[cfg(feature = "storage-sql")]
pub mod sql;

use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    Acquired,
    HeldByOther(String),
}

#[derive(Debug, thiserror::Error, Clone)]
pub enum StorageError {
    #[error("transient storage failure: {0}")]
    Transient(String),
    #[error("fatal storage failure: {0}")]
    Fatal(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// A single key/value entry returned from a prefix scan.
pub type ScanEntry = (String, Vec<u8>);

/// Narrow key/value store with atomic compare-and-swap and TTL-based locks.
/// Every method here is documented to be atomic at its own granularity;
/// callers compose several calls into a higher-level transaction by
/// retrying on `Conflict` (see `room::retry`).
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;
    async fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> StorageResult<()>;

    /// Succeeds (returns `true`) only if the current value equals `expected`
    /// (`None` meaning absent). On success the key is set to `new`.
    async fn compare_and_put(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: &[u8],
    ) -> StorageResult<bool>;

    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Lexicographically ordered entries whose key starts with `prefix`.
    async fn scan(&self, prefix: &str) -> StorageResult<Vec<ScanEntry>>;

    async fn lock(&self, name: &str, owner: &str, ttl: Duration) -> StorageResult<LockOutcome>;

    /// Releases the lock only if `owner` currently holds it.
    async fn unlock(&self, name: &str, owner: &str) -> StorageResult<bool>;

    /// Backend-driven expiry sweep. A no-op for backends (like Redis) whose
    /// native TTL already reclaims expired entries.
    async fn tick(&self) -> StorageResult<()>;
}

/// Retry a transient-prone storage operation with bounded exponential backoff,
/// per spec.md §4.1's failure policy.
pub async fn with_retry<T, F, Fut>(mut op: F) -> StorageResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = StorageResult<T>>,
{
    const DELAYS_MS: [u64; 3] = [50, 100, 200];
    let mut last_err = None;
    for delay in DELAYS_MS {
        match op().await {
            Ok(v) => return Ok(v),
            Err(StorageError::Transient(msg)) => {
                last_err = Some(StorageError::Transient(msg));
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            Err(e @ StorageError::Fatal(_)) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| StorageError::Transient("retry exhausted".into())))
}
