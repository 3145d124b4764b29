//! Cache backend implementations.

use crate::config::BackendType;
use crate::error::Result;
use crate::value::CacheValue;
use std::future::Future;
use std::time::Duration;

pub mod file;
pub mod inmemory;
#[cfg(feature = "redis")]
pub mod redis;
pub mod remote;

pub use file::FileBackend;
pub use inmemory::InMemoryBackend;
#[cfg(feature = "redis")]
pub use self::redis::RedisClient;
pub use remote::{ClientError, ClientResult, RemoteBackend, RemoteClient};

/// Trait for cache backend implementations.
///
/// Every backend normalizes keys with [`crate::key::normalize_key`] before
/// use and treats expired entries as absent (lazy eviction: the entry is
/// dropped by the access that notices it).
///
/// **IMPORTANT:** All methods use `&self` instead of `&mut self` to allow concurrent access.
/// Backend implementations use interior mutability or external storage.
///
/// **ASYNC:** All methods are async. Blocking callers go through
/// [`crate::client::CacheClient`], which drives these futures to completion
/// on the calling thread.
#[allow(async_fn_in_trait)]
pub trait CacheBackend: Send + Sync {
    /// Configured backend name.
    fn name(&self) -> &str;

    fn backend_type(&self) -> BackendType;

    /// Retrieve value from cache by key.
    ///
    /// # Returns
    /// - `Ok(Some(value))` - Value found in cache
    /// - `Ok(None)` - Cache miss (absent or expired)
    ///
    /// # Errors
    /// Returns `Err` for invalid keys, corrupted stored data, or backend failures
    async fn get(&self, key: &str) -> Result<Option<CacheValue>>;

    /// Store value in cache with optional TTL.
    ///
    /// # Arguments
    /// - `key`: Cache key
    /// - `value`: Value to store
    /// - `ttl`: Time-to-live. `None` = never expires, `Duration::ZERO` = already expired
    ///
    /// # Errors
    /// Returns `Err` if the value cannot be serialized or the backend fails
    async fn set(&self, key: &str, value: CacheValue, ttl: Option<Duration>) -> Result<()>;

    /// Remove value from cache. Removing an absent key is not an error.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if a live entry exists for `key`.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Bulk get operation.
    ///
    /// Returns one slot per requested key, in order; `None` marks a missing key.
    /// Default implementation calls `get()` for each key.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs, never for missing keys
    async fn mget(&self, keys: &[&str]) -> Result<Vec<Option<CacheValue>>> {
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            results.push(self.get(key).await?);
        }
        Ok(results)
    }

    /// Bulk set operation; every entry gets the same TTL.
    ///
    /// Default implementation calls `set()` for each entry.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    async fn mset(&self, entries: Vec<(String, CacheValue)>, ttl: Option<Duration>) -> Result<()> {
        for (key, value) in entries {
            self.set(&key, value, ttl).await?;
        }
        Ok(())
    }

    /// Bulk delete operation. Idempotent.
    ///
    /// Default implementation calls `delete()` for each key.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    async fn mdelete(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.delete(key).await?;
        }
        Ok(())
    }

    /// Add `amount` to the integer at `key`, creating it at 0 if absent.
    ///
    /// # Errors
    /// - `ErrorKind::Key` if `amount` is negative
    /// - `ErrorKind::Backend` if the stored value is not an integer
    async fn increment(&self, key: &str, amount: i64) -> Result<i64>;

    /// Subtract `amount` from the integer at `key`, creating it at 0 if absent.
    ///
    /// # Errors
    /// Same as [`CacheBackend::increment`]
    async fn decrement(&self, key: &str, amount: i64) -> Result<i64>;

    /// Remaining TTL of `key`; `None` if absent or without expiry.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    async fn ttl(&self, key: &str) -> Result<Option<Duration>>;

    /// Replace the TTL of an existing key. No-op if the key is absent.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    async fn touch(&self, key: &str, ttl: Duration) -> Result<()>;

    /// Remove every entry managed by this backend.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    async fn clear_all(&self) -> Result<()>;

    /// Health check - verify backend is accessible.
    ///
    /// Failures are reported as `Ok(false)`, not as errors.
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    /// Release held resources. Safe to call more than once.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A configured backend of any supported kind.
///
/// Built by [`crate::factory::CacheBackendFactory`]; the manager routes
/// operations to these by name.
pub enum Backend {
    Memory(InMemoryBackend),
    File(FileBackend),
    #[cfg(feature = "redis")]
    Remote(RemoteBackend<RedisClient>),
}

macro_rules! dispatch {
    ($self:ident, $backend:ident => $call:expr) => {
        match $self {
            Backend::Memory($backend) => $call,
            Backend::File($backend) => $call,
            #[cfg(feature = "redis")]
            Backend::Remote($backend) => $call,
        }
    };
}

impl Backend {
    /// Drive a future of this backend to completion on the calling thread.
    ///
    /// Memory futures never suspend and run inline; file and remote futures
    /// run on the shared runtime (see [`crate::runtime::block_on`]).
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        match self {
            Backend::Memory(_) => futures::executor::block_on(future),
            _ => crate::runtime::block_on(future),
        }
    }
}

impl CacheBackend for Backend {
    fn name(&self) -> &str {
        dispatch!(self, b => b.name())
    }

    fn backend_type(&self) -> BackendType {
        dispatch!(self, b => b.backend_type())
    }

    async fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        dispatch!(self, b => b.get(key).await)
    }

    async fn set(&self, key: &str, value: CacheValue, ttl: Option<Duration>) -> Result<()> {
        dispatch!(self, b => b.set(key, value, ttl).await)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        dispatch!(self, b => b.delete(key).await)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        dispatch!(self, b => b.exists(key).await)
    }

    async fn mget(&self, keys: &[&str]) -> Result<Vec<Option<CacheValue>>> {
        dispatch!(self, b => b.mget(keys).await)
    }

    async fn mset(&self, entries: Vec<(String, CacheValue)>, ttl: Option<Duration>) -> Result<()> {
        dispatch!(self, b => b.mset(entries, ttl).await)
    }

    async fn mdelete(&self, keys: &[&str]) -> Result<()> {
        dispatch!(self, b => b.mdelete(keys).await)
    }

    async fn increment(&self, key: &str, amount: i64) -> Result<i64> {
        dispatch!(self, b => b.increment(key, amount).await)
    }

    async fn decrement(&self, key: &str, amount: i64) -> Result<i64> {
        dispatch!(self, b => b.decrement(key, amount).await)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        dispatch!(self, b => b.ttl(key).await)
    }

    async fn touch(&self, key: &str, ttl: Duration) -> Result<()> {
        dispatch!(self, b => b.touch(key, ttl).await)
    }

    async fn clear_all(&self) -> Result<()> {
        dispatch!(self, b => b.clear_all().await)
    }

    async fn health_check(&self) -> Result<bool> {
        dispatch!(self, b => b.health_check().await)
    }

    async fn close(&self) -> Result<()> {
        dispatch!(self, b => b.close().await)
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("name", &self.name())
            .field("backend_type", &self.backend_type())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfig;

    #[tokio::test]
    async fn test_backend_exists_default() {
        let backend = Backend::Memory(InMemoryBackend::new(MemoryConfig::new("m")));
        backend
            .set("key", CacheValue::Int(1), None)
            .await
            .expect("Failed to set key");
        assert!(backend.exists("key").await.expect("Failed to check exists"));
        assert!(!backend
            .exists("nonexistent")
            .await
            .expect("Failed to check exists"));
        assert_eq!(backend.name(), "m");
        assert_eq!(backend.backend_type(), BackendType::Memory);
    }

    #[test]
    fn test_memory_block_on_runs_inline() {
        let backend = Backend::Memory(InMemoryBackend::new(MemoryConfig::new("m")));
        backend
            .block_on(backend.set("k", CacheValue::from("v"), None))
            .expect("Failed to set key");
        let value = backend.block_on(backend.get("k")).expect("Failed to get key");
        assert_eq!(value, Some(CacheValue::from("v")));
    }
}
