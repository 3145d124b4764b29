//! Clients bound to a single backend.
//!
//! Both clients are RAII handles: they hold a reference-counted backend and
//! release it when dropped, whichever way the caller's scope is left.

use crate::backend::{Backend, CacheBackend};
use crate::error::Result;
use crate::value::CacheValue;
use std::sync::Arc;
use std::time::Duration;

/// Blocking client for one backend.
///
/// Each call runs the backend's async implementation to completion on the
/// calling thread. See [`crate::runtime`] for where that is allowed.
#[derive(Debug, Clone)]
pub struct CacheClient {
    backend: Arc<Backend>,
}

impl CacheClient {
    pub fn new(backend: Arc<Backend>) -> Self {
        CacheClient { backend }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        self.backend.block_on(self.backend.get(key))
    }

    pub fn set(&self, key: &str, value: impl Into<CacheValue>, ttl: Option<Duration>) -> Result<()> {
        self.backend
            .block_on(self.backend.set(key, value.into(), ttl))
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        self.backend.block_on(self.backend.delete(key))
    }

    pub fn exists(&self, key: &str) -> Result<bool> {
        self.backend.block_on(self.backend.exists(key))
    }

    /// Values for `keys` in order; `None` marks a missing key.
    pub fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<CacheValue>>> {
        self.backend.block_on(self.backend.mget(keys))
    }

    pub fn set_many<K, V>(
        &self,
        entries: impl IntoIterator<Item = (K, V)>,
        ttl: Option<Duration>,
    ) -> Result<()>
    where
        K: Into<String>,
        V: Into<CacheValue>,
    {
        let entries = collect_entries(entries);
        self.backend.block_on(self.backend.mset(entries, ttl))
    }

    pub fn delete_many(&self, keys: &[&str]) -> Result<()> {
        self.backend.block_on(self.backend.mdelete(keys))
    }

    pub fn increment(&self, key: &str, amount: i64) -> Result<i64> {
        self.backend
            .block_on(self.backend.increment(key, amount))
    }

    pub fn decrement(&self, key: &str, amount: i64) -> Result<i64> {
        self.backend
            .block_on(self.backend.decrement(key, amount))
    }

    pub fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        self.backend.block_on(self.backend.ttl(key))
    }

    pub fn touch(&self, key: &str, ttl: Duration) -> Result<()> {
        self.backend.block_on(self.backend.touch(key, ttl))
    }

    pub fn clear(&self) -> Result<()> {
        self.backend.block_on(self.backend.clear_all())
    }

    pub fn is_healthy(&self) -> Result<bool> {
        self.backend.block_on(self.backend.health_check())
    }
}

impl Drop for CacheClient {
    fn drop(&mut self) {
        trace!("Released cache client for backend '{}'", self.backend.name());
    }
}

/// Async client for one backend.
#[derive(Debug, Clone)]
pub struct AsyncCacheClient {
    backend: Arc<Backend>,
}

impl AsyncCacheClient {
    pub fn new(backend: Arc<Backend>) -> Self {
        AsyncCacheClient { backend }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub async fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        self.backend.get(key).await
    }

    pub async fn set(
        &self,
        key: &str,
        value: impl Into<CacheValue>,
        ttl: Option<Duration>,
    ) -> Result<()> {
        self.backend.set(key, value.into(), ttl).await
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.backend.delete(key).await
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        self.backend.exists(key).await
    }

    /// Values for `keys` in order; `None` marks a missing key.
    pub async fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<CacheValue>>> {
        self.backend.mget(keys).await
    }

    pub async fn set_many<K, V>(
        &self,
        entries: impl IntoIterator<Item = (K, V)>,
        ttl: Option<Duration>,
    ) -> Result<()>
    where
        K: Into<String>,
        V: Into<CacheValue>,
    {
        self.backend.mset(collect_entries(entries), ttl).await
    }

    pub async fn delete_many(&self, keys: &[&str]) -> Result<()> {
        self.backend.mdelete(keys).await
    }

    pub async fn increment(&self, key: &str, amount: i64) -> Result<i64> {
        self.backend.increment(key, amount).await
    }

    pub async fn decrement(&self, key: &str, amount: i64) -> Result<i64> {
        self.backend.decrement(key, amount).await
    }

    pub async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        self.backend.ttl(key).await
    }

    pub async fn touch(&self, key: &str, ttl: Duration) -> Result<()> {
        self.backend.touch(key, ttl).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.backend.clear_all().await
    }

    pub async fn is_healthy(&self) -> Result<bool> {
        self.backend.health_check().await
    }
}

impl Drop for AsyncCacheClient {
    fn drop(&mut self) {
        trace!("Released async cache client for backend '{}'", self.backend.name());
    }
}

fn collect_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Vec<(String, CacheValue)>
where
    K: Into<String>,
    V: Into<CacheValue>,
{
    entries
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::config::MemoryConfig;

    fn memory() -> Arc<Backend> {
        Arc::new(Backend::Memory(InMemoryBackend::new(MemoryConfig::new("m"))))
    }

    #[test]
    fn test_blocking_client() {
        let client = CacheClient::new(memory());
        client.set("k", 1, None).expect("Failed to set");
        assert_eq!(client.get("k").expect("Failed to get"), Some(CacheValue::Int(1)));
        client
            .set_many([("a", 1), ("b", 2)], None)
            .expect("Failed to set many");
        assert_eq!(
            client.get_many(&["a", "b", "zz"]).expect("Failed to get many"),
            vec![Some(CacheValue::Int(1)), Some(CacheValue::Int(2)), None]
        );
        assert_eq!(client.increment("n", 3).expect("Failed to incr"), 3);
        assert!(client.is_healthy().expect("Failed health check"));
        client.clear().expect("Failed to clear");
        assert!(!client.exists("k").expect("Failed to check exists"));
    }

    #[tokio::test]
    async fn test_client_releases_backend_on_drop() {
        let backend = memory();
        {
            let client = AsyncCacheClient::new(Arc::clone(&backend));
            assert_eq!(Arc::strong_count(&backend), 2);
            client.set("k", "v", None).await.expect("Failed to set");
        }
        assert_eq!(Arc::strong_count(&backend), 1);

        let early_exit = async {
            let client = AsyncCacheClient::new(Arc::clone(&backend));
            client.increment("k", 1).await?;
            Ok::<_, crate::Error>(())
        };
        assert!(early_exit.await.is_err());
        assert_eq!(Arc::strong_count(&backend), 1);
    }
}
