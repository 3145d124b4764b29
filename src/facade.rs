//! High-level cache facade.

use crate::client::{AsyncCacheClient, CacheClient};
use crate::error::Result;
use crate::manager::CacheManager;
use crate::value::CacheValue;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// A manager plus an optional pinned backend, exposing every cache
/// operation without threading a backend name through call sites.
///
/// Cloning is cheap; clones share the manager.
///
/// # Example
///
/// ```
/// use multicache::{Cache, CacheManager, CacheManagerConfig};
/// use std::sync::Arc;
///
/// let manager = Arc::new(CacheManager::new(CacheManagerConfig::default())?);
/// let cache = Cache::new(manager);
/// cache.blocking_set("greeting", "hello", None)?;
/// assert_eq!(cache.blocking_get("greeting")?, Some("hello".into()));
/// # Ok::<(), multicache::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Cache {
    manager: Arc<CacheManager>,
    backend: Option<String>,
}

impl Cache {
    /// Facade over the manager's default backend.
    pub fn new(manager: Arc<CacheManager>) -> Self {
        Cache {
            manager,
            backend: None,
        }
    }

    /// Facade pinned to one named backend.
    ///
    /// # Errors
    /// Returns `ErrorKind::Configuration` if the manager has no such backend.
    pub fn pinned(manager: Arc<CacheManager>, backend: &str) -> Result<Self> {
        manager.get_backend(Some(backend))?;
        Ok(Cache {
            manager,
            backend: Some(backend.to_string()),
        })
    }

    pub fn manager(&self) -> &Arc<CacheManager> {
        &self.manager
    }

    /// Name of the backend operations go to.
    pub fn backend_name(&self) -> &str {
        self.backend
            .as_deref()
            .unwrap_or_else(|| self.manager.default_backend())
    }

    fn target(&self) -> Option<&str> {
        self.backend.as_deref()
    }

    pub fn client(&self) -> Result<CacheClient> {
        self.manager.using(self.target())
    }

    pub fn async_client(&self) -> Result<AsyncCacheClient> {
        self.manager.using_async(self.target())
    }

    pub async fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        self.manager.get(key, self.target()).await
    }

    /// Get and deserialize into `T`.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(value) => Ok(Some(value.deserialize_into()?)),
            None => Ok(None),
        }
    }

    pub async fn set(
        &self,
        key: &str,
        value: impl Into<CacheValue>,
        ttl: Option<Duration>,
    ) -> Result<()> {
        self.manager.set(key, value, ttl, self.target()).await
    }

    /// Serialize any `T` and store it.
    pub async fn set_as<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        self.set(key, CacheValue::from_serialize(value)?, ttl)
            .await
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.manager.delete(key, self.target()).await
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        self.manager.exists(key, self.target()).await
    }

    pub async fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<CacheValue>>> {
        self.manager.get_many(keys, self.target()).await
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
        self.manager.set_many(entries, ttl, self.target()).await
    }

    pub async fn delete_many(&self, keys: &[&str]) -> Result<()> {
        self.manager.delete_many(keys, self.target()).await
    }

    pub async fn increment(&self, key: &str, amount: i64) -> Result<i64> {
        self.manager.increment(key, amount, self.target()).await
    }

    pub async fn decrement(&self, key: &str, amount: i64) -> Result<i64> {
        self.manager.decrement(key, amount, self.target()).await
    }

    pub async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        self.manager.ttl(key, self.target()).await
    }

    pub async fn touch(&self, key: &str, ttl: Duration) -> Result<()> {
        self.manager.touch(key, ttl, self.target()).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.manager.clear(self.target()).await
    }

    pub async fn is_healthy(&self) -> Result<bool> {
        self.manager.health_check(self.target()).await
    }

    pub async fn close(&self) -> Result<()> {
        self.manager.close(self.target()).await
    }

    pub fn blocking_get(&self, key: &str) -> Result<Option<CacheValue>> {
        self.manager.blocking_get(key, self.target())
    }

    pub fn blocking_get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.blocking_get(key)? {
            Some(value) => Ok(Some(value.deserialize_into()?)),
            None => Ok(None),
        }
    }

    pub fn blocking_set(
        &self,
        key: &str,
        value: impl Into<CacheValue>,
        ttl: Option<Duration>,
    ) -> Result<()> {
        self.manager.blocking_set(key, value, ttl, self.target())
    }

    pub fn blocking_set_as<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        self.blocking_set(key, CacheValue::from_serialize(value)?, ttl)
    }

    pub fn blocking_delete(&self, key: &str) -> Result<()> {
        self.manager.blocking_delete(key, self.target())
    }

    pub fn blocking_exists(&self, key: &str) -> Result<bool> {
        self.manager.blocking_exists(key, self.target())
    }

    pub fn blocking_get_many(&self, keys: &[&str]) -> Result<Vec<Option<CacheValue>>> {
        self.manager.blocking_get_many(keys, self.target())
    }

    pub fn blocking_set_many<K, V>(
        &self,
        entries: impl IntoIterator<Item = (K, V)>,
        ttl: Option<Duration>,
    ) -> Result<()>
    where
        K: Into<String>,
        V: Into<CacheValue>,
    {
        self.manager
            .blocking_set_many(entries, ttl, self.target())
    }

    pub fn blocking_delete_many(&self, keys: &[&str]) -> Result<()> {
        self.manager.blocking_delete_many(keys, self.target())
    }

    pub fn blocking_increment(&self, key: &str, amount: i64) -> Result<i64> {
        self.manager
            .blocking_increment(key, amount, self.target())
    }

    pub fn blocking_decrement(&self, key: &str, amount: i64) -> Result<i64> {
        self.manager
            .blocking_decrement(key, amount, self.target())
    }

    pub fn blocking_ttl(&self, key: &str) -> Result<Option<Duration>> {
        self.manager.blocking_ttl(key, self.target())
    }

    pub fn blocking_touch(&self, key: &str, ttl: Duration) -> Result<()> {
        self.manager.blocking_touch(key, ttl, self.target())
    }

    pub fn blocking_clear(&self) -> Result<()> {
        self.manager.blocking_clear(self.target())
    }

    pub fn blocking_is_healthy(&self) -> Result<bool> {
        self.manager.blocking_health_check(self.target())
    }

    pub fn blocking_close(&self) -> Result<()> {
        self.manager.blocking_close(self.target())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheManagerConfig, MemoryConfig};
    use crate::error::ErrorKind;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct User {
        id: u64,
        name: String,
        tags: Vec<String>,
    }

    fn manager() -> Arc<CacheManager> {
        let config = CacheManagerConfig::new(vec![
            MemoryConfig::new("a").into(),
            MemoryConfig::new("b").into(),
        ]);
        Arc::new(CacheManager::new(config).expect("Failed to create manager"))
    }

    #[tokio::test]
    async fn test_typed_roundtrip() {
        let cache = Cache::new(manager());
        let user = User {
            id: 7,
            name: "Ada".to_string(),
            tags: vec!["admin".to_string()],
        };
        cache
            .set_as("user:7", &user, Some(Duration::from_secs(60)))
            .await
            .expect("Failed to set");
        let loaded: Option<User> = cache.get_as("user:7").await.expect("Failed to get");
        assert_eq!(loaded, Some(user));
        assert_eq!(cache.get_as::<User>("user:8").await.expect("Failed to get"), None);
    }

    #[tokio::test]
    async fn test_pinned_backend_is_isolated() {
        let manager = manager();
        let default = Cache::new(Arc::clone(&manager));
        let pinned = Cache::pinned(Arc::clone(&manager), "b").expect("Failed to pin");
        assert_eq!(default.backend_name(), "a");
        assert_eq!(pinned.backend_name(), "b");

        pinned.set("k", 1, None).await.expect("Failed to set");
        assert_eq!(default.get("k").await.expect("Failed to get"), None);
        assert_eq!(
            pinned.get("k").await.expect("Failed to get"),
            Some(CacheValue::Int(1))
        );

        let err = Cache::pinned(manager, "missing").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_blocking_surface() {
        let cache = Cache::new(manager());
        cache.blocking_set("k", "v", None).expect("Failed to set");
        assert!(cache.blocking_exists("k").expect("Failed to check exists"));
        cache
            .blocking_set_many([("x", 1), ("y", 2)], None)
            .expect("Failed to set many");
        assert_eq!(
            cache.blocking_get_many(&["x", "nope"]).expect("Failed to get many"),
            vec![Some(CacheValue::Int(1)), None]
        );
        assert_eq!(cache.blocking_increment("x", 4).expect("Failed to incr"), 5);
        assert_eq!(cache.blocking_decrement("x", 1).expect("Failed to decr"), 4);
        cache
            .blocking_touch("x", Duration::from_secs(10))
            .expect("Failed to touch");
        assert!(cache.blocking_ttl("x").expect("Failed to get ttl").is_some());
        cache
            .blocking_delete_many(&["x", "y"])
            .expect("Failed to delete many");
        cache.blocking_delete("k").expect("Failed to delete");
        assert!(cache.blocking_is_healthy().expect("Failed health check"));
        cache.blocking_clear().expect("Failed to clear");
        assert_eq!(cache.blocking_get("k").expect("Failed to get"), None);

        let client = cache.client().expect("Failed to get client");
        assert_eq!(client.backend_name(), "a");
        cache.blocking_close().expect("Failed to close");
    }
}
