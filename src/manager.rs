//! Cache manager: owns the configured backends and routes operations to them
//! by name.
//!
//! Every operation takes an optional backend name; `None` selects the
//! default backend. Async methods are the native form; each has a
//! `blocking_` twin for synchronous callers.
//!
//! # Example
//!
//! ```no_run
//! use multicache::config::{CacheManagerConfig, MemoryConfig};
//! use multicache::manager::CacheManager;
//!
//! # async fn example() -> multicache::Result<()> {
//! let config = CacheManagerConfig::new(vec![MemoryConfig::new("m").into()]);
//! let manager = CacheManager::connect(config).await?;
//!
//! manager.set("k", 1, None, None).await?;
//! assert_eq!(manager.get("k", None).await?, Some(1.into()));
//!
//! let client = manager.using_async(Some("m"))?;
//! client.delete("k").await?;
//! # Ok(())
//! # }
//! ```

use crate::backend::{Backend, CacheBackend};
use crate::client::{AsyncCacheClient, CacheClient};
use crate::config::{BackendConfig, CacheManagerConfig};
use crate::error::{CacheOperation, Error, Result};
use crate::factory::CacheBackendFactory;
use crate::value::CacheValue;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Routes cache operations to named backends.
pub struct CacheManager {
    backends: HashMap<String, Arc<Backend>>,
    /// Backend names in configuration order.
    order: Vec<String>,
    default_backend: String,
    closed: Mutex<HashSet<String>>,
}

impl CacheManager {
    /// Validate `config` and construct every enabled backend.
    ///
    /// # Errors
    /// - `ErrorKind::Configuration` for duplicate names, no enabled backend,
    ///   or a `default_backend` that is not an enabled backend
    /// - any error raised while constructing a backend
    pub async fn connect(config: CacheManagerConfig) -> Result<Self> {
        config.validate()?;
        let default_backend = config.resolve_default()?;

        let mut backends = HashMap::new();
        let mut order = Vec::new();
        for backend_config in config.enabled_backends() {
            let backend = CacheBackendFactory::create(backend_config).await?;
            order.push(backend_config.name().to_string());
            backends.insert(backend_config.name().to_string(), Arc::new(backend));
        }

        info!(
            "✓ Cache manager initialized with backends {:?} (default: {})",
            order, default_backend
        );

        Ok(CacheManager {
            backends,
            order,
            default_backend,
            closed: Mutex::new(HashSet::new()),
        })
    }

    /// Blocking form of [`CacheManager::connect`].
    pub fn new(config: CacheManagerConfig) -> Result<Self> {
        let memory_only = config
            .enabled_backends()
            .all(|b| matches!(b, BackendConfig::Memory(_)));
        if memory_only {
            futures::executor::block_on(Self::connect(config))
        } else {
            crate::runtime::block_on(Self::connect(config))
        }
    }

    /// Name of the backend used when an operation names none.
    pub fn default_backend(&self) -> &str {
        &self.default_backend
    }

    /// Backend names in configuration order.
    pub fn backend_names(&self) -> &[String] {
        &self.order
    }

    /// Resolve a backend by name, or the default backend for `None`.
    ///
    /// # Errors
    /// Returns `ErrorKind::Configuration` if no backend has that name.
    pub fn get_backend(&self, name: Option<&str>) -> Result<Arc<Backend>> {
        let name = name.unwrap_or(&self.default_backend);
        self.backends.get(name).cloned().ok_or_else(|| {
            Error::configuration(format!("cache backend '{}' not found", name))
                .with_config_section("backend")
                .with_config_value(name)
        })
    }

    /// Blocking client bound to a backend; released on drop.
    pub fn using(&self, backend: Option<&str>) -> Result<CacheClient> {
        Ok(CacheClient::new(self.get_backend(backend)?))
    }

    /// Async client bound to a backend; released on drop.
    pub fn using_async(&self, backend: Option<&str>) -> Result<AsyncCacheClient> {
        Ok(AsyncCacheClient::new(self.get_backend(backend)?))
    }

    pub async fn get(&self, key: &str, backend: Option<&str>) -> Result<Option<CacheValue>> {
        self.using_async(backend)?.get(key).await
    }

    pub async fn set(
        &self,
        key: &str,
        value: impl Into<CacheValue>,
        ttl: Option<Duration>,
        backend: Option<&str>,
    ) -> Result<()> {
        self.using_async(backend)?.set(key, value, ttl).await
    }

    pub async fn delete(&self, key: &str, backend: Option<&str>) -> Result<()> {
        self.using_async(backend)?.delete(key).await
    }

    pub async fn exists(&self, key: &str, backend: Option<&str>) -> Result<bool> {
        self.using_async(backend)?.exists(key).await
    }

    pub async fn get_many(
        &self,
        keys: &[&str],
        backend: Option<&str>,
    ) -> Result<Vec<Option<CacheValue>>> {
        self.using_async(backend)?.get_many(keys).await
    }

    pub async fn set_many<K, V>(
        &self,
        entries: impl IntoIterator<Item = (K, V)>,
        ttl: Option<Duration>,
        backend: Option<&str>,
    ) -> Result<()>
    where
        K: Into<String>,
        V: Into<CacheValue>,
    {
        self.using_async(backend)?.set_many(entries, ttl).await
    }

    pub async fn delete_many(&self, keys: &[&str], backend: Option<&str>) -> Result<()> {
        self.using_async(backend)?.delete_many(keys).await
    }

    pub async fn increment(&self, key: &str, amount: i64, backend: Option<&str>) -> Result<i64> {
        self.using_async(backend)?.increment(key, amount).await
    }

    pub async fn decrement(&self, key: &str, amount: i64, backend: Option<&str>) -> Result<i64> {
        self.using_async(backend)?.decrement(key, amount).await
    }

    pub async fn ttl(&self, key: &str, backend: Option<&str>) -> Result<Option<Duration>> {
        self.using_async(backend)?.ttl(key).await
    }

    pub async fn touch(&self, key: &str, ttl: Duration, backend: Option<&str>) -> Result<()> {
        self.using_async(backend)?.touch(key, ttl).await
    }

    pub async fn clear(&self, backend: Option<&str>) -> Result<()> {
        self.using_async(backend)?.clear().await
    }

    pub async fn health_check(&self, backend: Option<&str>) -> Result<bool> {
        self.using_async(backend)?.is_healthy().await
    }

    /// Health of every backend, by name.
    pub async fn health_check_all(&self) -> HashMap<String, bool> {
        let mut report = HashMap::with_capacity(self.order.len());
        for name in &self.order {
            let healthy = match self.backends.get(name) {
                Some(backend) => backend.health_check().await.unwrap_or(false),
                None => false,
            };
            report.insert(name.clone(), healthy);
        }
        report
    }

    /// Close one backend, or every backend for `None`.
    ///
    /// Closing is idempotent: a backend is closed at most once, however many
    /// times or from however many places this is called.
    pub async fn close(&self, backend: Option<&str>) -> Result<()> {
        for (name, handle) in self.to_close(backend)? {
            handle.close().await.map_err(|e| {
                e.with_operation(CacheOperation::Close)
            })?;
            info!("Closed cache backend '{}'", name);
        }
        Ok(())
    }

    /// Backends named by `backend` that have not been closed yet, marked
    /// closed.
    fn to_close(&self, backend: Option<&str>) -> Result<Vec<(String, Arc<Backend>)>> {
        let names: Vec<String> = match backend {
            Some(name) => {
                self.get_backend(Some(name))?;
                vec![name.to_string()]
            }
            None => self.order.clone(),
        };

        let mut closed = self.closed.lock();
        Ok(names
            .into_iter()
            .filter(|name| closed.insert(name.clone()))
            .filter_map(|name| {
                let handle = self.backends.get(&name).cloned()?;
                Some((name, handle))
            })
            .collect())
    }

    pub fn blocking_get(&self, key: &str, backend: Option<&str>) -> Result<Option<CacheValue>> {
        self.using(backend)?.get(key)
    }

    pub fn blocking_set(
        &self,
        key: &str,
        value: impl Into<CacheValue>,
        ttl: Option<Duration>,
        backend: Option<&str>,
    ) -> Result<()> {
        self.using(backend)?.set(key, value, ttl)
    }

    pub fn blocking_delete(&self, key: &str, backend: Option<&str>) -> Result<()> {
        self.using(backend)?.delete(key)
    }

    pub fn blocking_exists(&self, key: &str, backend: Option<&str>) -> Result<bool> {
        self.using(backend)?.exists(key)
    }

    pub fn blocking_get_many(
        &self,
        keys: &[&str],
        backend: Option<&str>,
    ) -> Result<Vec<Option<CacheValue>>> {
        self.using(backend)?.get_many(keys)
    }

    pub fn blocking_set_many<K, V>(
        &self,
        entries: impl IntoIterator<Item = (K, V)>,
        ttl: Option<Duration>,
        backend: Option<&str>,
    ) -> Result<()>
    where
        K: Into<String>,
        V: Into<CacheValue>,
    {
        self.using(backend)?.set_many(entries, ttl)
    }

    pub fn blocking_delete_many(&self, keys: &[&str], backend: Option<&str>) -> Result<()> {
        self.using(backend)?.delete_many(keys)
    }

    pub fn blocking_increment(&self, key: &str, amount: i64, backend: Option<&str>) -> Result<i64> {
        self.using(backend)?.increment(key, amount)
    }

    pub fn blocking_decrement(&self, key: &str, amount: i64, backend: Option<&str>) -> Result<i64> {
        self.using(backend)?.decrement(key, amount)
    }

    pub fn blocking_ttl(&self, key: &str, backend: Option<&str>) -> Result<Option<Duration>> {
        self.using(backend)?.ttl(key)
    }

    pub fn blocking_touch(&self, key: &str, ttl: Duration, backend: Option<&str>) -> Result<()> {
        self.using(backend)?.touch(key, ttl)
    }

    pub fn blocking_clear(&self, backend: Option<&str>) -> Result<()> {
        self.using(backend)?.clear()
    }

    pub fn blocking_health_check(&self, backend: Option<&str>) -> Result<bool> {
        self.using(backend)?.is_healthy()
    }

    /// Blocking form of [`CacheManager::close`].
    pub fn blocking_close(&self, backend: Option<&str>) -> Result<()> {
        for (name, handle) in self.to_close(backend)? {
            handle
                .block_on(handle.close())
                .map_err(|e| e.with_operation(CacheOperation::Close))?;
            info!("Closed cache backend '{}'", name);
        }
        Ok(())
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("backends", &self.order)
            .field("default_backend", &self.default_backend)
            .finish()
    }
}
