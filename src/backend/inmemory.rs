//! In-memory cache backend.

use super::CacheBackend;
use crate::config::{BackendType, MemoryConfig};
use crate::error::{CacheOperation, Error, Result};
use crate::expiry::{compute_expiry, is_expired, remaining_ttl};
use crate::key::normalize_key;
use crate::value::CacheValue;
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Entry {
    value: CacheValue,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: CacheValue, ttl: Option<Duration>) -> Self {
        Entry {
            value,
            expires_at: compute_expiry(ttl),
        }
    }

    fn is_expired(&self) -> bool {
        is_expired(self.expires_at)
    }
}

/// In-memory cache backend.
///
/// Values are stored natively, without serialization. Expired entries are
/// removed by the next access that sees them; there is no background sweeper.
///
/// With `thread_safe` enabled (the default) every operation, including the
/// bulk ones, runs under one backend-wide lock. With it disabled there is no
/// backend-wide lock: single-key operations stay atomic per key, but bulk
/// operations may interleave with other callers.
///
/// # Example
///
/// ```
/// # use multicache::backend::{CacheBackend, InMemoryBackend};
/// # use multicache::config::MemoryConfig;
/// # async fn example() -> multicache::Result<()> {
/// let backend = InMemoryBackend::new(MemoryConfig::new("mem"));
/// backend.set("key", "value".into(), None).await?;
/// assert!(backend.get("key").await?.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct InMemoryBackend {
    name: Arc<str>,
    entries: Arc<DashMap<String, Entry>>,
    lock: Option<Arc<Mutex<()>>>,
}

impl InMemoryBackend {
    pub fn new(config: MemoryConfig) -> Self {
        info!(
            "✓ Memory backend '{}' initialized (thread_safe: {})",
            config.name, config.thread_safe
        );
        InMemoryBackend {
            name: config.name.into(),
            entries: Arc::new(DashMap::new()),
            lock: config.thread_safe.then(|| Arc::new(Mutex::new(()))),
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let _guard = self.guard();
        self.entries.iter().filter(|e| !e.is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_thread_safe(&self) -> bool {
        self.lock.is_some()
    }

    fn guard(&self) -> Option<MutexGuard<'_, ()>> {
        self.lock.as_ref().map(|lock| lock.lock())
    }

    /// Apply `f` to the live entry for `key`, dropping it if expired.
    fn live<R>(&self, key: &str, f: impl FnOnce(&Entry) -> R) -> Option<R> {
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => return Some(f(&entry)),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, e| e.is_expired());
            debug!("Memory key {} expired, evicted", key);
        }
        None
    }

    fn read(&self, key: &str) -> Option<CacheValue> {
        let value = self.live(key, |e| e.value.clone());
        debug!(
            "✓ Memory GET {} -> {}",
            key,
            if value.is_some() { "HIT" } else { "MISS" }
        );
        value
    }

    fn add(&self, key: &str, delta: i64, operation: CacheOperation) -> Result<i64> {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(CacheValue::Int(0), None));
        if entry.is_expired() {
            *entry = Entry::new(CacheValue::Int(0), None);
        }

        let current = entry.value.as_i64().ok_or_else(|| {
            self.error(Error::backend("stored value is not an integer"), operation, key)
        })?;
        let next = current
            .checked_add(delta)
            .ok_or_else(|| self.error(Error::backend("integer overflow"), operation, key))?;
        entry.value = CacheValue::Int(next);
        Ok(next)
    }

    fn error(&self, err: Error, operation: CacheOperation, key: &str) -> Error {
        err.with_operation(operation)
            .with_key(key)
            .with_backend(&self.name, BackendType::Memory.as_str())
    }
}

impl CacheBackend for InMemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Memory
    }

    async fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        let key = normalize_key(key)?;
        let _guard = self.guard();
        Ok(self.read(&key))
    }

    async fn set(&self, key: &str, value: CacheValue, ttl: Option<Duration>) -> Result<()> {
        let key = normalize_key(key)?;
        let _guard = self.guard();
        if let Some(d) = ttl {
            debug!("✓ Memory SET {} (TTL: {:?})", key, d);
        } else {
            debug!("✓ Memory SET {}", key);
        }
        self.entries.insert(key, Entry::new(value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let key = normalize_key(key)?;
        let _guard = self.guard();
        self.entries.remove(&key);
        debug!("✓ Memory DELETE {}", key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let key = normalize_key(key)?;
        let _guard = self.guard();
        Ok(self.live(&key, |_| ()).is_some())
    }

    async fn mget(&self, keys: &[&str]) -> Result<Vec<Option<CacheValue>>> {
        let keys = crate::key::normalize_keys(keys)?;
        let _guard = self.guard();
        Ok(keys.iter().map(|key| self.read(key)).collect())
    }

    async fn mset(&self, entries: Vec<(String, CacheValue)>, ttl: Option<Duration>) -> Result<()> {
        let entries = entries
            .into_iter()
            .map(|(key, value)| Ok((normalize_key(&key)?, value)))
            .collect::<Result<Vec<_>>>()?;
        let _guard = self.guard();
        let count = entries.len();
        for (key, value) in entries {
            self.entries.insert(key, Entry::new(value, ttl));
        }
        debug!("✓ Memory MSET {} keys", count);
        Ok(())
    }

    async fn mdelete(&self, keys: &[&str]) -> Result<()> {
        let keys = crate::key::normalize_keys(keys)?;
        let _guard = self.guard();
        for key in &keys {
            self.entries.remove(key);
        }
        debug!("✓ Memory MDELETE {} keys", keys.len());
        Ok(())
    }

    async fn increment(&self, key: &str, amount: i64) -> Result<i64> {
        let key = normalize_key(key)?;
        if amount < 0 {
            return Err(Error::invalid_amount(CacheOperation::Incr, &key, amount));
        }
        let _guard = self.guard();
        self.add(&key, amount, CacheOperation::Incr)
    }

    async fn decrement(&self, key: &str, amount: i64) -> Result<i64> {
        let key = normalize_key(key)?;
        if amount < 0 {
            return Err(Error::invalid_amount(CacheOperation::Decr, &key, amount));
        }
        let _guard = self.guard();
        self.add(&key, -amount, CacheOperation::Decr)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let key = normalize_key(key)?;
        let _guard = self.guard();
        Ok(self.live(&key, |e| remaining_ttl(e.expires_at)).flatten())
    }

    async fn touch(&self, key: &str, ttl: Duration) -> Result<()> {
        let key = normalize_key(key)?;
        let _guard = self.guard();
        let expired = match self.entries.get_mut(&key) {
            Some(mut entry) if !entry.is_expired() => {
                entry.expires_at = compute_expiry(Some(ttl));
                false
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(&key, |_, e| e.is_expired());
        }
        Ok(())
    }

    async fn clear_all(&self) -> Result<()> {
        let _guard = self.guard();
        self.entries.clear();
        warn!("⚠ Memory backend '{}' cleared", self.name);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        debug!("Memory backend '{}' closed", self.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn backend() -> InMemoryBackend {
        InMemoryBackend::new(MemoryConfig::new("m"))
    }

    #[tokio::test]
    async fn test_set_get_exists_delete_and_clear() {
        let backend = backend();
        backend
            .set("k", CacheValue::from("v"), None)
            .await
            .expect("Failed to set");
        assert_eq!(
            backend.get("k").await.expect("Failed to get"),
            Some(CacheValue::from("v"))
        );
        assert!(backend.exists("k").await.expect("Failed to check exists"));

        backend.delete("k").await.expect("Failed to delete");
        assert_eq!(backend.get("k").await.expect("Failed to get"), None);
        backend.delete("k").await.expect("Deleting twice is fine");

        backend
            .set("a", CacheValue::Int(1), None)
            .await
            .expect("Failed to set");
        backend.clear_all().await.expect("Failed to clear");
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_keys_are_normalized() {
        let backend = backend();
        backend
            .set("  key\t", CacheValue::Int(1), None)
            .await
            .expect("Failed to set");
        assert_eq!(
            backend.get("key\u{200b}").await.expect("Failed to get"),
            Some(CacheValue::Int(1))
        );

        let err = backend.get("   ").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Key);
    }

    #[tokio::test]
    async fn test_zero_ttl_is_expired_immediately() {
        for thread_safe in [true, false] {
            let backend = InMemoryBackend::new(MemoryConfig::new("m").with_thread_safe(thread_safe));
            backend
                .set("e", CacheValue::Int(1), Some(Duration::ZERO))
                .await
                .expect("Failed to set");
            assert_eq!(backend.get("e").await.expect("Failed to get"), None);
            assert!(!backend.exists("e").await.expect("Failed to check exists"));
            assert_eq!(backend.len(), 0);
        }
    }

    #[tokio::test]
    async fn test_mget_purges_expired_and_marks_missing() {
        let backend = InMemoryBackend::new(MemoryConfig::new("m").with_thread_safe(false));
        backend
            .set("k1", CacheValue::Int(1), None)
            .await
            .expect("Failed to set");
        backend
            .set("k2", CacheValue::Int(2), Some(Duration::ZERO))
            .await
            .expect("Failed to set");

        let got = backend
            .mget(&["k1", "k2", "missing"])
            .await
            .expect("Failed to mget");
        assert_eq!(got, vec![Some(CacheValue::Int(1)), None, None]);
    }

    #[tokio::test]
    async fn test_bulk_operations() {
        let backend = backend();
        backend
            .mset(
                vec![
                    ("a".to_string(), CacheValue::Int(1)),
                    ("b".to_string(), CacheValue::Int(2)),
                ],
                None,
            )
            .await
            .expect("Failed to mset");
        let got = backend.mget(&["a", "b", "c"]).await.expect("Failed to mget");
        assert_eq!(got, vec![Some(CacheValue::Int(1)), Some(CacheValue::Int(2)), None]);

        backend
            .mdelete(&["a", "b", "never-set"])
            .await
            .expect("Failed to mdelete");
        assert_eq!(backend.get("a").await.expect("Failed to get"), None);
        assert_eq!(backend.get("b").await.expect("Failed to get"), None);
    }

    #[tokio::test]
    async fn test_increment_decrement_and_validation() {
        let backend = backend();
        assert_eq!(backend.increment("c", 1).await.expect("Failed to incr"), 1);
        assert_eq!(backend.increment("c", 5).await.expect("Failed to incr"), 6);
        assert_eq!(backend.decrement("c", 6).await.expect("Failed to decr"), 0);
        assert_eq!(backend.decrement("fresh", 2).await.expect("Failed to decr"), -2);

        let err = backend.increment("c", -1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Key);
        let err = backend.decrement("c", -1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Key);
    }

    #[tokio::test]
    async fn test_increment_non_integer_fails() {
        let backend = backend();
        backend
            .set("s", CacheValue::from("text"), None)
            .await
            .expect("Failed to set");
        let err = backend.increment("s", 1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Backend);
        assert_eq!(err.details()["backend_type"], "memory");
    }

    #[tokio::test]
    async fn test_increment_keeps_ttl() {
        let backend = backend();
        backend
            .set("n", CacheValue::Int(1), Some(Duration::from_secs(60)))
            .await
            .expect("Failed to set");
        backend.increment("n", 1).await.expect("Failed to incr");
        assert!(backend.ttl("n").await.expect("Failed to get ttl").is_some());
    }

    #[tokio::test]
    async fn test_ttl_and_touch() {
        let backend = backend();
        backend
            .set("k", CacheValue::from("v"), None)
            .await
            .expect("Failed to set");
        assert_eq!(backend.ttl("k").await.expect("Failed to get ttl"), None);

        backend
            .touch("k", Duration::from_secs(30))
            .await
            .expect("Failed to touch");
        let left = backend
            .ttl("k")
            .await
            .expect("Failed to get ttl")
            .expect("TTL should be set");
        assert!(left <= Duration::from_secs(30));

        backend
            .touch("missing", Duration::from_secs(30))
            .await
            .expect("Touch on missing key is a no-op");
        assert!(!backend.exists("missing").await.expect("Failed to check exists"));
        assert_eq!(backend.ttl("missing").await.expect("Failed to get ttl"), None);
    }

    #[tokio::test]
    async fn test_short_ttl_expires() {
        let backend = backend();
        backend
            .set("k", CacheValue::Int(1), Some(Duration::from_millis(20)))
            .await
            .expect("Failed to set");
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(backend.get("k").await.expect("Failed to get"), None);
    }

    #[tokio::test]
    async fn test_health_and_close_are_idempotent() {
        let backend = backend();
        assert!(backend.health_check().await.expect("Failed health check"));
        backend.close().await.expect("Failed to close");
        backend.close().await.expect("Failed to close twice");
    }

    #[test]
    fn test_thread_safe_concurrent_increments() {
        let backend = backend();
        assert!(backend.is_thread_safe());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let backend = backend.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        futures::executor::block_on(backend.increment("hits", 1))
                            .expect("Failed to incr");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread panicked");
        }

        let total = futures::executor::block_on(backend.get("hits")).expect("Failed to get");
        assert_eq!(total, Some(CacheValue::Int(800)));
    }
}
