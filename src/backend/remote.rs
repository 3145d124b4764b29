//! Remote key-value server backend.
//!
//! [`RemoteBackend`] adapts any [`RemoteClient`]; the production client is
//! [`super::RedisClient`]. The backend owns error translation: whatever the
//! client fails with comes out as a [`crate::Error`] of kind `Backend`
//! (or `Timeout`/`Connection`), with the client error kept as the source.

use super::CacheBackend;
use crate::config::{BackendType, RemoteConfig};
use crate::error::{CacheOperation, Error, ErrorKind, Result};
use crate::key::{normalize_key, normalize_keys};
use crate::serialization::Serializer;
use crate::value::CacheValue;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Error produced by a [`RemoteClient`].
pub type ClientError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type of [`RemoteClient`] calls.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Command surface of a pre-connected remote key-value client.
///
/// Values travel as raw bytes; TTLs are whole milliseconds on the way in and
/// server-reported seconds on the way out.
#[allow(async_fn_in_trait)]
pub trait RemoteClient: Send + Sync {
    async fn ping(&self) -> ClientResult<()>;

    async fn get(&self, key: &str) -> ClientResult<Option<Vec<u8>>>;

    /// `SET key value [PX ttl]`.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> ClientResult<()>;

    /// `DEL keys...`; returns how many keys were removed.
    async fn delete(&self, keys: &[String]) -> ClientResult<u64>;

    async fn exists(&self, key: &str) -> ClientResult<bool>;

    async fn mget(&self, keys: &[String]) -> ClientResult<Vec<Option<Vec<u8>>>>;

    /// Pipelined `SET`s in a single round trip.
    async fn pipeline_set(
        &self,
        entries: Vec<(String, Vec<u8>)>,
        ttl: Option<Duration>,
    ) -> ClientResult<()>;

    /// One `SCAN cursor MATCH pattern` page: the next cursor and the keys.
    async fn scan(&self, cursor: u64, pattern: &str) -> ClientResult<(u64, Vec<String>)>;

    async fn incr_by(&self, key: &str, amount: i64) -> ClientResult<i64>;

    async fn decr_by(&self, key: &str, amount: i64) -> ClientResult<i64>;

    /// Server `TTL`: seconds left, `-1` without expiry, `-2` when absent.
    async fn ttl(&self, key: &str) -> ClientResult<i64>;

    /// Server `EXPIRE`; `false` when the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> ClientResult<bool>;

    async fn close(&self) -> ClientResult<()>;
}

/// Remote cache backend.
///
/// Construction pings the server and fails fast with a connection error.
/// Bulk writes are pipelined; `clear_all` walks the keyspace with `SCAN`
/// until the cursor returns to 0.
pub struct RemoteBackend<C: RemoteClient> {
    name: String,
    client: C,
    serializer: Serializer,
    decode_responses: bool,
    timeout: Option<Duration>,
    closed: AtomicBool,
}

impl<C: RemoteClient> RemoteBackend<C> {
    /// Wrap an already connected client.
    ///
    /// # Errors
    /// Returns `ErrorKind::Connection` if the liveness probe fails
    pub async fn with_client(config: RemoteConfig, client: C) -> Result<Self> {
        let backend = RemoteBackend {
            timeout: config.timeout(),
            name: config.name,
            client,
            serializer: Serializer::new(config.serializer),
            decode_responses: config.decode_responses,
            closed: AtomicBool::new(false),
        };

        backend.client.ping().await.map_err(|e| {
            Error::connection(format!("remote backend '{}' failed ping: {}", backend.name, e))
                .with_operation(CacheOperation::Health)
                .with_backend(&backend.name, BackendType::Remote.as_str())
                .with_source(e)
        })?;

        info!(
            "✓ Remote backend '{}' initialized (serializer: {})",
            backend.name,
            backend.serializer.kind()
        );
        Ok(backend)
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn serializer(&self) -> Serializer {
        self.serializer
    }

    /// Run one client call with closed-check, timeout and error translation.
    async fn call<T, F>(&self, operation: CacheOperation, key: Option<&str>, fut: F) -> Result<T>
    where
        F: Future<Output = ClientResult<T>>,
    {
        if self.closed.load(Ordering::Acquire) {
            return Err(self.annotate(
                Error::connection(format!("remote backend '{}' is closed", self.name)),
                operation,
                key,
            ));
        }

        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(self.annotate(
                        Error::timeout(
                            format!("remote {} timed out after {:?}", operation, limit),
                            Some(limit.as_secs_f64()),
                        ),
                        operation,
                        key,
                    ))
                }
            },
            None => fut.await,
        };

        outcome.map_err(|e| {
            self.annotate(
                Error::backend(format!("remote {} failed: {}", operation, e)).with_source(e),
                operation,
                key,
            )
        })
    }

    fn annotate(&self, err: Error, operation: CacheOperation, key: Option<&str>) -> Error {
        let err = err
            .with_operation(operation)
            .with_backend(&self.name, BackendType::Remote.as_str());
        match key {
            Some(key) => err.with_key(key),
            None => err,
        }
    }

    fn encode(&self, key: &str, operation: CacheOperation, value: &CacheValue) -> Result<Vec<u8>> {
        self.serializer
            .encode(value)
            .map_err(|e| self.annotate(e, operation, Some(key)))
    }

    fn decode(&self, key: &str, operation: CacheOperation, raw: &[u8]) -> Result<CacheValue> {
        if self.decode_responses && std::str::from_utf8(raw).is_err() {
            return Err(self.annotate(
                Error::serialization("response is not valid UTF-8"),
                operation,
                Some(key),
            ));
        }
        self.serializer
            .decode(raw)
            .map_err(|e| self.annotate(e, operation, Some(key)))
    }
}

impl<C: RemoteClient> CacheBackend for RemoteBackend<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Remote
    }

    async fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        let key = normalize_key(key)?;
        let raw = self
            .call(CacheOperation::Get, Some(&key), self.client.get(&key))
            .await?;
        match raw {
            Some(raw) => {
                debug!("✓ Remote GET {} -> HIT", key);
                Ok(Some(self.decode(&key, CacheOperation::Get, &raw)?))
            }
            None => {
                debug!("✓ Remote GET {} -> MISS", key);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: CacheValue, ttl: Option<Duration>) -> Result<()> {
        let key = normalize_key(key)?;
        let raw = self.encode(&key, CacheOperation::Set, &value)?;

        if ttl == Some(Duration::ZERO) {
            // Written and already expired: the key must read as absent.
            let keys = [key.clone()];
            self.call(CacheOperation::Set, Some(&key), self.client.delete(&keys))
                .await?;
            return Ok(());
        }

        self.call(CacheOperation::Set, Some(&key), self.client.set(&key, raw, ttl))
            .await?;
        debug!("✓ Remote SET {}", key);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let key = normalize_key(key)?;
        let keys = [key.clone()];
        self.call(CacheOperation::Delete, Some(&key), self.client.delete(&keys))
            .await?;
        debug!("✓ Remote DELETE {}", key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let key = normalize_key(key)?;
        self.call(CacheOperation::Exists, Some(&key), self.client.exists(&key))
            .await
    }

    async fn mget(&self, keys: &[&str]) -> Result<Vec<Option<CacheValue>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let keys = normalize_keys(keys)?;
        let raws = self
            .call(CacheOperation::GetMany, None, self.client.mget(&keys))
            .await?;

        let mut results = Vec::with_capacity(keys.len());
        for (i, key) in keys.iter().enumerate() {
            // A short reply counts as missing for the tail.
            match raws.get(i).cloned().flatten() {
                Some(raw) => results.push(Some(self.decode(key, CacheOperation::GetMany, &raw)?)),
                None => results.push(None),
            }
        }
        debug!("✓ Remote MGET {} keys (batch operation)", keys.len());
        Ok(results)
    }

    async fn mset(&self, entries: Vec<(String, CacheValue)>, ttl: Option<Duration>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut encoded = Vec::with_capacity(entries.len());
        for (key, value) in &entries {
            let key = normalize_key(key)?;
            let raw = self.encode(&key, CacheOperation::SetMany, value)?;
            encoded.push((key, raw));
        }

        if ttl == Some(Duration::ZERO) {
            let keys: Vec<String> = encoded.into_iter().map(|(k, _)| k).collect();
            self.call(CacheOperation::SetMany, None, self.client.delete(&keys))
                .await?;
            return Ok(());
        }

        let count = encoded.len();
        self.call(
            CacheOperation::SetMany,
            None,
            self.client.pipeline_set(encoded, ttl),
        )
        .await?;
        debug!("✓ Remote MSET {} keys (pipelined)", count);
        Ok(())
    }

    async fn mdelete(&self, keys: &[&str]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let keys = normalize_keys(keys)?;
        self.call(CacheOperation::DeleteMany, None, self.client.delete(&keys))
            .await?;
        debug!("✓ Remote MDELETE {} keys", keys.len());
        Ok(())
    }

    async fn increment(&self, key: &str, amount: i64) -> Result<i64> {
        let key = normalize_key(key)?;
        if amount < 0 {
            return Err(Error::invalid_amount(CacheOperation::Incr, &key, amount));
        }
        self.call(CacheOperation::Incr, Some(&key), self.client.incr_by(&key, amount))
            .await
    }

    async fn decrement(&self, key: &str, amount: i64) -> Result<i64> {
        let key = normalize_key(key)?;
        if amount < 0 {
            return Err(Error::invalid_amount(CacheOperation::Decr, &key, amount));
        }
        self.call(CacheOperation::Decr, Some(&key), self.client.decr_by(&key, amount))
            .await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let key = normalize_key(key)?;
        let secs = self
            .call(CacheOperation::Ttl, Some(&key), self.client.ttl(&key))
            .await?;
        Ok(u64::try_from(secs).ok().map(Duration::from_secs))
    }

    async fn touch(&self, key: &str, ttl: Duration) -> Result<()> {
        let key = normalize_key(key)?;
        self.call(CacheOperation::Touch, Some(&key), self.client.expire(&key, ttl))
            .await?;
        Ok(())
    }

    async fn clear_all(&self) -> Result<()> {
        let mut cursor = 0u64;
        let mut removed = 0usize;
        loop {
            let (next, keys) = self
                .call(CacheOperation::Clear, None, self.client.scan(cursor, "*"))
                .await?;
            if !keys.is_empty() {
                self.call(CacheOperation::Clear, None, self.client.delete(&keys))
                    .await?;
                removed += keys.len();
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        warn!(
            "⚠ Remote backend '{}' cleared ({} keys removed)",
            self.name, removed
        );
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        match self.call(CacheOperation::Health, None, self.client.ping()).await {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!("Remote backend '{}' health check failed: {}", self.name, e);
                Ok(false)
            }
        }
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.client.close().await.map_err(|e| {
            self.annotate(
                Error::new(ErrorKind::Connection, format!("failed to close connection: {}", e))
                    .with_source(e),
                CacheOperation::Close,
                None,
            )
        })?;
        info!("Remote backend '{}' closed", self.name);
        Ok(())
    }
}
