//! Filesystem cache backend.
//!
//! Each entry is a value file plus an optional expiry sidecar:
//!
//! ```text
//! {directory}/{encoded-key}{extension}        serialized value
//! {directory}/{encoded-key}{extension}.ttl    absolute expiry, Unix seconds
//! ```
//!
//! Keys are percent-encoded outside `[A-Za-z0-9._-]` (and a leading `.`), so
//! any key maps to exactly one plain file name inside the directory.
//!
//! Eviction is oldest-first by modification time. Writes made through this
//! backend also carry an insertion sequence, which orders entries whose
//! timestamps collide on coarse-grained filesystems.
//!
//! No in-process locking is done: two writers racing on the same key can
//! interleave. Writes are best effort.

use super::CacheBackend;
use crate::config::{BackendType, FileConfig};
use crate::error::{CacheOperation, Error, Result};
use crate::expiry::{compute_unix_expiry, is_unix_expired, remaining_unix_ttl};
use crate::key::normalize_key;
use crate::serialization::Serializer;
use crate::value::CacheValue;
use dashmap::DashMap;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use tokio::fs;

const SIDECAR_SUFFIX: &str = ".ttl";

/// Filesystem cache backend.
#[derive(Debug)]
pub struct FileBackend {
    name: String,
    directory: PathBuf,
    extension: String,
    max_entries: Option<usize>,
    serializer: Serializer,
    /// Insertion sequence per value file written by this instance.
    written: DashMap<PathBuf, u64>,
    next_seq: AtomicU64,
}

/// A value file as seen by eviction.
struct Entry {
    modified: SystemTime,
    /// 0 for files this instance never wrote.
    seq: u64,
    path: PathBuf,
}

impl FileBackend {
    /// Create the backend, creating the directory if it does not exist.
    ///
    /// # Errors
    /// Returns `ErrorKind::Backend` if the directory cannot be created
    pub async fn new(config: FileConfig) -> Result<Self> {
        fs::create_dir_all(&config.directory).await.map_err(|e| {
            Error::backend(format!(
                "failed to create cache directory {}: {}",
                config.directory.display(),
                e
            ))
            .with_backend(&config.name, BackendType::File.as_str())
            .with_source(e)
        })?;

        info!(
            "✓ File backend '{}' initialized at {} (serializer: {}, max_entries: {:?})",
            config.name,
            config.directory.display(),
            config.serializer,
            config.max_entries
        );

        Ok(FileBackend {
            name: config.name,
            directory: config.directory,
            extension: config.file_extension,
            max_entries: config.max_entries,
            serializer: Serializer::new(config.serializer),
            written: DashMap::new(),
            next_seq: AtomicU64::new(1),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the value file for an already-normalized key.
    pub fn value_path(&self, key: &str) -> PathBuf {
        self.directory
            .join(format!("{}{}", encode_file_name(key), self.extension))
    }

    /// Path of the expiry sidecar for an already-normalized key.
    pub fn sidecar_path(&self, key: &str) -> PathBuf {
        sidecar_of(&self.value_path(key))
    }

    fn error(&self, err: Error, operation: CacheOperation, key: Option<&str>) -> Error {
        let err = err
            .with_operation(operation)
            .with_backend(&self.name, BackendType::File.as_str());
        match key {
            Some(key) => err.with_key(key),
            None => err,
        }
    }

    fn io_error(
        &self,
        operation: CacheOperation,
        key: Option<&str>,
        path: &Path,
        err: std::io::Error,
    ) -> Error {
        self.error(
            Error::backend(format!("file I/O failed on {}: {}", path.display(), err))
                .with_source(err),
            operation,
            key,
        )
    }

    /// Expiry recorded in the sidecar, if any.
    async fn read_expiry(&self, key: &str, operation: CacheOperation) -> Result<Option<f64>> {
        let path = self.sidecar_path(key);
        let text = match fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(operation, Some(key), &path, e)),
        };
        match text.trim().parse::<f64>() {
            Ok(at) if at.is_finite() => Ok(Some(at)),
            _ => Err(self.error(
                Error::backend(format!("invalid expiry sidecar {}", path.display()))
                    .with_detail("sidecar", serde_json::json!(text.trim())),
                operation,
                Some(key),
            )),
        }
    }

    /// Check the sidecar; drop both files if the entry has expired.
    ///
    /// Returns the recorded expiry when the entry is still live.
    async fn check_expiry(
        &self,
        key: &str,
        operation: CacheOperation,
    ) -> Result<(bool, Option<f64>)> {
        let expiry = self.read_expiry(key, operation).await?;
        if is_unix_expired(expiry) {
            self.remove_entry(key, operation).await?;
            debug!("File key {} expired, evicted", key);
            return Ok((false, None));
        }
        Ok((true, expiry))
    }

    async fn load(&self, key: &str, operation: CacheOperation) -> Result<Option<CacheValue>> {
        let (live, _) = self.check_expiry(key, operation).await?;
        if !live {
            return Ok(None);
        }

        let path = self.value_path(key);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(operation, Some(key), &path, e)),
        };

        // Undecodable bytes are corruption, not a miss.
        self.serializer.decode(&bytes).map(Some).map_err(|e| {
            self.error(
                Error::backend(format!("corrupted cache file {}: {}", path.display(), e))
                    .with_source(e),
                operation,
                Some(key),
            )
        })
    }

    async fn write_value(
        &self,
        key: &str,
        value: &CacheValue,
        operation: CacheOperation,
    ) -> Result<()> {
        let bytes = self
            .serializer
            .encode(value)
            .map_err(|e| self.error(e, operation, Some(key)))?;
        let path = self.value_path(key);
        fs::write(&path, bytes)
            .await
            .map_err(|e| self.io_error(operation, Some(key), &path, e))?;
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.written.insert(path, seq);
        Ok(())
    }

    async fn write_expiry(
        &self,
        key: &str,
        ttl: Option<Duration>,
        operation: CacheOperation,
    ) -> Result<()> {
        let path = self.sidecar_path(key);
        match compute_unix_expiry(ttl) {
            Some(at) => fs::write(&path, at.to_string())
                .await
                .map_err(|e| self.io_error(operation, Some(key), &path, e)),
            None => self.remove_file(&path, operation, Some(key)).await,
        }
    }

    async fn store(
        &self,
        key: &str,
        value: &CacheValue,
        ttl: Option<Duration>,
        operation: CacheOperation,
    ) -> Result<()> {
        self.write_value(key, value, operation).await?;
        self.write_expiry(key, ttl, operation).await?;
        debug!("✓ File SET {} (TTL: {:?})", key, ttl);
        self.enforce_capacity(&self.value_path(key), operation)
            .await
    }

    async fn remove_file(
        &self,
        path: &Path,
        operation: CacheOperation,
        key: Option<&str>,
    ) -> Result<()> {
        self.written.remove(path);
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(operation, key, path, e)),
        }
    }

    async fn remove_entry(&self, key: &str, operation: CacheOperation) -> Result<()> {
        self.remove_file(&self.value_path(key), operation, Some(key))
            .await?;
        self.remove_file(&self.sidecar_path(key), operation, Some(key))
            .await
    }

    /// Value files currently in the directory.
    async fn list_entries(&self, operation: CacheOperation) -> Result<Vec<Entry>> {
        let mut dir = fs::read_dir(&self.directory)
            .await
            .map_err(|e| self.io_error(operation, None, &self.directory, e))?;

        let mut entries = Vec::new();
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| self.io_error(operation, None, &self.directory, e))?
        {
            let path = item.path();
            if !self.is_value_file(&path) {
                continue;
            }
            let modified = match item.metadata().await {
                Ok(meta) => meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                // Removed by someone else since listing.
                Err(e) if e.kind() == IoErrorKind::NotFound => continue,
                Err(e) => return Err(self.io_error(operation, None, &path, e)),
            };
            let seq = self.written.get(&path).map_or(0, |seq| *seq);
            entries.push(Entry {
                modified,
                seq,
                path,
            });
        }
        Ok(entries)
    }

    fn is_value_file(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .map_or(false, |name| name.ends_with(&self.extension))
    }

    fn is_managed_file(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .map_or(false, |name| {
                name.ends_with(&self.extension)
                    || name
                        .strip_suffix(SIDECAR_SUFFIX)
                        .map_or(false, |stem| stem.ends_with(&self.extension))
            })
    }

    /// Evict oldest-first until the entry count is within `max_entries`.
    ///
    /// `keep` (the entry just written) is never evicted.
    async fn enforce_capacity(&self, keep: &Path, operation: CacheOperation) -> Result<()> {
        let Some(max_entries) = self.max_entries else {
            return Ok(());
        };

        let mut entries = self.list_entries(operation).await?;
        if entries.len() <= max_entries {
            return Ok(());
        }

        entries.sort_by(|a, b| {
            (a.modified, a.seq, &a.path).cmp(&(b.modified, b.seq, &b.path))
        });
        let excess = entries.len() - max_entries;
        let victims: Vec<PathBuf> = entries
            .into_iter()
            .map(|entry| entry.path)
            .filter(|path| path != keep)
            .take(excess)
            .collect();

        for path in &victims {
            self.remove_file(path, operation, None).await?;
            self.remove_file(&sidecar_of(path), operation, None)
                .await?;
        }
        warn!(
            "⚠ File backend '{}' evicted {} entries (max_entries: {})",
            self.name,
            victims.len(),
            max_entries
        );
        Ok(())
    }

    async fn add(&self, key: &str, delta: i64, operation: CacheOperation) -> Result<i64> {
        let current = match self.load(key, operation).await? {
            None => 0,
            Some(value) => integer_of(&value).ok_or_else(|| {
                self.error(
                    Error::backend("stored value is not an integer"),
                    operation,
                    Some(key),
                )
            })?,
        };
        let next = current
            .checked_add(delta)
            .ok_or_else(|| self.error(Error::backend("integer overflow"), operation, Some(key)))?;

        // Only the value file is rewritten, so an existing expiry survives.
        self.write_value(key, &CacheValue::Int(next), operation)
            .await?;
        self.enforce_capacity(&self.value_path(key), operation)
            .await?;
        Ok(next)
    }
}

impl CacheBackend for FileBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend_type(&self) -> BackendType {
        BackendType::File
    }

    async fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        let key = normalize_key(key)?;
        let value = self.load(&key, CacheOperation::Get).await?;
        debug!(
            "✓ File GET {} -> {}",
            key,
            if value.is_some() { "HIT" } else { "MISS" }
        );
        Ok(value)
    }

    async fn set(&self, key: &str, value: CacheValue, ttl: Option<Duration>) -> Result<()> {
        let key = normalize_key(key)?;
        self.store(&key, &value, ttl, CacheOperation::Set).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let key = normalize_key(key)?;
        self.remove_entry(&key, CacheOperation::Delete).await?;
        debug!("✓ File DELETE {}", key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let key = normalize_key(key)?;
        let (live, _) = self.check_expiry(&key, CacheOperation::Exists).await?;
        if !live {
            return Ok(false);
        }
        let path = self.value_path(&key);
        match fs::metadata(&path).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(false),
            Err(e) => Err(self.io_error(CacheOperation::Exists, Some(&key), &path, e)),
        }
    }

    async fn mset(&self, entries: Vec<(String, CacheValue)>, ttl: Option<Duration>) -> Result<()> {
        for (key, value) in &entries {
            let key = normalize_key(key)?;
            self.store(&key, value, ttl, CacheOperation::SetMany)
                .await?;
        }
        Ok(())
    }

    async fn mdelete(&self, keys: &[&str]) -> Result<()> {
        for key in crate::key::normalize_keys(keys)? {
            self.remove_entry(&key, CacheOperation::DeleteMany)
                .await?;
        }
        Ok(())
    }

    async fn increment(&self, key: &str, amount: i64) -> Result<i64> {
        let key = normalize_key(key)?;
        if amount < 0 {
            return Err(Error::invalid_amount(CacheOperation::Incr, &key, amount));
        }
        self.add(&key, amount, CacheOperation::Incr).await
    }

    async fn decrement(&self, key: &str, amount: i64) -> Result<i64> {
        let key = normalize_key(key)?;
        if amount < 0 {
            return Err(Error::invalid_amount(CacheOperation::Decr, &key, amount));
        }
        self.add(&key, -amount, CacheOperation::Decr).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let key = normalize_key(key)?;
        let (live, expiry) = self.check_expiry(&key, CacheOperation::Ttl).await?;
        if !live {
            return Ok(None);
        }
        let path = self.value_path(&key);
        match fs::metadata(&path).await {
            Ok(_) => Ok(remaining_unix_ttl(expiry)),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error(CacheOperation::Ttl, Some(&key), &path, e)),
        }
    }

    async fn touch(&self, key: &str, ttl: Duration) -> Result<()> {
        let key = normalize_key(key)?;
        if !self.exists(&key).await? {
            return Ok(());
        }
        self.write_expiry(&key, Some(ttl), CacheOperation::Touch)
            .await
    }

    async fn clear_all(&self) -> Result<()> {
        let operation = CacheOperation::Clear;
        let mut dir = fs::read_dir(&self.directory)
            .await
            .map_err(|e| self.io_error(operation, None, &self.directory, e))?;

        let mut removed = 0usize;
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| self.io_error(operation, None, &self.directory, e))?
        {
            let path = item.path();
            if self.is_managed_file(&path) {
                self.remove_file(&path, operation, None).await?;
                removed += 1;
            }
        }
        warn!(
            "⚠ File backend '{}' cleared ({} files removed)",
            self.name, removed
        );
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        let probe = self.directory.join(format!(".{}.probe", encode_file_name(&self.name)));
        let outcome = match fs::write(&probe, b"ok").await {
            Ok(()) => fs::remove_file(&probe).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!(
                    "File backend '{}' health check failed at {}: {}",
                    self.name,
                    self.directory.display(),
                    e
                );
                Ok(false)
            }
        }
    }
}

/// Encode a key into a single safe path component.
fn encode_file_name(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for (i, byte) in key.bytes().enumerate() {
        let plain = byte.is_ascii_alphanumeric()
            || byte == b'_'
            || byte == b'-'
            || (byte == b'.' && i > 0);
        if plain {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

fn sidecar_of(value_path: &Path) -> PathBuf {
    let mut path = value_path.as_os_str().to_owned();
    path.push(SIDECAR_SUFFIX);
    PathBuf::from(path)
}

/// Integer view of a stored counter; text serializers hand back digits.
fn integer_of(value: &CacheValue) -> Option<i64> {
    match value {
        CacheValue::Int(n) => Some(*n),
        CacheValue::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}
