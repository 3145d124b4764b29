//! Typed backend and manager configuration.
//!
//! Configurations deserialize from JSON (`backend_type` selects the variant)
//! and are checked with `validate()` before any backend is built.
//!
//! ```
//! use multicache::config::CacheManagerConfig;
//!
//! let config = CacheManagerConfig::from_json_str(r#"{
//!     "backends": [
//!         {"backend_type": "memory", "name": "mem"},
//!         {"backend_type": "file", "name": "disk", "directory": "/tmp/multicache-doc"}
//!     ],
//!     "default_backend": "mem"
//! }"#).unwrap();
//! assert_eq!(config.backends.len(), 2);
//! ```

use crate::error::{Error, Result};
use crate::serialization::SerializerKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the backend in [`CacheManagerConfig::default`].
pub const DEFAULT_BACKEND_NAME: &str = "default";

/// Default extension of file backend value files.
pub const DEFAULT_FILE_EXTENSION: &str = ".cache";

/// URL schemes accepted by the remote backend.
pub const REMOTE_URL_SCHEMES: &[&str] = &["redis://", "rediss://", "redis+unix://", "unix://"];

/// Kind of storage behind a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    Memory,
    File,
    #[serde(alias = "redis")]
    Remote,
}

impl BackendType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendType::Memory => "memory",
            BackendType::File => "file",
            BackendType::Remote => "remote",
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_true() -> bool {
    true
}

fn default_extension() -> String {
    DEFAULT_FILE_EXTENSION.to_string()
}

fn default_file_serializer() -> SerializerKind {
    SerializerKind::Binary
}

/// In-process map backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Serialize every operation behind one backend-wide lock.
    #[serde(default = "default_true")]
    pub thread_safe: bool,
}

impl MemoryConfig {
    pub fn new(name: impl Into<String>) -> Self {
        MemoryConfig {
            name: name.into(),
            enabled: true,
            thread_safe: true,
        }
    }

    pub fn with_thread_safe(mut self, thread_safe: bool) -> Self {
        self.thread_safe = thread_safe;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Directory-of-files backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Created on backend construction if missing.
    pub directory: PathBuf,
    #[serde(default = "default_extension")]
    pub file_extension: String,
    /// Oldest entries are evicted once this many are stored.
    #[serde(default)]
    pub max_entries: Option<usize>,
    #[serde(default = "default_file_serializer")]
    pub serializer: SerializerKind,
}

impl FileConfig {
    pub fn new(name: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        FileConfig {
            name: name.into(),
            enabled: true,
            directory: directory.into(),
            file_extension: default_extension(),
            max_entries: None,
            serializer: default_file_serializer(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.file_extension = extension.into();
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    pub fn with_serializer(mut self, serializer: SerializerKind) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Remote key-value server backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub url: String,
    /// Require stored payloads to be UTF-8 text.
    #[serde(default)]
    pub decode_responses: bool,
    #[serde(default)]
    pub serializer: SerializerKind,
    /// Budget for a single operation; unset means the client's own timeouts.
    #[serde(default)]
    pub timeout_seconds: Option<f64>,
}

impl RemoteConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        RemoteConfig {
            name: name.into(),
            enabled: true,
            url: url.into(),
            decode_responses: false,
            serializer: SerializerKind::default(),
            timeout_seconds: None,
        }
    }

    pub fn with_decode_responses(mut self, decode: bool) -> Self {
        self.decode_responses = decode;
        self
    }

    pub fn with_serializer(mut self, serializer: SerializerKind) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_seconds = Some(timeout.as_secs_f64());
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}

/// Configuration of one named backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend_type", rename_all = "lowercase")]
pub enum BackendConfig {
    Memory(MemoryConfig),
    File(FileConfig),
    #[serde(alias = "redis")]
    Remote(RemoteConfig),
}

impl BackendConfig {
    pub fn name(&self) -> &str {
        match self {
            BackendConfig::Memory(c) => &c.name,
            BackendConfig::File(c) => &c.name,
            BackendConfig::Remote(c) => &c.name,
        }
    }

    pub fn enabled(&self) -> bool {
        match self {
            BackendConfig::Memory(c) => c.enabled,
            BackendConfig::File(c) => c.enabled,
            BackendConfig::Remote(c) => c.enabled,
        }
    }

    pub fn backend_type(&self) -> BackendType {
        match self {
            BackendConfig::Memory(_) => BackendType::Memory,
            BackendConfig::File(_) => BackendType::File,
            BackendConfig::Remote(_) => BackendType::Remote,
        }
    }

    /// Parse an untyped configuration object.
    ///
    /// # Errors
    /// - backend error if `backend_type` names no known backend
    /// - configuration error for missing or malformed fields
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let backend_type = value
            .get("backend_type")
            .and_then(|t| t.as_str())
            .ok_or_else(|| {
                Error::configuration("backend config is missing backend_type")
                    .with_config_section("backend_type")
            })?;

        if !matches!(backend_type, "memory" | "file" | "remote" | "redis") {
            return Err(Error::backend(format!(
                "unsupported backend type: {}",
                backend_type
            ))
            .with_detail("backend_type", serde_json::json!(backend_type)));
        }

        serde_json::from_value(value).map_err(|e| {
            Error::configuration(format!("invalid backend config: {}", e))
                .with_config_section("backends")
                .with_source(e)
        })
    }

    /// Check field constraints.
    ///
    /// # Errors
    /// Returns a configuration error naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.name().trim().is_empty() {
            return Err(Error::configuration("backend name must not be empty")
                .with_config_section("name"));
        }

        match self {
            BackendConfig::Memory(_) => Ok(()),
            BackendConfig::File(c) => {
                if !c.file_extension.starts_with('.') || c.file_extension.len() < 2 {
                    return Err(Error::configuration(format!(
                        "file_extension must start with '.', got {:?}",
                        c.file_extension
                    ))
                    .with_config_section("file_extension")
                    .with_config_value(c.file_extension.clone()));
                }
                if c.file_extension.ends_with(".ttl") {
                    return Err(Error::configuration("file_extension must not end with .ttl")
                        .with_config_section("file_extension")
                        .with_config_value(c.file_extension.clone()));
                }
                if c.max_entries == Some(0) {
                    return Err(Error::configuration("max_entries must be positive")
                        .with_config_section("max_entries")
                        .with_config_value(0));
                }
                if c.directory.as_os_str().is_empty() {
                    return Err(Error::configuration("directory must not be empty")
                        .with_config_section("directory"));
                }
                Ok(())
            }
            BackendConfig::Remote(c) => {
                if !REMOTE_URL_SCHEMES.iter().any(|s| c.url.starts_with(s)) {
                    return Err(Error::configuration(format!(
                        "url must use one of {:?}, got {}",
                        REMOTE_URL_SCHEMES, c.url
                    ))
                    .with_config_section("url")
                    .with_config_value(c.url.clone()));
                }
                if c.decode_responses && !c.serializer.is_text() {
                    return Err(Error::configuration(format!(
                        "decode_responses requires a text serializer, got {}",
                        c.serializer
                    ))
                    .with_config_section("serializer")
                    .with_config_value(c.serializer.as_str()));
                }
                if let Some(secs) = c.timeout_seconds {
                    if !(secs.is_finite() && secs > 0.0) {
                        return Err(Error::configuration("timeout_seconds must be positive")
                            .with_config_section("timeout_seconds")
                            .with_config_value(secs));
                    }
                }
                Ok(())
            }
        }
    }
}

impl From<MemoryConfig> for BackendConfig {
    fn from(c: MemoryConfig) -> Self {
        BackendConfig::Memory(c)
    }
}

impl From<FileConfig> for BackendConfig {
    fn from(c: FileConfig) -> Self {
        BackendConfig::File(c)
    }
}

impl From<RemoteConfig> for BackendConfig {
    fn from(c: RemoteConfig) -> Self {
        BackendConfig::Remote(c)
    }
}

/// Set of backends owned by a manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheManagerConfig {
    pub backends: Vec<BackendConfig>,
    /// Backend used when an operation names none. Defaults to the first
    /// enabled backend.
    #[serde(default)]
    pub default_backend: Option<String>,
}

impl Default for CacheManagerConfig {
    /// A single thread-safe memory backend named `default`.
    fn default() -> Self {
        CacheManagerConfig {
            backends: vec![MemoryConfig::new(DEFAULT_BACKEND_NAME).into()],
            default_backend: None,
        }
    }
}

impl CacheManagerConfig {
    pub fn new(backends: Vec<BackendConfig>) -> Self {
        CacheManagerConfig {
            backends,
            default_backend: None,
        }
    }

    pub fn with_default_backend(mut self, name: impl Into<String>) -> Self {
        self.default_backend = Some(name.into());
        self
    }

    /// Parse a JSON document.
    ///
    /// # Errors
    /// Returns a configuration error for malformed JSON, a backend error for
    /// an unknown `backend_type`.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let mut raw: serde_json::Value = serde_json::from_str(text).map_err(|e| {
            Error::configuration(format!("invalid cache config JSON: {}", e)).with_source(e)
        })?;

        let backends = match raw.get_mut("backends").map(serde_json::Value::take) {
            Some(serde_json::Value::Array(items)) => items
                .into_iter()
                .map(BackendConfig::from_value)
                .collect::<Result<Vec<_>>>()?,
            Some(serde_json::Value::Null) | None => Vec::new(),
            Some(_) => {
                return Err(Error::configuration("backends must be a list")
                    .with_config_section("backends"))
            }
        };

        let default_backend = match raw.get("default_backend") {
            Some(serde_json::Value::String(name)) => Some(name.clone()),
            Some(serde_json::Value::Null) | None => None,
            Some(_) => {
                return Err(Error::configuration("default_backend must be a string")
                    .with_config_section("default_backend"))
            }
        };

        Ok(CacheManagerConfig {
            backends,
            default_backend,
        })
    }

    /// Read and parse a JSON file.
    ///
    /// # Errors
    /// Returns a configuration error if the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration(format!("cannot read cache config {}: {}", path.display(), e))
                .with_config_value(path.display().to_string())
                .with_source(e)
        })?;
        Self::from_json_str(&text)
    }

    /// Enabled backends in declaration order.
    pub fn enabled_backends(&self) -> impl Iterator<Item = &BackendConfig> {
        self.backends.iter().filter(|b| b.enabled())
    }

    /// Name of the backend used when none is given.
    ///
    /// # Errors
    /// Same conditions as [`CacheManagerConfig::validate`].
    pub fn resolve_default(&self) -> Result<String> {
        match &self.default_backend {
            Some(name) => {
                if self.enabled_backends().any(|b| b.name() == name) {
                    Ok(name.clone())
                } else {
                    Err(Error::configuration(format!(
                        "default backend '{}' is not an enabled backend",
                        name
                    ))
                    .with_config_section("default_backend")
                    .with_config_value(name.clone()))
                }
            }
            None => self
                .enabled_backends()
                .next()
                .map(|b| b.name().to_string())
                .ok_or_else(no_enabled_backends),
        }
    }

    /// Check every backend, name uniqueness, and the default backend.
    ///
    /// # Errors
    /// Returns a configuration error when names repeat, no backend is enabled,
    /// or `default_backend` does not name an enabled backend.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for backend in &self.backends {
            backend.validate()?;
            if !seen.insert(backend.name()) {
                return Err(Error::configuration(format!(
                    "duplicate backend name: {}",
                    backend.name()
                ))
                .with_config_section("backends")
                .with_config_value(backend.name()));
            }
        }

        if self.enabled_backends().next().is_none() {
            return Err(no_enabled_backends());
        }

        self.resolve_default().map(|_| ())
    }
}

fn no_enabled_backends() -> Error {
    Error::configuration("no enabled cache backends configured").with_config_section("backends")
}
