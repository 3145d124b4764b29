//! Error types for cache operations.
//!
//! Every failure that crosses a backend boundary is an [`Error`] with an
//! [`ErrorKind`], a human message, and a structured details mapping that can
//! be rendered with [`Error::to_map`] for logging.

use serde_json::{json, Map, Value};
use std::fmt;

/// Stable error code carried by every cache error.
pub const ERROR_CODE: &str = "CACHE_ERROR";

/// Boxed cause attached to an [`Error`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Category of a cache failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid manager or backend setup. Raised at construction.
    Configuration,
    /// Remote backend unreachable or closed.
    Connection,
    /// A value could not be encoded or decoded.
    Serialization,
    /// Invalid key, or invalid argument to a numeric operation.
    Key,
    /// An operation exceeded its time budget.
    Timeout,
    /// Unexpected failure of the underlying storage.
    Backend,
    /// Generic operation failure.
    Operation,
}

impl ErrorKind {
    /// Wire name used in the details mapping.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Connection => "connection",
            ErrorKind::Serialization => "serialization",
            ErrorKind::Key => "key_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Backend => "backend_error",
            ErrorKind::Operation => "operation",
        }
    }

    /// Name of the error class, used as `exception_type` in [`Error::to_map`].
    pub fn type_name(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "CacheConfigurationError",
            ErrorKind::Connection => "CacheConnectionError",
            ErrorKind::Serialization => "CacheSerializationError",
            ErrorKind::Key => "CacheKeyError",
            ErrorKind::Timeout => "CacheTimeoutError",
            ErrorKind::Backend => "CacheBackendError",
            ErrorKind::Operation => "CacheException",
        }
    }

    fn default_suggestions(&self) -> Vec<String> {
        let items: &[&str] = match self {
            ErrorKind::Configuration => &[
                "Check backend names are unique and non-empty",
                "Make sure default_backend names an enabled backend",
            ],
            ErrorKind::Connection => &[
                "Verify the remote cache server is running and reachable",
                "Check the connection URL",
            ],
            ErrorKind::Serialization => &[
                "Check the value is supported by the configured serializer",
            ],
            ErrorKind::Key => &["Use a non-empty key", "Use a non-negative amount"],
            ErrorKind::Timeout => &["Increase the timeout or check server load"],
            ErrorKind::Backend => &["Check backend health and logs for the underlying cause"],
            ErrorKind::Operation => &["Check the cache configuration and backend health"],
        };
        items.iter().map(|s| s.to_string()).collect()
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache operation an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheOperation {
    Get,
    Set,
    Delete,
    Exists,
    Incr,
    Decr,
    Clear,
    GetMany,
    SetMany,
    DeleteMany,
    Ttl,
    Touch,
    Close,
    Health,
}

impl CacheOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheOperation::Get => "get",
            CacheOperation::Set => "set",
            CacheOperation::Delete => "delete",
            CacheOperation::Exists => "exists",
            CacheOperation::Incr => "incr",
            CacheOperation::Decr => "decr",
            CacheOperation::Clear => "clear",
            CacheOperation::GetMany => "get_many",
            CacheOperation::SetMany => "set_many",
            CacheOperation::DeleteMany => "delete_many",
            CacheOperation::Ttl => "ttl",
            CacheOperation::Touch => "touch",
            CacheOperation::Close => "close",
            CacheOperation::Health => "health",
        }
    }
}

impl fmt::Display for CacheOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by every cache operation.
///
/// Build one with a kind constructor and chain the `with_*` methods to attach
/// details:
///
/// ```
/// use multicache::error::{CacheOperation, Error, ErrorKind};
///
/// let err = Error::key("key must not be empty")
///     .with_operation(CacheOperation::Get)
///     .with_backend("mem", "memory");
/// assert_eq!(err.kind(), ErrorKind::Key);
/// assert_eq!(err.details()["operation"], "get");
/// ```
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
    details: Map<String, Value>,
    suggestions: Option<Vec<String>>,
    #[source]
    source: Option<BoxError>,
}

impl Error {
    /// Create an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let mut details = Map::new();
        details.insert("error_type".to_string(), json!(kind.as_str()));
        Error {
            kind,
            message: message.into(),
            details,
            suggestions: None,
            source: None,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connection, message)
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Serialization, message)
    }

    pub fn key(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Key, message)
    }

    /// Timeout error; `timeout_seconds` is recorded only when known.
    pub fn timeout(message: impl Into<String>, timeout_seconds: Option<f64>) -> Self {
        let err = Self::new(ErrorKind::Timeout, message);
        match timeout_seconds {
            Some(secs) => err.with_detail("timeout_seconds", json!(secs)),
            None => err,
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Backend, message)
    }

    /// Negative amount passed to increment/decrement.
    ///
    /// Reported with the key kind so callers see the same condition as an
    /// invalid key; the `invalid_argument` detail tells them apart.
    pub fn invalid_amount(operation: CacheOperation, key: &str, amount: i64) -> Self {
        Self::key(format!("amount must be non-negative, got {}", amount))
            .with_operation(operation)
            .with_key(key)
            .with_detail("invalid_argument", json!("amount"))
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        ERROR_CODE
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> &Map<String, Value> {
        &self.details
    }

    /// Remediation hints: the caller-supplied list, or the kind's defaults.
    pub fn suggestions(&self) -> Vec<String> {
        self.suggestions
            .clone()
            .unwrap_or_else(|| self.kind.default_suggestions())
    }

    pub fn is_kind(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    pub fn with_operation(self, operation: CacheOperation) -> Self {
        self.with_detail("operation", json!(operation.as_str()))
    }

    pub fn with_key(self, key: &str) -> Self {
        self.with_detail("cache_key", json!(key))
    }

    pub fn with_backend(self, name: &str, backend_type: &str) -> Self {
        self.with_detail("backend_name", json!(name))
            .with_detail("backend_type", json!(backend_type))
    }

    pub fn with_config_section(self, section: &str) -> Self {
        self.with_detail("config_section", json!(section))
    }

    pub fn with_config_value(self, value: impl Into<Value>) -> Self {
        self.with_detail("config_value", value.into())
    }

    /// Insert or overwrite a single detail entry.
    pub fn with_detail(mut self, name: &str, value: Value) -> Self {
        self.details.insert(name.to_string(), value);
        self
    }

    /// Merge an existing details mapping; later entries win.
    pub fn with_details(mut self, details: Map<String, Value>) -> Self {
        self.details.extend(details);
        self
    }

    /// Replace the default suggestions.
    pub fn with_suggestions<I, S>(mut self, suggestions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suggestions = Some(suggestions.into_iter().map(Into::into).collect());
        self
    }

    /// Attach the underlying cause.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        self.source = Some(source.into());
        self
    }

    /// Render the error as a mapping for logging and telemetry.
    pub fn to_map(&self) -> Value {
        let mut map = Map::new();
        map.insert("exception_type".to_string(), json!(self.kind.type_name()));
        map.insert("error_code".to_string(), json!(self.code()));
        map.insert("message".to_string(), json!(self.message));
        map.insert("details".to_string(), Value::Object(self.details.clone()));
        map.insert("suggestions".to_string(), json!(self.suggestions()));
        if let Some(source) = &self.source {
            map.insert("cause".to_string(), json!(source.to_string()));
        }
        Value::Object(map)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::serialization(format!("JSON error: {}", e)).with_source(e)
    }
}

impl From<postcard::Error> for Error {
    fn from(e: postcard::Error) -> Self {
        Error::serialization(format!("binary encoding error: {}", e)).with_source(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_details_and_map() {
        let err = Error::new(ErrorKind::Backend, "cache failed")
            .with_operation(CacheOperation::Get)
            .with_key("k")
            .with_backend("mem", "memory");

        assert_eq!(err.code(), "CACHE_ERROR");
        let map = err.to_map();
        assert_eq!(map["exception_type"], "CacheBackendError");
        assert_eq!(map["details"]["operation"], "get");
        assert_eq!(map["details"]["backend_type"], "memory");
        assert_eq!(map["details"]["error_type"], "backend_error");
        assert_eq!(map["details"]["cache_key"], "k");
    }

    #[test]
    fn test_configuration_error_section_without_value() {
        let err = Error::configuration("cfg").with_config_section("s");
        assert_eq!(err.details()["config_section"], "s");
        assert!(!err.details().contains_key("config_value"));

        let err = err.with_config_value("x");
        assert_eq!(err.details()["config_value"], "x");
    }

    #[test]
    fn test_timeout_seconds_only_when_known() {
        let err = Error::timeout("slow", Some(1.0));
        assert_eq!(err.details()["timeout_seconds"], 1.0);

        let err = Error::timeout("slow", None);
        assert!(!err.details().contains_key("timeout_seconds"));
        assert!(!err.details().contains_key("operation"));
    }

    #[test]
    fn test_custom_suggestions_replace_defaults() {
        let defaults = Error::key("bad").suggestions();
        assert!(!defaults.is_empty());

        let err = Error::key("bad").with_suggestions(["one", "two"]);
        assert_eq!(err.suggestions(), vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn test_merge_existing_details() {
        let mut existing = Map::new();
        existing.insert("existing".to_string(), json!("d"));
        let err = Error::new(ErrorKind::Operation, "m").with_details(existing);
        assert_eq!(err.details()["existing"], "d");
        assert!(!err.details().contains_key("operation"));
    }

    #[test]
    fn test_source_is_preserved() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err = Error::backend("write failed").with_source(io);
        assert_eq!(err.source().map(|s| s.to_string()), Some("disk gone".into()));
        assert_eq!(err.to_map()["cause"], "disk gone");
    }

    #[test]
    fn test_invalid_amount_is_key_error() {
        let err = Error::invalid_amount(CacheOperation::Incr, "n", -1);
        assert!(err.is_kind(ErrorKind::Key));
        assert_eq!(err.details()["invalid_argument"], "amount");
        assert_eq!(err.details()["operation"], "incr");
    }

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(ErrorKind::Key.as_str(), "key_error");
        assert_eq!(ErrorKind::Configuration.to_string(), "configuration");
        assert_eq!(CacheOperation::GetMany.as_str(), "get_many");
        assert_eq!(CacheOperation::Health.to_string(), "health");
    }
}
