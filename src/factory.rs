//! Backend factory.

use crate::backend::{Backend, FileBackend, InMemoryBackend};
#[cfg(feature = "redis")]
use crate::backend::RemoteBackend;
use crate::config::BackendConfig;
#[cfg(not(feature = "redis"))]
use crate::error::Error;
use crate::error::Result;

/// Builds a [`Backend`] from its configuration.
pub struct CacheBackendFactory;

impl CacheBackendFactory {
    /// Validate `config` and construct the matching backend.
    ///
    /// # Errors
    /// - configuration error if `config` fails validation, or names a remote
    ///   backend while the `redis` feature is disabled
    /// - backend error if a file directory cannot be created
    /// - connection error if a remote server cannot be reached
    pub async fn create(config: &BackendConfig) -> Result<Backend> {
        config.validate()?;
        debug!(
            "Creating {} backend '{}'",
            config.backend_type(),
            config.name()
        );

        match config {
            BackendConfig::Memory(c) => Ok(Backend::Memory(InMemoryBackend::new(c.clone()))),
            BackendConfig::File(c) => Ok(Backend::File(FileBackend::new(c.clone()).await?)),
            #[cfg(feature = "redis")]
            BackendConfig::Remote(c) => Ok(Backend::Remote(RemoteBackend::connect(c.clone()).await?)),
            #[cfg(not(feature = "redis"))]
            BackendConfig::Remote(c) => Err(Error::configuration(format!(
                "remote backend '{}' requires the `redis` feature",
                c.name
            ))
            .with_config_section("backend_type")
            .with_config_value("remote")),
        }
    }

    /// Blocking form of [`CacheBackendFactory::create`].
    pub fn blocking_create(config: &BackendConfig) -> Result<Backend> {
        match config {
            // Never suspends.
            BackendConfig::Memory(_) => futures::executor::block_on(Self::create(config)),
            _ => crate::runtime::block_on(Self::create(config)),
        }
    }

    /// Parse an untyped configuration object and construct the backend.
    ///
    /// # Errors
    /// Returns a backend error naming the type if `backend_type` is not
    /// recognised, otherwise as [`CacheBackendFactory::create`].
    pub async fn create_from_value(value: serde_json::Value) -> Result<Backend> {
        let config = BackendConfig::from_value(value)?;
        Self::create(&config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CacheBackend;
    use crate::config::{BackendType, FileConfig, MemoryConfig, RemoteConfig};
    use crate::error::ErrorKind;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_memory() {
        let backend = CacheBackendFactory::create(&MemoryConfig::new("m").into())
            .await
            .expect("Failed to create backend");
        assert_eq!(backend.backend_type(), BackendType::Memory);
        assert_eq!(backend.name(), "m");
    }

    #[tokio::test]
    async fn test_create_file() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let backend = CacheBackendFactory::create(&FileConfig::new("f", dir.path()).into())
            .await
            .expect("Failed to create backend");
        assert_eq!(backend.backend_type(), BackendType::File);
    }

    #[test]
    fn test_blocking_create_memory() {
        let backend = CacheBackendFactory::blocking_create(&MemoryConfig::new("m").into())
            .expect("Failed to create backend");
        assert_eq!(backend.name(), "m");
    }

    #[tokio::test]
    async fn test_unknown_backend_type_is_backend_error() {
        let err = CacheBackendFactory::create_from_value(json!({
            "backend_type": "unknown",
            "name": "x"
        }))
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Backend);
        assert!(err.message().contains("unknown"));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_before_construction() {
        let config: BackendConfig = RemoteConfig::new("r", "http://localhost").into();
        let err = CacheBackendFactory::create(&config).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
