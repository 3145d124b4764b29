//! # multicache
//!
//! One cache contract over interchangeable storage backends.
//!
//! ## Features
//!
//! - **Three backends:** in-process map, directory of files, Redis server
//! - **TTL everywhere:** lazy expiry on read, `ttl`/`touch` introspection
//! - **Bounded file cache:** oldest-first eviction past `max_entries`
//! - **Named backends:** a validated manager routes each call by name
//! - **Sync and async:** every operation has a native async form and a
//!   `blocking_` twin
//! - **Structured errors:** one `Error` type with a kind, a details map and
//!   remediation hints
//!
//! ## Quick Start
//!
//! ```
//! use multicache::{Cache, CacheManager, CacheManagerConfig, FileConfig, MemoryConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example(dir: &std::path::Path) -> multicache::Result<()> {
//! // 1. Describe the backends
//! let config = CacheManagerConfig::new(vec![
//!     MemoryConfig::new("hot").into(),
//!     FileConfig::new("disk", dir).with_max_entries(10_000).into(),
//! ]);
//!
//! // 2. Build the manager (validates names and the default backend)
//! let manager = Arc::new(CacheManager::connect(config).await?);
//!
//! // 3. Use it through a facade
//! let cache = Cache::new(Arc::clone(&manager));
//! cache.set("user:1", "Ada", Some(Duration::from_secs(300))).await?;
//! assert_eq!(cache.get("user:1").await?, Some("Ada".into()));
//!
//! let disk = Cache::pinned(manager, "disk")?;
//! disk.increment("visits", 1).await?;
//! # Ok(())
//! # }
//! ```
//!
//! For a process-wide instance see [`get_cache`] and [`get_cache_manager`].

#[macro_use]
extern crate log;

pub mod backend;
pub mod client;
pub mod config;
pub mod error;
pub mod expiry;
pub mod facade;
pub mod factory;
pub mod key;
pub mod manager;
pub mod registry;
pub mod runtime;
pub mod serialization;
pub mod value;

// Re-exports for convenience
pub use backend::{Backend, CacheBackend, FileBackend, InMemoryBackend, RemoteBackend};
pub use client::{AsyncCacheClient, CacheClient};
pub use config::{
    BackendConfig, BackendType, CacheManagerConfig, FileConfig, MemoryConfig, RemoteConfig,
};
pub use error::{CacheOperation, Error, ErrorKind, Result};
pub use facade::Cache;
pub use factory::CacheBackendFactory;
pub use manager::CacheManager;
pub use registry::{
    configure_cache_manager, configure_cache_manager_async, get_cache, get_cache_manager,
};
pub use serialization::{Serializer, SerializerKind};
pub use value::CacheValue;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
