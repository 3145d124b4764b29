//! Process-wide default manager.
//!
//! The first call to [`get_cache_manager`] builds a manager from the JSON file
//! named by `MULTICACHE_CONFIG`, or a single memory backend when the variable
//! is unset. Later calls return the same instance until
//! [`configure_cache_manager`] replaces it.

use crate::config::CacheManagerConfig;
use crate::error::Result;
use crate::facade::Cache;
use crate::manager::CacheManager;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::sync::Arc;

/// Environment variable naming a JSON configuration file.
pub const CONFIG_ENV: &str = "MULTICACHE_CONFIG";

/// The process-wide manager and the facade over its default backend.
#[derive(Clone)]
struct Installed {
    manager: Arc<CacheManager>,
    cache: Cache,
}

impl Installed {
    fn new(manager: Arc<CacheManager>) -> Self {
        let cache = Cache::new(Arc::clone(&manager));
        Installed { manager, cache }
    }
}

static DEFAULT: Lazy<RwLock<Option<Installed>>> = Lazy::new(|| RwLock::new(None));

fn default_config() -> Result<CacheManagerConfig> {
    match std::env::var_os(CONFIG_ENV) {
        Some(path) => {
            info!("Loading cache configuration from {:?}", path);
            CacheManagerConfig::from_path(path)
        }
        None => Ok(CacheManagerConfig::default()),
    }
}

/// The process-wide manager, built on first use.
///
/// # Errors
/// Returns the configuration or construction error of the first build; the
/// next call retries.
pub fn get_cache_manager() -> Result<Arc<CacheManager>> {
    Ok(installed()?.manager)
}

fn installed() -> Result<Installed> {
    if let Some(installed) = DEFAULT.read().as_ref() {
        return Ok(installed.clone());
    }

    let mut slot = DEFAULT.write();
    // Another caller may have won the race for the write lock.
    if let Some(installed) = slot.as_ref() {
        return Ok(installed.clone());
    }
    let installed = Installed::new(Arc::new(CacheManager::new(default_config()?)?));
    *slot = Some(installed.clone());
    Ok(installed)
}

/// Replace the process-wide manager with one built from `config`.
///
/// The previous manager is not closed; holders of it keep a working handle.
///
/// # Errors
/// Returns the validation or construction error; the current manager is kept.
pub fn configure_cache_manager(config: CacheManagerConfig) -> Result<Arc<CacheManager>> {
    let manager = Arc::new(CacheManager::new(config)?);
    install(Arc::clone(&manager));
    Ok(manager)
}

/// Async form of [`configure_cache_manager`].
pub async fn configure_cache_manager_async(
    config: CacheManagerConfig,
) -> Result<Arc<CacheManager>> {
    let manager = Arc::new(CacheManager::connect(config).await?);
    install(Arc::clone(&manager));
    Ok(manager)
}

fn install(manager: Arc<CacheManager>) {
    if DEFAULT.write().replace(Installed::new(manager)).is_some() {
        info!("Replaced process-wide cache manager");
    }
}

/// Facade over the process-wide manager's default backend.
///
/// The facade is cached next to the manager and replaced with it.
pub fn get_cache() -> Result<Cache> {
    Ok(installed()?.cache)
}

/// Forget the process-wide manager; the next access rebuilds it.
pub fn reset_cache_manager() -> Option<Arc<CacheManager>> {
    DEFAULT.write().take().map(|installed| installed.manager)
}
