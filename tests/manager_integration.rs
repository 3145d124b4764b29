use multicache::{
    Cache, CacheManager, CacheManagerConfig, CacheValue, ErrorKind, FileConfig, MemoryConfig,
};
use std::sync::Arc;
use std::time::Duration;

fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init()
        .ok();
}

#[test]
fn test_memory_end_to_end() {
    init_logging();
    let config = CacheManagerConfig::new(vec![MemoryConfig::new("m").into()]);
    let manager = CacheManager::new(config).expect("Failed to create manager");

    manager.blocking_set("k", 1, None, None).expect("Failed to set");
    assert_eq!(
        manager.blocking_get("k", None).expect("Failed to get"),
        Some(CacheValue::Int(1))
    );
    manager.blocking_delete("k", None).expect("Failed to delete");
    assert_eq!(manager.blocking_get("k", None).expect("Failed to get"), None);
}

#[test]
fn test_json_configuration_with_file_backend() {
    init_logging();
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let json = format!(
        r#"{{
            "backends": [
                {{"backend_type": "memory", "name": "hot", "thread_safe": true}},
                {{"backend_type": "file", "name": "disk", "directory": {:?},
                  "file_extension": ".bin", "max_entries": 2}}
            ],
            "default_backend": "disk"
        }}"#,
        dir.path().to_string_lossy()
    );
    let config = CacheManagerConfig::from_json_str(&json).expect("Failed to parse config");
    let manager = Arc::new(CacheManager::new(config).expect("Failed to create manager"));
    assert_eq!(manager.default_backend(), "disk");

    let cache = Cache::new(Arc::clone(&manager));
    for key in ["a", "b", "c"] {
        cache.blocking_set(key, key, None).expect("Failed to set");
    }
    assert_eq!(cache.blocking_get("a").expect("Failed to get"), None);
    assert_eq!(
        cache.blocking_get("c").expect("Failed to get"),
        Some(CacheValue::from("c"))
    );
    assert!(dir.path().join("c.bin").is_file());

    let hot = Cache::pinned(Arc::clone(&manager), "hot").expect("Failed to pin");
    assert_eq!(hot.blocking_get("c").expect("Failed to get"), None);

    manager.blocking_close(None).expect("Failed to close");
}

#[test]
fn test_unknown_backend_type_in_json() {
    let err = CacheManagerConfig::from_json_str(
        r#"{"backends": [{"backend_type": "carrier-pigeon", "name": "p"}]}"#,
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Backend);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_blocking_api_inside_multi_thread_runtime() {
    init_logging();
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = CacheManagerConfig::new(vec![FileConfig::new("f", dir.path()).into()]);
    let manager = CacheManager::connect(config)
        .await
        .expect("Failed to create manager");

    manager
        .blocking_set("k", "v", Some(Duration::from_secs(30)), None)
        .expect("Failed to set");
    assert_eq!(
        manager.get("k", None).await.expect("Failed to get"),
        Some(CacheValue::from("v"))
    );
    let ttl = manager
        .blocking_ttl("k", None)
        .expect("Failed to get ttl")
        .expect("ttl should be set");
    assert!(ttl <= Duration::from_secs(30));
}

#[tokio::test]
async fn test_blocking_api_inside_current_thread_runtime() {
    init_logging();
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = CacheManagerConfig::new(vec![FileConfig::new("f", dir.path()).into()]);
    let manager = CacheManager::new(config).expect("Failed to create manager");

    manager
        .blocking_set("k", 1, Some(Duration::from_secs(5)), None)
        .expect("Failed to set");
    assert_eq!(
        manager.blocking_get("k", None).expect("Failed to get"),
        Some(CacheValue::Int(1))
    );
    assert_eq!(
        manager.get("k", None).await.expect("Failed to get"),
        Some(CacheValue::Int(1))
    );
    manager.blocking_close(None).expect("Failed to close");
}

#[tokio::test]
async fn test_scoped_async_client() {
    let config = CacheManagerConfig::new(vec![MemoryConfig::new("m").into()]);
    let manager = CacheManager::connect(config)
        .await
        .expect("Failed to create manager");

    let outcome: multicache::Result<()> = async {
        let client = manager.using_async(Some("m"))?;
        client.set("n", "not a number", None).await?;
        client.increment("n", 1).await?;
        Ok(())
    }
    .await;
    assert_eq!(outcome.unwrap_err().kind(), ErrorKind::Backend);

    let err = manager.increment("n", -1, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Key);
    assert_eq!(err.details()["invalid_argument"], "amount");

    manager.close(None).await.expect("Failed to close");
    manager.close(None).await.expect("Failed to close twice");
}
