use edge_config::{AppConfig, ConfigError, StorageBackend};
use std::collections::HashMap;

fn load(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    AppConfig::from_lookup(|key| vars.get(key).cloned())
}

#[test]
fn defaults_without_env() {
    let config = load(&[]).expect("config");
    assert_eq!(config.http_addr, "0.0.0.0:2580");
    assert_eq!(config.supervisor_interval_seconds, 5);
    assert_eq!(config.max_lost_cache_size, 10_000);
    assert_eq!(config.alarm_log_max_rows, 1000);
    assert_eq!(config.storage_backend, StorageBackend::Memory);
    assert_eq!(config.lock_dir.to_str(), Some("."));
    assert!(config.resources_file.is_none());
}

#[test]
fn backend_requires_url() {
    let err = load(&[("EDGE_STORAGE_BACKEND", "redis")]).unwrap_err();
    assert_eq!(err, ConfigError::Missing("EDGE_REDIS_URL".to_string()));

    let config = load(&[
        ("EDGE_STORAGE_BACKEND", "postgres"),
        ("EDGE_DATABASE_URL", "postgres://edge@localhost/edge"),
    ])
    .expect("config");
    assert_eq!(config.storage_backend, StorageBackend::Postgres);
}

#[test]
fn invalid_numbers_rejected() {
    let err = load(&[("EDGE_MAX_LOST_CACHE_SIZE", "lots")]).unwrap_err();
    assert_eq!(
        err,
        ConfigError::Invalid("EDGE_MAX_LOST_CACHE_SIZE".to_string(), "lots".to_string())
    );
    assert!(load(&[("EDGE_STORAGE_BACKEND", "sqlite")]).is_err());
}

#[test]
fn load_config_from_env() {
    // Rust 2024 中 set_var 需要显式标注 unsafe（测试进程内可控）。
    unsafe {
        std::env::set_var("EDGE_HTTP_ADDR", "127.0.0.1:2581");
        std::env::set_var("ARCHSUPPORT", "EEKITH3");
    }

    let config = AppConfig::from_env().expect("config");
    assert_eq!(config.http_addr, "127.0.0.1:2581");
    assert_eq!(config.arch_support.as_deref(), Some("EEKITH3"));
}
