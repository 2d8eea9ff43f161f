//! 网关运行配置加载。
//!
//! 全部来自 `EDGE_*` 环境变量（`ARCHSUPPORT` 除外），缺省值可直接在单机上运行。

use std::env;
use std::path::PathBuf;

/// 配置加载错误。
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 持久化后端。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Redis,
    Postgres,
}

impl StorageBackend {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "memory" => Some(StorageBackend::Memory),
            "redis" => Some(StorageBackend::Redis),
            "postgres" | "postgresql" => Some(StorageBackend::Postgres),
            _ => None,
        }
    }
}

/// 网关运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_addr: String,
    pub supervisor_interval_seconds: u64,
    pub max_lost_cache_size: usize,
    pub alarm_log_max_rows: usize,
    pub storage_backend: StorageBackend,
    pub redis_url: Option<String>,
    pub database_url: Option<String>,
    pub intercache_sweep_seconds: u64,
    pub lock_dir: PathBuf,
    pub resources_file: Option<PathBuf>,
    /// 板级支持变体，只记录不解释
    pub arch_support: Option<String>,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 从任意 key → value 来源读取配置。
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let reader = Reader { lookup };
        let http_addr = reader
            .optional("EDGE_HTTP_ADDR")
            .unwrap_or_else(|| "0.0.0.0:2580".to_string());
        let supervisor_interval_seconds =
            reader.u64_with_default("EDGE_SUPERVISOR_INTERVAL_SECONDS", 5)?.max(1);
        let max_lost_cache_size = reader.u64_with_default("EDGE_MAX_LOST_CACHE_SIZE", 10_000)? as usize;
        let alarm_log_max_rows = reader.u64_with_default("EDGE_ALARM_LOG_MAX_ROWS", 1000)? as usize;
        let storage_backend = match reader.optional("EDGE_STORAGE_BACKEND") {
            Some(value) => StorageBackend::parse(&value)
                .ok_or_else(|| ConfigError::Invalid("EDGE_STORAGE_BACKEND".to_string(), value))?,
            None => StorageBackend::Memory,
        };
        let redis_url = reader.optional("EDGE_REDIS_URL");
        let database_url = reader.optional("EDGE_DATABASE_URL");
        match storage_backend {
            StorageBackend::Redis if redis_url.is_none() => {
                return Err(ConfigError::Missing("EDGE_REDIS_URL".to_string()));
            }
            StorageBackend::Postgres if database_url.is_none() => {
                return Err(ConfigError::Missing("EDGE_DATABASE_URL".to_string()));
            }
            _ => {}
        }
        let intercache_sweep_seconds =
            reader.u64_with_default("EDGE_INTERCACHE_SWEEP_SECONDS", 5)?.max(1);
        let lock_dir = PathBuf::from(
            reader
                .optional("EDGE_LOCK_DIR")
                .unwrap_or_else(|| ".".to_string()),
        );
        let resources_file = reader.optional("EDGE_RESOURCES_FILE").map(PathBuf::from);
        let arch_support = reader.optional("ARCHSUPPORT");

        Ok(Self {
            http_addr,
            supervisor_interval_seconds,
            max_lost_cache_size,
            alarm_log_max_rows,
            storage_backend,
            redis_url,
            database_url,
            intercache_sweep_seconds,
            lock_dir,
            resources_file,
            arch_support,
        })
    }
}

struct Reader<F> {
    lookup: F,
}

impl<F> Reader<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// 空字符串视为未设置。
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|value| !value.is_empty())
    }

    fn u64_with_default(&self, key: &str, default: u64) -> Result<u64, ConfigError> {
        let Some(value) = self.optional(key) else {
            return Ok(default);
        };
        value
            .parse::<u64>()
            .map_err(|_| ConfigError::Invalid(key.to_string(), value))
    }
}
