//! Redis 目标：`{"key","data":{..}}` 写成一次 HSET。

use crate::common::{Deliver, OfflineCache, TargetDeps};
use crate::error::TargetError;
use async_trait::async_trait;
use domain::{ConfigMap, ResourceState};
use edge_runtime::{
    CancelToken, RuntimeError, StateCell, Target, ValidateConfig, Worker, bind_config,
    require_non_empty,
};
use redis::aio::MultiplexedConnection;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Mutex;
use tracing::{debug, info};

fn default_address() -> String {
    "127.0.0.1:6379".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedisTargetConfig {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub db: i64,
    #[serde(default)]
    pub cache_offline_data: bool,
}

impl ValidateConfig for RedisTargetConfig {
    fn validate(&self) -> Result<(), String> {
        require_non_empty("address", &self.address)?;
        if self.db < 0 {
            return Err("db must not be negative".to_string());
        }
        Ok(())
    }
}

impl RedisTargetConfig {
    pub fn url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}/{}", self.address, self.db)
        } else {
            format!("redis://:{}@{}/{}", self.password, self.address, self.db)
        }
    }
}

/// 写入的哈希记录。
#[derive(Debug, Deserialize)]
pub struct HashRecord {
    pub key: String,
    pub data: Map<String, Value>,
}

impl HashRecord {
    pub fn parse(data: &str) -> Result<Self, TargetError> {
        let record: HashRecord = serde_json::from_str(data)
            .map_err(|e| TargetError::InvalidData(format!("expect {{\"key\",\"data\"}}: {}", e)))?;
        if record.key.is_empty() || record.data.is_empty() {
            return Err(TargetError::InvalidData("key and data are required".to_string()));
        }
        Ok(record)
    }

    /// 字段值：字符串原样，其余按 JSON 文本。
    pub fn fields(&self) -> Vec<(String, String)> {
        self.data
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), value)
            })
            .collect()
    }
}

pub struct RedisTarget {
    uuid: String,
    client: Option<redis::Client>,
    conn: Mutex<Option<MultiplexedConnection>>,
    cache: OfflineCache,
    state: StateCell,
}

impl RedisTarget {
    pub fn new(deps: TargetDeps) -> Self {
        Self {
            uuid: String::new(),
            client: None,
            conn: Mutex::new(None),
            cache: OfflineCache::new(deps.lost_cache),
            state: StateCell::default(),
        }
    }

    fn conn(&self) -> Result<MultiplexedConnection, TargetError> {
        self.conn
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(TargetError::NotConnected)
    }

    async fn ping(&self) -> Result<(), TargetError> {
        let mut conn = self.conn()?;
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| TargetError::Remote(e.to_string()))
    }
}

#[async_trait]
impl Deliver for RedisTarget {
    async fn deliver(&self, data: &str) -> Result<(), TargetError> {
        let record = HashRecord::parse(data)?;
        let mut conn = self.conn()?;
        let mut cmd = redis::cmd("HSET");
        cmd.arg(&record.key);
        for (field, value) in record.fields() {
            cmd.arg(field).arg(value);
        }
        cmd.query_async::<_, i64>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| TargetError::Remote(e.to_string()))
    }
}

#[async_trait]
impl Worker for RedisTarget {
    async fn init(&mut self, uuid: &str, config: &ConfigMap) -> Result<(), RuntimeError> {
        let config: RedisTargetConfig = bind_config(config)?;
        let client =
            redis::Client::open(config.url()).map_err(|e| RuntimeError::Config(e.to_string()))?;
        self.cache.bind(uuid, config.cache_offline_data);
        self.uuid = uuid.to_string();
        self.client = Some(client);
        Ok(())
    }

    async fn start(&self, _cancel: CancelToken) -> Result<(), RuntimeError> {
        self.state.begin_start();
        let client = self.client.as_ref().ok_or(TargetError::NotConnected)?;
        let conn = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| TargetError::Remote(e.to_string()))?;
        *self.conn.lock().unwrap_or_else(|e| e.into_inner()) = Some(conn);
        self.ping().await?;
        self.cache.replay(self).await;
        self.state.transition(ResourceState::Up);
        info!(target: "edge.target", uuid = %self.uuid, "redis_target_started");
        Ok(())
    }

    async fn status(&self) -> ResourceState {
        let state = self.state.get();
        if state != ResourceState::Up {
            return state;
        }
        match self.ping().await {
            Ok(()) => ResourceState::Up,
            Err(err) => {
                debug!(target: "edge.target", uuid = %self.uuid, error = %err, "redis_probe_failed");
                self.state.transition(ResourceState::Down);
                ResourceState::Down
            }
        }
    }

    async fn stop(&self) {
        self.state.transition(ResourceState::Stop);
        self.conn.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    fn as_target(&self) -> Option<&dyn Target> {
        Some(self)
    }
}

#[async_trait]
impl Target for RedisTarget {
    async fn to(&self, data: &str) -> Result<(), RuntimeError> {
        self.cache.write_through(self, data).await
    }
}
