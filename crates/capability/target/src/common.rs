//! 各目标共用的配置项、数据模式与离线缓存。

use crate::error::TargetError;
use async_trait::async_trait;
use edge_runtime::RuntimeError;
use edge_storage::LostCacheStore;
use edge_telemetry::{record_lost_cache_replayed, record_lost_cache_saved};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{info, warn};

/// 目标工厂共享的依赖。
#[derive(Clone)]
pub struct TargetDeps {
    pub lost_cache: Arc<dyn LostCacheStore>,
}

impl TargetDeps {
    pub fn new(lost_cache: Arc<dyn LostCacheStore>) -> Self {
        Self { lost_cache }
    }
}

/// 写出数据的编码方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataMode {
    /// 原样写出
    #[default]
    RawString,
    /// 先按十六进制解码
    HexString,
    /// `{"label","body"}` JSON 信封，以 `\r\n` 结尾
    Json,
}

impl DataMode {
    pub fn encode(self, label: &str, data: &str) -> Result<Vec<u8>, TargetError> {
        match self {
            DataMode::RawString => Ok(data.as_bytes().to_vec()),
            DataMode::HexString => hex::decode(data.trim())
                .map_err(|e| TargetError::InvalidData(format!("invalid hex string: {}", e))),
            DataMode::Json => {
                let mut bytes = serde_json::to_vec(&Envelope { label, body: data })
                    .map_err(|e| TargetError::InvalidData(e.to_string()))?;
                bytes.extend_from_slice(b"\r\n");
                Ok(bytes)
            }
        }
    }
}

/// 带标签的 JSON 信封。
#[derive(Debug, Serialize)]
pub struct Envelope<'a> {
    pub label: &'a str,
    pub body: &'a str,
}

pub(crate) fn default_timeout_ms() -> u64 {
    3000
}

pub(crate) fn default_true() -> bool {
    true
}

pub(crate) fn default_ping_packet() -> String {
    "rhilex".to_string()
}

pub(crate) fn default_host() -> String {
    "127.0.0.1".to_string()
}

/// 单次写出。
#[async_trait]
pub(crate) trait Deliver: Send + Sync {
    async fn deliver(&self, data: &str) -> Result<(), TargetError>;
}

/// 单个目标的离线缓存句柄。
///
/// 写出失败且开启缓存时按 uuid 追加记录；启动时按写入顺序重放，
/// 遇到第一条失败即停止，剩余记录留到下次启动。
pub(crate) struct OfflineCache {
    store: Arc<dyn LostCacheStore>,
    uuid: String,
    enabled: bool,
}

impl OfflineCache {
    pub(crate) fn new(store: Arc<dyn LostCacheStore>) -> Self {
        Self {
            store,
            uuid: String::new(),
            enabled: false,
        }
    }

    pub(crate) fn bind(&mut self, uuid: &str, enabled: bool) {
        self.uuid = uuid.to_string();
        self.enabled = enabled;
    }

    /// 写出一条数据，失败时按需缓存并返回原错误。
    pub(crate) async fn write_through(
        &self,
        sink: &dyn Deliver,
        data: &str,
    ) -> Result<(), RuntimeError> {
        match sink.deliver(data).await {
            Ok(()) => Ok(()),
            Err(err) => {
                if self.enabled {
                    self.save(data).await;
                }
                Err(err.into())
            }
        }
    }

    async fn save(&self, data: &str) {
        match self.store.save(&self.uuid, data).await {
            Ok(record) => {
                record_lost_cache_saved();
                info!(target: "edge.target", uuid = %self.uuid, id = record.id, "lost_cache_saved");
            }
            Err(err) => {
                warn!(target: "edge.target", uuid = %self.uuid, error = %err, "lost_cache_save_failed");
            }
        }
    }

    /// 重放缓存，返回成功条数。
    pub(crate) async fn replay(&self, sink: &dyn Deliver) -> usize {
        if !self.enabled {
            return 0;
        }
        if let Err(err) = self.store.create_table(&self.uuid).await {
            warn!(target: "edge.target", uuid = %self.uuid, error = %err, "lost_cache_prepare_failed");
            return 0;
        }
        let records = match self.store.get(&self.uuid).await {
            Ok(records) => records,
            Err(err) => {
                warn!(target: "edge.target", uuid = %self.uuid, error = %err, "lost_cache_load_failed");
                return 0;
            }
        };
        let mut replayed = 0;
        for record in records {
            if let Err(err) = sink.deliver(&record.data).await {
                warn!(
                    target: "edge.target",
                    uuid = %self.uuid,
                    id = record.id,
                    error = %err,
                    "lost_cache_replay_stopped"
                );
                break;
            }
            if let Err(err) = self.store.delete_one(&self.uuid, record.id).await {
                warn!(target: "edge.target", uuid = %self.uuid, id = record.id, error = %err, "lost_cache_delete_failed");
            }
            record_lost_cache_replayed();
            replayed += 1;
        }
        if replayed > 0 {
            info!(target: "edge.target", uuid = %self.uuid, replayed, "lost_cache_replayed");
        }
        replayed
    }
}

/// TCP 拨号探活。
pub(crate) async fn probe_tcp(addr: &str, timeout: Duration) -> Result<(), TargetError> {
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(err)) => Err(TargetError::Io(err)),
        Err(_) => Err(TargetError::Timeout(timeout.as_millis() as u64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edge_storage::InMemoryLostCacheStore;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Flaky {
        healthy: AtomicBool,
        written: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Deliver for Flaky {
        async fn deliver(&self, data: &str) -> Result<(), TargetError> {
            if !self.healthy.load(Ordering::SeqCst) {
                return Err(TargetError::ConnectionClosed);
            }
            self.written.lock().unwrap().push(data.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_data_mode_encoding() {
        assert_eq!(DataMode::RawString.encode("l", "AB").unwrap(), b"AB".to_vec());
        assert_eq!(
            DataMode::HexString.encode("l", "0a0B").unwrap(),
            vec![0x0a, 0x0b]
        );
        assert!(DataMode::HexString.encode("l", "zz").is_err());
        assert_eq!(
            DataMode::Json.encode("rhilex", "x").unwrap(),
            b"{\"label\":\"rhilex\",\"body\":\"x\"}\r\n".to_vec()
        );
        let mode: DataMode = serde_json::from_str("\"HEX_STRING\"").unwrap();
        assert_eq!(mode, DataMode::HexString);
    }

    #[tokio::test]
    async fn test_cache_saves_on_failure_and_replays_in_order() {
        let store = Arc::new(InMemoryLostCacheStore::new(16));
        let mut cache = OfflineCache::new(store.clone());
        cache.bind("t1", true);
        let sink = Flaky {
            healthy: AtomicBool::new(false),
            written: Mutex::new(Vec::new()),
        };
        assert!(cache.write_through(&sink, "a").await.is_err());
        assert!(cache.write_through(&sink, "b").await.is_err());
        assert_eq!(store.get("t1").await.unwrap().len(), 2);

        sink.healthy.store(true, Ordering::SeqCst);
        assert_eq!(cache.replay(&sink).await, 2);
        assert_eq!(*sink.written.lock().unwrap(), vec!["a", "b"]);
        assert!(store.get("t1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cache_disabled_keeps_nothing() {
        let store = Arc::new(InMemoryLostCacheStore::new(16));
        let mut cache = OfflineCache::new(store.clone());
        cache.bind("t1", false);
        let sink = Flaky {
            healthy: AtomicBool::new(false),
            written: Mutex::new(Vec::new()),
        };
        assert!(cache.write_through(&sink, "a").await.is_err());
        assert!(store.get("t1").await.unwrap().is_empty());
    }
}
