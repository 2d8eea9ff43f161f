//! TCP 透传目标：长连接，按数据模式编码后写出。

use crate::common::{
    DataMode, Deliver, OfflineCache, TargetDeps, default_host, default_timeout_ms,
};
use crate::error::TargetError;
use async_trait::async_trait;
use domain::{ConfigMap, ResourceState};
use edge_runtime::{
    CancelToken, RuntimeError, StateCell, Target, ValidateConfig, Worker, WorkerTasks, bind_config,
    require_non_empty,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{info, warn};

const PING_PERIOD: Duration = Duration::from_secs(5);

fn default_port() -> u16 {
    6502
}

fn default_stream_ping() -> String {
    "rhilex\r\n".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TcpConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub data_mode: DataMode,
    #[serde(default = "default_stream_ping")]
    pub ping_packet: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout: u64,
    #[serde(default)]
    pub allow_ping: bool,
    #[serde(default)]
    pub cache_offline_data: bool,
}

impl ValidateConfig for TcpConfig {
    fn validate(&self) -> Result<(), String> {
        require_non_empty("host", &self.host)?;
        if self.port == 0 {
            return Err("port is required".to_string());
        }
        Ok(())
    }
}

impl TcpConfig {
    fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout.max(1))
    }
}

/// 写出时独占连接，保证同一目标的写出顺序。
type SharedStream = Arc<Mutex<Option<TcpStream>>>;

async fn write_frame(
    stream: &SharedStream,
    bytes: &[u8],
    timeout: Duration,
) -> Result<(), TargetError> {
    let mut guard = stream.lock().await;
    let Some(conn) = guard.as_mut() else {
        return Err(TargetError::NotConnected);
    };
    let written = match tokio::time::timeout(timeout, conn.write_all(bytes)).await {
        Ok(result) => result.map_err(TargetError::Io),
        Err(_) => Err(TargetError::Timeout(timeout.as_millis() as u64)),
    };
    if written.is_err() {
        guard.take();
    }
    written
}

pub struct TcpTarget {
    uuid: String,
    config: Option<TcpConfig>,
    stream: SharedStream,
    cache: OfflineCache,
    state: Arc<StateCell>,
    tasks: WorkerTasks,
}

impl TcpTarget {
    pub fn new(deps: TargetDeps) -> Self {
        Self {
            uuid: String::new(),
            config: None,
            stream: Arc::new(Mutex::new(None)),
            cache: OfflineCache::new(deps.lost_cache),
            state: Arc::new(StateCell::default()),
            tasks: WorkerTasks::new(),
        }
    }

    fn config(&self) -> Result<&TcpConfig, TargetError> {
        self.config.as_ref().ok_or(TargetError::NotConnected)
    }
}

#[async_trait]
impl Deliver for TcpTarget {
    async fn deliver(&self, data: &str) -> Result<(), TargetError> {
        let config = self.config()?;
        let bytes = config.data_mode.encode(config.ping_packet.trim_end(), data)?;
        let result = write_frame(&self.stream, &bytes, config.io_timeout()).await;
        if let Err(TargetError::Io(_) | TargetError::Timeout(_)) = &result {
            self.state.transition(ResourceState::Down);
        }
        result
    }
}

#[async_trait]
impl Worker for TcpTarget {
    async fn init(&mut self, uuid: &str, config: &ConfigMap) -> Result<(), RuntimeError> {
        let config: TcpConfig = bind_config(config)?;
        self.cache.bind(uuid, config.cache_offline_data);
        self.uuid = uuid.to_string();
        self.config = Some(config);
        Ok(())
    }

    async fn start(&self, cancel: CancelToken) -> Result<(), RuntimeError> {
        self.state.begin_start();
        let config = self.config()?.clone();
        let conn = match tokio::time::timeout(config.io_timeout(), TcpStream::connect(config.addr()))
            .await
        {
            Ok(Ok(conn)) => conn,
            Ok(Err(err)) => return Err(TargetError::Io(err).into()),
            Err(_) => return Err(TargetError::Timeout(config.timeout).into()),
        };
        *self.stream.lock().await = Some(conn);
        self.state.transition(ResourceState::Up);

        if config.allow_ping {
            let stream = self.stream.clone();
            let state = self.state.clone();
            let uuid = self.uuid.clone();
            let config = config.clone();
            self.tasks.spawn(async move {
                let mut ticker = tokio::time::interval(PING_PERIOD);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            let ping = config.ping_packet.as_bytes();
                            if let Err(err) = write_frame(&stream, ping, config.io_timeout()).await {
                                warn!(target: "edge.target", uuid = %uuid, error = %err, "tcp_ping_failed");
                                state.transition(ResourceState::Down);
                                break;
                            }
                        }
                    }
                }
            });
        }
        self.cache.replay(self).await;
        info!(target: "edge.target", uuid = %self.uuid, addr = %config.addr(), "tcp_target_started");
        Ok(())
    }

    async fn status(&self) -> ResourceState {
        self.state.get()
    }

    async fn stop(&self) {
        self.state.transition(ResourceState::Stop);
        if let Some(mut conn) = self.stream.lock().await.take() {
            let _ = conn.shutdown().await;
        }
        self.tasks.join(Duration::from_millis(500)).await;
    }

    fn as_target(&self) -> Option<&dyn Target> {
        Some(self)
    }
}

#[async_trait]
impl Target for TcpTarget {
    async fn to(&self, data: &str) -> Result<(), RuntimeError> {
        self.cache.write_through(self, data).await
    }
}
