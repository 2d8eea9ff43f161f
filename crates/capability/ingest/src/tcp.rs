//! TCP 输入源。
//!
//! 每帧以 4 字节大端长度开头，长度不得超过 `maxDataLength`。
//! 每收到一帧回复 `ok`；5 秒内没有新帧头的连接被关闭。

use crate::common::{ClientData, default_listen_host, default_max_data_length, emit_json};
use crate::error::IngestError;
use async_trait::async_trait;
use domain::{ConfigMap, ResourceState};
use edge_runtime::{
    CancelToken, RuleHook, RuntimeError, StateCell, ValidateConfig, Worker, WorkerTasks,
    bind_config, require_non_empty,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

const HEADER_SIZE: usize = 4;
const HEADER_TIMEOUT: Duration = Duration::from_secs(5);

fn default_port() -> u16 {
    6201
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TcpSourceConfig {
    #[serde(default = "default_listen_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_data_length")]
    pub max_data_length: usize,
}

impl ValidateConfig for TcpSourceConfig {
    fn validate(&self) -> Result<(), String> {
        require_non_empty("host", &self.host)?;
        if self.port == 0 {
            return Err("port is required".to_string());
        }
        if self.max_data_length == 0 {
            return Err("maxDataLength must be positive".to_string());
        }
        Ok(())
    }
}

/// 读取一帧；对端正常关闭时返回 `None`。
async fn read_frame(
    conn: &mut TcpStream,
    max_len: usize,
) -> Result<Option<Vec<u8>>, IngestError> {
    let mut header = [0u8; HEADER_SIZE];
    match tokio::time::timeout(HEADER_TIMEOUT, conn.read_exact(&mut header)).await {
        Ok(Ok(_)) => {}
        Ok(Err(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Ok(Err(err)) => return Err(err.into()),
        Err(_) => return Err(IngestError::Timeout(HEADER_TIMEOUT.as_millis() as u64)),
    }
    let len = u32::from_be_bytes(header) as usize;
    if len > max_len {
        return Err(IngestError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame length {} exceeds {}", len, max_len),
        )));
    }
    let mut data = vec![0u8; len];
    conn.read_exact(&mut data).await?;
    Ok(Some(data))
}

async fn handle_client(
    mut conn: TcpStream,
    peer: SocketAddr,
    uuid: Arc<str>,
    hook: Arc<dyn RuleHook>,
    max_len: usize,
) -> Result<(), IngestError> {
    while let Some(data) = read_frame(&mut conn, max_len).await? {
        let event = ClientData::new(peer.to_string(), &data);
        if emit_json(hook.as_ref(), &uuid, &event).await {
            conn.write_all(b"ok").await?;
        }
    }
    Ok(())
}

pub struct TcpSource {
    uuid: String,
    config: Option<TcpSourceConfig>,
    hook: Arc<dyn RuleHook>,
    state: StateCell,
    tasks: WorkerTasks,
}

impl TcpSource {
    pub fn new(hook: Arc<dyn RuleHook>) -> Self {
        Self {
            uuid: String::new(),
            config: None,
            hook,
            state: StateCell::default(),
            tasks: WorkerTasks::new(),
        }
    }
}

#[async_trait]
impl Worker for TcpSource {
    async fn init(&mut self, uuid: &str, config: &ConfigMap) -> Result<(), RuntimeError> {
        self.config = Some(bind_config(config)?);
        self.uuid = uuid.to_string();
        Ok(())
    }

    async fn start(&self, cancel: CancelToken) -> Result<(), RuntimeError> {
        self.state.begin_start();
        let config = self.config.as_ref().ok_or(IngestError::NotStarted)?;
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| IngestError::Bind {
                addr: addr.clone(),
                source,
            })?;

        let uuid: Arc<str> = Arc::from(self.uuid.as_str());
        let hook = self.hook.clone();
        let max_len = config.max_data_length;
        self.tasks.spawn(async move {
            loop {
                let accepted = tokio::select! {
                    _ = cancel.cancelled() => break,
                    accepted = listener.accept() => accepted,
                };
                let (conn, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(err) => {
                        warn!(target: "edge.ingest", uuid = %uuid, error = %err, "tcp_accept_failed");
                        continue;
                    }
                };
                debug!(target: "edge.ingest", uuid = %uuid, peer = %peer, "tcp_client_connected");
                let uuid = uuid.clone();
                let hook = hook.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        handled = handle_client(conn, peer, uuid.clone(), hook, max_len) => {
                            if let Err(err) = handled {
                                debug!(target: "edge.ingest", uuid = %uuid, peer = %peer, error = %err, "tcp_client_closed");
                            }
                        }
                    }
                });
            }
        });
        self.state.transition(ResourceState::Up);
        info!(target: "edge.ingest", uuid = %self.uuid, addr = %addr, "tcp_source_started");
        Ok(())
    }

    async fn status(&self) -> ResourceState {
        self.state.get()
    }

    async fn stop(&self) {
        self.state.transition(ResourceState::Stop);
        self.tasks.join(Duration::from_millis(500)).await;
    }
}
