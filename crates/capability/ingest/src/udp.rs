//! UDP 输入源：每个报文是一条输入，处理成功后向发送方回复 `ok`。

use crate::common::{ClientData, default_listen_host, default_max_data_length, emit_json};
use crate::error::IngestError;
use async_trait::async_trait;
use domain::{ConfigMap, ResourceState};
use edge_runtime::{
    CancelToken, RuleHook, RuntimeError, StateCell, ValidateConfig, Worker, WorkerTasks,
    bind_config, require_non_empty,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

fn default_port() -> u16 {
    6200
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UdpSourceConfig {
    #[serde(default = "default_listen_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_data_length")]
    pub max_data_length: usize,
}

impl ValidateConfig for UdpSourceConfig {
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

pub struct UdpSource {
    uuid: String,
    config: Option<UdpSourceConfig>,
    hook: Arc<dyn RuleHook>,
    state: StateCell,
    tasks: WorkerTasks,
}

impl UdpSource {
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
impl Worker for UdpSource {
    async fn init(&mut self, uuid: &str, config: &ConfigMap) -> Result<(), RuntimeError> {
        self.config = Some(bind_config(config)?);
        self.uuid = uuid.to_string();
        Ok(())
    }

    async fn start(&self, cancel: CancelToken) -> Result<(), RuntimeError> {
        self.state.begin_start();
        let config = self.config.as_ref().ok_or(IngestError::NotStarted)?;
        let addr = format!("{}:{}", config.host, config.port);
        let socket = UdpSocket::bind(&addr)
            .await
            .map_err(|source| IngestError::Bind {
                addr: addr.clone(),
                source,
            })?;

        let uuid = self.uuid.clone();
        let hook = self.hook.clone();
        let max_len = config.max_data_length;
        self.tasks.spawn(async move {
            let mut buffer = vec![0u8; max_len];
            loop {
                let received = tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = socket.recv_from(&mut buffer) => received,
                };
                let (n, peer) = match received {
                    Ok(pair) => pair,
                    Err(err) => {
                        warn!(target: "edge.ingest", uuid = %uuid, error = %err, "udp_recv_failed");
                        continue;
                    }
                };
                debug!(target: "edge.ingest", uuid = %uuid, peer = %peer, bytes = n, "udp_datagram_received");
                let event = ClientData::new(peer.to_string(), &buffer[..n]);
                if !emit_json(hook.as_ref(), &uuid, &event).await {
                    continue;
                }
                if let Err(err) = socket.send_to(b"ok", peer).await {
                    debug!(target: "edge.ingest", uuid = %uuid, peer = %peer, error = %err, "udp_reply_failed");
                }
            }
        });
        self.state.transition(ResourceState::Up);
        info!(target: "edge.ingest", uuid = %self.uuid, addr = %addr, "udp_source_started");
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
