//! UDP 目标：每次写出建立一次连接并发送单个报文。

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
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, info};

const PING_PERIOD: Duration = Duration::from_secs(5);

fn default_port() -> u16 {
    6502
}

fn default_datagram_ping() -> String {
    "rhilex\r\n".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UdpConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub data_mode: DataMode,
    #[serde(default = "default_datagram_ping")]
    pub ping_packet: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout: u64,
    #[serde(default)]
    pub allow_ping: bool,
    #[serde(default)]
    pub cache_offline_data: bool,
}

impl ValidateConfig for UdpConfig {
    fn validate(&self) -> Result<(), String> {
        require_non_empty("host", &self.host)?;
        if self.port == 0 {
            return Err("port is required".to_string());
        }
        Ok(())
    }
}

impl UdpConfig {
    fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 发送一个报文。
pub(crate) async fn send_datagram(
    addr: &str,
    bytes: &[u8],
    timeout: Duration,
) -> Result<(), TargetError> {
    let send = async {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(addr).await?;
        socket.send(bytes).await?;
        Ok::<(), std::io::Error>(())
    };
    match tokio::time::timeout(timeout, send).await {
        Ok(result) => result.map_err(TargetError::Io),
        Err(_) => Err(TargetError::Timeout(timeout.as_millis() as u64)),
    }
}

pub struct UdpTarget {
    uuid: String,
    config: Option<UdpConfig>,
    cache: OfflineCache,
    state: StateCell,
    tasks: WorkerTasks,
}

impl UdpTarget {
    pub fn new(deps: TargetDeps) -> Self {
        Self {
            uuid: String::new(),
            config: None,
            cache: OfflineCache::new(deps.lost_cache),
            state: StateCell::default(),
            tasks: WorkerTasks::new(),
        }
    }

    fn config(&self) -> Result<&UdpConfig, TargetError> {
        self.config.as_ref().ok_or(TargetError::NotConnected)
    }
}

#[async_trait]
impl Deliver for UdpTarget {
    async fn deliver(&self, data: &str) -> Result<(), TargetError> {
        let config = self.config()?;
        let bytes = config.data_mode.encode(config.ping_packet.trim_end(), data)?;
        send_datagram(
            &config.addr(),
            &bytes,
            Duration::from_millis(config.timeout.max(1)),
        )
        .await
    }
}

#[async_trait]
impl Worker for UdpTarget {
    async fn init(&mut self, uuid: &str, config: &ConfigMap) -> Result<(), RuntimeError> {
        let config: UdpConfig = bind_config(config)?;
        self.cache.bind(uuid, config.cache_offline_data);
        self.uuid = uuid.to_string();
        self.config = Some(config);
        Ok(())
    }

    async fn start(&self, cancel: CancelToken) -> Result<(), RuntimeError> {
        self.state.begin_start();
        let config = self.config()?.clone();
        if config.allow_ping {
            let uuid = self.uuid.clone();
            let config = config.clone();
            self.tasks.spawn(async move {
                let mut ticker = tokio::time::interval(PING_PERIOD);
                let timeout = Duration::from_millis(config.timeout.max(1));
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            let sent = send_datagram(&config.addr(), config.ping_packet.as_bytes(), timeout).await;
                            if let Err(err) = sent {
                                debug!(target: "edge.target", uuid = %uuid, error = %err, "udp_ping_failed");
                            }
                        }
                    }
                }
            });
        }
        self.cache.replay(self).await;
        self.state.transition(ResourceState::Up);
        info!(target: "edge.target", uuid = %self.uuid, addr = %config.addr(), "udp_target_started");
        Ok(())
    }

    async fn status(&self) -> ResourceState {
        let state = self.state.get();
        if state != ResourceState::Up {
            return state;
        }
        let Some(config) = self.config.as_ref() else {
            return ResourceState::Down;
        };
        let probe = async {
            let socket = UdpSocket::bind("0.0.0.0:0").await?;
            socket.connect(config.addr()).await?;
            Ok::<(), std::io::Error>(())
        };
        match probe.await {
            Ok(()) => ResourceState::Up,
            Err(err) => {
                debug!(target: "edge.target", uuid = %self.uuid, error = %err, "udp_probe_failed");
                self.state.transition(ResourceState::Down);
                ResourceState::Down
            }
        }
    }

    async fn stop(&self) {
        self.state.transition(ResourceState::Stop);
        self.tasks.join(Duration::from_millis(500)).await;
    }

    fn as_target(&self) -> Option<&dyn Target> {
        Some(self)
    }
}

#[async_trait]
impl Target for UdpTarget {
    async fn to(&self, data: &str) -> Result<(), RuntimeError> {
        self.cache.write_through(self, data).await
    }
}
