//! `GENERIC_USER_PROTOCOL`：基于传输栈（传输层 → 链路层 → 应用层）的自定义协议设备。
//!
//! OnCtrl：
//!
//! | 指令 | 参数 | 返回 |
//! |------|------|------|
//! | `Request` | `{"type":u16,"payload":"hex"}` | 应答帧 `{"type","payload"}` |
//!
//! 开启 `autoRequest` 后按 `dataPoints` 依次发送固定请求帧，应答以十六进制上送。
//!
//! 运行期间独占端口 `host:port`，另一个设备再连接同一端口会启动失败。

use crate::common::{emit_json, parse_args};
use crate::error::DeviceError;
use async_trait::async_trait;
use domain::{ConfigMap, ResourceState};
use edge_protocol::{AppLayer, AppLayerFrame, CheckAlgorithm, StreamPort};
use edge_runtime::{
    CacheValue, CancelToken, Controllable, HardwarePort, InterCache, OccupyBy, PortRegistry,
    RuleHook, RuntimeError, StateCell, ValidateConfig, Worker, WorkerTasks, bind_config,
    require_non_empty,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{info, warn};

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    502
}

fn default_timeout() -> u64 {
    3000
}

fn default_frequency() -> u64 {
    1000
}

/// 轮询点位：一条固定请求帧。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPoint {
    pub tag: String,
    #[serde(default)]
    pub alias: String,
    #[serde(rename = "type", default)]
    pub frame_type: u16,
    /// 请求负载（十六进制）
    #[serde(default)]
    pub command: String,
    /// 本点位请求后的等待时间（毫秒）
    #[serde(default = "default_frequency")]
    pub frequency: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProtocolConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub check_algorithm: CheckAlgorithm,
    #[serde(default)]
    pub auto_request: bool,
    #[serde(default)]
    pub batch_request: bool,
    #[serde(default)]
    pub data_points: Vec<DataPoint>,
}

impl ValidateConfig for UserProtocolConfig {
    fn validate(&self) -> Result<(), String> {
        require_non_empty("host", &self.host)?;
        if self.port == 0 {
            return Err("port is required".to_string());
        }
        for point in &self.data_points {
            require_non_empty("tag", &point.tag)?;
            if point.frequency < 1 {
                return Err(format!("'frequency' of {} must be positive", point.tag));
            }
            hex::decode(&point.command)
                .map_err(|e| format!("invalid command of {}: {}", point.tag, e))?;
        }
        Ok(())
    }
}

impl UserProtocolConfig {
    fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout.max(1))
    }

    fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// OnCtrl 与应答使用的帧表示，负载为十六进制。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HexFrame {
    #[serde(rename = "type")]
    pub frame_type: u16,
    #[serde(default)]
    pub payload: String,
}

impl HexFrame {
    fn to_frame(&self) -> Result<AppLayerFrame, DeviceError> {
        Ok(AppLayerFrame::new(self.frame_type, hex::decode(&self.payload)?))
    }

    fn from_frame(frame: &AppLayerFrame) -> Self {
        Self {
            frame_type: frame.frame_type,
            payload: hex::encode(&frame.payload),
        }
    }
}

/// 一次轮询的读数。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PointReading {
    pub tag: String,
    pub alias: String,
    pub command: String,
    pub value: String,
}

type Link = AppLayer<StreamPort<TcpStream>>;
type SharedLink = Arc<Mutex<Option<Link>>>;

/// 发送一帧并等待应答；端口失效时关闭连接并把设备置为 DOWN。
async fn exchange(
    link: &SharedLink,
    state: &StateCell,
    frame: &AppLayerFrame,
) -> Result<AppLayerFrame, DeviceError> {
    let mut guard = link.lock().await;
    let app = guard.as_mut().ok_or(DeviceError::NotConnected)?;
    match app.request(frame).await {
        Ok(reply) => Ok(reply),
        Err(err) => {
            if err.is_fatal() {
                if let Some(mut app) = guard.take() {
                    let _ = app.close().await;
                }
                state.transition(ResourceState::Down);
            }
            Err(err.into())
        }
    }
}

struct Poller {
    uuid: String,
    config: UserProtocolConfig,
    link: SharedLink,
    hook: Arc<dyn RuleHook>,
    intercache: Arc<InterCache>,
    state: Arc<StateCell>,
}

impl Poller {
    async fn run(self, cancel: CancelToken) {
        while !cancel.is_cancelled() {
            let mut batch = Vec::new();
            for point in &self.config.data_points {
                if let Some(reading) = self.request_point(point).await {
                    if self.config.batch_request {
                        batch.push(reading);
                    } else {
                        emit_json(self.hook.as_ref(), &self.uuid, &reading).await;
                    }
                }
                if self.state.get() != ResourceState::Up {
                    return;
                }
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(Duration::from_millis(point.frequency)) => {}
                }
            }
            if !batch.is_empty() {
                emit_json(self.hook.as_ref(), &self.uuid, &batch).await;
            }
            if self.config.data_points.is_empty() {
                break;
            }
        }
    }

    async fn request_point(&self, point: &DataPoint) -> Option<PointReading> {
        let payload = hex::decode(&point.command).ok()?;
        let frame = AppLayerFrame::new(point.frame_type, payload);
        match exchange(&self.link, &self.state, &frame).await {
            Ok(reply) => {
                let value = hex::encode(&reply.payload);
                let cached = CacheValue::new(&point.tag, json!(value)).with_status(ResourceState::Up);
                let _ = self.intercache.set(&self.uuid, &point.tag, cached);
                Some(PointReading {
                    tag: point.tag.clone(),
                    alias: point.alias.clone(),
                    command: point.command.clone(),
                    value,
                })
            }
            Err(err) => {
                warn!(target: "edge.device", uuid = %self.uuid, tag = %point.tag, error = %err, "user_protocol_request_failed");
                self.intercache.update_status(
                    &self.uuid,
                    &point.tag,
                    ResourceState::Down,
                    &err.to_string(),
                );
                None
            }
        }
    }
}

pub struct UserProtocolDevice {
    uuid: String,
    config: Option<UserProtocolConfig>,
    hook: Arc<dyn RuleHook>,
    intercache: Arc<InterCache>,
    ports: Arc<PortRegistry>,
    link: SharedLink,
    state: Arc<StateCell>,
    tasks: WorkerTasks,
}

impl UserProtocolDevice {
    pub fn new(
        hook: Arc<dyn RuleHook>,
        intercache: Arc<InterCache>,
        ports: Arc<PortRegistry>,
    ) -> Self {
        Self {
            uuid: String::new(),
            config: None,
            hook,
            intercache,
            ports,
            link: Arc::new(Mutex::new(None)),
            state: Arc::new(StateCell::default()),
            tasks: WorkerTasks::new(),
        }
    }

    async fn connect(&self, config: &UserProtocolConfig) -> Result<TcpStream, RuntimeError> {
        let addr = config.addr();
        match tokio::time::timeout(config.io_timeout(), TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(err)) => Err(RuntimeError::worker(err)),
            Err(_) => Err(RuntimeError::worker(format!("connect {} timed out", addr))),
        }
    }

    async fn request(&self, args: &[u8]) -> Result<Vec<u8>, DeviceError> {
        let request: HexFrame = parse_args(args)?;
        let reply = exchange(&self.link, &self.state, &request.to_frame()?).await?;
        Ok(serde_json::to_vec(&HexFrame::from_frame(&reply))?)
    }
}

#[async_trait]
impl Worker for UserProtocolDevice {
    async fn init(&mut self, uuid: &str, config: &ConfigMap) -> Result<(), RuntimeError> {
        self.config = Some(bind_config(config)?);
        self.uuid = uuid.to_string();
        Ok(())
    }

    async fn start(&self, cancel: CancelToken) -> Result<(), RuntimeError> {
        self.state.begin_start();
        let config = self.config.clone().ok_or(DeviceError::NotConnected)?;
        let addr = config.addr();
        self.ports.register(HardwarePort::new(&addr, "TCP"));
        self.ports.occupy(
            &addr,
            OccupyBy::new(&self.uuid, "DEVICE", crate::GENERIC_USER_PROTOCOL),
        )?;
        let stream = match self.connect(&config).await {
            Ok(stream) => stream,
            Err(err) => {
                self.ports.release(&addr, &self.uuid);
                return Err(err);
            }
        };
        let app = AppLayer::new(
            StreamPort::new(stream),
            config.check_algorithm,
            config.io_timeout(),
            config.io_timeout(),
        );
        *self.link.lock().await = Some(app);

        self.intercache.register_slot(&self.uuid);
        for point in &config.data_points {
            let loading = CacheValue {
                err_msg: "Loading".to_string(),
                ..CacheValue::new(&point.tag, json!("0"))
            };
            let _ = self.intercache.set(&self.uuid, &point.tag, loading);
        }
        self.state.transition(ResourceState::Up);

        if config.auto_request && !config.data_points.is_empty() {
            let poller = Poller {
                uuid: self.uuid.clone(),
                config: config.clone(),
                link: self.link.clone(),
                hook: self.hook.clone(),
                intercache: self.intercache.clone(),
                state: self.state.clone(),
            };
            self.tasks.spawn(poller.run(cancel));
        }
        info!(
            target: "edge.device",
            uuid = %self.uuid,
            addr = %addr,
            check = ?config.check_algorithm,
            points = config.data_points.len(),
            "user_protocol_device_started"
        );
        Ok(())
    }

    async fn status(&self) -> ResourceState {
        self.state.get()
    }

    async fn stop(&self) {
        self.state.transition(ResourceState::Stop);
        self.tasks.join(Duration::from_millis(500)).await;
        if let Some(mut app) = self.link.lock().await.take() {
            let _ = app.close().await;
        }
        if let Some(config) = &self.config {
            self.ports.release(&config.addr(), &self.uuid);
        }
        self.intercache.unregister_slot(&self.uuid);
    }

    fn as_controllable(&self) -> Option<&dyn Controllable> {
        Some(self)
    }
}

#[async_trait]
impl Controllable for UserProtocolDevice {
    async fn on_ctrl(&self, cmd: &str, args: &[u8]) -> Result<Vec<u8>, RuntimeError> {
        let result = match cmd {
            "Request" => self.request(args).await,
            other => Err(DeviceError::UnsupportedCommand(other.to_string())),
        };
        Ok(result?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_frame_conversion() {
        let frame = HexFrame {
            frame_type: 2,
            payload: "0a0b".to_string(),
        };
        let app = frame.to_frame().unwrap();
        assert_eq!(app, AppLayerFrame::new(2, vec![0x0a, 0x0b]));
        assert_eq!(HexFrame::from_frame(&app), frame);

        let bad = HexFrame {
            frame_type: 1,
            payload: "xyz".to_string(),
        };
        assert!(bad.to_frame().is_err());
    }

    #[test]
    fn test_config_rejects_bad_command() {
        let config: UserProtocolConfig = serde_json::from_value(json!({
            "port": 9000,
            "dataPoints": [{"tag": "a", "command": "zz"}]
        }))
        .unwrap();
        assert!(config.validate().is_err());

        let config: UserProtocolConfig = serde_json::from_value(json!({
            "port": 9000,
            "checkAlgorithm": "CRC32",
            "dataPoints": [{"tag": "a", "type": 3, "command": "0102"}]
        }))
        .unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.check_algorithm, CheckAlgorithm::Crc32);
        assert_eq!(config.data_points[0].frame_type, 3);
    }
}
