//! Semtech UDP 包转发协议与转发目标。
//!
//! 报文头：`version:1 | token:2 (LE) | identifier:1`，上行报文随后跟 8 字节网关 MAC，
//! 其余为 JSON 负载。
//!
//! | 标识 | 报文 | 结构 |
//! |------|------|------|
//! | 0x00 | PUSH_DATA | 头 + MAC + JSON |
//! | 0x01 | PUSH_ACK | 头 |
//! | 0x02 | PULL_DATA | 头 + MAC |
//! | 0x03 | PULL_RESP | 头 + JSON |
//! | 0x04 | PULL_ACK | 头 |
//! | 0x05 | TX_ACK | 头 + MAC + 可选 JSON |

use crate::common::{Deliver, OfflineCache, TargetDeps};
use crate::error::TargetError;
use crate::udp::send_datagram;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use domain::{ConfigMap, ResourceState};
use edge_runtime::{
    CancelToken, RuntimeError, StateCell, Target, ValidateConfig, Worker, bind_config,
};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;
use tracing::info;

/// 报文标识。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    PushData = 0x00,
    PushAck = 0x01,
    PullData = 0x02,
    PullResp = 0x03,
    PullAck = 0x04,
    TxAck = 0x05,
}

impl PacketType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(PacketType::PushData),
            0x01 => Some(PacketType::PushAck),
            0x02 => Some(PacketType::PullData),
            0x03 => Some(PacketType::PullResp),
            0x04 => Some(PacketType::PullAck),
            0x05 => Some(PacketType::TxAck),
            _ => None,
        }
    }
}

/// 支持的协议版本。
pub const PROTOCOL_VERSION_1: u8 = 0x01;
pub const PROTOCOL_VERSION_2: u8 = 0x02;

pub type GatewayMac = [u8; 8];

fn invalid(message: impl Into<String>) -> TargetError {
    TargetError::InvalidData(message.into())
}

fn check_header(data: &[u8], min_len: usize, expected: PacketType) -> Result<(u8, u16), TargetError> {
    if data.len() < min_len {
        return Err(invalid(format!(
            "at least {} bytes of data are expected",
            min_len
        )));
    }
    if data[3] != expected as u8 {
        return Err(invalid(format!("identifier mismatch ({:?} expected)", expected)));
    }
    if data[0] != PROTOCOL_VERSION_1 && data[0] != PROTOCOL_VERSION_2 {
        return Err(invalid("invalid protocol version"));
    }
    Ok((data[0], u16::from_le_bytes([data[1], data[2]])))
}

fn header(version: u8, token: u16, kind: PacketType, capacity: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(capacity);
    out.push(version);
    out.extend_from_slice(&token.to_le_bytes());
    out.push(kind as u8);
    out
}

fn read_mac(data: &[u8]) -> GatewayMac {
    let mut mac = [0u8; 8];
    mac.copy_from_slice(&data[4..12]);
    mac
}

/// 一条上行射频包。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rxpk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    pub tmst: u32,
    pub chan: u8,
    pub rfch: u8,
    pub freq: f64,
    pub stat: i8,
    pub modu: String,
    pub datr: String,
    pub codr: String,
    pub rssi: i16,
    pub lsnr: f64,
    pub size: u16,
    /// Base64 编码的负载
    pub data: String,
}

impl Rxpk {
    /// 以固定射频参数包装一段负载。
    pub fn lora(payload: &[u8]) -> Self {
        let now = chrono::Utc::now();
        Self {
            time: Some(now.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()),
            tmst: now.timestamp_millis() as u32,
            chan: 1,
            rfch: 1,
            freq: 868.1,
            stat: 1,
            modu: "LORA".to_string(),
            datr: "SF7BW125".to_string(),
            codr: "4/5".to_string(),
            rssi: -50,
            lsnr: 7.5,
            size: payload.len().min(u16::MAX as usize) as u16,
            data: STANDARD.encode(payload),
        }
    }

    pub fn payload(&self) -> Result<Vec<u8>, TargetError> {
        STANDARD
            .decode(&self.data)
            .map_err(|e| invalid(format!("invalid base64 data: {}", e)))
    }
}

/// 网关状态统计。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stat {
    pub time: String,
    #[serde(default)]
    pub lati: f64,
    #[serde(default)]
    pub long: f64,
    #[serde(default)]
    pub alti: i32,
    pub rxnb: u32,
    pub rxok: u32,
    pub rxfw: u32,
    pub ackr: f64,
    pub dwnb: u32,
    pub txnb: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushDataPayload {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rxpk: Vec<Rxpk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stat: Option<Stat>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PushDataPacket {
    pub version: u8,
    pub token: u16,
    pub gateway_mac: GatewayMac,
    pub payload: PushDataPayload,
}

impl PushDataPacket {
    pub fn encode(&self) -> Result<Vec<u8>, TargetError> {
        let body = serde_json::to_vec(&self.payload).map_err(|e| invalid(e.to_string()))?;
        let mut out = header(self.version, self.token, PacketType::PushData, 12 + body.len());
        out.extend_from_slice(&self.gateway_mac);
        out.extend_from_slice(&body);
        Ok(out)
    }

    pub fn decode(data: &[u8]) -> Result<Self, TargetError> {
        let (version, token) = check_header(data, 13, PacketType::PushData)?;
        let payload = serde_json::from_slice(&data[12..]).map_err(|e| invalid(e.to_string()))?;
        Ok(Self {
            version,
            token,
            gateway_mac: read_mac(data),
            payload,
        })
    }
}

/// PUSH_ACK / PULL_ACK 只有报文头。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckPacket {
    pub version: u8,
    pub token: u16,
    pub kind: PacketType,
}

impl AckPacket {
    pub fn push_ack(version: u8, token: u16) -> Self {
        Self {
            version,
            token,
            kind: PacketType::PushAck,
        }
    }

    pub fn pull_ack(version: u8, token: u16) -> Self {
        Self {
            version,
            token,
            kind: PacketType::PullAck,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        header(self.version, self.token, self.kind, 4)
    }

    pub fn decode(data: &[u8], kind: PacketType) -> Result<Self, TargetError> {
        if data.len() != 4 {
            return Err(invalid("4 bytes of data are expected"));
        }
        let (version, token) = check_header(data, 4, kind)?;
        Ok(Self {
            version,
            token,
            kind,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PullDataPacket {
    pub version: u8,
    pub token: u16,
    pub gateway_mac: GatewayMac,
}

impl PullDataPacket {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = header(self.version, self.token, PacketType::PullData, 12);
        out.extend_from_slice(&self.gateway_mac);
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self, TargetError> {
        if data.len() != 12 {
            return Err(invalid("12 bytes of data are expected"));
        }
        let (version, token) = check_header(data, 12, PacketType::PullData)?;
        Ok(Self {
            version,
            token,
            gateway_mac: read_mac(data),
        })
    }
}

/// 下行发送请求，`txpk` 原样保留。
#[derive(Debug, Clone, PartialEq)]
pub struct PullRespPacket {
    pub version: u8,
    pub token: u16,
    pub txpk: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct PullRespPayload {
    txpk: serde_json::Value,
}

impl PullRespPacket {
    pub fn encode(&self) -> Result<Vec<u8>, TargetError> {
        let body = serde_json::to_vec(&PullRespPayload {
            txpk: self.txpk.clone(),
        })
        .map_err(|e| invalid(e.to_string()))?;
        let mut out = header(self.version, self.token, PacketType::PullResp, 4 + body.len());
        out.extend_from_slice(&body);
        Ok(out)
    }

    pub fn decode(data: &[u8]) -> Result<Self, TargetError> {
        let (version, token) = check_header(data, 5, PacketType::PullResp)?;
        let payload: PullRespPayload =
            serde_json::from_slice(&data[4..]).map_err(|e| invalid(e.to_string()))?;
        Ok(Self {
            version,
            token,
            txpk: payload.txpk,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxPkAck {
    #[serde(default)]
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxAckPayload {
    pub txpk_ack: TxPkAck,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxAckPacket {
    pub version: u8,
    pub token: u16,
    pub gateway_mac: GatewayMac,
    pub payload: Option<TxAckPayload>,
}

impl TxAckPacket {
    pub fn encode(&self) -> Result<Vec<u8>, TargetError> {
        let body = match &self.payload {
            Some(payload) => serde_json::to_vec(payload).map_err(|e| invalid(e.to_string()))?,
            None => Vec::new(),
        };
        let mut out = header(self.version, self.token, PacketType::TxAck, 12 + body.len());
        out.extend_from_slice(&self.gateway_mac);
        out.extend_from_slice(&body);
        Ok(out)
    }

    pub fn decode(data: &[u8]) -> Result<Self, TargetError> {
        let (version, token) = check_header(data, 12, PacketType::TxAck)?;
        // 至少要有 "{}"
        let payload = if data.len() > 13 {
            Some(serde_json::from_slice(&data[12..]).map_err(|e| invalid(e.to_string()))?)
        } else {
            None
        };
        Ok(Self {
            version,
            token,
            gateway_mac: read_mac(data),
            payload,
        })
    }
}

/// 解析十六进制网关 MAC（8 字节）。
pub fn parse_gateway_mac(value: &str) -> Result<GatewayMac, String> {
    let bytes = hex::decode(value.trim()).map_err(|e| format!("invalid mac addr:{} ({})", value, e))?;
    let mac: GatewayMac = bytes
        .try_into()
        .map_err(|_| format!("invalid mac addr:{}", value))?;
    Ok(mac)
}

fn default_mac() -> String {
    "00010203AABBCCDD".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    1700
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemtechForwarderConfig {
    #[serde(default = "default_mac")]
    pub mac: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cache_offline_data: bool,
}

impl ValidateConfig for SemtechForwarderConfig {
    fn validate(&self) -> Result<(), String> {
        parse_gateway_mac(&self.mac)?;
        self.host
            .parse::<IpAddr>()
            .map_err(|_| format!("invalid host format:{}", self.host))?;
        Ok(())
    }
}

/// 把规则输出包装成 PUSH_DATA 发往网络服务器。
pub struct SemtechForwarderTarget {
    uuid: String,
    config: Option<SemtechForwarderConfig>,
    mac: GatewayMac,
    cache: OfflineCache,
    state: StateCell,
}

impl SemtechForwarderTarget {
    pub fn new(deps: TargetDeps) -> Self {
        Self {
            uuid: String::new(),
            config: None,
            mac: [0u8; 8],
            cache: OfflineCache::new(deps.lost_cache),
            state: StateCell::default(),
        }
    }

    pub fn push_packet(&self, data: &str) -> PushDataPacket {
        PushDataPacket {
            version: PROTOCOL_VERSION_2,
            token: (OsRng.next_u32() & 0xFFFF) as u16,
            gateway_mac: self.mac,
            payload: PushDataPayload {
                rxpk: vec![Rxpk::lora(data.as_bytes())],
                stat: None,
            },
        }
    }
}

#[async_trait]
impl Deliver for SemtechForwarderTarget {
    async fn deliver(&self, data: &str) -> Result<(), TargetError> {
        let config = self.config.as_ref().ok_or(TargetError::NotConnected)?;
        let bytes = self.push_packet(data).encode()?;
        let addr = format!("{}:{}", config.host, config.port);
        send_datagram(&addr, &bytes, Duration::from_secs(3)).await
    }
}

#[async_trait]
impl Worker for SemtechForwarderTarget {
    async fn init(&mut self, uuid: &str, config: &ConfigMap) -> Result<(), RuntimeError> {
        let config: SemtechForwarderConfig = bind_config(config)?;
        self.mac = parse_gateway_mac(&config.mac).map_err(RuntimeError::Config)?;
        self.cache.bind(uuid, config.cache_offline_data);
        self.uuid = uuid.to_string();
        self.config = Some(config);
        Ok(())
    }

    async fn start(&self, _cancel: CancelToken) -> Result<(), RuntimeError> {
        self.state.begin_start();
        self.cache.replay(self).await;
        self.state.transition(ResourceState::Up);
        info!(target: "edge.target", uuid = %self.uuid, mac = %hex::encode_upper(self.mac), "semtech_forwarder_started");
        Ok(())
    }

    async fn status(&self) -> ResourceState {
        self.state.get()
    }

    async fn stop(&self) {
        self.state.transition(ResourceState::Stop);
    }

    fn as_target(&self) -> Option<&dyn Target> {
        Some(self)
    }
}

#[async_trait]
impl Target for SemtechForwarderTarget {
    async fn to(&self, data: &str) -> Result<(), RuntimeError> {
        self.cache.write_through(self, data).await
    }
}
