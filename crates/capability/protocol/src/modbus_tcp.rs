//! Modbus TCP 主站
//!
//! 连接 Modbus 从设备，按寄存器块读取并解码，支持写单个/多个保持寄存器。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let config = ModbusTcpConfig::from_json(r#"{"host":"192.168.1.100","port":502}"#)?;
//! let mut master = ModbusMaster::connect(&config).await?;
//! let registers = master.read_block(&block).await?;
//! ```

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use tokio_modbus::prelude::*;
use tracing::debug;

/// Modbus TCP 连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusTcpConfig {
    /// Modbus 服务器主机地址
    pub host: String,
    /// Modbus 服务器端口（默认 502）
    #[serde(default = "default_modbus_port")]
    pub port: u16,
    /// 超时（毫秒）
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_modbus_port() -> u16 {
    502
}

fn default_timeout() -> u64 {
    3000
}

impl ModbusTcpConfig {
    /// 从 JSON 配置字符串解析
    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(json).map_err(|e| ProtocolError::ConfigParse(e.to_string()))
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ProtocolError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ProtocolError::ConfigParse(format!("invalid address: {}", e)))
    }
}

/// Modbus 寄存器数据类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModbusDataType {
    /// 16位有符号整数
    #[default]
    Int16,
    /// 16位无符号整数
    Uint16,
    /// 32位有符号整数（2个寄存器）
    Int32,
    /// 32位无符号整数（2个寄存器）
    Uint32,
    /// 32位浮点数（2个寄存器）
    Float32,
    /// 64位浮点数（4个寄存器）
    Float64,
}

impl ModbusDataType {
    /// 所需寄存器数量
    pub fn register_count(self) -> u16 {
        match self {
            ModbusDataType::Int16 | ModbusDataType::Uint16 => 1,
            ModbusDataType::Int32 | ModbusDataType::Uint32 | ModbusDataType::Float32 => 2,
            ModbusDataType::Float64 => 4,
        }
    }
}

/// 寄存器块：一次读取的地址范围。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterBlock {
    /// 点位标识
    pub tag: String,
    /// 从站 ID (1-247)
    #[serde(default = "default_slave_id")]
    pub slave_id: u8,
    /// 功能码：3 读保持寄存器，4 读输入寄存器
    #[serde(default = "default_function")]
    pub function: u8,
    /// 寄存器起始地址
    pub address: u16,
    /// 数据类型
    #[serde(default)]
    pub data_type: ModbusDataType,
    /// 缩放系数
    #[serde(default)]
    pub weight: Option<f64>,
}

fn default_slave_id() -> u8 {
    1
}

fn default_function() -> u8 {
    3
}

/// Modbus TCP 主站连接。
pub struct ModbusMaster {
    ctx: tokio_modbus::client::Context,
    timeout: Duration,
}

impl ModbusMaster {
    pub async fn connect(config: &ModbusTcpConfig) -> Result<Self, ProtocolError> {
        let addr = config.socket_addr()?;
        let timeout = Duration::from_millis(config.timeout);
        let ctx = tokio::time::timeout(timeout, tcp::connect(addr))
            .await
            .map_err(|_| ProtocolError::Timeout(format!("connect {}", addr)))?
            .map_err(|e| ProtocolError::Connection(e.to_string()))?;
        Ok(Self { ctx, timeout })
    }

    /// 读取一个寄存器块，返回原始寄存器值
    pub async fn read_block(&mut self, block: &RegisterBlock) -> Result<Vec<u16>, ProtocolError> {
        self.ctx.set_slave(Slave(block.slave_id));
        let count = block.data_type.register_count();
        let timeout = self.timeout;
        let ctx = &mut self.ctx;
        let call = async move {
            let response = match block.function {
                3 => ctx.read_holding_registers(block.address, count).await,
                4 => ctx.read_input_registers(block.address, count).await,
                other => {
                    return Err(ProtocolError::ConfigParse(format!(
                        "unsupported function code: {}",
                        other
                    )));
                }
            };
            response
                .map_err(|e| ProtocolError::Modbus(e.to_string()))
                .and_then(|r| r.map_err(|e| ProtocolError::Modbus(format!("exception: {:?}", e))))
        };
        let registers = tokio::time::timeout(timeout, call)
            .await
            .map_err(|_| ProtocolError::Timeout(format!("read {}", block.tag)))??;

        debug!(
            target: "edge.protocol",
            slave = block.slave_id,
            register = block.address,
            values = ?registers,
            "read_modbus_registers"
        );
        Ok(registers)
    }

    pub async fn write_single_register(
        &mut self,
        slave_id: u8,
        address: u16,
        value: u16,
    ) -> Result<(), ProtocolError> {
        self.ctx.set_slave(Slave(slave_id));
        tokio::time::timeout(self.timeout, self.ctx.write_single_register(address, value))
            .await
            .map_err(|_| ProtocolError::Timeout(format!("write register {}", address)))?
            .map_err(|e| ProtocolError::Modbus(e.to_string()))?
            .map_err(|e| ProtocolError::Modbus(format!("exception: {:?}", e)))
    }

    pub async fn write_multiple_registers(
        &mut self,
        slave_id: u8,
        address: u16,
        values: &[u16],
    ) -> Result<(), ProtocolError> {
        self.ctx.set_slave(Slave(slave_id));
        tokio::time::timeout(
            self.timeout,
            self.ctx.write_multiple_registers(address, values),
        )
        .await
        .map_err(|_| ProtocolError::Timeout(format!("write registers {}", address)))?
        .map_err(|e| ProtocolError::Modbus(e.to_string()))?
        .map_err(|e| ProtocolError::Modbus(format!("exception: {:?}", e)))
    }
}

/// 解析寄存器数据为浮点值
pub fn decode_registers(registers: &[u16], data_type: ModbusDataType) -> Result<f64, ProtocolError> {
    let need = data_type.register_count() as usize;
    if registers.len() < need {
        return Err(ProtocolError::DataParse(format!(
            "need {} registers for {:?}",
            need, data_type
        )));
    }
    let word = |hi: u16, lo: u16| ((hi as u32) << 16) | lo as u32;
    let value = match data_type {
        ModbusDataType::Int16 => registers[0] as i16 as f64,
        ModbusDataType::Uint16 => registers[0] as f64,
        ModbusDataType::Int32 => word(registers[0], registers[1]) as i32 as f64,
        ModbusDataType::Uint32 => word(registers[0], registers[1]) as f64,
        ModbusDataType::Float32 => f32::from_bits(word(registers[0], registers[1])) as f64,
        ModbusDataType::Float64 => {
            let bits = registers[..4]
                .iter()
                .fold(0u64, |acc, r| (acc << 16) | *r as u64);
            f64::from_bits(bits)
        }
    };
    Ok(value)
}
