//! 协议错误类型定义

/// 协议通信错误
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// 连接错误
    #[error("connection error: {0}")]
    Connection(String),

    /// 对端关闭（EOF）
    #[error("connection closed")]
    ConnectionClosed,

    /// 端口已关闭
    #[error("port closed")]
    PortClosed,

    /// IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Modbus 错误
    #[error("modbus error: {0}")]
    Modbus(String),

    /// 配置解析错误
    #[error("config parse error: {0}")]
    ConfigParse(String),

    /// 数据解析错误
    #[error("data parse error: {0}")]
    DataParse(String),

    /// 帧格式错误（长度越界、缺少结束符等）
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// 链路层数据过短
    #[error("Invalid data length")]
    InvalidDataLength,

    /// 链路层校验失败
    #[error("Check sum error, expected:{expected}, checked: {checked}")]
    Checksum { expected: u32, checked: u32 },

    /// CRC16 帧校验失败
    #[error("CRC Check Error: (Checked={checked},Calculated={calculated})")]
    Crc16 { checked: u16, calculated: u16 },

    /// 超时错误
    #[error("timeout: {0}")]
    Timeout(String),

    /// 通道关闭
    #[error("channel closed")]
    ChannelClosed,
}

impl ProtocolError {
    /// 瞬时错误：记录并计数，不上报监督器。
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProtocolError::Timeout(_)
                | ProtocolError::InvalidFrame(_)
                | ProtocolError::InvalidDataLength
                | ProtocolError::Checksum { .. }
                | ProtocolError::Crc16 { .. }
                | ProtocolError::DataParse(_)
        )
    }

    /// 致命错误：端口不可用，Worker 需转为 DOWN。
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProtocolError::ConnectionClosed | ProtocolError::PortClosed | ProtocolError::Io(_)
        )
    }
}
