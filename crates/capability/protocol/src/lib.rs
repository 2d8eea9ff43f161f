//! # 帧协议引擎
//!
//! 在任意双向字节流（串口、TCP）上完成分帧、校验与请求应答交换。
//!
//! ## 架构设计
//!
//! ```text
//! Port（读写截止时间 / 幂等关闭）
//!   │
//!   ├── 分帧器（定长头 / 换行 / 特殊边沿 / CRC16 双边沿）──> mpsc 通道（完整帧）
//!   │
//!   └── Transport（AA BB ... 0D 0A，只管边沿与长度）
//!          │
//!          ▼
//!       DataLink（累加和 / CRC8 / CRC16 / CRC32 校验，Tx/Rx 错误计数）
//!          │
//!          ▼
//!       AppLayer（type + length + payload）
//!          ├── request()：同步主站
//!          └── Slaver：从站循环，入站通道
//! ```
//!
//! ## 传输层线上格式
//!
//! ```text
//! 0xAA 0xBB | type:2 | length:2 (BE) | payload:length | check:W (BE) | 0x0D 0x0A
//! ```
//!
//! 负载最多 512 字节，校验覆盖 type + length + payload。
//!
//! 另外提供与传输栈无关的编解码：`ApplicationFrame`、`GenericFrame`、`ReqRespFrame`、
//! 请求应答 `Packet`、二进制字段解析 `parse_binary`，以及 Modbus TCP 主站。

mod application;
mod binparser;
mod checksum;
mod datalink;
mod error;
mod framer;
mod generic_frame;
mod modbus_tcp;
mod packet;
mod port;
mod reqresp_frame;
mod transport;

pub use application::{AppLayer, AppLayerFrame, ApplicationFrame, Slaver, SLAVER_CHANNEL_CAPACITY};
pub use binparser::parse_binary;
pub use checksum::{
    check_data_crc16, check_data_crc32, checksum8, crc16_ccitt, crc16_modbus, crc32_ieee, crc8,
    CheckAlgorithm,
};
pub use datalink::{DataLink, LinkStats, LinkStatsSnapshot};
pub use error::ProtocolError;
pub use framer::{
    run_framer, Crc16EdgeDecoder, FixedLengthDecoder, FrameDecoder, FramerStats, NewlineDecoder,
    SpecialEdgeDecoder, MAX_FRAME_SIZE, SCRATCH_CAPACITY,
};
pub use generic_frame::{GenericFrame, Validatable};
pub use modbus_tcp::{decode_registers, ModbusDataType, ModbusMaster, ModbusTcpConfig, RegisterBlock};
pub use packet::{Packet, PacketType};
pub use port::{Port, PortCloser, StreamPort};
pub use reqresp_frame::ReqRespFrame;
pub use transport::{Transport, TransportConfig, MAX_PAYLOAD};
