//! 请求应答包
//!
//! `0xFF | type | deviceId | msgId:2 (BE) | dataLen:1 | data | crc16:2 (BE) | 0xFE`，
//! CRC-16/CCITT-FALSE 覆盖起始标志到数据末尾。

use crate::checksum::crc16_ccitt;
use crate::error::ProtocolError;

pub const START_FLAG: u8 = 0xFF;
pub const END_FLAG: u8 = 0xFE;
const MIN_PACKET_LEN: usize = 9;

/// 包类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Report,
    Command,
    Reply,
}

impl PacketType {
    pub fn as_u8(self) -> u8 {
        match self {
            PacketType::Report => 0x01,
            PacketType::Command => 0x02,
            PacketType::Reply => 0x03,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(PacketType::Report),
            0x02 => Some(PacketType::Command),
            0x03 => Some(PacketType::Reply),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub packet_type: PacketType,
    pub device_id: u8,
    pub msg_id: u16,
    pub data: Vec<u8>,
}

impl Packet {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        if self.data.len() > u8::MAX as usize {
            return Err(ProtocolError::InvalidFrame(format!(
                "data too long: {}",
                self.data.len()
            )));
        }
        let mut out = Vec::with_capacity(MIN_PACKET_LEN + self.data.len());
        out.push(START_FLAG);
        out.push(self.packet_type.as_u8());
        out.push(self.device_id);
        out.extend_from_slice(&self.msg_id.to_be_bytes());
        out.push(self.data.len() as u8);
        out.extend_from_slice(&self.data);
        let crc = crc16_ccitt(&out);
        out.extend_from_slice(&crc.to_be_bytes());
        out.push(END_FLAG);
        Ok(out)
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < MIN_PACKET_LEN {
            return Err(ProtocolError::InvalidFrame("packet too short".to_string()));
        }
        if bytes[0] != START_FLAG || bytes[bytes.len() - 1] != END_FLAG {
            return Err(ProtocolError::InvalidFrame("invalid start or end flag".to_string()));
        }
        let data_len = bytes[5] as usize;
        if bytes.len() != 6 + data_len + 3 {
            return Err(ProtocolError::InvalidFrame("data length mismatch".to_string()));
        }
        let crc_at = 6 + data_len;
        let checked = u16::from_be_bytes([bytes[crc_at], bytes[crc_at + 1]]);
        let calculated = crc16_ccitt(&bytes[..crc_at]);
        if checked != calculated {
            return Err(ProtocolError::Crc16 {
                checked,
                calculated,
            });
        }
        let packet_type = PacketType::from_u8(bytes[1])
            .ok_or_else(|| ProtocolError::InvalidFrame(format!("unknown packet type: {}", bytes[1])))?;
        Ok(Self {
            packet_type,
            device_id: bytes[2],
            msg_id: u16::from_be_bytes([bytes[3], bytes[4]]),
            data: bytes[6..crc_at].to_vec(),
        })
    }

    /// 构造对本包的应答，沿用设备号与消息号。
    pub fn reply(&self, data: impl Into<Vec<u8>>) -> Packet {
        Packet {
            packet_type: PacketType::Reply,
            device_id: self.device_id,
            msg_id: self.msg_id,
            data: data.into(),
        }
    }
}
