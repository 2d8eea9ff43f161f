//! 校验算法
//!
//! 两种 CRC16 并存，不能合并：
//! - 分帧器、请求应答包使用 CRC-16/CCITT-FALSE（多项式 0x1021，初值 0xFFFF）
//! - 应用帧编解码使用 CRC-16/MODBUS
//!
//! 链路层的 "CRC8" 实际是按字节累加（溢出回绕）的校验和，另提供真正的 CRC-8（多项式 0x07）。

use crate::error::ProtocolError;
use crc::{Crc, CRC_16_IBM_3740, CRC_16_MODBUS, CRC_32_ISO_HDLC, CRC_8_SMBUS};
use serde::{Deserialize, Serialize};

const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);
const CRC16_CCITT: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);
const CRC16_MODBUS: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);
const CRC32_IEEE: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// 按字节累加，溢出回绕。
pub fn checksum8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// CRC-8（多项式 0x07，初值 0）。
pub fn crc8(data: &[u8]) -> u8 {
    CRC8.checksum(data)
}

/// CRC-16/CCITT-FALSE。
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    CRC16_CCITT.checksum(data)
}

/// CRC-16/MODBUS。
pub fn crc16_modbus(data: &[u8]) -> u16 {
    CRC16_MODBUS.checksum(data)
}

/// CRC-32/IEEE。
pub fn crc32_ieee(data: &[u8]) -> u32 {
    CRC32_IEEE.checksum(data)
}

/// 校验双边沿 CRC16 帧并返回数据段。
///
/// 帧布局：`edge:2 | data | crc16:2 (BE) | \r\n`，CRC 覆盖 `data`。
pub fn check_data_crc16(buffer: &[u8]) -> Result<&[u8], ProtocolError> {
    let len = buffer.len();
    if len < 6 {
        return Err(ProtocolError::InvalidFrame(format!("Invalid packet:{:?}", buffer)));
    }
    let checked = u16::from_be_bytes([buffer[len - 4], buffer[len - 3]]);
    let data = &buffer[2..len - 4];
    let calculated = crc16_ccitt(data);
    if checked != calculated {
        return Err(ProtocolError::Crc16 {
            checked,
            calculated,
        });
    }
    Ok(data)
}

/// 校验末尾 4 字节大端 CRC32 并返回数据段。
pub fn check_data_crc32(buffer: &[u8]) -> Result<&[u8], ProtocolError> {
    if buffer.len() < 4 {
        return Err(ProtocolError::InvalidFrame(
            "data is too short to contain a CRC32 checksum".to_string(),
        ));
    }
    let split = buffer.len() - 4;
    let (data, tail) = buffer.split_at(split);
    let expected = u32::from_be_bytes([tail[0], tail[1], tail[2], tail[3]]);
    if crc32_ieee(data) != expected {
        return Err(ProtocolError::InvalidFrame(
            "CRC32 checksum does not match".to_string(),
        ));
    }
    Ok(data)
}

/// 链路层校验算法。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckAlgorithm {
    /// 累加和（1 字节）
    Checksum8,
    /// CRC-8（1 字节）
    Crc8,
    /// CRC-16/CCITT-FALSE（2 字节，大端）
    #[default]
    Crc16,
    /// CRC-32/IEEE（4 字节，大端）
    Crc32,
}

impl CheckAlgorithm {
    /// 校验字段宽度（字节）。
    pub fn width(self) -> usize {
        match self {
            CheckAlgorithm::Checksum8 | CheckAlgorithm::Crc8 => 1,
            CheckAlgorithm::Crc16 => 2,
            CheckAlgorithm::Crc32 => 4,
        }
    }

    pub fn compute(self, data: &[u8]) -> u32 {
        match self {
            CheckAlgorithm::Checksum8 => checksum8(data) as u32,
            CheckAlgorithm::Crc8 => crc8(data) as u32,
            CheckAlgorithm::Crc16 => crc16_ccitt(data) as u32,
            CheckAlgorithm::Crc32 => crc32_ieee(data),
        }
    }

    /// 按宽度大端编码校验值。
    pub fn encode(self, data: &[u8]) -> Vec<u8> {
        let value = self.compute(data);
        value.to_be_bytes()[4 - self.width()..].to_vec()
    }

    /// 从大端字节读取校验值。
    pub fn read(self, bytes: &[u8]) -> u32 {
        bytes
            .iter()
            .take(self.width())
            .fold(0u32, |acc, b| (acc << 8) | *b as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crc16_frame(payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![0xEE, 0xEF];
        frame.extend_from_slice(payload);
        frame.extend_from_slice(&crc16_ccitt(payload).to_be_bytes());
        frame.extend_from_slice(b"\r\n");
        frame
    }

    #[test]
    fn test_known_vectors() {
        assert_eq!(crc16_ccitt(b"123456789"), 0x29B1);
        assert_eq!(crc16_modbus(b"123456789"), 0x4B37);
        assert_eq!(crc32_ieee(b"123456789"), 0xCBF4_3926);
        assert_eq!(crc8(b"123456789"), 0xF4);
    }

    #[test]
    fn test_checksum8_wraps() {
        assert_eq!(checksum8(&[0xFF, 0x02]), 0x01);
        assert_eq!(checksum8(&[]), 0);
    }

    #[test]
    fn test_check_data_crc16() {
        let payload = [0xDE, 0xAD, 0xBE, 0xEF];
        let frame = crc16_frame(&payload);
        assert_eq!(check_data_crc16(&frame).unwrap(), &payload);

        let mut broken = frame.clone();
        let idx = broken.len() - 3;
        broken[idx] ^= 0x01;
        let err = check_data_crc16(&broken).unwrap_err();
        assert!(err.to_string().starts_with("CRC Check Error"));
    }

    #[test]
    fn test_check_data_crc16_short() {
        let err = check_data_crc16(&[0xEE, 0xEF, 0x0D]).unwrap_err();
        assert!(err.to_string().contains("Invalid packet"));
    }

    #[test]
    fn test_check_data_crc32() {
        let mut data = b"hello".to_vec();
        data.extend_from_slice(&crc32_ieee(b"hello").to_be_bytes());
        assert_eq!(check_data_crc32(&data).unwrap(), b"hello");
        data[0] = b'j';
        assert!(check_data_crc32(&data).is_err());
        assert!(check_data_crc32(&[1, 2]).is_err());
    }

    #[test]
    fn test_check_algorithm_encode() {
        let data = [0x01, 0x02, 0x03];
        assert_eq!(CheckAlgorithm::Checksum8.encode(&data), vec![0x06]);
        let crc16 = CheckAlgorithm::Crc16.encode(&data);
        assert_eq!(crc16.len(), 2);
        assert_eq!(CheckAlgorithm::Crc16.read(&crc16), crc16_ccitt(&data) as u32);
        assert_eq!(CheckAlgorithm::Crc32.encode(&data).len(), 4);
    }
}
