//! 请求响应帧
//!
//! 布局：`delimiter:2 | id:2 | type:2 | length:2 | payload | crc32:4 (BE) | reverse(delimiter):2`，
//! CRC32/IEEE 只覆盖 payload。

use crate::checksum::crc32_ieee;
use crate::error::ProtocolError;

const FIXED_LEN: usize = 2 + 6 + 4 + 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReqRespFrame {
    pub delimiter: [u8; 2],
    pub id: u16,
    pub frame_type: u16,
    pub payload: Vec<u8>,
}

impl ReqRespFrame {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        if self.payload.len() > u16::MAX as usize {
            return Err(ProtocolError::InvalidFrame(
                "payload length exceeds maximum".to_string(),
            ));
        }
        let mut out = Vec::with_capacity(FIXED_LEN + self.payload.len());
        out.extend_from_slice(&self.delimiter);
        out.extend_from_slice(&self.id.to_be_bytes());
        out.extend_from_slice(&self.frame_type.to_be_bytes());
        out.extend_from_slice(&(self.payload.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.payload);
        out.extend_from_slice(&crc32_ieee(&self.payload).to_be_bytes());
        out.extend_from_slice(&[self.delimiter[1], self.delimiter[0]]);
        Ok(out)
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < FIXED_LEN {
            return Err(ProtocolError::InvalidFrame(
                "data too short to decode frame".to_string(),
            ));
        }
        let delimiter = [data[0], data[1]];
        let id = u16::from_be_bytes([data[2], data[3]]);
        let frame_type = u16::from_be_bytes([data[4], data[5]]);
        let length = u16::from_be_bytes([data[6], data[7]]) as usize;
        if data.len() < FIXED_LEN + length {
            return Err(ProtocolError::InvalidFrame(
                "data too short for payload".to_string(),
            ));
        }
        let payload = data[8..8 + length].to_vec();
        let crc_at = 8 + length;
        let expected = u32::from_be_bytes([
            data[crc_at],
            data[crc_at + 1],
            data[crc_at + 2],
            data[crc_at + 3],
        ]);
        if crc32_ieee(&payload) != expected {
            return Err(ProtocolError::InvalidFrame("CRC check failed".to_string()));
        }
        let reverse = [data[crc_at + 4], data[crc_at + 5]];
        if reverse != [delimiter[1], delimiter[0]] {
            return Err(ProtocolError::InvalidFrame(
                "reverse delimiter mismatch".to_string(),
            ));
        }
        Ok(Self {
            delimiter,
            id,
            frame_type,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ReqRespFrame {
        ReqRespFrame {
            delimiter: [0x5A, 0xA5],
            id: 7,
            frame_type: 2,
            payload: b"on".to_vec(),
        }
    }

    #[test]
    fn test_encode_layout() {
        let bytes = sample().encode().unwrap();
        assert_eq!(&bytes[..8], &[0x5A, 0xA5, 0, 7, 0, 2, 0, 2]);
        assert_eq!(&bytes[bytes.len() - 2..], &[0xA5, 0x5A]);
        assert_eq!(ReqRespFrame::decode(&bytes).unwrap(), sample());
    }

    #[test]
    fn test_decode_rejects_corruption() {
        let mut bytes = sample().encode().unwrap();
        bytes[8] ^= 0x01;
        assert!(ReqRespFrame::decode(&bytes).is_err());

        let mut bytes = sample().encode().unwrap();
        let last = bytes.len() - 1;
        bytes[last] = 0;
        assert!(ReqRespFrame::decode(&bytes).is_err());
    }
}
