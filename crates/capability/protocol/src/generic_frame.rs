//! 通用帧：`length:u32 LE | JSON(T) | crc32 LE`
//!
//! CRC32/IEEE 覆盖 `length | data`。序列化前与反序列化后都会调用 `validate`。

use crate::checksum::crc32_ieee;
use crate::error::ProtocolError;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// 可校验的负载。
pub trait Validatable {
    fn validate(&self) -> Result<(), String>;
}

/// 带长度与 CRC32 的通用帧。
#[derive(Debug, Clone, PartialEq)]
pub struct GenericFrame<T> {
    pub data: T,
}

impl<T> GenericFrame<T>
where
    T: Validatable + Serialize + DeserializeOwned,
{
    pub fn new(data: T) -> Self {
        Self { data }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, ProtocolError> {
        self.data.validate().map_err(ProtocolError::DataParse)?;
        let body =
            serde_json::to_vec(&self.data).map_err(|e| ProtocolError::DataParse(e.to_string()))?;
        let mut out = Vec::with_capacity(body.len() + 8);
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(&body);
        let crc = crc32_ieee(&out);
        out.extend_from_slice(&crc.to_le_bytes());
        Ok(out)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < 8 {
            return Err(ProtocolError::InvalidFrame(
                "data is too short to contain length and CRC".to_string(),
            ));
        }
        let length = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        if bytes.len() != length + 8 {
            return Err(ProtocolError::InvalidFrame(format!(
                "declared length {} does not match frame size {}",
                length,
                bytes.len()
            )));
        }
        let (covered, tail) = bytes.split_at(4 + length);
        let expected = u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]);
        if crc32_ieee(covered) != expected {
            return Err(ProtocolError::InvalidFrame(
                "CRC does not match, data may be corrupted".to_string(),
            ));
        }
        let data: T = serde_json::from_slice(&covered[4..])
            .map_err(|e| ProtocolError::DataParse(e.to_string()))?;
        data.validate().map_err(ProtocolError::DataParse)?;
        Ok(Self { data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Reading {
        sensor: String,
        value: i32,
    }

    impl Validatable for Reading {
        fn validate(&self) -> Result<(), String> {
            if self.sensor.is_empty() {
                return Err("sensor is required".to_string());
            }
            Ok(())
        }
    }

    #[test]
    fn test_generic_frame_identity() {
        let frame = GenericFrame::new(Reading {
            sensor: "t1".to_string(),
            value: 25,
        });
        let bytes = frame.serialize().unwrap();
        assert_eq!(GenericFrame::<Reading>::deserialize(&bytes).unwrap(), frame);
    }

    #[test]
    fn test_generic_frame_crc_mismatch() {
        let frame = GenericFrame::new(Reading {
            sensor: "t1".to_string(),
            value: 25,
        });
        let mut bytes = frame.serialize().unwrap();
        let last = bytes.len() - 1;
        bytes[last] = bytes[last].wrapping_add(1);
        let err = GenericFrame::<Reading>::deserialize(&bytes).unwrap_err();
        assert!(err.to_string().contains("CRC does not match"));
    }

    #[test]
    fn test_generic_frame_validates() {
        let frame = GenericFrame::new(Reading {
            sensor: String::new(),
            value: 1,
        });
        assert!(frame.serialize().is_err());
        assert!(GenericFrame::<Reading>::deserialize(&[0, 0]).is_err());
    }
}
