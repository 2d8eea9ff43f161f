//! 应用层（L3）
//!
//! - `AppLayerFrame`：`type:2 | length:2 | payload`，在链路层之上交换
//! - `AppLayer::request`：同步主站，发送一帧并等待应答
//! - `Slaver`：从站循环，把收到的帧投递到入站通道（容量 1024）
//! - `ApplicationFrame`：独立的 `length:2 | payload | crc16/MODBUS:2` 编解码

use crate::checksum::{crc16_modbus, CheckAlgorithm};
use crate::datalink::{DataLink, LinkStats};
use crate::error::ProtocolError;
use crate::port::Port;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// 从站入站通道容量。
pub const SLAVER_CHANNEL_CAPACITY: usize = 1024;

/// 应用层帧。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppLayerFrame {
    #[serde(rename = "type")]
    pub frame_type: u16,
    pub payload: Vec<u8>,
}

impl AppLayerFrame {
    pub fn new(frame_type: u16, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            frame_type,
            payload: payload.into(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        if self.payload.len() > u16::MAX as usize {
            return Err(ProtocolError::InvalidFrame(
                "payload length exceeds maximum".to_string(),
            ));
        }
        let mut out = Vec::with_capacity(4 + self.payload.len());
        out.extend_from_slice(&self.frame_type.to_be_bytes());
        out.extend_from_slice(&(self.payload.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < 4 {
            return Err(ProtocolError::InvalidFrame(
                "data too short for header".to_string(),
            ));
        }
        let frame_type = u16::from_be_bytes([bytes[0], bytes[1]]);
        let length = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
        if bytes.len() < 4 + length {
            return Err(ProtocolError::InvalidFrame(
                "data too short for payload".to_string(),
            ));
        }
        Ok(Self {
            frame_type,
            payload: bytes[4..4 + length].to_vec(),
        })
    }
}

/// 应用层：封装链路层，对外只暴露帧。
pub struct AppLayer<P> {
    datalink: DataLink<P>,
}

impl<P: Port> AppLayer<P> {
    pub fn new(port: P, check: CheckAlgorithm, read_timeout: Duration, write_timeout: Duration) -> Self {
        Self {
            datalink: DataLink::new(port, check, read_timeout, write_timeout),
        }
    }

    pub fn stats(&self) -> Arc<LinkStats> {
        self.datalink.stats()
    }

    /// 发送请求帧并等待应答帧。
    pub async fn request(&mut self, frame: &AppLayerFrame) -> Result<AppLayerFrame, ProtocolError> {
        let bytes = frame.encode()?;
        let response = self.datalink.exchange(&bytes).await?;
        AppLayerFrame::decode(&response)
    }

    pub async fn send(&mut self, frame: &AppLayerFrame) -> Result<(), ProtocolError> {
        let bytes = frame.encode()?;
        self.datalink.send(&bytes).await
    }

    pub async fn recv(&mut self) -> Result<AppLayerFrame, ProtocolError> {
        let bytes = self.datalink.recv().await?;
        AppLayerFrame::decode(&bytes)
    }

    pub async fn close(&mut self) -> Result<(), ProtocolError> {
        self.datalink.close().await
    }
}

/// 从站：持续读取帧并投递到入站通道。
pub struct Slaver<P> {
    app: AppLayer<P>,
    tx: mpsc::Sender<AppLayerFrame>,
}

impl<P: Port> Slaver<P> {
    pub fn new(app: AppLayer<P>) -> (Self, mpsc::Receiver<AppLayerFrame>) {
        let (tx, rx) = mpsc::channel(SLAVER_CHANNEL_CAPACITY);
        (Self { app, tx }, rx)
    }

    pub fn stats(&self) -> Arc<LinkStats> {
        self.app.stats()
    }

    /// 运行从站循环。
    ///
    /// `shutdown` 完成时正常退出；EOF 关闭端口并返回 `ConnectionClosed`；
    /// 校验失败、超时等瞬时错误只记录并继续。
    pub async fn run<F>(mut self, shutdown: F) -> Result<(), ProtocolError>
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);
        loop {
            let result = tokio::select! {
                _ = &mut shutdown => {
                    self.app.close().await?;
                    return Ok(());
                }
                result = self.app.recv() => result,
            };
            match result {
                Ok(frame) => {
                    if self.tx.send(frame).await.is_err() {
                        self.app.close().await?;
                        return Err(ProtocolError::ChannelClosed);
                    }
                }
                Err(err) if err.is_transient() => {
                    debug!(target: "edge.protocol", error = %err, "slaver_frame_skipped");
                }
                Err(err) => {
                    info!(target: "edge.protocol", error = %err, "slaver_stopped");
                    let _ = self.app.close().await;
                    return Err(err);
                }
            }
        }
    }
}

/// 独立应用帧：`length:u16 BE | payload | crc16/MODBUS BE`。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationFrame {
    pub length: u16,
    pub payload: Vec<u8>,
    pub crc16: u16,
}

impl ApplicationFrame {
    pub fn new(payload: impl Into<Vec<u8>>) -> Result<Self, ProtocolError> {
        let payload = payload.into();
        if payload.len() > u16::MAX as usize {
            return Err(ProtocolError::InvalidFrame(
                "payload length exceeds maximum".to_string(),
            ));
        }
        Ok(Self {
            length: payload.len() as u16,
            crc16: crc16_modbus(&payload),
            payload,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        if self.payload.len() != self.length as usize {
            return Err(ProtocolError::InvalidFrame(
                "payload length does not match Length field".to_string(),
            ));
        }
        let mut out = Vec::with_capacity(self.payload.len() + 4);
        out.extend_from_slice(&self.length.to_be_bytes());
        out.extend_from_slice(&self.payload);
        out.extend_from_slice(&crc16_modbus(&self.payload).to_be_bytes());
        Ok(out)
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < 4 {
            return Err(ProtocolError::InvalidFrame("data too short to decode".to_string()));
        }
        let length = u16::from_be_bytes([data[0], data[1]]);
        if data.len() != length as usize + 4 {
            return Err(ProtocolError::InvalidFrame("data length mismatch".to_string()));
        }
        let payload = data[2..2 + length as usize].to_vec();
        let crc16 = u16::from_be_bytes([data[data.len() - 2], data[data.len() - 1]]);
        if crc16 != crc16_modbus(&payload) {
            return Err(ProtocolError::InvalidFrame("crc16 check failed".to_string()));
        }
        Ok(Self {
            length,
            payload,
            crc16,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_layer_frame_decode_errors() {
        assert!(AppLayerFrame::decode(&[0x00, 0x01]).is_err());
        assert!(AppLayerFrame::decode(&[0x00, 0x01, 0x00, 0x05, 0x01]).is_err());
        let frame = AppLayerFrame::decode(&[0x00, 0x09, 0x00, 0x01, 0x7F]).unwrap();
        assert_eq!(frame, AppLayerFrame::new(9, vec![0x7F]));
    }

    #[test]
    fn test_app_layer_frame_too_large() {
        let frame = AppLayerFrame::new(1, vec![0u8; 70_000]);
        let err = frame.encode().unwrap_err();
        assert!(err.to_string().contains("payload length exceeds maximum"));
    }

    #[test]
    fn test_application_frame_codec() {
        let frame = ApplicationFrame::new(b"abc".to_vec()).unwrap();
        let bytes = frame.encode().unwrap();
        assert_eq!(&bytes[..2], &[0x00, 0x03]);
        assert_eq!(ApplicationFrame::decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn test_application_frame_errors() {
        assert_eq!(
            ApplicationFrame::decode(&[0x00]).unwrap_err().to_string(),
            "invalid frame: data too short to decode"
        );
        assert_eq!(
            ApplicationFrame::decode(&[0x00, 0x05, 0x01, 0x02, 0x03]).unwrap_err().to_string(),
            "invalid frame: data length mismatch"
        );
        let mut bytes = ApplicationFrame::new(vec![1, 2]).unwrap().encode().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert_eq!(
            ApplicationFrame::decode(&bytes).unwrap_err().to_string(),
            "invalid frame: crc16 check failed"
        );

        let mut frame = ApplicationFrame::new(vec![1, 2]).unwrap();
        frame.length = 3;
        assert!(frame.encode().is_err());
    }
}
