//! 传输层（L1）
//!
//! 线上格式：`AA BB | type:2 | length:2 (BE) | payload | check:W | 0D 0A`
//!
//! - 写：设置写截止时间，写入全部字节后清除截止时间
//! - 读：同步到 `AA BB`，读取 4 字节头，校验 0 < L ≤ 512，再读取 `L + W + 2` 字节；
//!   若结束符不对且中途出现新的 `AA BB`，当前尝试视为截断，从新起点重试
//! - 数据不足时，若后续 `AA BB` 处已缓存一个完整帧，或等待超时而后面存在新的 `AA BB`，
//!   同样按截断处理，避免一个声明长度过大的残帧卡住后续帧
//! - 本层不做校验，W 由链路层的校验算法决定

use crate::error::ProtocolError;
use crate::port::Port;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

pub const START_OF_FRAME: [u8; 2] = [0xAA, 0xBB];
pub const END_OF_FRAME: [u8; 2] = [0x0D, 0x0A];
/// 传输层单帧负载上限。
pub const MAX_PAYLOAD: usize = 512;
const HEADER_LEN: usize = 4;

/// 传输层配置。
#[derive(Debug, Clone, Copy)]
pub struct TransportConfig {
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    /// 链路层校验字段宽度
    pub check_width: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(3000),
            write_timeout: Duration::from_millis(3000),
            check_width: 2,
        }
    }
}

/// 传输层：负责边沿与长度，不关心内容。
pub struct Transport<P> {
    port: P,
    config: TransportConfig,
    // 错误恢复缓冲：上一次尝试未消费的字节
    pending: Vec<u8>,
}

impl<P: Port> Transport<P> {
    pub fn new(port: P, config: TransportConfig) -> Self {
        Self {
            port,
            config,
            pending: Vec::new(),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// 发送 `type|length|payload|check`，自动加上起止边沿。
    pub async fn write(&mut self, body: &[u8]) -> Result<(), ProtocolError> {
        let mut frame = Vec::with_capacity(body.len() + 4);
        frame.extend_from_slice(&START_OF_FRAME);
        frame.extend_from_slice(body);
        frame.extend_from_slice(&END_OF_FRAME);

        self.port
            .set_write_deadline(Some(Instant::now() + self.config.write_timeout));
        let result = self.port.write_all(&frame).await;
        self.port.set_write_deadline(None);
        result
    }

    /// 读取一帧，返回 `type|length|payload|check`（不含起止边沿）。
    pub async fn read(&mut self) -> Result<Vec<u8>, ProtocolError> {
        self.port
            .set_read_deadline(Some(Instant::now() + self.config.read_timeout));
        let result = self.read_frame().await;
        self.port.set_read_deadline(None);
        result
    }

    pub async fn close(&mut self) -> Result<(), ProtocolError> {
        self.pending.clear();
        self.port.close().await
    }

    async fn read_frame(&mut self) -> Result<Vec<u8>, ProtocolError> {
        loop {
            self.sync_start().await?;
            self.fill(2 + HEADER_LEN).await?;

            let length = u16::from_be_bytes([self.pending[4], self.pending[5]]) as usize;
            if length == 0 || length > MAX_PAYLOAD {
                // 丢弃当前起始边沿，下次从后续字节重新同步
                self.pending.drain(..2);
                return Err(ProtocolError::InvalidFrame(format!(
                    "invalid payload length: {}",
                    length
                )));
            }

            let total = 2 + HEADER_LEN + length + self.config.check_width + END_OF_FRAME.len();
            if self.pending.len() < total {
                if let Some(pos) = self.buffered_frame_after_start() {
                    debug!(target: "edge.protocol", offset = pos, "transport_frame_truncated");
                    self.pending.drain(..pos);
                    continue;
                }
                if let Err(err) = self.fill(total).await {
                    let later = find_start(&self.pending[2..]);
                    match (later, &err) {
                        (Some(pos), ProtocolError::Timeout(_)) => {
                            debug!(target: "edge.protocol", offset = pos + 2, "transport_frame_truncated");
                            self.pending.drain(..pos + 2);
                            continue;
                        }
                        _ => return Err(err),
                    }
                }
            }

            if self.pending[total - 2..total] == END_OF_FRAME {
                let body = self.pending[2..total - 2].to_vec();
                self.pending.drain(..total);
                return Ok(body);
            }

            match find_start(&self.pending[2..total]) {
                Some(pos) => {
                    debug!(target: "edge.protocol", offset = pos + 2, "transport_frame_truncated");
                    self.pending.drain(..pos + 2);
                }
                None => {
                    self.pending.drain(..total);
                    return Err(ProtocolError::InvalidFrame(
                        "missing end delimiter".to_string(),
                    ));
                }
            }
        }
    }

    /// 暂存区中（首个边沿之后）已完整到达的帧的起点。
    fn buffered_frame_after_start(&self) -> Option<usize> {
        let mut offset = 2;
        while let Some(pos) = find_start(&self.pending[offset..]) {
            let at = offset + pos;
            if complete_frame_len(&self.pending[at..], self.config.check_width).is_some() {
                return Some(at);
            }
            offset = at + 1;
        }
        None
    }

    /// 丢弃起始边沿之前的字节，直到暂存区以 `AA BB` 开头。
    async fn sync_start(&mut self) -> Result<(), ProtocolError> {
        loop {
            if let Some(pos) = find_start(&self.pending) {
                self.pending.drain(..pos);
                return Ok(());
            }
            let keep_last = self.pending.last() == Some(&START_OF_FRAME[0]);
            let len = self.pending.len();
            if keep_last {
                self.pending.drain(..len - 1);
            } else {
                self.pending.clear();
            }
            self.read_more().await?;
        }
    }

    async fn fill(&mut self, want: usize) -> Result<(), ProtocolError> {
        while self.pending.len() < want {
            self.read_more().await?;
        }
        Ok(())
    }

    async fn read_more(&mut self) -> Result<(), ProtocolError> {
        let mut buf = [0u8; 1024];
        let n = self.port.read(&mut buf).await?;
        if n == 0 {
            return Err(ProtocolError::ConnectionClosed);
        }
        self.pending.extend_from_slice(&buf[..n]);
        Ok(())
    }
}

fn find_start(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == START_OF_FRAME)
}

/// `data` 以一个长度合法且带结束符的完整帧开头时，返回该帧总长。
fn complete_frame_len(data: &[u8], check_width: usize) -> Option<usize> {
    if data.len() < 2 + HEADER_LEN || data[..2] != START_OF_FRAME {
        return None;
    }
    let length = u16::from_be_bytes([data[4], data[5]]) as usize;
    if length == 0 || length > MAX_PAYLOAD {
        return None;
    }
    let total = 2 + HEADER_LEN + length + check_width + END_OF_FRAME.len();
    (data.len() >= total && data[total - 2..total] == END_OF_FRAME).then_some(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::StreamPort;
    use tokio::io::AsyncWriteExt;

    fn body(frame_type: u16, payload: &[u8], check: &[u8]) -> Vec<u8> {
        let mut out = frame_type.to_be_bytes().to_vec();
        out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        out.extend_from_slice(payload);
        out.extend_from_slice(check);
        out
    }

    #[tokio::test]
    async fn test_write_wraps_edges() {
        let (a, mut b) = tokio::io::duplex(256);
        let mut transport = Transport::new(StreamPort::new(a), TransportConfig::default());
        transport.write(&[1, 2, 3]).await.unwrap();
        let mut buf = [0u8; 7];
        tokio::io::AsyncReadExt::read_exact(&mut b, &mut buf).await.unwrap();
        assert_eq!(buf, [0xAA, 0xBB, 1, 2, 3, 0x0D, 0x0A]);
    }

    #[tokio::test]
    async fn test_read_skips_noise_and_truncation() {
        let (a, mut b) = tokio::io::duplex(1024);
        let mut transport = Transport::new(StreamPort::new(a), TransportConfig::default());

        let good = body(0x0001, &[9, 8, 7], &[0x12, 0x34]);
        let mut wire = vec![0x00, 0x01];
        // 截断帧：声明长度 5，但中途出现新的起始边沿
        wire.extend_from_slice(&[0xAA, 0xBB, 0x00, 0x01, 0x00, 0x05, 0x01]);
        wire.extend_from_slice(&START_OF_FRAME);
        wire.extend_from_slice(&good);
        wire.extend_from_slice(&END_OF_FRAME);
        b.write_all(&wire).await.unwrap();

        let frame = transport.read().await.unwrap();
        assert_eq!(frame, good);
    }

    #[tokio::test]
    async fn test_read_recovers_from_truncated_long_frame() {
        let (a, mut b) = tokio::io::duplex(1024);
        let mut transport = Transport::new(StreamPort::new(a), TransportConfig::default());

        let good = body(0x0007, &[1, 2, 3], &[0x12, 0x34]);
        // 截断帧声明长度 64，后面完整帧的字节数不足以凑满它
        let mut wire = vec![0xAA, 0xBB, 0x00, 0x01, 0x00, 0x40, 0x01];
        wire.extend_from_slice(&START_OF_FRAME);
        wire.extend_from_slice(&good);
        wire.extend_from_slice(&END_OF_FRAME);
        b.write_all(&wire).await.unwrap();

        let frame = tokio::time::timeout(Duration::from_millis(500), transport.read())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame, good);
    }

    #[tokio::test]
    async fn test_read_resyncs_after_timeout() {
        let (a, mut b) = tokio::io::duplex(1024);
        let config = TransportConfig {
            read_timeout: Duration::from_millis(100),
            ..TransportConfig::default()
        };
        let mut transport = Transport::new(StreamPort::new(a), config);

        let good = body(0x0007, &[1, 2, 3], &[0x12, 0x34]);
        let mut rest = good.clone();
        rest.extend_from_slice(&END_OF_FRAME);
        let tail = rest.split_off(4);

        let mut wire = vec![0xAA, 0xBB, 0x00, 0x01, 0x00, 0x40, 0x01];
        wire.extend_from_slice(&START_OF_FRAME);
        wire.extend_from_slice(&rest);
        b.write_all(&wire).await.unwrap();
        assert!(matches!(
            transport.read().await,
            Err(ProtocolError::Timeout(_))
        ));

        b.write_all(&tail).await.unwrap();
        assert_eq!(transport.read().await.unwrap(), good);
    }

    #[tokio::test]
    async fn test_read_rejects_bad_length() {
        let (a, mut b) = tokio::io::duplex(1024);
        let mut transport = Transport::new(StreamPort::new(a), TransportConfig::default());
        b.write_all(&[0xAA, 0xBB, 0x00, 0x01, 0x00, 0x00]).await.unwrap();
        assert!(matches!(
            transport.read().await,
            Err(ProtocolError::InvalidFrame(_))
        ));

        b.write_all(&[0xAA, 0xBB, 0x00, 0x01, 0x02, 0x01]).await.unwrap();
        assert!(matches!(
            transport.read().await,
            Err(ProtocolError::InvalidFrame(_))
        ));
    }

    #[tokio::test]
    async fn test_read_eof() {
        let (a, b) = tokio::io::duplex(64);
        let mut transport = Transport::new(StreamPort::new(a), TransportConfig::default());
        drop(b);
        assert!(matches!(
            transport.read().await,
            Err(ProtocolError::ConnectionClosed)
        ));
    }
}
