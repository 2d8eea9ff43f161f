//! 链路层（L2）
//!
//! 写入时在数据后追加校验字段，读取时校验并剥离。校验失败计数后返回错误，
//! 不上报监督器。

use crate::checksum::CheckAlgorithm;
use crate::error::ProtocolError;
use crate::port::Port;
use crate::transport::{Transport, TransportConfig};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// 链路统计，可跨任务读取。
#[derive(Debug, Default)]
pub struct LinkStats {
    tx_frames: AtomicU64,
    rx_frames: AtomicU64,
    tx_errors: AtomicU64,
    rx_errors: AtomicU64,
    checksum_errors: AtomicU64,
}

/// 链路统计快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStatsSnapshot {
    pub tx_frames: u64,
    pub rx_frames: u64,
    pub tx_errors: u64,
    pub rx_errors: u64,
    pub checksum_errors: u64,
}

impl LinkStats {
    pub fn snapshot(&self) -> LinkStatsSnapshot {
        LinkStatsSnapshot {
            tx_frames: self.tx_frames.load(Ordering::Relaxed),
            rx_frames: self.rx_frames.load(Ordering::Relaxed),
            tx_errors: self.tx_errors.load(Ordering::Relaxed),
            rx_errors: self.rx_errors.load(Ordering::Relaxed),
            checksum_errors: self.checksum_errors.load(Ordering::Relaxed),
        }
    }

    fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// 链路层。
pub struct DataLink<P> {
    transport: Transport<P>,
    check: CheckAlgorithm,
    stats: Arc<LinkStats>,
}

impl<P: Port> DataLink<P> {
    pub fn new(port: P, check: CheckAlgorithm, read_timeout: Duration, write_timeout: Duration) -> Self {
        let config = TransportConfig {
            read_timeout,
            write_timeout,
            check_width: check.width(),
        };
        Self {
            transport: Transport::new(port, config),
            check,
            stats: Arc::new(LinkStats::default()),
        }
    }

    pub fn check(&self) -> CheckAlgorithm {
        self.check
    }

    pub fn stats(&self) -> Arc<LinkStats> {
        self.stats.clone()
    }

    pub async fn send(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        let mut body = data.to_vec();
        body.extend_from_slice(&self.check.encode(data));
        match self.transport.write(&body).await {
            Ok(()) => {
                LinkStats::inc(&self.stats.tx_frames);
                Ok(())
            }
            Err(err) => {
                LinkStats::inc(&self.stats.tx_errors);
                Err(err)
            }
        }
    }

    /// 读取一帧并校验，返回剥离校验字段后的数据。
    pub async fn recv(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let bytes = match self.transport.read().await {
            Ok(bytes) => bytes,
            Err(err) => {
                LinkStats::inc(&self.stats.rx_errors);
                return Err(err);
            }
        };
        let width = self.check.width();
        if bytes.len() < 4 + width {
            LinkStats::inc(&self.stats.rx_errors);
            return Err(ProtocolError::InvalidDataLength);
        }
        let (data, tail) = bytes.split_at(bytes.len() - width);
        let expected = self.check.read(tail);
        let checked = self.check.compute(data);
        if expected != checked {
            LinkStats::inc(&self.stats.rx_errors);
            LinkStats::inc(&self.stats.checksum_errors);
            return Err(ProtocolError::Checksum { expected, checked });
        }
        LinkStats::inc(&self.stats.rx_frames);
        Ok(data.to_vec())
    }

    /// 发送后等待一帧应答。
    pub async fn exchange(&mut self, data: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        self.send(data).await?;
        self.recv().await
    }

    pub async fn close(&mut self) -> Result<(), ProtocolError> {
        self.transport.close().await
    }
}
