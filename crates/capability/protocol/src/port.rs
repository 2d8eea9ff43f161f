//! 端口抽象
//!
//! 字节流双向端口（串口、TCP 等），读写带截止时间，关闭幂等且能唤醒挂起中的读写。
//! 同一端口不允许并发读或并发写，所有权归属单个 Worker。

use crate::error::ProtocolError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::time::Instant;

/// 带截止时间的双向字节端口。
#[async_trait]
pub trait Port: Send {
    /// 读取到 `buf`，返回读取字节数；0 表示 EOF。
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ProtocolError>;

    /// 写入 `data`，返回写入字节数。
    async fn write(&mut self, data: &[u8]) -> Result<usize, ProtocolError>;

    /// 设置读截止时间，`None` 表示取消。
    fn set_read_deadline(&mut self, deadline: Option<Instant>);

    /// 设置写截止时间，`None` 表示取消。
    fn set_write_deadline(&mut self, deadline: Option<Instant>);

    /// 关闭端口，可重复调用。
    async fn close(&mut self) -> Result<(), ProtocolError>;

    /// 写入全部字节。
    async fn write_all(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        let mut written = 0;
        while written < data.len() {
            let n = self.write(&data[written..]).await?;
            if n == 0 {
                return Err(ProtocolError::ConnectionClosed);
            }
            written += n;
        }
        Ok(())
    }
}

/// 端口关闭句柄，可跨任务持有，用于唤醒挂起中的读写。
#[derive(Debug, Clone)]
pub struct PortCloser {
    tx: Arc<watch::Sender<bool>>,
}

impl PortCloser {
    pub fn close(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.tx.borrow()
    }
}

/// 基于任意异步流的端口实现（TcpStream、DuplexStream 等）。
pub struct StreamPort<S> {
    stream: S,
    read_deadline: Option<Instant>,
    write_deadline: Option<Instant>,
    closer: PortCloser,
    closed_rx: watch::Receiver<bool>,
    shutdown_done: bool,
}

impl<S> StreamPort<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        let (tx, closed_rx) = watch::channel(false);
        Self {
            stream,
            read_deadline: None,
            write_deadline: None,
            closer: PortCloser { tx: Arc::new(tx) },
            closed_rx,
            shutdown_done: false,
        }
    }

    pub fn closer(&self) -> PortCloser {
        self.closer.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closer.is_closed()
    }
}

#[async_trait]
impl<S> Port for StreamPort<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        if self.closer.is_closed() {
            return Err(ProtocolError::PortClosed);
        }
        let deadline = self.read_deadline;
        let mut closed = self.closed_rx.clone();
        let stream = &mut self.stream;
        let io = async move {
            match deadline {
                Some(at) => match tokio::time::timeout_at(at, stream.read(buf)).await {
                    Ok(result) => result.map_err(ProtocolError::from),
                    Err(_) => Err(ProtocolError::Timeout("read deadline exceeded".to_string())),
                },
                None => stream.read(buf).await.map_err(ProtocolError::from),
            }
        };
        tokio::select! {
            result = io => result,
            _ = closed.wait_for(|closed| *closed) => Err(ProtocolError::PortClosed),
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize, ProtocolError> {
        if self.closer.is_closed() {
            return Err(ProtocolError::PortClosed);
        }
        let deadline = self.write_deadline;
        let mut closed = self.closed_rx.clone();
        let stream = &mut self.stream;
        let io = async move {
            let n = match deadline {
                Some(at) => tokio::time::timeout_at(at, stream.write(data))
                    .await
                    .map_err(|_| ProtocolError::Timeout("write deadline exceeded".to_string()))??,
                None => stream.write(data).await?,
            };
            stream.flush().await?;
            Ok::<usize, ProtocolError>(n)
        };
        tokio::select! {
            result = io => result,
            _ = closed.wait_for(|closed| *closed) => Err(ProtocolError::PortClosed),
        }
    }

    fn set_read_deadline(&mut self, deadline: Option<Instant>) {
        self.read_deadline = deadline;
    }

    fn set_write_deadline(&mut self, deadline: Option<Instant>) {
        self.write_deadline = deadline;
    }

    async fn close(&mut self) -> Result<(), ProtocolError> {
        self.closer.close();
        if self.shutdown_done {
            return Ok(());
        }
        self.shutdown_done = true;
        // 对端可能已断开，shutdown 失败不影响关闭语义
        let _ = self.stream.shutdown().await;
        Ok(())
    }
}
