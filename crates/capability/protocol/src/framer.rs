//! 分帧器
//!
//! 四种分帧规则，均从端口读取字节并向输出通道投递完整帧：
//! - `FixedLengthDecoder`：4 字节大端长度头 + 数据
//! - `NewlineDecoder`：以 `\r\n` 结尾
//! - `SpecialEdgeDecoder`：起始边沿 (E1, E2) 到 `\r\n` 之间
//! - `Crc16EdgeDecoder`：`EE EF` 起始，`\r\n` 结尾，结尾前 2 字节为 CRC16
//!
//! 共同约束：暂存区上限 10240 字节，单帧上限 256 字节；遇到超长或畸形帧时清空暂存区继续扫描；
//! 不完整的尾部字节保留到下一次读取。

use crate::checksum::check_data_crc16;
use crate::error::ProtocolError;
use crate::port::Port;
use std::future::Future;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// 暂存区上限。
pub const SCRATCH_CAPACITY: usize = 10240;
/// 单帧上限。
pub const MAX_FRAME_SIZE: usize = 256;

const CRLF: [u8; 2] = [0x0D, 0x0A];
const CRC16_EDGE: [u8; 2] = [0xEE, 0xEF];

/// 分帧统计。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FramerStats {
    pub frames: u64,
    pub dropped: u64,
    pub checksum_errors: u64,
}

/// 纯字节分帧逻辑，与 IO 解耦。
pub trait FrameDecoder: Send {
    /// 喂入新字节，返回本次可取出的全部完整帧。
    fn feed(&mut self, data: &[u8]) -> Vec<Vec<u8>>;

    fn stats(&self) -> FramerStats;
}

/// 暂存区：统一处理容量上限与统计。
#[derive(Debug, Default)]
struct Scratch {
    buf: Vec<u8>,
    stats: FramerStats,
}

impl Scratch {
    fn push(&mut self, data: &[u8]) {
        if self.buf.len() + data.len() > SCRATCH_CAPACITY {
            warn!(target: "edge.protocol", pending = self.buf.len(), "framer_scratch_overflow");
            self.reset();
        }
        let take = data.len().min(SCRATCH_CAPACITY);
        self.buf.extend_from_slice(&data[data.len() - take..]);
    }

    fn reset(&mut self) {
        if !self.buf.is_empty() {
            self.stats.dropped += 1;
        }
        self.buf.clear();
    }

    fn emit(&mut self, frames: &mut Vec<Vec<u8>>, frame: &[u8]) {
        self.stats.frames += 1;
        frames.push(frame.to_vec());
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// 4 字节大端长度头分帧，输出仅包含数据部分。
#[derive(Debug, Default)]
pub struct FixedLengthDecoder {
    scratch: Scratch,
}

impl FixedLengthDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameDecoder for FixedLengthDecoder {
    fn feed(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        self.scratch.push(data);
        let mut frames = Vec::new();
        loop {
            let buf = &self.scratch.buf;
            if buf.len() < 4 {
                break;
            }
            let length = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
            if length == 0 || length > MAX_FRAME_SIZE {
                debug!(target: "edge.protocol", length, "fixed_length_frame_rejected");
                self.scratch.reset();
                break;
            }
            if buf.len() < 4 + length {
                break;
            }
            let frame = buf[4..4 + length].to_vec();
            self.scratch.emit(&mut frames, &frame);
            self.scratch.buf.drain(..4 + length);
        }
        frames
    }

    fn stats(&self) -> FramerStats {
        self.scratch.stats
    }
}

/// `\r\n` 结尾分帧，输出不含结束符；含结束符不足 4 字节的帧被丢弃。
#[derive(Debug, Default)]
pub struct NewlineDecoder {
    scratch: Scratch,
}

impl NewlineDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameDecoder for NewlineDecoder {
    fn feed(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        self.scratch.push(data);
        let mut frames = Vec::new();
        loop {
            match find(&self.scratch.buf, &CRLF) {
                Some(pos) => {
                    let frame = self.scratch.buf[..pos].to_vec();
                    self.scratch.buf.drain(..pos + 2);
                    if pos + 2 < 4 || frame.len() > MAX_FRAME_SIZE {
                        self.scratch.stats.dropped += 1;
                        continue;
                    }
                    self.scratch.emit(&mut frames, &frame);
                }
                None => {
                    if self.scratch.buf.len() > MAX_FRAME_SIZE + CRLF.len() {
                        self.scratch.reset();
                    }
                    break;
                }
            }
        }
        frames
    }

    fn stats(&self) -> FramerStats {
        self.scratch.stats
    }
}

/// 在暂存区中定位起始边沿，丢弃边沿前的噪声字节。
///
/// 返回 false 表示暂存区中尚无完整边沿。
fn align_to_edge(scratch: &mut Scratch, edge: [u8; 2]) -> bool {
    match find(&scratch.buf, &edge) {
        Some(0) => true,
        Some(pos) => {
            scratch.buf.drain(..pos);
            true
        }
        None => {
            // 仅保留可能是半个边沿的最后一个字节
            let keep_last = scratch.buf.last() == Some(&edge[0]);
            let len = scratch.buf.len();
            if keep_last {
                scratch.buf.drain(..len - 1);
            } else {
                scratch.buf.clear();
            }
            false
        }
    }
}

/// 起始边沿 (E1, E2) 与 `\r\n` 之间的字节构成一帧。
#[derive(Debug)]
pub struct SpecialEdgeDecoder {
    edge: [u8; 2],
    scratch: Scratch,
}

impl SpecialEdgeDecoder {
    pub fn new(e1: u8, e2: u8) -> Self {
        Self {
            edge: [e1, e2],
            scratch: Scratch::default(),
        }
    }
}

impl FrameDecoder for SpecialEdgeDecoder {
    fn feed(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        self.scratch.push(data);
        let mut frames = Vec::new();
        while align_to_edge(&mut self.scratch, self.edge) {
            match find(&self.scratch.buf[2..], &CRLF) {
                Some(pos) => {
                    let frame = self.scratch.buf[2..2 + pos].to_vec();
                    self.scratch.buf.drain(..2 + pos + 2);
                    if frame.len() > MAX_FRAME_SIZE {
                        self.scratch.stats.dropped += 1;
                        continue;
                    }
                    self.scratch.emit(&mut frames, &frame);
                }
                None => {
                    if self.scratch.buf.len() > MAX_FRAME_SIZE + 4 {
                        self.scratch.reset();
                    }
                    break;
                }
            }
        }
        frames
    }

    fn stats(&self) -> FramerStats {
        self.scratch.stats
    }
}

/// `EE EF` 起始、`\r\n` 结尾、带 CRC16 的帧，输出校验通过的数据段。
#[derive(Debug, Default)]
pub struct Crc16EdgeDecoder {
    scratch: Scratch,
}

impl Crc16EdgeDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameDecoder for Crc16EdgeDecoder {
    fn feed(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        self.scratch.push(data);
        let mut frames = Vec::new();
        while align_to_edge(&mut self.scratch, CRC16_EDGE) {
            match find(&self.scratch.buf[2..], &CRLF) {
                Some(pos) => {
                    let end = 2 + pos + 2;
                    let packet: Vec<u8> = self.scratch.buf.drain(..end).collect();
                    if packet.len() > MAX_FRAME_SIZE + 6 {
                        self.scratch.stats.dropped += 1;
                        continue;
                    }
                    match check_data_crc16(&packet) {
                        Ok(payload) => {
                            let payload = payload.to_vec();
                            self.scratch.emit(&mut frames, &payload);
                        }
                        Err(err) => {
                            debug!(target: "edge.protocol", error = %err, "crc16_frame_dropped");
                            self.scratch.stats.checksum_errors += 1;
                            self.scratch.stats.dropped += 1;
                        }
                    }
                }
                None => {
                    if self.scratch.buf.len() > MAX_FRAME_SIZE + 6 {
                        self.scratch.reset();
                    }
                    break;
                }
            }
        }
        frames
    }

    fn stats(&self) -> FramerStats {
        self.scratch.stats
    }
}

/// 分帧循环：从端口读取字节并投递完整帧。
///
/// - `shutdown` 完成时退出，返回 Ok
/// - EOF 返回 `ConnectionClosed`，由上层决定是否转为 DOWN
/// - 读超时视为瞬时错误，继续循环
/// - 输出通道关闭时返回 `ChannelClosed`
pub async fn run_framer<P, D, F>(
    port: &mut P,
    decoder: &mut D,
    out: &mpsc::Sender<Vec<u8>>,
    shutdown: F,
) -> Result<(), ProtocolError>
where
    P: Port + ?Sized,
    D: FrameDecoder + ?Sized,
    F: Future<Output = ()> + Send,
{
    tokio::pin!(shutdown);
    let mut buf = [0u8; 1024];
    loop {
        let n = tokio::select! {
            _ = &mut shutdown => return Ok(()),
            read = port.read(&mut buf) => match read {
                Ok(0) => return Err(ProtocolError::ConnectionClosed),
                Ok(n) => n,
                Err(err) if err.is_transient() => {
                    debug!(target: "edge.protocol", error = %err, "framer_read_transient");
                    continue;
                }
                Err(err) => return Err(err),
            },
        };
        for frame in decoder.feed(&buf[..n]) {
            out.send(frame)
                .await
                .map_err(|_| ProtocolError::ChannelClosed)?;
        }
    }
}
