//! 追踪初始化、请求 ID 生成与网关计数器。

use serde::Serialize;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 请求级追踪标识。
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub request_id: String,
    pub trace_id: String,
}

/// 网关计数器快照。
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub frames_emitted: u64,
    pub frames_dropped: u64,
    pub checksum_errors: u64,
    pub worker_starts: u64,
    pub worker_restarts: u64,
    pub worker_panics: u64,
    pub target_success: u64,
    pub target_failure: u64,
    pub lost_cache_saved: u64,
    pub lost_cache_replayed: u64,
    pub inbound_events: u64,
    pub downlink_messages: u64,
    pub alarms_fired: u64,
}

/// 网关计数器。
#[derive(Default)]
pub struct TelemetryMetrics {
    frames_emitted: AtomicU64,
    frames_dropped: AtomicU64,
    checksum_errors: AtomicU64,
    worker_starts: AtomicU64,
    worker_restarts: AtomicU64,
    worker_panics: AtomicU64,
    target_success: AtomicU64,
    target_failure: AtomicU64,
    lost_cache_saved: AtomicU64,
    lost_cache_replayed: AtomicU64,
    inbound_events: AtomicU64,
    downlink_messages: AtomicU64,
    alarms_fired: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_emitted: self.frames_emitted.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            checksum_errors: self.checksum_errors.load(Ordering::Relaxed),
            worker_starts: self.worker_starts.load(Ordering::Relaxed),
            worker_restarts: self.worker_restarts.load(Ordering::Relaxed),
            worker_panics: self.worker_panics.load(Ordering::Relaxed),
            target_success: self.target_success.load(Ordering::Relaxed),
            target_failure: self.target_failure.load(Ordering::Relaxed),
            lost_cache_saved: self.lost_cache_saved.load(Ordering::Relaxed),
            lost_cache_replayed: self.lost_cache_replayed.load(Ordering::Relaxed),
            inbound_events: self.inbound_events.load(Ordering::Relaxed),
            downlink_messages: self.downlink_messages.load(Ordering::Relaxed),
            alarms_fired: self.alarms_fired.load(Ordering::Relaxed),
        }
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的 request_id 与 trace_id。
pub fn new_request_ids() -> RequestIds {
    RequestIds {
        request_id: uuid::Uuid::new_v4().to_string(),
        trace_id: uuid::Uuid::new_v4().to_string(),
    }
}

/// 记录分帧器输出的完整帧数。
pub fn record_frames_emitted(count: u64) {
    metrics().frames_emitted.fetch_add(count, Ordering::Relaxed);
}

/// 记录被丢弃的帧（超长、畸形）。
pub fn record_frames_dropped(count: u64) {
    metrics().frames_dropped.fetch_add(count, Ordering::Relaxed);
}

/// 记录校验失败次数。
pub fn record_checksum_error() {
    metrics().checksum_errors.fetch_add(1, Ordering::Relaxed);
}

/// 记录 Worker 首次启动。
pub fn record_worker_start() {
    metrics().worker_starts.fetch_add(1, Ordering::Relaxed);
}

/// 记录监督器重启次数。
pub fn record_worker_restart() {
    metrics().worker_restarts.fetch_add(1, Ordering::Relaxed);
}

/// 记录 Worker 内部 panic 被捕获的次数。
pub fn record_worker_panic() {
    metrics().worker_panics.fetch_add(1, Ordering::Relaxed);
}

/// 记录目标写出成功。
pub fn record_target_success() {
    metrics().target_success.fetch_add(1, Ordering::Relaxed);
}

/// 记录目标写出失败。
pub fn record_target_failure() {
    metrics().target_failure.fetch_add(1, Ordering::Relaxed);
}

/// 记录离线缓存写入。
pub fn record_lost_cache_saved() {
    metrics().lost_cache_saved.fetch_add(1, Ordering::Relaxed);
}

/// 记录离线缓存重放成功。
pub fn record_lost_cache_replayed() {
    metrics().lost_cache_replayed.fetch_add(1, Ordering::Relaxed);
}

/// 记录输入源事件。
pub fn record_inbound_event() {
    metrics().inbound_events.fetch_add(1, Ordering::Relaxed);
}

/// 记录云端下行消息。
pub fn record_downlink_message() {
    metrics().downlink_messages.fetch_add(1, Ordering::Relaxed);
}

/// 记录告警触发。
pub fn record_alarm_fired() {
    metrics().alarms_fired.fetch_add(1, Ordering::Relaxed);
}
