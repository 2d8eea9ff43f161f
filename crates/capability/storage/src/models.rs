//! 存储数据模型

use serde::{Deserialize, Serialize};

/// 离线缓存记录：目标写出失败时保存的原始数据。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LostCacheRecord {
    /// 同一 uuid 内单调递增
    pub id: i64,
    pub uuid: String,
    pub data: String,
    pub ts_ms: i64,
}

/// 告警日志。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmLogRecord {
    pub uuid: String,
    pub ts: i64,
    pub rule_id: String,
    pub source: String,
    pub event_type: String,
    pub summary: String,
    pub info: String,
}
