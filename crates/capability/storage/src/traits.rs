//! 存储接口 Trait 定义
//!
//! - LostCacheStore：目标离线缓存（按 uuid 的 FIFO）
//! - AlarmLogStore：告警日志（有界，超出丢弃最旧）
//! - InternalStore：内部 key/value

use crate::error::StorageError;
use crate::models::{AlarmLogRecord, LostCacheRecord};
use async_trait::async_trait;

/// 离线缓存接口
#[async_trait]
pub trait LostCacheStore: Send + Sync {
    /// 幂等
    async fn create_table(&self, uuid: &str) -> Result<(), StorageError>;

    /// 追加一条；超过单 uuid 上限时丢弃最旧记录
    async fn save(&self, uuid: &str, data: &str) -> Result<LostCacheRecord, StorageError>;

    /// 按写入顺序（最旧在前）返回
    async fn get(&self, uuid: &str) -> Result<Vec<LostCacheRecord>, StorageError>;

    /// 删除恰好一条，返回是否存在
    async fn delete_one(&self, uuid: &str, id: i64) -> Result<bool, StorageError>;

    async fn clear(&self, uuid: &str) -> Result<(), StorageError>;
}

/// 告警日志接口
#[async_trait]
pub trait AlarmLogStore: Send + Sync {
    /// 批量写入并裁剪到上限
    async fn append_batch(&self, records: &[AlarmLogRecord]) -> Result<(), StorageError>;

    /// 最新在前
    async fn list_recent(&self, limit: usize) -> Result<Vec<AlarmLogRecord>, StorageError>;

    async fn count(&self) -> Result<usize, StorageError>;
}

/// 内部 key/value 接口
#[async_trait]
pub trait InternalStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    async fn delete(&self, key: &str) -> Result<bool, StorageError>;

    async fn keys(&self) -> Result<Vec<String>, StorageError>;
}
