//! 进程级具名槽缓存。
//!
//! 规则引擎通过槽名 + key 找到 Worker 的绑定信息；带超时的条目由 `sweep_expired` 清理。

use crate::error::RuntimeError;
use domain::{ResourceState, now_epoch_ms};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

pub const SOURCE_SLOT: &str = "__SourceBinding";
pub const DEVICE_SLOT: &str = "__DeviceBinding";
pub const CECOLLA_SLOT: &str = "__CecollaBinding";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheValue {
    pub uuid: String,
    pub status: ResourceState,
    pub err_msg: String,
    pub last_fetch_time: i64,
    /// 过期时间（毫秒时间戳），None 表示不过期
    pub expiration_time: Option<i64>,
    pub value: serde_json::Value,
}

impl CacheValue {
    pub fn new(uuid: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            uuid: uuid.into(),
            status: ResourceState::Pending,
            err_msg: String::new(),
            last_fetch_time: now_epoch_ms(),
            expiration_time: None,
            value,
        }
    }

    pub fn with_status(mut self, status: ResourceState) -> Self {
        self.status = status;
        self
    }

    fn is_expired(&self, now_ms: i64) -> bool {
        self.expiration_time.is_some_and(|at| at <= now_ms)
    }
}

type Slot = HashMap<String, CacheValue>;

#[derive(Debug, Default)]
pub struct InterCache {
    slots: RwLock<HashMap<String, Slot>>,
}

impl InterCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已存在的槽保持不变，返回 false。
    pub fn register_slot(&self, slot: &str) -> bool {
        let mut slots = self.write();
        if slots.contains_key(slot) {
            return false;
        }
        slots.insert(slot.to_string(), Slot::new());
        true
    }

    pub fn unregister_slot(&self, slot: &str) -> bool {
        self.write().remove(slot).is_some()
    }

    /// 槽内未过期条目的快照。
    pub fn get_slot(&self, slot: &str) -> Option<HashMap<String, CacheValue>> {
        let now = now_epoch_ms();
        self.read().get(slot).map(|entries| {
            entries
                .iter()
                .filter(|(_, v)| !v.is_expired(now))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
    }

    pub fn set(&self, slot: &str, key: &str, value: CacheValue) -> Result<(), RuntimeError> {
        let mut slots = self.write();
        let entries = slots
            .get_mut(slot)
            .ok_or_else(|| RuntimeError::SlotNotFound(slot.to_string()))?;
        entries.insert(key.to_string(), value);
        Ok(())
    }

    pub fn set_with_timeout(
        &self,
        slot: &str,
        key: &str,
        mut value: CacheValue,
        ttl: Duration,
    ) -> Result<(), RuntimeError> {
        value.expiration_time = Some(now_epoch_ms() + ttl.as_millis() as i64);
        self.set(slot, key, value)
    }

    /// 读取时刷新 `last_fetch_time`。
    pub fn get(&self, slot: &str, key: &str) -> Option<CacheValue> {
        let now = now_epoch_ms();
        let mut slots = self.write();
        let value = slots.get_mut(slot)?.get_mut(key)?;
        if value.is_expired(now) {
            return None;
        }
        value.last_fetch_time = now;
        Some(value.clone())
    }

    pub fn delete(&self, slot: &str, key: &str) -> Option<CacheValue> {
        self.write().get_mut(slot)?.remove(key)
    }

    /// 更新条目状态，不存在时忽略。
    pub fn update_status(&self, slot: &str, key: &str, status: ResourceState, err_msg: &str) {
        if let Some(value) = self.write().get_mut(slot).and_then(|s| s.get_mut(key)) {
            value.status = status;
            value.err_msg = err_msg.to_string();
        }
    }

    pub fn size(&self, slot: &str) -> usize {
        self.read().get(slot).map(|s| s.len()).unwrap_or(0)
    }

    /// 清空所有槽中的条目，槽本身保留。
    pub fn flush(&self) {
        for entries in self.write().values_mut() {
            entries.clear();
        }
    }

    /// 删除已过期条目，返回删除数。
    pub fn sweep_expired(&self) -> usize {
        let now = now_epoch_ms();
        let mut removed = 0;
        for entries in self.write().values_mut() {
            let before = entries.len();
            entries.retain(|_, v| !v.is_expired(now));
            removed += before - entries.len();
        }
        removed
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Slot>> {
        self.slots.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Slot>> {
        self.slots.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_slot_lifecycle() {
        let cache = InterCache::new();
        assert!(cache.register_slot(DEVICE_SLOT));
        assert!(!cache.register_slot(DEVICE_SLOT));
        cache
            .set(DEVICE_SLOT, "d1", CacheValue::new("d1", json!({"type": "X"})))
            .unwrap();
        assert_eq!(cache.size(DEVICE_SLOT), 1);
        assert_eq!(cache.get(DEVICE_SLOT, "d1").unwrap().value["type"], "X");

        cache.update_status(DEVICE_SLOT, "d1", ResourceState::Down, "timeout");
        let value = cache.get(DEVICE_SLOT, "d1").unwrap();
        assert_eq!(value.status, ResourceState::Down);
        assert_eq!(value.err_msg, "timeout");

        assert!(cache.delete(DEVICE_SLOT, "d1").is_some());
        assert!(cache.get(DEVICE_SLOT, "d1").is_none());
        assert!(cache.unregister_slot(DEVICE_SLOT));
        assert!(cache.get_slot(DEVICE_SLOT).is_none());
    }

    #[test]
    fn test_set_requires_slot() {
        let cache = InterCache::new();
        let err = cache
            .set("missing", "k", CacheValue::new("k", json!(1)))
            .unwrap_err();
        assert_eq!(err, RuntimeError::SlotNotFound("missing".to_string()));
    }

    #[test]
    fn test_expired_entries_are_hidden_and_swept() {
        let cache = InterCache::new();
        cache.register_slot("s");
        cache
            .set_with_timeout("s", "old", CacheValue::new("old", json!(1)), Duration::ZERO)
            .unwrap();
        cache
            .set_with_timeout("s", "new", CacheValue::new("new", json!(2)), Duration::from_secs(60))
            .unwrap();
        assert!(cache.get("s", "old").is_none());
        assert_eq!(cache.get_slot("s").unwrap().len(), 1);
        assert_eq!(cache.sweep_expired(), 1);
        assert_eq!(cache.size("s"), 1);
        cache.flush();
        assert_eq!(cache.size("s"), 0);
        assert!(cache.get_slot("s").is_some());
    }
}
