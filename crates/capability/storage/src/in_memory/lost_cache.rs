//! 离线缓存内存实现

use crate::error::StorageError;
use crate::models::LostCacheRecord;
use crate::traits::LostCacheStore;
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

#[derive(Default)]
struct Queue {
    next_id: i64,
    records: VecDeque<LostCacheRecord>,
}

/// 离线缓存内存存储，每个 uuid 一个有界队列
pub struct InMemoryLostCacheStore {
    max_size: usize,
    queues: RwLock<HashMap<String, Queue>>,
}

impl InMemoryLostCacheStore {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size: max_size.max(1),
            queues: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait::async_trait]
impl LostCacheStore for InMemoryLostCacheStore {
    async fn create_table(&self, uuid: &str) -> Result<(), StorageError> {
        let mut queues = self
            .queues
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        queues.entry(uuid.to_string()).or_default();
        Ok(())
    }

    async fn save(&self, uuid: &str, data: &str) -> Result<LostCacheRecord, StorageError> {
        let mut queues = self
            .queues
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let queue = queues.entry(uuid.to_string()).or_default();
        queue.next_id += 1;
        let record = LostCacheRecord {
            id: queue.next_id,
            uuid: uuid.to_string(),
            data: data.to_string(),
            ts_ms: domain::now_epoch_ms(),
        };
        queue.records.push_back(record.clone());
        while queue.records.len() > self.max_size {
            queue.records.pop_front();
        }
        Ok(record)
    }

    async fn get(&self, uuid: &str) -> Result<Vec<LostCacheRecord>, StorageError> {
        let queues = self
            .queues
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(queues
            .get(uuid)
            .map(|q| q.records.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_one(&self, uuid: &str, id: i64) -> Result<bool, StorageError> {
        let mut queues = self
            .queues
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let Some(queue) = queues.get_mut(uuid) else {
            return Ok(false);
        };
        match queue.records.iter().position(|r| r.id == id) {
            Some(index) => {
                queue.records.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn clear(&self, uuid: &str) -> Result<(), StorageError> {
        let mut queues = self
            .queues
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        if let Some(queue) = queues.get_mut(uuid) {
            queue.records.clear();
        }
        Ok(())
    }
}
