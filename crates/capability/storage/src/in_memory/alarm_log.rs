//! 告警日志内存实现

use crate::error::StorageError;
use crate::models::AlarmLogRecord;
use crate::traits::AlarmLogStore;
use std::collections::VecDeque;
use std::sync::RwLock;

pub struct InMemoryAlarmLogStore {
    max_rows: usize,
    logs: RwLock<VecDeque<AlarmLogRecord>>,
}

impl InMemoryAlarmLogStore {
    pub fn new(max_rows: usize) -> Self {
        Self {
            max_rows: max_rows.max(1),
            logs: RwLock::new(VecDeque::new()),
        }
    }
}

#[async_trait::async_trait]
impl AlarmLogStore for InMemoryAlarmLogStore {
    async fn append_batch(&self, records: &[AlarmLogRecord]) -> Result<(), StorageError> {
        let mut logs = self
            .logs
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        logs.extend(records.iter().cloned());
        while logs.len() > self.max_rows {
            logs.pop_front();
        }
        Ok(())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<AlarmLogRecord>, StorageError> {
        let logs = self
            .logs
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(logs.iter().rev().take(limit).cloned().collect())
    }

    async fn count(&self) -> Result<usize, StorageError> {
        let logs = self
            .logs
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(logs.len())
    }
}
