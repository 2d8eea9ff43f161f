//! 内部 key/value 内存实现

use crate::error::StorageError;
use crate::traits::InternalStore;
use std::collections::BTreeMap;
use std::sync::RwLock;

#[derive(Default)]
pub struct InMemoryInternalStore {
    values: RwLock<BTreeMap<String, String>>,
}

impl InMemoryInternalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl InternalStore for InMemoryInternalStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let values = self
            .values
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut values = self
            .values
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let mut values = self
            .values
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(values.remove(key).is_some())
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        let values = self
            .values
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(values.keys().cloned().collect())
    }
}
