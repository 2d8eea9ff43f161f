//! Redis 存储实现
//!
//! - 离线缓存：`edge:lost_cache:{uuid}` 列表保存 JSON 记录，`edge:lost_cache:{uuid}:seq` 分配 id
//! - 内部存储：`edge:internal` 哈希

use crate::error::StorageError;
use crate::models::LostCacheRecord;
use crate::traits::{InternalStore, LostCacheStore};
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;

const INTERNAL_KEY: &str = "edge:internal";

fn lost_cache_key(uuid: &str) -> String {
    format!("edge:lost_cache:{}", uuid)
}

fn lost_cache_seq_key(uuid: &str) -> String {
    format!("edge:lost_cache:{}:seq", uuid)
}

async fn connection(client: &redis::Client) -> Result<MultiplexedConnection, StorageError> {
    client
        .get_multiplexed_tokio_connection()
        .await
        .map_err(|err| StorageError::new(err.to_string()))
}

/// Redis 离线缓存存储
pub struct RedisLostCacheStore {
    client: redis::Client,
    max_size: isize,
}

impl RedisLostCacheStore {
    pub fn new(client: redis::Client, max_size: usize) -> Self {
        Self {
            client,
            max_size: max_size.max(1) as isize,
        }
    }

    pub fn connect(redis_url: &str, max_size: usize) -> Result<Self, StorageError> {
        let client =
            redis::Client::open(redis_url).map_err(|err| StorageError::new(err.to_string()))?;
        Ok(Self::new(client, max_size))
    }
}

#[async_trait::async_trait]
impl LostCacheStore for RedisLostCacheStore {
    async fn create_table(&self, _uuid: &str) -> Result<(), StorageError> {
        Ok(())
    }

    async fn save(&self, uuid: &str, data: &str) -> Result<LostCacheRecord, StorageError> {
        let mut conn = connection(&self.client).await?;
        let id: i64 = conn.incr(lost_cache_seq_key(uuid), 1).await?;
        let record = LostCacheRecord {
            id,
            uuid: uuid.to_string(),
            data: data.to_string(),
            ts_ms: domain::now_epoch_ms(),
        };
        let payload = serde_json::to_string(&record)?;
        let key = lost_cache_key(uuid);
        conn.rpush::<_, _, i64>(&key, payload).await?;
        conn.ltrim::<_, ()>(&key, -self.max_size, -1).await?;
        Ok(record)
    }

    async fn get(&self, uuid: &str) -> Result<Vec<LostCacheRecord>, StorageError> {
        let mut conn = connection(&self.client).await?;
        let items: Vec<String> = conn.lrange(lost_cache_key(uuid), 0, -1).await?;
        let mut records = Vec::with_capacity(items.len());
        for item in items {
            records.push(serde_json::from_str::<LostCacheRecord>(&item)?);
        }
        Ok(records)
    }

    async fn delete_one(&self, uuid: &str, id: i64) -> Result<bool, StorageError> {
        let mut conn = connection(&self.client).await?;
        let key = lost_cache_key(uuid);
        let items: Vec<String> = conn.lrange(&key, 0, -1).await?;
        for item in items {
            let record: LostCacheRecord = serde_json::from_str(&item)?;
            if record.id == id {
                let removed: i64 = conn.lrem(&key, 1, item).await?;
                return Ok(removed > 0);
            }
        }
        Ok(false)
    }

    async fn clear(&self, uuid: &str) -> Result<(), StorageError> {
        let mut conn = connection(&self.client).await?;
        conn.del::<_, i64>(lost_cache_key(uuid)).await?;
        Ok(())
    }
}

/// Redis 内部 key/value 存储
pub struct RedisInternalStore {
    client: redis::Client,
}

impl RedisInternalStore {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    pub fn connect(redis_url: &str) -> Result<Self, StorageError> {
        let client =
            redis::Client::open(redis_url).map_err(|err| StorageError::new(err.to_string()))?;
        Ok(Self::new(client))
    }
}

#[async_trait::async_trait]
impl InternalStore for RedisInternalStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let mut conn = connection(&self.client).await?;
        let value: Option<String> = conn.hget(INTERNAL_KEY, key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut conn = connection(&self.client).await?;
        conn.hset::<_, _, _, i64>(INTERNAL_KEY, key, value).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let mut conn = connection(&self.client).await?;
        let removed: i64 = conn.hdel(INTERNAL_KEY, key).await?;
        Ok(removed > 0)
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        let mut conn = connection(&self.client).await?;
        let mut keys: Vec<String> = conn.hkeys(INTERNAL_KEY).await?;
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(lost_cache_key("t1"), "edge:lost_cache:t1");
        assert_eq!(lost_cache_seq_key("t1"), "edge:lost_cache:t1:seq");
    }
}
