//! Postgres 离线缓存实现

use crate::error::StorageError;
use crate::models::LostCacheRecord;
use crate::traits::LostCacheStore;
use sqlx::{PgPool, Row};

pub struct PgLostCacheStore {
    pub pool: PgPool,
    max_size: i64,
}

impl PgLostCacheStore {
    pub fn new(pool: PgPool, max_size: usize) -> Self {
        Self {
            pool,
            max_size: max_size.max(1) as i64,
        }
    }
}

#[async_trait::async_trait]
impl LostCacheStore for PgLostCacheStore {
    async fn create_table(&self, _uuid: &str) -> Result<(), StorageError> {
        crate::connection::ensure_schema(&self.pool).await
    }

    async fn save(&self, uuid: &str, data: &str) -> Result<LostCacheRecord, StorageError> {
        let ts_ms = domain::now_epoch_ms();
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            "insert into lost_cache (uuid, data, ts_ms) values ($1, $2, $3) returning id",
        )
        .bind(uuid)
        .bind(data)
        .bind(ts_ms)
        .fetch_one(&mut *tx)
        .await?;
        let id: i64 = row.try_get("id")?;
        sqlx::query(
            "delete from lost_cache \
             where uuid = $1 \
             and id not in (select id from lost_cache where uuid = $1 order by id desc limit $2)",
        )
        .bind(uuid)
        .bind(self.max_size)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(LostCacheRecord {
            id,
            uuid: uuid.to_string(),
            data: data.to_string(),
            ts_ms,
        })
    }

    async fn get(&self, uuid: &str) -> Result<Vec<LostCacheRecord>, StorageError> {
        let rows = sqlx::query(
            "select id, uuid, data, ts_ms from lost_cache where uuid = $1 order by id asc",
        )
        .bind(uuid)
        .fetch_all(&self.pool)
        .await?;
        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(LostCacheRecord {
                id: row.try_get("id")?,
                uuid: row.try_get("uuid")?,
                data: row.try_get("data")?,
                ts_ms: row.try_get("ts_ms")?,
            });
        }
        Ok(items)
    }

    async fn delete_one(&self, uuid: &str, id: i64) -> Result<bool, StorageError> {
        let result = sqlx::query("delete from lost_cache where uuid = $1 and id = $2")
            .bind(uuid)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear(&self, uuid: &str) -> Result<(), StorageError> {
        sqlx::query("delete from lost_cache where uuid = $1")
            .bind(uuid)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
