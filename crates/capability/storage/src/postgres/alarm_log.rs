//! Postgres 告警日志实现

use crate::error::StorageError;
use crate::models::AlarmLogRecord;
use crate::traits::AlarmLogStore;
use sqlx::{PgPool, Row};

pub struct PgAlarmLogStore {
    pub pool: PgPool,
    max_rows: i64,
}

impl PgAlarmLogStore {
    pub fn new(pool: PgPool, max_rows: usize) -> Self {
        Self {
            pool,
            max_rows: max_rows.max(1) as i64,
        }
    }
}

#[async_trait::async_trait]
impl AlarmLogStore for PgAlarmLogStore {
    async fn append_batch(&self, records: &[AlarmLogRecord]) -> Result<(), StorageError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                "insert into alarm_log \
                 (uuid, ts, rule_id, source, event_type, summary, info) \
                 values ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(&record.uuid)
            .bind(record.ts)
            .bind(&record.rule_id)
            .bind(&record.source)
            .bind(&record.event_type)
            .bind(&record.summary)
            .bind(&record.info)
            .execute(&mut *tx)
            .await?;
        }
        // 只保留最新 max_rows 行
        sqlx::query(
            "delete from alarm_log \
             where id not in (select id from alarm_log order by id desc limit $1)",
        )
        .bind(self.max_rows)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<AlarmLogRecord>, StorageError> {
        let rows = sqlx::query(
            "select uuid, ts, rule_id, source, event_type, summary, info \
             from alarm_log order by id desc limit $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(AlarmLogRecord {
                uuid: row.try_get("uuid")?,
                ts: row.try_get("ts")?,
                rule_id: row.try_get("rule_id")?,
                source: row.try_get("source")?,
                event_type: row.try_get("event_type")?,
                summary: row.try_get("summary")?,
                info: row.try_get("info")?,
            });
        }
        Ok(items)
    }

    async fn count(&self) -> Result<usize, StorageError> {
        let row = sqlx::query("select count(*) as total from alarm_log")
            .fetch_one(&self.pool)
            .await?;
        let total: i64 = row.try_get("total")?;
        Ok(total.max(0) as usize)
    }
}
