//! 数据库连接管理
//!
//! - connect_pool：建立 Postgres 连接池（最大 8 连接）
//! - ensure_schema：建表（幂等）

use crate::error::StorageError;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub async fn connect_pool(database_url: &str) -> Result<PgPool, StorageError> {
    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(database_url)
        .await?;
    Ok(pool)
}

const SCHEMA: &[&str] = &[
    "create table if not exists lost_cache (\
     id bigserial primary key, \
     uuid text not null, \
     data text not null, \
     ts_ms bigint not null)",
    "create index if not exists lost_cache_uuid_idx on lost_cache (uuid, id)",
    "create table if not exists alarm_log (\
     id bigserial primary key, \
     uuid text not null, \
     ts bigint not null, \
     rule_id text not null, \
     source text not null, \
     event_type text not null, \
     summary text not null, \
     info text not null)",
];

/// 创建网关使用的表。
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StorageError> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
