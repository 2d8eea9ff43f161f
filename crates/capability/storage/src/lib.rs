//! # 边缘网关存储
//!
//! 三类持久化状态，均以 async Trait 抽象，后端可替换：
//!
//! | 接口 | 内存 | Redis | Postgres |
//! |------|------|-------|----------|
//! | `LostCacheStore` 离线缓存 | ✓ | ✓ | ✓ |
//! | `AlarmLogStore` 告警日志 | ✓ |   | ✓ |
//! | `InternalStore` 内部 key/value | ✓ | ✓ |   |
//!
//! 离线缓存按目标 uuid 分队列，超过上限丢弃最旧记录；告警日志整体有界（默认 1000 行）。

pub mod connection;
pub mod error;
pub mod in_memory;
pub mod models;
pub mod postgres;
pub mod redis;
pub mod traits;

pub use connection::*;
pub use error::*;
pub use models::*;
pub use crate::redis::{RedisInternalStore, RedisLostCacheStore};
pub use traits::*;

pub use in_memory::{InMemoryAlarmLogStore, InMemoryInternalStore, InMemoryLostCacheStore};

pub use postgres::{PgAlarmLogStore, PgLostCacheStore};
