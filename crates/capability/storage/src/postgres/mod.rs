//! PostgreSQL 存储实现模块
//!
//! 表结构见 `connection::ensure_schema`。

pub mod alarm_log;
pub mod lost_cache;

pub use alarm_log::*;
pub use lost_cache::*;
