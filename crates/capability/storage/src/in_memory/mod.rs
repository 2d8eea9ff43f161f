//! 内存存储实现模块
//!
//! 单机默认后端，也用于测试。进程退出即丢失。

pub mod alarm_log;
pub mod internal;
pub mod lost_cache;

pub use alarm_log::*;
pub use internal::*;
pub use lost_cache::*;
