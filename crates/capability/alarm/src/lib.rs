//! # 告警中心
//!
//! 规则引擎把数据送入 `AlarmCenter::input`，命中的表达式经节流（阈值 + 最小间隔）
//! 后进入有界队列；后台任务把事件类型转发给规则绑定的输出目标，并每秒批量写入
//! `AlarmLogStore`。
//!
//! 表达式语法见 [`expr`]。

mod center;
mod error;
pub mod expr;
mod rule;

pub use center::{
    ALARM_QUEUE_CAPACITY, AlarmCenter, AlarmRuleConfig, ExprDefine, FLUSH_INTERVAL,
};
pub use error::AlarmError;
pub use expr::AlarmExpr;
pub use rule::AlarmRule;
