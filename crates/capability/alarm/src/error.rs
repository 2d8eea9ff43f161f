/// 告警中心错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AlarmError {
    #[error("invalid expr `{expr}`: {reason}")]
    InvalidExpr { expr: String, reason: String },
    #[error("AlarmRule not exists in registry:{0}")]
    RuleNotFound(String),
    #[error("alarm queue closed")]
    QueueClosed,
}
