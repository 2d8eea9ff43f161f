/// 资源运行时错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    #[error("unsupported resource type: {0}")]
    UnsupportedType(String),
    #[error("resource already exists: {0}")]
    AlreadyExists(String),
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("cache slot not found: {0}")]
    SlotNotFound(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("worker error: {0}")]
    Worker(String),
    #[error("unsupported command: {0}")]
    UnsupportedCommand(String),
    #[error("operation not supported: {0}")]
    Unsupported(String),
    #[error("worker panicked: {0}")]
    Panicked(String),
    #[error("port not found: {0}")]
    PortNotFound(String),
    #[error("port {port} is busy, occupied by {uuid}")]
    PortBusy { port: String, uuid: String },
    #[error("rule channel closed")]
    ChannelClosed,
}

impl RuntimeError {
    pub fn worker(err: impl std::fmt::Display) -> Self {
        RuntimeError::Worker(err.to_string())
    }
}
