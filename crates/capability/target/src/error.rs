use edge_runtime::RuntimeError;

/// 输出目标错误。
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("not connected")]
    NotConnected,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("http error: {0}")]
    Http(String),
    #[error("remote error: {0}")]
    Remote(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("timeout after {0} ms")]
    Timeout(u64),
}

impl From<reqwest::Error> for TargetError {
    fn from(err: reqwest::Error) -> Self {
        TargetError::Http(err.to_string())
    }
}

impl From<edge_storage::StorageError> for TargetError {
    fn from(err: edge_storage::StorageError) -> Self {
        TargetError::Storage(err.to_string())
    }
}

impl From<TargetError> for RuntimeError {
    fn from(err: TargetError) -> Self {
        RuntimeError::Worker(err.to_string())
    }
}
