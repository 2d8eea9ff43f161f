use edge_runtime::RuntimeError;

/// 采集错误。
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("not started")]
    NotStarted,
    #[error("bind {addr} failed: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("mqtt error: {0}")]
    Mqtt(String),
    #[error("timeout after {0} ms")]
    Timeout(u64),
}

impl From<rumqttc::ClientError> for IngestError {
    fn from(err: rumqttc::ClientError) -> Self {
        IngestError::Mqtt(err.to_string())
    }
}

impl From<IngestError> for RuntimeError {
    fn from(err: IngestError) -> Self {
        RuntimeError::Worker(err.to_string())
    }
}
