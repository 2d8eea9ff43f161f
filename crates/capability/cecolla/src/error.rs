use edge_runtime::RuntimeError;

/// 云边协同错误。
#[derive(Debug, thiserror::Error)]
pub enum CecollaError {
    #[error("invalid mqtt connection")]
    NotConnected,
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error("mqtt error: {0}")]
    Mqtt(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("remote error: code={code}, msg={msg}")]
    Remote { code: i64, msg: String },
    #[error("timeout after {0} ms")]
    Timeout(u64),
    #[error("cache error: {0}")]
    Cache(String),
    #[error("unsupported command: {0}")]
    UnsupportedCommand(String),
}

impl From<serde_json::Error> for CecollaError {
    fn from(err: serde_json::Error) -> Self {
        CecollaError::InvalidArgs(err.to_string())
    }
}

impl From<rumqttc::ClientError> for CecollaError {
    fn from(err: rumqttc::ClientError) -> Self {
        CecollaError::Mqtt(err.to_string())
    }
}

impl From<reqwest::Error> for CecollaError {
    fn from(err: reqwest::Error) -> Self {
        CecollaError::Http(err.to_string())
    }
}

impl From<RuntimeError> for CecollaError {
    fn from(err: RuntimeError) -> Self {
        CecollaError::Cache(err.to_string())
    }
}

impl From<CecollaError> for RuntimeError {
    fn from(err: CecollaError) -> Self {
        match err {
            CecollaError::UnsupportedCommand(cmd) => RuntimeError::UnsupportedCommand(cmd),
            other => RuntimeError::Worker(other.to_string()),
        }
    }
}
