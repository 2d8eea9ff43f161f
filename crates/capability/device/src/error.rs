use edge_protocol::ProtocolError;
use edge_runtime::RuntimeError;

/// 设备错误。
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("device not connected")]
    NotConnected,
    #[error("invalid args: {0}")]
    InvalidArgs(String),
    #[error("unsupported command: {0}")]
    UnsupportedCommand(String),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl From<serde_json::Error> for DeviceError {
    fn from(err: serde_json::Error) -> Self {
        DeviceError::InvalidArgs(err.to_string())
    }
}

impl From<hex::FromHexError> for DeviceError {
    fn from(err: hex::FromHexError) -> Self {
        DeviceError::InvalidArgs(err.to_string())
    }
}

impl From<DeviceError> for RuntimeError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::UnsupportedCommand(cmd) => RuntimeError::UnsupportedCommand(cmd),
            other => RuntimeError::Worker(other.to_string()),
        }
    }
}
