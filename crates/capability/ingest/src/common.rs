use edge_runtime::RuleHook;
use edge_telemetry::record_inbound_event;
use serde::Serialize;
use tracing::warn;

pub(crate) fn default_listen_host() -> String {
    "0.0.0.0".to_string()
}

pub(crate) fn default_max_data_length() -> usize {
    1024
}

/// TCP/UDP 客户端上送的数据。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientData {
    pub client_addr: String,
    pub data: String,
}

impl ClientData {
    /// 合法 UTF-8 按文本输出，否则输出十六进制。
    pub fn new(client_addr: impl Into<String>, bytes: &[u8]) -> Self {
        let data = match std::str::from_utf8(bytes) {
            Ok(text) => text.to_string(),
            Err(_) => hex::encode(bytes),
        };
        Self {
            client_addr: client_addr.into(),
            data,
        }
    }
}

/// 把一条输入交给规则引擎，失败只记日志。
pub(crate) async fn emit(hook: &dyn RuleHook, uuid: &str, data: &str) -> bool {
    record_inbound_event();
    match hook.work_in_end(uuid, data).await {
        Ok(()) => true,
        Err(err) => {
            warn!(target: "edge.ingest", uuid = %uuid, error = %err, "in_end_dispatch_failed");
            false
        }
    }
}

pub(crate) async fn emit_json<T: Serialize>(hook: &dyn RuleHook, uuid: &str, value: &T) -> bool {
    match serde_json::to_string(value) {
        Ok(data) => emit(hook, uuid, &data).await,
        Err(err) => {
            warn!(target: "edge.ingest", uuid = %uuid, error = %err, "in_end_encode_failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_data_text_or_hex() {
        let text = ClientData::new("1.2.3.4:5", b"hello");
        assert_eq!(text.data, "hello");
        let binary = ClientData::new("1.2.3.4:5", &[0xff, 0x00, 0x10]);
        assert_eq!(binary.data, "ff0010");
        let json = serde_json::to_string(&text).unwrap();
        assert_eq!(json, r#"{"clientAddr":"1.2.3.4:5","data":"hello"}"#);
    }
}
