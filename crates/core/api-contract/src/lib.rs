//! 状态 API 的 DTO 与响应封装。

use serde::{Deserialize, Serialize};

/// 标准 API 响应封装。
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

/// 失败响应的错误体。
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

/// 健康检查。
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthDto {
    pub ok: bool,
    pub version: String,
}

/// 受监督资源。
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDto {
    pub uuid: String,
    pub name: String,
    #[serde(rename = "type")]
    pub type_tag: String,
    pub kind: String,
    /// `UP` / `DOWN` / `PENDING` / ...
    pub state: String,
    pub description: String,
    pub config: serde_json::Map<String, serde_json::Value>,
}

/// 网关计数器。
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshotDto {
    pub frames_emitted: u64,
    pub frames_dropped: u64,
    pub checksum_errors: u64,
    pub worker_starts: u64,
    pub worker_restarts: u64,
    pub worker_panics: u64,
    pub target_success: u64,
    pub target_failure: u64,
    pub lost_cache_saved: u64,
    pub lost_cache_replayed: u64,
    pub inbound_events: u64,
    pub downlink_messages: u64,
    pub alarms_fired: u64,
}

/// 告警日志。
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmLogDto {
    pub uuid: String,
    pub ts: i64,
    pub rule_id: String,
    pub source: String,
    pub event_type: String,
    pub summary: String,
    pub info: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_envelope_shape() {
        let body = serde_json::to_value(ApiResponse::<()>::error("RESOURCE.NOT_FOUND", "resource not found")).unwrap();
        assert_eq!(
            body,
            json!({
                "success": false,
                "data": null,
                "error": {"code": "RESOURCE.NOT_FOUND", "message": "resource not found"}
            })
        );
    }

    #[test]
    fn test_resource_uses_wire_names() {
        let dto = ResourceDto {
            uuid: "u1".to_string(),
            name: "meter".to_string(),
            type_tag: "GENERIC_MODBUS_MASTER".to_string(),
            kind: "device".to_string(),
            state: "UP".to_string(),
            description: String::new(),
            config: serde_json::Map::new(),
        };
        let body = serde_json::to_value(ApiResponse::success(dto)).unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["type"], "GENERIC_MODBUS_MASTER");
        assert_eq!(body["data"]["state"], "UP");
    }
}
