use serde::{Deserialize, Serialize};

/// 服务调用参数：目标 uuid 加任意参数。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceArg {
    pub uuid: String,
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
}

/// 对 Worker 的同步 RPC 请求。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub name: String,
    pub method: String,
    #[serde(default)]
    pub args: Vec<ServiceArg>,
}

/// RPC 响应，`type` 为结果的线上类型名。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceResponse {
    #[serde(rename = "type")]
    pub result_type: String,
    pub result: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceResponse {
    pub fn ok(result_type: impl Into<String>, result: serde_json::Value) -> Self {
        Self {
            result_type: result_type.into(),
            result,
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            result_type: "error".to_string(),
            result: serde_json::Value::Null,
            error: Some(message.into()),
        }
    }
}

/// Worker 对外声明的服务。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub name: String,
    pub description: String,
    pub method: String,
}
