//! 通过平台 HTTP 接口拉取物模型，MQTT 应答缺失时使用。

use crate::error::CecollaError;
use crate::schema::SchemaSimple;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Option<SchemaEnvelope>,
}

#[derive(Debug, Deserialize)]
struct SchemaEnvelope {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: SchemaSimple,
}

pub fn schema_url(host: &str, product_id: &str, device_name: &str) -> String {
    let host = host.trim_end_matches('/');
    let base = if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    };
    format!(
        "{}/api/v1/things/device/edge/send/thing/property/{}/{}",
        base, product_id, device_name
    )
}

fn is_success(code: i64) -> bool {
    code == 0 || code == 200
}

/// `POST {"method":"getSchema","msgToken":..}`，Basic 认证使用 MQTT 用户名与密码。
pub async fn fetch_schema(
    client: &reqwest::Client,
    host: &str,
    product_id: &str,
    device_name: &str,
    username: &str,
    password: &str,
) -> Result<SchemaSimple, CecollaError> {
    let body = json!({
        "method": "getSchema",
        "msgToken": uuid::Uuid::new_v4().to_string(),
    });
    let response: ApiResponse = client
        .post(schema_url(host, product_id, device_name))
        .basic_auth(username, Some(password))
        .timeout(Duration::from_secs(5))
        .json(&body)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    if !is_success(response.code) {
        return Err(CecollaError::Remote {
            code: response.code,
            msg: response.msg,
        });
    }
    let envelope = response.data.ok_or_else(|| CecollaError::Remote {
        code: response.code,
        msg: "empty schema".to_string(),
    })?;
    if !is_success(envelope.code) {
        return Err(CecollaError::Remote {
            code: envelope.code,
            msg: envelope.msg,
        });
    }
    Ok(envelope.data)
}
