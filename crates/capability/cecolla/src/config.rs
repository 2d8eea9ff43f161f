use crate::auth::SignMethod;
use edge_runtime::{ValidateConfig, require_non_empty};
use serde::{Deserialize, Serialize};

const DEFAULT_MQTT_PORT: u16 = 1883;

fn default_endpoint() -> String {
    "tcp://127.0.0.1:1883".to_string()
}

/// 工作模式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GatewayMode {
    /// 直连设备
    #[default]
    Device,
    /// 网关，代理子设备
    Gateway,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IThingsConfig {
    #[serde(default = "default_endpoint")]
    pub server_endpoint: String,
    #[serde(default)]
    pub mode: GatewayMode,
    /// 子设备产品，GATEWAY 模式必填
    #[serde(default)]
    pub sub_product: String,
    pub product_id: String,
    pub device_name: String,
    pub device_psk: String,
    #[serde(default)]
    pub sign_method: SignMethod,
    /// 物模型 HTTP 接口地址，为空时不启用
    #[serde(default)]
    pub schema_api_host: String,
}

impl ValidateConfig for IThingsConfig {
    fn validate(&self) -> Result<(), String> {
        require_non_empty("productId", &self.product_id)?;
        require_non_empty("deviceName", &self.device_name)?;
        require_non_empty("devicePsk", &self.device_psk)?;
        if self.mode == GatewayMode::Gateway {
            require_non_empty("subProduct", &self.sub_product)?;
        }
        self.broker().map(|_| ())
    }
}

impl IThingsConfig {
    /// 解析 `tcp://host:port`，缺省端口 1883。
    pub fn broker(&self) -> Result<(String, u16), String> {
        let endpoint = self.server_endpoint.trim();
        let rest = endpoint
            .strip_prefix("tcp://")
            .or_else(|| endpoint.strip_prefix("mqtt://"))
            .unwrap_or(endpoint)
            .trim_end_matches('/');
        if rest.is_empty() {
            return Err(format!("invalid serverEndpoint: {}", self.server_endpoint));
        }
        match rest.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| format!("invalid serverEndpoint: {}", self.server_endpoint))?;
                if host.is_empty() {
                    return Err(format!("invalid serverEndpoint: {}", self.server_endpoint));
                }
                Ok((host.to_string(), port))
            }
            None => Ok((rest.to_string(), DEFAULT_MQTT_PORT)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edge_runtime::bind_config;
    use serde_json::json;

    fn bind(value: serde_json::Value) -> Result<IThingsConfig, edge_runtime::RuntimeError> {
        let serde_json::Value::Object(map) = value else {
            panic!("object expected");
        };
        bind_config(&map)
    }

    #[test]
    fn test_config_defaults() {
        let config = bind(json!({"productId": "p", "deviceName": "d", "devicePsk": "k"})).unwrap();
        assert_eq!(config.mode, GatewayMode::Device);
        assert_eq!(config.sign_method, SignMethod::HmacSha256);
        assert_eq!(config.broker().unwrap(), ("127.0.0.1".to_string(), 1883));
    }

    #[test]
    fn test_gateway_mode_requires_sub_product() {
        let err = bind(json!({
            "productId": "p", "deviceName": "d", "devicePsk": "k", "mode": "GATEWAY"
        }));
        assert!(err.is_err());
        let ok = bind(json!({
            "productId": "p", "deviceName": "d", "devicePsk": "k",
            "mode": "GATEWAY", "subProduct": "sp",
            "serverEndpoint": "mqtt://iot.local:11883"
        }))
        .unwrap();
        assert_eq!(ok.broker().unwrap(), ("iot.local".to_string(), 11883));
    }

    #[test]
    fn test_bad_endpoint() {
        assert!(
            bind(json!({
                "productId": "p", "deviceName": "d", "devicePsk": "k",
                "serverEndpoint": "tcp://host:notaport"
            }))
            .is_err()
        );
    }
}
