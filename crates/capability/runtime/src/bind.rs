use crate::error::RuntimeError;
use domain::ConfigMap;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// 类型化配置的业务校验。
pub trait ValidateConfig {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// 把非类型化配置绑定到类型化结构并校验。
pub fn bind_config<T>(config: &ConfigMap) -> Result<T, RuntimeError>
where
    T: DeserializeOwned + ValidateConfig,
{
    let typed: T = serde_json::from_value(serde_json::Value::Object(config.clone()))
        .map_err(|e| RuntimeError::Config(e.to_string()))?;
    typed.validate().map_err(RuntimeError::Config)?;
    Ok(typed)
}

pub fn config_to_map<T: Serialize>(config: &T) -> Result<ConfigMap, RuntimeError> {
    match serde_json::to_value(config).map_err(|e| RuntimeError::Config(e.to_string()))? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(RuntimeError::Config(format!(
            "config must be an object, got {}",
            other
        ))),
    }
}

/// 必填字符串字段。
pub fn require_non_empty(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{} is required", field));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct DemoConfig {
        host: String,
        #[serde(default = "default_port")]
        port: u16,
        #[serde(default)]
        cache_offline_data: bool,
    }

    fn default_port() -> u16 {
        1883
    }

    impl ValidateConfig for DemoConfig {
        fn validate(&self) -> Result<(), String> {
            require_non_empty("host", &self.host)
        }
    }

    fn map(value: serde_json::Value) -> ConfigMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_bind_with_defaults() {
        let config: DemoConfig =
            bind_config(&map(json!({"host": "127.0.0.1", "cacheOfflineData": true}))).unwrap();
        assert_eq!(config.port, 1883);
        assert!(config.cache_offline_data);
        let back = config_to_map(&config).unwrap();
        assert_eq!(back["port"], 1883);
    }

    #[test]
    fn test_bind_rejects_invalid() {
        let err = bind_config::<DemoConfig>(&map(json!({"host": " "}))).unwrap_err();
        assert_eq!(err, RuntimeError::Config("host is required".to_string()));
        assert!(bind_config::<DemoConfig>(&map(json!({"port": 1}))).is_err());
        assert!(bind_config::<DemoConfig>(&map(json!({"host": "h", "port": "x"}))).is_err());
    }
}
