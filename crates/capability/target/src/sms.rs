//! 短信目标：阿里云（HMAC-SHA1 签名 GET）或聚合数据（key 鉴权 GET）。
//!
//! 输入：`{"to","content","template","data":{..}}`，模板变量取自 `data`。

use crate::common::{Deliver, OfflineCache, TargetDeps};
use crate::error::TargetError;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use domain::{ConfigMap, ResourceState};
use edge_runtime::{
    CancelToken, RuntimeError, StateCell, Target, ValidateConfig, Worker, bind_config,
    require_non_empty,
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

const ALIYUN_ENDPOINT: &str = "https://dysmsapi.aliyuncs.com/";
const JUHE_ENDPOINT: &str = "http://v.juhe.cn/sms/send";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SmsProvider {
    #[serde(rename = "ALI_SMS")]
    Aliyun,
    #[serde(rename = "JUHE_SMS")]
    Juhe,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsConfig {
    #[serde(rename = "type")]
    pub provider: SmsProvider,
    #[serde(default, alias = "app_key")]
    pub app_key: String,
    #[serde(default)]
    pub access_key_id: String,
    #[serde(default)]
    pub access_key_secret: String,
    #[serde(default)]
    pub sign_name: String,
    #[serde(default = "default_region")]
    pub region_id: String,
    #[serde(default)]
    pub cache_offline_data: bool,
}

fn default_region() -> String {
    "cn-hangzhou".to_string()
}

impl ValidateConfig for SmsConfig {
    fn validate(&self) -> Result<(), String> {
        match self.provider {
            SmsProvider::Aliyun => {
                require_non_empty("accessKeyId", &self.access_key_id)?;
                require_non_empty("accessKeySecret", &self.access_key_secret)?;
                require_non_empty("signName", &self.sign_name)
            }
            SmsProvider::Juhe => require_non_empty("appKey", &self.app_key),
        }
    }
}

/// 一条短信。
#[derive(Debug, Clone, Deserialize)]
pub struct SmsMessage {
    #[serde(deserialize_with = "phone_number")]
    pub to: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub template: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

fn phone_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "invalid phone number: {}",
            other
        ))),
    }
}

/// RFC 3986 百分号编码，仅保留非保留字符。
pub fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len() * 3);
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}

fn query_string(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// 阿里云 RPC 签名：`GET&%2F&{编码后的规范化查询串}`，密钥为 `secret&`。
pub fn aliyun_signature(secret: &str, params: &BTreeMap<String, String>) -> String {
    let string_to_sign = format!("GET&{}&{}", percent_encode("/"), percent_encode(&query_string(params)));
    let key = format!("{}&", secret);
    let Ok(mut mac) = Hmac::<Sha1>::new_from_slice(key.as_bytes()) else {
        return String::new();
    };
    mac.update(string_to_sign.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

fn aliyun_params(
    config: &SmsConfig,
    message: &SmsMessage,
    nonce: &str,
    timestamp: &str,
) -> Result<BTreeMap<String, String>, TargetError> {
    let template_param =
        serde_json::to_string(&message.data).map_err(|e| TargetError::InvalidData(e.to_string()))?;
    let mut params = BTreeMap::new();
    for (k, v) in [
        ("AccessKeyId", config.access_key_id.as_str()),
        ("Action", "SendSms"),
        ("Format", "JSON"),
        ("PhoneNumbers", message.to.as_str()),
        ("RegionId", config.region_id.as_str()),
        ("SignName", config.sign_name.as_str()),
        ("SignatureMethod", "HMAC-SHA1"),
        ("SignatureNonce", nonce),
        ("SignatureVersion", "1.0"),
        ("TemplateCode", message.template.as_str()),
        ("TemplateParam", template_param.as_str()),
        ("Timestamp", timestamp),
        ("Version", "2017-05-25"),
    ] {
        params.insert(k.to_string(), v.to_string());
    }
    Ok(params)
}

/// 聚合数据模板变量：`#key#=value&...`。
pub fn juhe_tpl_value(data: &BTreeMap<String, String>) -> String {
    data.iter()
        .map(|(k, v)| format!("#{}#={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AliyunReply {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct JuheReply {
    #[serde(default)]
    error_code: i64,
    #[serde(default)]
    reason: String,
}

pub struct SmsTarget {
    uuid: String,
    config: Option<SmsConfig>,
    client: reqwest::Client,
    cache: OfflineCache,
    state: StateCell,
}

impl SmsTarget {
    pub fn new(deps: TargetDeps) -> Self {
        Self {
            uuid: String::new(),
            config: None,
            client: reqwest::Client::new(),
            cache: OfflineCache::new(deps.lost_cache),
            state: StateCell::default(),
        }
    }

    async fn send_aliyun(&self, config: &SmsConfig, message: &SmsMessage) -> Result<(), TargetError> {
        let nonce = uuid::Uuid::new_v4().to_string();
        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let mut params = aliyun_params(config, message, &nonce, &timestamp)?;
        let signature = aliyun_signature(&config.access_key_secret, &params);
        params.insert("Signature".to_string(), signature);
        let url = format!("{}?{}", ALIYUN_ENDPOINT, query_string(&params));
        let reply: AliyunReply = self.client.get(url).send().await?.json().await?;
        if reply.code != "OK" {
            return Err(TargetError::Remote(format!("{}: {}", reply.code, reply.message)));
        }
        Ok(())
    }

    async fn send_juhe(&self, config: &SmsConfig, message: &SmsMessage) -> Result<(), TargetError> {
        let tpl_value = juhe_tpl_value(&message.data);
        let reply: JuheReply = self
            .client
            .get(JUHE_ENDPOINT)
            .query(&[
                ("mobile", message.to.as_str()),
                ("tpl_id", message.template.as_str()),
                ("tpl_value", tpl_value.as_str()),
                ("key", config.app_key.as_str()),
            ])
            .send()
            .await?
            .json()
            .await?;
        if reply.error_code != 0 {
            return Err(TargetError::Remote(format!(
                "{}: {}",
                reply.error_code, reply.reason
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Deliver for SmsTarget {
    async fn deliver(&self, data: &str) -> Result<(), TargetError> {
        let config = self.config.as_ref().ok_or(TargetError::NotConnected)?;
        let message: SmsMessage = serde_json::from_str(data)
            .map_err(|e| TargetError::InvalidData(format!("sms format error: {}", e)))?;
        debug!(
            target: "edge.target",
            uuid = %self.uuid,
            to = %message.to,
            template = %message.template,
            content_len = message.content.len(),
            "sms_send"
        );
        match config.provider {
            SmsProvider::Aliyun => self.send_aliyun(config, &message).await,
            SmsProvider::Juhe => self.send_juhe(config, &message).await,
        }
    }
}

#[async_trait]
impl Worker for SmsTarget {
    async fn init(&mut self, uuid: &str, config: &ConfigMap) -> Result<(), RuntimeError> {
        let config: SmsConfig = bind_config(config)?;
        self.client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| RuntimeError::Config(e.to_string()))?;
        self.cache.bind(uuid, config.cache_offline_data);
        self.uuid = uuid.to_string();
        self.config = Some(config);
        Ok(())
    }

    async fn start(&self, _cancel: CancelToken) -> Result<(), RuntimeError> {
        self.state.begin_start();
        self.cache.replay(self).await;
        self.state.transition(ResourceState::Up);
        info!(target: "edge.target", uuid = %self.uuid, "sms_target_started");
        Ok(())
    }

    async fn status(&self) -> ResourceState {
        self.state.get()
    }

    async fn stop(&self) {
        self.state.transition(ResourceState::Stop);
    }

    fn as_target(&self) -> Option<&dyn Target> {
        Some(self)
    }
}

#[async_trait]
impl Target for SmsTarget {
    async fn to(&self, data: &str) -> Result<(), RuntimeError> {
        self.cache.write_through(self, data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_percent_encoding() {
        assert_eq!(percent_encode("a b*c~"), "a%20b%2Ac~");
        assert_eq!(percent_encode("/"), "%2F");
        assert_eq!(percent_encode("中"), "%E4%B8%AD");
    }

    #[test]
    fn test_aliyun_signature_is_stable() {
        let config: SmsConfig = bind_config(
            json!({
                "type": "ALI_SMS",
                "accessKeyId": "testId",
                "accessKeySecret": "testSecret",
                "signName": "edge"
            })
            .as_object()
            .unwrap(),
        )
        .unwrap();
        let message: SmsMessage =
            serde_json::from_str(r#"{"to":15300000001,"template":"SMS_1","data":{"code":"1234"}}"#)
                .unwrap();
        assert_eq!(message.to, "15300000001");
        let params = aliyun_params(&config, &message, "nonce", "2017-07-12T02:42:19Z").unwrap();
        let first = aliyun_signature("testSecret", &params);
        let second = aliyun_signature("testSecret", &params);
        assert_eq!(first, second);
        assert_eq!(STANDARD.decode(&first).unwrap().len(), 20);
        assert_ne!(first, aliyun_signature("other", &params));
    }

    #[test]
    fn test_juhe_template_and_validation() {
        let mut data = BTreeMap::new();
        data.insert("code".to_string(), "1234".to_string());
        data.insert("name".to_string(), "pump".to_string());
        assert_eq!(juhe_tpl_value(&data), "#code#=1234&#name#=pump");

        let map = json!({"type": "JUHE_SMS"});
        assert!(bind_config::<SmsConfig>(map.as_object().unwrap()).is_err());
        let map = json!({"type": "OTHER"});
        assert!(bind_config::<SmsConfig>(map.as_object().unwrap()).is_err());
    }
}
