//! GrepTime 目标：经 HTTP InfluxDB 行协议写入。
//!
//! 一条 JSON 对象写成一行：`{table},gateway_sn={gwsn} k1=v1,k2=v2 {ts_ms}`，
//! 列按名称排序，类型由 JSON 值推断（整数带 `i` 后缀，浮点、布尔原样，其余按字符串）。

use crate::common::{Deliver, OfflineCache, TargetDeps, default_host, probe_tcp};
use crate::error::TargetError;
use async_trait::async_trait;
use domain::{ConfigMap, ResourceState};
use edge_runtime::{
    CancelToken, RuntimeError, StateCell, Target, ValidateConfig, Worker, bind_config,
    require_non_empty,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info};

fn default_gwsn() -> String {
    "rhilex".to_string()
}

fn default_port() -> u16 {
    4000
}

fn default_database() -> String {
    "public".to_string()
}

fn default_table() -> String {
    "rhilex".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrepTimeConfig {
    #[serde(default = "default_gwsn")]
    pub gwsn: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default)]
    pub cache_offline_data: bool,
}

impl ValidateConfig for GrepTimeConfig {
    fn validate(&self) -> Result<(), String> {
        require_non_empty("host", &self.host)?;
        require_non_empty("database", &self.database)?;
        require_non_empty("table", &self.table)
    }
}

fn escape_key(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, ',' | ' ' | '=') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn escape_string_field(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

fn field_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(format!("{}i", n)),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(escape_string_field(s)),
        other => Some(escape_string_field(&other.to_string())),
    }
}

/// 把一条 JSON 对象编码为行协议。
pub fn to_line_protocol(
    table: &str,
    gwsn: &str,
    fields: &Map<String, Value>,
    ts_ms: i64,
) -> Result<String, TargetError> {
    let mut keys: Vec<&String> = fields.keys().collect();
    keys.sort();
    let encoded: Vec<String> = keys
        .into_iter()
        .filter_map(|key| {
            let value = field_value(&fields[key.as_str()])?;
            Some(format!("{}={}", escape_key(key), value))
        })
        .collect();
    if encoded.is_empty() {
        return Err(TargetError::InvalidData("no field to write".to_string()));
    }
    Ok(format!(
        "{},gateway_sn={} {} {}",
        escape_key(table),
        escape_key(gwsn),
        encoded.join(","),
        ts_ms
    ))
}

pub struct GrepTimeTarget {
    uuid: String,
    config: Option<GrepTimeConfig>,
    client: reqwest::Client,
    cache: OfflineCache,
    state: StateCell,
}

impl GrepTimeTarget {
    pub fn new(deps: TargetDeps) -> Self {
        Self {
            uuid: String::new(),
            config: None,
            client: reqwest::Client::new(),
            cache: OfflineCache::new(deps.lost_cache),
            state: StateCell::default(),
        }
    }
}

#[async_trait]
impl Deliver for GrepTimeTarget {
    async fn deliver(&self, data: &str) -> Result<(), TargetError> {
        let config = self.config.as_ref().ok_or(TargetError::NotConnected)?;
        let fields: Map<String, Value> = serde_json::from_str(data)
            .map_err(|e| TargetError::InvalidData(format!("expect json object: {}", e)))?;
        let line = to_line_protocol(&config.table, &config.gwsn, &fields, domain::now_epoch_ms())?;
        let url = format!(
            "http://{}:{}/v1/influxdb/write?db={}&precision=ms",
            config.host, config.port, config.database
        );
        let mut request = self.client.post(url).body(line);
        if !config.username.is_empty() {
            request = request.basic_auth(&config.username, Some(&config.password));
        }
        request.send().await?.error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl Worker for GrepTimeTarget {
    async fn init(&mut self, uuid: &str, config: &ConfigMap) -> Result<(), RuntimeError> {
        let config: GrepTimeConfig = bind_config(config)?;
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
        info!(target: "edge.target", uuid = %self.uuid, "greptime_target_started");
        Ok(())
    }

    async fn status(&self) -> ResourceState {
        let state = self.state.get();
        if state != ResourceState::Up {
            return state;
        }
        let Some(config) = self.config.as_ref() else {
            return ResourceState::Down;
        };
        let addr = format!("{}:{}", config.host, config.port);
        match probe_tcp(&addr, Duration::from_secs(3)).await {
            Ok(()) => ResourceState::Up,
            Err(err) => {
                debug!(target: "edge.target", uuid = %self.uuid, error = %err, "greptime_probe_failed");
                self.state.transition(ResourceState::Down);
                ResourceState::Down
            }
        }
    }

    async fn stop(&self) {
        self.state.transition(ResourceState::Stop);
    }

    fn as_target(&self) -> Option<&dyn Target> {
        Some(self)
    }
}

#[async_trait]
impl Target for GrepTimeTarget {
    async fn to(&self, data: &str) -> Result<(), RuntimeError> {
        self.cache.write_through(self, data).await
    }
}
