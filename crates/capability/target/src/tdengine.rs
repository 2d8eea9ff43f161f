//! TDengine REST 目标。
//!
//! `POST http://{fqdn}:{port}/rest/sql/{db}`，正文为纯文本 SQL，Basic 认证。
//! 配置了 `insertSql` 时用数据替换模板中的 `%v`，否则数据本身即 SQL。

use crate::common::{Deliver, OfflineCache, TargetDeps};
use crate::error::TargetError;
use async_trait::async_trait;
use domain::{ConfigMap, ResourceState};
use edge_runtime::{
    CancelToken, RuntimeError, StateCell, Target, ValidateConfig, Worker, bind_config,
    require_non_empty,
};
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

const CLIENT_TIMEOUT: Duration = Duration::from_millis(2000);
const PROBE_SQL: &str = "SELECT CLIENT_VERSION();";

fn default_fqdn() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    6041
}

fn default_username() -> String {
    "root".to_string()
}

fn default_password() -> String {
    "taosdata".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TdEngineConfig {
    #[serde(default = "default_fqdn")]
    pub fqdn: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_password")]
    pub password: String,
    pub db_name: String,
    #[serde(default)]
    pub insert_sql: Option<String>,
    #[serde(default)]
    pub cache_offline_data: bool,
}

impl ValidateConfig for TdEngineConfig {
    fn validate(&self) -> Result<(), String> {
        require_non_empty("fqdn", &self.fqdn)?;
        require_non_empty("dbName", &self.db_name)
    }
}

impl TdEngineConfig {
    pub fn url(&self) -> String {
        format!(
            "http://{}:{}/rest/sql/{}",
            self.fqdn, self.port, self.db_name
        )
    }

    /// 生成待执行的 SQL。
    pub fn render_sql(&self, data: &str) -> String {
        match self.insert_sql.as_deref() {
            Some(template) if !template.trim().is_empty() => template.replace("%v", data),
            _ => data.to_string(),
        }
    }
}

/// REST 接口的应答头部。
#[derive(Debug, Deserialize)]
struct SqlReply {
    #[serde(default)]
    status: String,
    #[serde(default)]
    code: i64,
    #[serde(default)]
    desc: String,
}

fn check_reply(body: &str) -> Result<(), TargetError> {
    let reply: SqlReply = serde_json::from_str(body)
        .map_err(|e| TargetError::Remote(format!("invalid reply: {}", e)))?;
    if reply.status == "error" || reply.code != 0 {
        return Err(TargetError::Remote(format!(
            "code={}, desc={}",
            reply.code, reply.desc
        )));
    }
    Ok(())
}

pub struct TdEngineTarget {
    uuid: String,
    config: Option<TdEngineConfig>,
    client: reqwest::Client,
    cache: OfflineCache,
    state: StateCell,
}

impl TdEngineTarget {
    pub fn new(deps: TargetDeps) -> Self {
        Self {
            uuid: String::new(),
            config: None,
            client: reqwest::Client::new(),
            cache: OfflineCache::new(deps.lost_cache),
            state: StateCell::default(),
        }
    }

    async fn execute(&self, sql: String) -> Result<(), TargetError> {
        let config = self.config.as_ref().ok_or(TargetError::NotConnected)?;
        let body = self
            .client
            .post(config.url())
            .header(CONTENT_TYPE, "text/plain")
            .basic_auth(&config.username, Some(&config.password))
            .body(sql)
            .send()
            .await?
            .text()
            .await?;
        check_reply(&body)
    }
}

#[async_trait]
impl Deliver for TdEngineTarget {
    async fn deliver(&self, data: &str) -> Result<(), TargetError> {
        let config = self.config.as_ref().ok_or(TargetError::NotConnected)?;
        self.execute(config.render_sql(data)).await
    }
}

#[async_trait]
impl Worker for TdEngineTarget {
    async fn init(&mut self, uuid: &str, config: &ConfigMap) -> Result<(), RuntimeError> {
        let config: TdEngineConfig = bind_config(config)?;
        self.client = reqwest::Client::builder()
            .timeout(CLIENT_TIMEOUT)
            .build()
            .map_err(|e| RuntimeError::Config(e.to_string()))?;
        self.cache.bind(uuid, config.cache_offline_data);
        self.uuid = uuid.to_string();
        self.config = Some(config);
        Ok(())
    }

    async fn start(&self, _cancel: CancelToken) -> Result<(), RuntimeError> {
        self.state.begin_start();
        self.execute(PROBE_SQL.to_string()).await?;
        self.cache.replay(self).await;
        self.state.transition(ResourceState::Up);
        info!(target: "edge.target", uuid = %self.uuid, "tdengine_target_started");
        Ok(())
    }

    async fn status(&self) -> ResourceState {
        let state = self.state.get();
        if state != ResourceState::Up {
            return state;
        }
        match self.execute(PROBE_SQL.to_string()).await {
            Ok(()) => ResourceState::Up,
            Err(err) => {
                debug!(target: "edge.target", uuid = %self.uuid, error = %err, "tdengine_probe_failed");
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
impl Target for TdEngineTarget {
    async fn to(&self, data: &str) -> Result<(), RuntimeError> {
        self.cache.write_through(self, data).await
    }
}
