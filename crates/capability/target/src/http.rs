//! HTTP 输出目标：`POST {"label","body"}`。

use crate::common::{
    Deliver, Envelope, OfflineCache, TargetDeps, default_ping_packet, default_timeout_ms,
    default_true, probe_tcp,
};
use crate::error::TargetError;
use async_trait::async_trait;
use domain::{ConfigMap, ResourceState};
use edge_runtime::{
    CancelToken, RuntimeError, StateCell, Target, ValidateConfig, Worker, WorkerTasks, bind_config,
    require_non_empty,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpConfig {
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default = "default_true")]
    pub allow_ping: bool,
    #[serde(default = "default_ping_packet")]
    pub ping_packet: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout: u64,
    #[serde(default)]
    pub cache_offline_data: bool,
}

impl ValidateConfig for HttpConfig {
    fn validate(&self) -> Result<(), String> {
        require_non_empty("url", &self.url)?;
        let url = reqwest::Url::parse(&self.url).map_err(|e| format!("invalid url: {}", e))?;
        if url.host_str().is_none() {
            return Err(format!("invalid url: {}", self.url));
        }
        header_map(&self.headers).map(|_| ())
    }
}

fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, String> {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| format!("invalid header name: {}", key))?;
        let value =
            HeaderValue::from_str(value).map_err(|_| format!("invalid header value: {}", key))?;
        map.insert(name, value);
    }
    Ok(map)
}

pub struct HttpTarget {
    uuid: String,
    config: Option<HttpConfig>,
    headers: HeaderMap,
    client: reqwest::Client,
    cache: OfflineCache,
    state: StateCell,
    tasks: WorkerTasks,
}

impl HttpTarget {
    pub fn new(deps: TargetDeps) -> Self {
        Self {
            uuid: String::new(),
            config: None,
            headers: HeaderMap::new(),
            client: reqwest::Client::new(),
            cache: OfflineCache::new(deps.lost_cache),
            state: StateCell::default(),
            tasks: WorkerTasks::new(),
        }
    }

    fn config(&self) -> Result<&HttpConfig, TargetError> {
        self.config.as_ref().ok_or(TargetError::NotConnected)
    }

    fn probe_addr(&self) -> Option<String> {
        let url = reqwest::Url::parse(&self.config.as_ref()?.url).ok()?;
        let host = url.host_str()?.to_string();
        let port = url.port_or_known_default()?;
        Some(format!("{}:{}", host, port))
    }
}

#[async_trait]
impl Deliver for HttpTarget {
    async fn deliver(&self, data: &str) -> Result<(), TargetError> {
        let config = self.config()?;
        self.client
            .post(&config.url)
            .headers(self.headers.clone())
            .json(&Envelope {
                label: &config.ping_packet,
                body: data,
            })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl Worker for HttpTarget {
    async fn init(&mut self, uuid: &str, config: &ConfigMap) -> Result<(), RuntimeError> {
        let config: HttpConfig = bind_config(config)?;
        self.headers = header_map(&config.headers).map_err(RuntimeError::Config)?;
        self.client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout.max(1)))
            .build()
            .map_err(|e| RuntimeError::Config(e.to_string()))?;
        self.cache.bind(uuid, config.cache_offline_data);
        self.uuid = uuid.to_string();
        self.config = Some(config);
        Ok(())
    }

    async fn start(&self, cancel: CancelToken) -> Result<(), RuntimeError> {
        self.state.begin_start();
        let config = self.config()?.clone();
        if config.allow_ping {
            let client = self.client.clone();
            let uuid = self.uuid.clone();
            let period = Duration::from_millis(config.timeout.max(100));
            self.tasks.spawn(async move {
                let mut ticker = tokio::time::interval(period);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            let sent = client.post(&config.url).body(config.ping_packet.clone()).send().await;
                            if let Err(err) = sent {
                                debug!(target: "edge.target", uuid = %uuid, error = %err, "http_ping_failed");
                            }
                        }
                    }
                }
            });
        }
        self.cache.replay(self).await;
        self.state.transition(ResourceState::Up);
        info!(target: "edge.target", uuid = %self.uuid, "http_target_started");
        Ok(())
    }

    async fn status(&self) -> ResourceState {
        let state = self.state.get();
        if state != ResourceState::Up {
            return state;
        }
        let Some(addr) = self.probe_addr() else {
            return ResourceState::Down;
        };
        match probe_tcp(&addr, Duration::from_secs(3)).await {
            Ok(()) => ResourceState::Up,
            Err(err) => {
                debug!(target: "edge.target", uuid = %self.uuid, error = %err, "http_probe_failed");
                self.state.transition(ResourceState::Down);
                ResourceState::Down
            }
        }
    }

    async fn stop(&self) {
        self.state.transition(ResourceState::Stop);
        self.tasks.join(Duration::from_millis(500)).await;
    }

    fn as_target(&self) -> Option<&dyn Target> {
        Some(self)
    }
}

#[async_trait]
impl Target for HttpTarget {
    async fn to(&self, data: &str) -> Result<(), RuntimeError> {
        self.cache.write_through(self, data).await
    }
}
