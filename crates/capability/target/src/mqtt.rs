//! MQTT 输出目标：QoS 1 发布到固定主题。

use crate::common::{Deliver, OfflineCache, TargetDeps, default_host};
use crate::error::TargetError;
use async_trait::async_trait;
use domain::{ConfigMap, ResourceState};
use edge_runtime::{
    CancelToken, RuntimeError, StateCell, Target, ValidateConfig, Worker, WorkerTasks, bind_config,
    require_non_empty,
};
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

fn default_port() -> u16 {
    1883
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MqttTargetConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub pub_topic: String,
    #[serde(default)]
    pub cache_offline_data: bool,
}

impl ValidateConfig for MqttTargetConfig {
    fn validate(&self) -> Result<(), String> {
        require_non_empty("host", &self.host)?;
        require_non_empty("pubTopic", &self.pub_topic)
    }
}

/// 等待 CONNACK。
pub(crate) async fn wait_connack(eventloop: &mut EventLoop) -> Result<(), ConnectionError> {
    loop {
        if let Event::Incoming(Packet::ConnAck(_)) = eventloop.poll().await? {
            return Ok(());
        }
    }
}

pub struct MqttTarget {
    uuid: String,
    config: Option<MqttTargetConfig>,
    client: Mutex<Option<AsyncClient>>,
    connected: Arc<AtomicBool>,
    cache: OfflineCache,
    state: Arc<StateCell>,
    tasks: WorkerTasks,
}

impl MqttTarget {
    pub fn new(deps: TargetDeps) -> Self {
        Self {
            uuid: String::new(),
            config: None,
            client: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
            cache: OfflineCache::new(deps.lost_cache),
            state: Arc::new(StateCell::default()),
            tasks: WorkerTasks::new(),
        }
    }

    fn client(&self) -> Option<AsyncClient> {
        self.client
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl Deliver for MqttTarget {
    async fn deliver(&self, data: &str) -> Result<(), TargetError> {
        let config = self.config.as_ref().ok_or(TargetError::NotConnected)?;
        if !self.connected.load(Ordering::Acquire) {
            return Err(TargetError::NotConnected);
        }
        let client = self.client().ok_or(TargetError::NotConnected)?;
        client
            .publish(
                config.pub_topic.clone(),
                QoS::AtLeastOnce,
                false,
                data.as_bytes().to_vec(),
            )
            .await
            .map_err(|e| TargetError::Remote(e.to_string()))
    }
}

#[async_trait]
impl Worker for MqttTarget {
    async fn init(&mut self, uuid: &str, config: &ConfigMap) -> Result<(), RuntimeError> {
        let mut config: MqttTargetConfig = bind_config(config)?;
        if config.client_id.is_empty() {
            config.client_id = format!("edge-target-{}", uuid);
        }
        self.cache.bind(uuid, config.cache_offline_data);
        self.uuid = uuid.to_string();
        self.config = Some(config);
        Ok(())
    }

    async fn start(&self, cancel: CancelToken) -> Result<(), RuntimeError> {
        self.state.begin_start();
        let config = self
            .config
            .as_ref()
            .ok_or(TargetError::NotConnected)?
            .clone();
        let mut options = MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(60));
        options.set_clean_session(true);
        if !config.username.is_empty() {
            options.set_credentials(config.username.clone(), config.password.clone());
        }
        let (client, mut eventloop) = AsyncClient::new(options, 64);
        match tokio::time::timeout(CONNECT_TIMEOUT, wait_connack(&mut eventloop)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(RuntimeError::worker(err)),
            Err(_) => {
                return Err(TargetError::Timeout(CONNECT_TIMEOUT.as_millis() as u64).into());
            }
        }
        self.connected.store(true, Ordering::Release);
        *self.client.lock().unwrap_or_else(|e| e.into_inner()) = Some(client);
        self.state.transition(ResourceState::Up);

        let connected = self.connected.clone();
        let state = self.state.clone();
        let uuid = self.uuid.clone();
        self.tasks.spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    polled = eventloop.poll() => {
                        if let Err(err) = polled {
                            warn!(target: "edge.target", uuid = %uuid, error = %err, "mqtt_target_disconnected");
                            connected.store(false, Ordering::Release);
                            state.transition(ResourceState::Down);
                            break;
                        }
                    }
                }
            }
        });
        self.cache.replay(self).await;
        info!(
            target: "edge.target",
            uuid = %self.uuid,
            host = %config.host,
            port = config.port,
            topic = %config.pub_topic,
            "mqtt_target_started"
        );
        Ok(())
    }

    async fn status(&self) -> ResourceState {
        let state = self.state.get();
        if state == ResourceState::Up && !self.connected.load(Ordering::Acquire) {
            return ResourceState::Down;
        }
        state
    }

    async fn stop(&self) {
        self.state.transition(ResourceState::Stop);
        self.connected.store(false, Ordering::Release);
        let client = self.client.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(client) = client {
            let _ = client.try_disconnect();
        }
        self.tasks.join(Duration::from_millis(500)).await;
    }

    fn as_target(&self) -> Option<&dyn Target> {
        Some(self)
    }
}

#[async_trait]
impl Target for MqttTarget {
    async fn to(&self, data: &str) -> Result<(), RuntimeError> {
        self.cache.write_through(self, data).await
    }
}
