//! MQTT 输入源：订阅 `subTopics`，每条消息以 `{"topic","payload"}` 送入规则引擎。
//!
//! `payload` 是原始字节的 Base64 编码。

use crate::common::emit_json;
use crate::error::IngestError;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use domain::{ConfigMap, ResourceState, now_epoch_ms};
use edge_runtime::{
    CancelToken, RuleHook, RuntimeError, StateCell, ValidateConfig, Worker, WorkerTasks,
    bind_config, require_non_empty,
};
use rumqttc::{
    AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Packet, QoS, SubscribeFilter,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const KEEP_ALIVE: Duration = Duration::from_secs(60);

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    format!("rhilex_mqtt_source_{}", now_epoch_ms())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MqttSourceConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub sub_topics: Vec<String>,
    #[serde(default)]
    pub qos: u8,
}

impl ValidateConfig for MqttSourceConfig {
    fn validate(&self) -> Result<(), String> {
        require_non_empty("host", &self.host)?;
        require_non_empty("clientId", &self.client_id)?;
        if self.sub_topics.iter().any(|t| t.trim().is_empty()) {
            return Err("subTopics must not contain empty topics".to_string());
        }
        if self.qos > 2 {
            return Err(format!("invalid qos: {}", self.qos));
        }
        Ok(())
    }
}

impl MqttSourceConfig {
    fn qos(&self) -> QoS {
        match self.qos {
            0 => QoS::AtMostOnce,
            1 => QoS::AtLeastOnce,
            _ => QoS::ExactlyOnce,
        }
    }
}

/// 送往规则引擎的 MQTT 消息。
#[derive(Debug, Clone, Serialize)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: String,
}

impl MqttMessage {
    pub fn new(topic: &str, payload: &[u8]) -> Self {
        Self {
            topic: topic.to_string(),
            payload: STANDARD.encode(payload),
        }
    }
}

async fn wait_connack(eventloop: &mut EventLoop) -> Result<(), ConnectionError> {
    loop {
        if let Event::Incoming(Packet::ConnAck(_)) = eventloop.poll().await? {
            return Ok(());
        }
    }
}

pub struct MqttSource {
    uuid: String,
    config: Option<MqttSourceConfig>,
    hook: Arc<dyn RuleHook>,
    client: Mutex<Option<AsyncClient>>,
    connected: Arc<AtomicBool>,
    state: Arc<StateCell>,
    tasks: WorkerTasks,
}

impl MqttSource {
    pub fn new(hook: Arc<dyn RuleHook>) -> Self {
        Self {
            uuid: String::new(),
            config: None,
            hook,
            client: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
            state: Arc::new(StateCell::default()),
            tasks: WorkerTasks::new(),
        }
    }
}

#[async_trait]
impl Worker for MqttSource {
    async fn init(&mut self, uuid: &str, config: &ConfigMap) -> Result<(), RuntimeError> {
        self.config = Some(bind_config(config)?);
        self.uuid = uuid.to_string();
        Ok(())
    }

    async fn start(&self, cancel: CancelToken) -> Result<(), RuntimeError> {
        self.state.begin_start();
        let config = self.config.clone().ok_or(IngestError::NotStarted)?;
        let mut options = MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
        options.set_keep_alive(KEEP_ALIVE);
        options.set_clean_session(true);
        if !config.username.is_empty() {
            options.set_credentials(config.username.clone(), config.password.clone());
        }
        let (client, mut eventloop) = AsyncClient::new(options, 64);
        match tokio::time::timeout(CONNECT_TIMEOUT, wait_connack(&mut eventloop)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(IngestError::Mqtt(err.to_string()).into()),
            Err(_) => {
                return Err(IngestError::Timeout(CONNECT_TIMEOUT.as_millis() as u64).into());
            }
        }
        self.connected.store(true, Ordering::Release);

        if !config.sub_topics.is_empty() {
            let qos = config.qos();
            let filters = config
                .sub_topics
                .iter()
                .map(|topic| SubscribeFilter::new(topic.clone(), qos));
            client
                .subscribe_many(filters)
                .await
                .map_err(IngestError::from)?;
        }
        *self.client.lock().unwrap_or_else(|e| e.into_inner()) = Some(client);

        let uuid = self.uuid.clone();
        let hook = self.hook.clone();
        let connected = self.connected.clone();
        let state = self.state.clone();
        self.tasks.spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    polled = eventloop.poll() => match polled {
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            let message = MqttMessage::new(&publish.topic, &publish.payload);
                            emit_json(hook.as_ref(), &uuid, &message).await;
                        }
                        Ok(_) => {}
                        Err(err) => {
                            warn!(target: "edge.ingest", uuid = %uuid, error = %err, "mqtt_source_disconnected");
                            connected.store(false, Ordering::Release);
                            state.transition(ResourceState::Down);
                            break;
                        }
                    }
                }
            }
        });
        self.state.transition(ResourceState::Up);
        info!(
            target: "edge.ingest",
            uuid = %self.uuid,
            host = %config.host,
            port = config.port,
            client_id = %config.client_id,
            topics = config.sub_topics.len(),
            "mqtt_source_started"
        );
        Ok(())
    }

    async fn status(&self) -> ResourceState {
        let state = self.state.get();
        if state == ResourceState::Up && !self.connected.load(Ordering::Acquire) {
            self.state.transition(ResourceState::Down);
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_payload_is_base64() {
        let message = MqttMessage::new("a/b", b"hi");
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({"topic": "a/b", "payload": "aGk="})
        );
    }

    #[test]
    fn test_config_validation() {
        let config: MqttSourceConfig =
            serde_json::from_value(json!({"subTopics": ["a/#"], "qos": 1})).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.qos(), QoS::AtLeastOnce);
        assert!(config.client_id.starts_with("rhilex_mqtt_source_"));

        let bad: MqttSourceConfig = serde_json::from_value(json!({"qos": 3})).unwrap();
        assert!(bad.validate().is_err());
        let empty: MqttSourceConfig = serde_json::from_value(json!({"subTopics": [" "]})).unwrap();
        assert!(empty.validate().is_err());
    }
}
