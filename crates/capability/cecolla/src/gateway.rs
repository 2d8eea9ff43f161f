//! `ITHINGS_IOTHUB` Worker：建立 MQTT 会话并把协议交给 [`GatewayCore`]。
//!
//! 客户端不自动重连，断线后状态置为 DOWN，由监督器重启。

use crate::auth::{AuthInfo, gen_secret_device_info};
use crate::config::IThingsConfig;
use crate::error::CecollaError;
use crate::httpapi::fetch_schema;
use crate::protocol::GatewayCore;
use crate::uplink::MqttUplink;
use async_trait::async_trait;
use domain::{ConfigMap, ResourceState};
use edge_runtime::{
    CancelToken, Controllable, InterCache, RuleHook, RuntimeError, StateCell, Worker,
    WorkerTasks, bind_config,
};
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Packet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const KEEP_ALIVE: Duration = Duration::from_secs(60);
/// 等待 MQTT 物模型应答的时间，超时后走 HTTP 接口
const SCHEMA_FALLBACK_DELAY: Duration = Duration::from_secs(5);

async fn wait_connack(eventloop: &mut EventLoop) -> Result<(), ConnectionError> {
    loop {
        if let Event::Incoming(Packet::ConnAck(_)) = eventloop.poll().await? {
            return Ok(());
        }
    }
}

pub struct IThingsGateway {
    uuid: String,
    config: Option<IThingsConfig>,
    auth: Option<AuthInfo>,
    hook: Arc<dyn RuleHook>,
    intercache: Arc<InterCache>,
    http: reqwest::Client,
    core: Mutex<Option<Arc<GatewayCore>>>,
    client: Mutex<Option<AsyncClient>>,
    connected: Arc<AtomicBool>,
    state: Arc<StateCell>,
    tasks: WorkerTasks,
}

impl IThingsGateway {
    pub fn new(hook: Arc<dyn RuleHook>, intercache: Arc<InterCache>) -> Self {
        Self {
            uuid: String::new(),
            config: None,
            auth: None,
            hook,
            intercache,
            http: reqwest::Client::new(),
            core: Mutex::new(None),
            client: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
            state: Arc::new(StateCell::default()),
            tasks: WorkerTasks::new(),
        }
    }

    fn core(&self) -> Option<Arc<GatewayCore>> {
        self.core.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn spawn_schema_fallback(
        &self,
        core: Arc<GatewayCore>,
        config: IThingsConfig,
        auth: AuthInfo,
        cancel: CancelToken,
    ) {
        let http = self.http.clone();
        let uuid = self.uuid.clone();
        self.tasks.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(SCHEMA_FALLBACK_DELAY) => {}
            }
            if core.gateway_schema().is_some() {
                return;
            }
            let fetched = fetch_schema(
                &http,
                &config.schema_api_host,
                &config.product_id,
                &config.device_name,
                &auth.username,
                &auth.password,
            )
            .await;
            match fetched {
                Ok(schema) => core.install_schema(&config.product_id, schema),
                Err(err) => {
                    warn!(target: "edge.cecolla", uuid = %uuid, error = %err, "ithings_schema_fetch_failed");
                }
            }
        });
    }
}

#[async_trait]
impl Worker for IThingsGateway {
    async fn init(&mut self, uuid: &str, config: &ConfigMap) -> Result<(), RuntimeError> {
        let config: IThingsConfig = bind_config(config)?;
        self.auth = Some(gen_secret_device_info(
            config.sign_method,
            &config.product_id,
            &config.device_name,
            &config.device_psk,
        ));
        self.uuid = uuid.to_string();
        self.config = Some(config);
        Ok(())
    }

    async fn start(&self, cancel: CancelToken) -> Result<(), RuntimeError> {
        self.state.begin_start();
        let config = self.config.clone().ok_or(CecollaError::NotConnected)?;
        let auth = self.auth.clone().ok_or(CecollaError::NotConnected)?;
        let (host, port) = config.broker().map_err(RuntimeError::Config)?;

        let mut options = MqttOptions::new(auth.client_id.clone(), host.clone(), port);
        options.set_keep_alive(KEEP_ALIVE);
        options.set_clean_session(true);
        options.set_credentials(auth.username.clone(), auth.password.clone());
        let (client, mut eventloop) = AsyncClient::new(options, 64);
        match tokio::time::timeout(CONNECT_TIMEOUT, wait_connack(&mut eventloop)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(CecollaError::Mqtt(err.to_string()).into()),
            Err(_) => {
                return Err(CecollaError::Timeout(CONNECT_TIMEOUT.as_millis() as u64).into());
            }
        }
        self.connected.store(true, Ordering::Release);

        let uplink = Arc::new(MqttUplink::new(client.clone(), self.connected.clone()));
        let core = Arc::new(GatewayCore::new(
            &self.uuid,
            config.clone(),
            uplink,
            self.hook.clone(),
            self.intercache.clone(),
        ));
        *self.client.lock().unwrap_or_else(|e| e.into_inner()) = Some(client);
        *self.core.lock().unwrap_or_else(|e| e.into_inner()) = Some(core.clone());

        let loop_core = core.clone();
        let loop_cancel = cancel.clone();
        let connected = self.connected.clone();
        let state = self.state.clone();
        let uuid = self.uuid.clone();
        self.tasks.spawn(async move {
            loop {
                tokio::select! {
                    _ = loop_cancel.cancelled() => break,
                    polled = eventloop.poll() => match polled {
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            loop_core.handle_downlink(&publish.topic, &publish.payload).await;
                        }
                        Ok(_) => {}
                        Err(err) => {
                            warn!(target: "edge.cecolla", uuid = %uuid, error = %err, "ithings_disconnected");
                            connected.store(false, Ordering::Release);
                            state.transition(ResourceState::Down);
                            break;
                        }
                    }
                }
            }
        });

        core.on_connected().await?;
        if !config.schema_api_host.is_empty() {
            self.spawn_schema_fallback(core, config.clone(), auth, cancel);
        }
        self.state.transition(ResourceState::Up);
        info!(
            target: "edge.cecolla",
            uuid = %self.uuid,
            host = %host,
            port,
            product_id = %config.product_id,
            device_name = %config.device_name,
            mode = ?config.mode,
            "ithings_gateway_started"
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
        let core = self.core.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(core) = core {
            core.teardown();
        }
        let client = self.client.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(client) = client {
            let _ = client.try_disconnect();
        }
        self.tasks.join(Duration::from_millis(500)).await;
        info!(target: "edge.cecolla", uuid = %self.uuid, "ithings_gateway_stopped");
    }

    fn as_controllable(&self) -> Option<&dyn Controllable> {
        Some(self)
    }
}

#[async_trait]
impl Controllable for IThingsGateway {
    async fn on_ctrl(&self, cmd: &str, args: &[u8]) -> Result<Vec<u8>, RuntimeError> {
        let core = self.core().ok_or(CecollaError::NotConnected)?;
        if !core.is_connected() {
            return Err(CecollaError::NotConnected.into());
        }
        Ok(core.on_ctrl(cmd, args).await?)
    }
}
