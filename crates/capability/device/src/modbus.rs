//! `GENERIC_MODBUS_MASTER`：Modbus TCP 主站设备。
//!
//! 每 `frequency` 毫秒按寄存器块轮询一次，读数写入以设备 uuid 命名的
//! InterCache 槽，并经 `RuleHook::work_device` 上送。连续失败超过 5 次置为 DOWN。

use crate::common::{emit_json, parse_args};
use crate::error::DeviceError;
use async_trait::async_trait;
use domain::{ConfigMap, ResourceState, now_epoch_ms};
use edge_protocol::{ModbusMaster, ModbusTcpConfig, RegisterBlock, decode_registers};
use edge_runtime::{
    CacheValue, CancelToken, Controllable, InterCache, RuleHook, RuntimeError, StateCell,
    ValidateConfig, Worker, WorkerTasks, bind_config, require_non_empty,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const MAX_RETRY: u32 = 5;
const MIN_FREQUENCY_MS: u64 = 50;

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    502
}

fn default_timeout() -> u64 {
    3000
}

fn default_frequency() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModbusMasterConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_true")]
    pub auto_request: bool,
    /// 一轮读数合并为一个数组上送
    #[serde(default)]
    pub batch_request: bool,
    #[serde(default = "default_frequency")]
    pub frequency: u64,
    #[serde(default)]
    pub blocks: Vec<RegisterBlock>,
}

impl ValidateConfig for ModbusMasterConfig {
    fn validate(&self) -> Result<(), String> {
        require_non_empty("host", &self.host)?;
        if self.port == 0 {
            return Err("port is required".to_string());
        }
        if self.frequency < MIN_FREQUENCY_MS {
            return Err(format!(
                "'frequency' must be at least {} milliseconds",
                MIN_FREQUENCY_MS
            ));
        }
        let mut tags = HashSet::new();
        for block in &self.blocks {
            require_non_empty("tag", &block.tag)?;
            if !tags.insert(block.tag.as_str()) {
                return Err(format!("duplicate tag: {}", block.tag));
            }
        }
        Ok(())
    }
}

impl ModbusMasterConfig {
    fn tcp(&self) -> ModbusTcpConfig {
        ModbusTcpConfig {
            host: self.host.clone(),
            port: self.port,
            timeout: self.timeout,
        }
    }
}

/// 一个寄存器块的读数。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterReading {
    pub tag: String,
    pub slaver_id: u8,
    pub last_fetch_time: i64,
    pub value: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WriteSingleArgs {
    #[serde(default = "default_slave")]
    slaver_id: u8,
    address: u16,
    value: u16,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WriteMultipleArgs {
    #[serde(default = "default_slave")]
    slaver_id: u8,
    address: u16,
    values: Vec<u16>,
}

fn default_slave() -> u8 {
    1
}

type SharedMaster = Arc<Mutex<Option<ModbusMaster>>>;

/// 轮询任务的上下文。
struct Poller {
    uuid: String,
    config: ModbusMasterConfig,
    master: SharedMaster,
    hook: Arc<dyn RuleHook>,
    intercache: Arc<InterCache>,
    state: Arc<StateCell>,
    failures: Arc<AtomicU32>,
}

impl Poller {
    async fn run(self, cancel: CancelToken) {
        let mut ticker = tokio::time::interval(Duration::from_millis(self.config.frequency));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if !self.poll_round().await {
                        break;
                    }
                }
            }
        }
    }

    /// 读一轮全部寄存器块；连接不可用时返回 false。
    async fn poll_round(&self) -> bool {
        let mut readings = Vec::with_capacity(self.config.blocks.len());
        {
            let mut guard = self.master.lock().await;
            let Some(master) = guard.as_mut() else {
                return false;
            };
            for block in &self.config.blocks {
                match read_block(master, block).await {
                    Ok(reading) => {
                        self.failures.store(0, Ordering::Release);
                        let cached = CacheValue::new(&block.tag, json!(reading.value))
                            .with_status(ResourceState::Up);
                        let _ = self.intercache.set(&self.uuid, &block.tag, cached);
                        readings.push(reading);
                    }
                    Err(err) => {
                        let failures = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
                        warn!(
                            target: "edge.device",
                            uuid = %self.uuid,
                            tag = %block.tag,
                            failures,
                            error = %err,
                            "modbus_read_failed"
                        );
                        self.intercache.update_status(
                            &self.uuid,
                            &block.tag,
                            ResourceState::Down,
                            &err.to_string(),
                        );
                        let fatal = matches!(&err, DeviceError::Protocol(e) if e.is_fatal());
                        if fatal || failures > MAX_RETRY {
                            guard.take();
                            self.state.transition(ResourceState::Down);
                            return false;
                        }
                    }
                }
            }
        }

        if self.config.batch_request {
            if !readings.is_empty() {
                emit_json(self.hook.as_ref(), &self.uuid, &readings).await;
            }
        } else {
            for reading in &readings {
                emit_json(self.hook.as_ref(), &self.uuid, reading).await;
            }
        }
        true
    }
}

async fn read_block(
    master: &mut ModbusMaster,
    block: &RegisterBlock,
) -> Result<RegisterReading, DeviceError> {
    let registers = master.read_block(block).await?;
    let raw = decode_registers(&registers, block.data_type)?;
    let value = block.weight.map(|w| raw * w).unwrap_or(raw);
    debug!(target: "edge.device", tag = %block.tag, value, "modbus_block_decoded");
    Ok(RegisterReading {
        tag: block.tag.clone(),
        slaver_id: block.slave_id,
        last_fetch_time: now_epoch_ms(),
        value,
    })
}

pub struct ModbusMasterDevice {
    uuid: String,
    config: Option<ModbusMasterConfig>,
    hook: Arc<dyn RuleHook>,
    intercache: Arc<InterCache>,
    master: SharedMaster,
    failures: Arc<AtomicU32>,
    state: Arc<StateCell>,
    tasks: WorkerTasks,
}

impl ModbusMasterDevice {
    pub fn new(hook: Arc<dyn RuleHook>, intercache: Arc<InterCache>) -> Self {
        Self {
            uuid: String::new(),
            config: None,
            hook,
            intercache,
            master: Arc::new(Mutex::new(None)),
            failures: Arc::new(AtomicU32::new(0)),
            state: Arc::new(StateCell::default()),
            tasks: WorkerTasks::new(),
        }
    }

    async fn write_single(&self, args: &[u8]) -> Result<Vec<u8>, DeviceError> {
        let args: WriteSingleArgs = parse_args(args)?;
        let mut guard = self.master.lock().await;
        let master = guard.as_mut().ok_or(DeviceError::NotConnected)?;
        master
            .write_single_register(args.slaver_id, args.address, args.value)
            .await?;
        Ok(Vec::new())
    }

    async fn write_multiple(&self, args: &[u8]) -> Result<Vec<u8>, DeviceError> {
        let args: WriteMultipleArgs = parse_args(args)?;
        if args.values.is_empty() {
            return Err(DeviceError::InvalidArgs("values must not be empty".to_string()));
        }
        let mut guard = self.master.lock().await;
        let master = guard.as_mut().ok_or(DeviceError::NotConnected)?;
        master
            .write_multiple_registers(args.slaver_id, args.address, &args.values)
            .await?;
        Ok(Vec::new())
    }
}

#[async_trait]
impl Worker for ModbusMasterDevice {
    async fn init(&mut self, uuid: &str, config: &ConfigMap) -> Result<(), RuntimeError> {
        self.config = Some(bind_config(config)?);
        self.uuid = uuid.to_string();
        Ok(())
    }

    async fn start(&self, cancel: CancelToken) -> Result<(), RuntimeError> {
        self.state.begin_start();
        let config = self.config.clone().ok_or(DeviceError::NotConnected)?;
        let master = ModbusMaster::connect(&config.tcp())
            .await
            .map_err(DeviceError::from)?;
        *self.master.lock().await = Some(master);
        self.failures.store(0, Ordering::Release);

        self.intercache.register_slot(&self.uuid);
        for block in &config.blocks {
            let loading = CacheValue {
                err_msg: "Loading".to_string(),
                ..CacheValue::new(&block.tag, json!(0))
            };
            let _ = self.intercache.set(&self.uuid, &block.tag, loading);
        }

        if config.auto_request && !config.blocks.is_empty() {
            let poller = Poller {
                uuid: self.uuid.clone(),
                config: config.clone(),
                master: self.master.clone(),
                hook: self.hook.clone(),
                intercache: self.intercache.clone(),
                state: self.state.clone(),
                failures: self.failures.clone(),
            };
            self.tasks.spawn(poller.run(cancel));
        }
        self.state.transition(ResourceState::Up);
        info!(
            target: "edge.device",
            uuid = %self.uuid,
            host = %config.host,
            port = config.port,
            blocks = config.blocks.len(),
            "modbus_master_started"
        );
        Ok(())
    }

    async fn status(&self) -> ResourceState {
        let state = self.state.get();
        if state == ResourceState::Up && self.failures.load(Ordering::Acquire) > MAX_RETRY {
            self.state.transition(ResourceState::Down);
            return ResourceState::Down;
        }
        state
    }

    async fn stop(&self) {
        self.state.transition(ResourceState::Stop);
        self.tasks.join(Duration::from_millis(500)).await;
        self.master.lock().await.take();
        self.intercache.unregister_slot(&self.uuid);
    }

    fn as_controllable(&self) -> Option<&dyn Controllable> {
        Some(self)
    }
}

#[async_trait]
impl Controllable for ModbusMasterDevice {
    async fn on_ctrl(&self, cmd: &str, args: &[u8]) -> Result<Vec<u8>, RuntimeError> {
        let result = match cmd {
            "WriteSingleRegister" => self.write_single(args).await,
            "WriteMultipleRegisters" => self.write_multiple(args).await,
            other => Err(DeviceError::UnsupportedCommand(other.to_string())),
        };
        Ok(result?)
    }
}
