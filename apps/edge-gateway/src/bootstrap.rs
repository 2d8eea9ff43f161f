//! 网关装配：存储、四类运行时、告警中心与后台任务。

use crate::AppState;
use domain::{ConfigMap, Resource, ResourceKind};
use edge_alarm::{AlarmCenter, AlarmError, AlarmRuleConfig};
use edge_config::{AppConfig, ConfigError, StorageBackend};
use edge_runtime::{ChannelRuleHook, InterCache, RuleHook, RuntimeError, Runtimes};
use edge_storage::{
    AlarmLogStore, InMemoryAlarmLogStore, InMemoryInternalStore, InMemoryLostCacheStore,
    InternalStore, LostCacheStore, PgAlarmLogStore, PgLostCacheStore, RedisInternalStore,
    RedisLostCacheStore, StorageError, connect_pool, ensure_schema,
};
use edge_target::TargetDeps;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 规则事件队列容量。
const RULE_EVENT_CAPACITY: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Alarm(#[from] AlarmError),
    #[error("invalid resources file {path}: {reason}")]
    ResourcesFile { path: String, reason: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// 资源文件中的一条资源。
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    pub uuid: String,
    pub name: String,
    #[serde(rename = "type")]
    pub type_tag: String,
    pub kind: ResourceKind,
    #[serde(default)]
    pub config: ConfigMap,
    #[serde(default)]
    pub description: String,
}

/// 资源文件中的一条告警规则。
#[derive(Debug, Clone, Deserialize)]
pub struct AlarmRuleSpec {
    pub uuid: String,
    #[serde(flatten)]
    pub rule: AlarmRuleConfig,
}

/// 启动时加载的资源文件：资源数组，或 `{"resources":[...],"alarmRules":[...]}`。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceFile {
    #[serde(default)]
    pub resources: Vec<ResourceSpec>,
    #[serde(default)]
    pub alarm_rules: Vec<AlarmRuleSpec>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ResourceFileRepr {
    List(Vec<ResourceSpec>),
    Full(ResourceFile),
}

impl ResourceFile {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        Ok(match serde_json::from_str(text)? {
            ResourceFileRepr::List(resources) => ResourceFile {
                resources,
                alarm_rules: Vec::new(),
            },
            ResourceFileRepr::Full(file) => file,
        })
    }

    pub async fn read(path: &Path) -> Result<Self, GatewayError> {
        let text = tokio::fs::read_to_string(path).await?;
        Self::parse(&text).map_err(|err| GatewayError::ResourcesFile {
            path: path.display().to_string(),
            reason: err.to_string(),
        })
    }
}

/// 持久化依赖。
#[derive(Clone)]
pub struct Stores {
    pub lost_cache: Arc<dyn LostCacheStore>,
    pub alarm_logs: Arc<dyn AlarmLogStore>,
    pub internal: Arc<dyn InternalStore>,
}

impl Stores {
    pub fn in_memory(config: &AppConfig) -> Self {
        Self {
            lost_cache: Arc::new(InMemoryLostCacheStore::new(config.max_lost_cache_size)),
            alarm_logs: Arc::new(InMemoryAlarmLogStore::new(config.alarm_log_max_rows)),
            internal: Arc::new(InMemoryInternalStore::new()),
        }
    }

    /// 按 `EDGE_STORAGE_BACKEND` 建立存储。Redis 后端不保存告警日志，Postgres 后端不保存内部 KV。
    pub async fn connect(config: &AppConfig) -> Result<Self, GatewayError> {
        let mut stores = Self::in_memory(config);
        match config.storage_backend {
            StorageBackend::Memory => {}
            StorageBackend::Redis => {
                let url = config
                    .redis_url
                    .as_deref()
                    .ok_or_else(|| ConfigError::Missing("EDGE_REDIS_URL".to_string()))?;
                stores.lost_cache = Arc::new(RedisLostCacheStore::connect(
                    url,
                    config.max_lost_cache_size,
                )?);
                stores.internal = Arc::new(RedisInternalStore::connect(url)?);
            }
            StorageBackend::Postgres => {
                let url = config
                    .database_url
                    .as_deref()
                    .ok_or_else(|| ConfigError::Missing("EDGE_DATABASE_URL".to_string()))?;
                let pool = connect_pool(url).await?;
                ensure_schema(&pool).await?;
                stores.lost_cache = Arc::new(PgLostCacheStore::new(
                    pool.clone(),
                    config.max_lost_cache_size,
                ));
                stores.alarm_logs = Arc::new(PgAlarmLogStore::new(pool, config.alarm_log_max_rows));
            }
        }
        info!(backend = ?config.storage_backend, "stores_ready");
        Ok(stores)
    }
}

/// 运行中的网关。
pub struct Gateway {
    pub config: AppConfig,
    pub runtimes: Runtimes,
    pub alarm: Arc<AlarmCenter>,
    pub stores: Stores,
    tasks: Vec<JoinHandle<()>>,
}

impl Gateway {
    /// 注册全部资源类型并启动告警中心，需在 tokio 运行时内调用。
    pub fn build(config: AppConfig, stores: Stores) -> Self {
        let runtimes = Runtimes::new(Arc::new(InterCache::new()));
        let (hook, mut events) = ChannelRuleHook::new(RULE_EVENT_CAPACITY);
        let hook: Arc<dyn RuleHook> = Arc::new(hook);

        edge_ingest::register_types(&runtimes.sources, hook.clone());
        edge_device::register_types(&runtimes.devices, hook.clone());
        edge_cecolla::register_types(&runtimes.cecollas, hook);
        edge_target::register_types(
            &runtimes.targets,
            TargetDeps::new(stores.lost_cache.clone()),
        );

        let alarm = AlarmCenter::spawn(stores.alarm_logs.clone(), runtimes.targets.clone());

        // 规则脚本不在网关核心内执行，事件只记录
        let drain = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                debug!(kind = ?event.kind, uuid = %event.uuid, bytes = event.data.len(), "rule_event");
            }
        });

        Self {
            config,
            runtimes,
            alarm,
            stores,
            tasks: vec![drain],
        }
    }

    /// 加载资源与告警规则；单条失败只记日志，返回成功加载的资源数。
    pub async fn load(&self, file: &ResourceFile) -> usize {
        let mut loaded = 0;
        for spec in &file.resources {
            let resource = Resource::new(
                spec.uuid.clone(),
                spec.name.clone(),
                spec.type_tag.clone(),
                spec.config.clone(),
                spec.description.clone(),
            );
            match self.runtimes.by_kind(spec.kind).load_resource(resource).await {
                Ok(()) => loaded += 1,
                Err(err) => {
                    warn!(uuid = %spec.uuid, kind = spec.kind.as_str(), error = %err, "resource_load_failed")
                }
            }
        }
        for spec in &file.alarm_rules {
            if let Err(err) = self.alarm.load_rule(&spec.uuid, &spec.rule) {
                warn!(rule_id = %spec.uuid, error = %err, "alarm_rule_load_failed");
            }
        }
        info!(
            resources = loaded,
            alarm_rules = self.alarm.rule_ids().len(),
            "resources_loaded"
        );
        loaded
    }

    /// 启动四类监督循环与 inter-cache 过期清理。
    pub fn start_background(&mut self) {
        let period = Duration::from_secs(self.config.supervisor_interval_seconds);
        self.tasks.push(self.runtimes.sources.start_monitoring(period));
        self.tasks.push(self.runtimes.devices.start_monitoring(period));
        self.tasks.push(self.runtimes.cecollas.start_monitoring(period));
        self.tasks.push(self.runtimes.targets.start_monitoring(period));

        let intercache = self.runtimes.sources.intercache().clone();
        let sweep = Duration::from_secs(self.config.intercache_sweep_seconds);
        self.tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let removed = intercache.sweep_expired();
                if removed > 0 {
                    debug!(removed, "intercache_swept");
                }
            }
        }));
    }

    pub fn state(&self) -> AppState {
        AppState {
            runtimes: self.runtimes.clone(),
            alarm_logs: self.stores.alarm_logs.clone(),
            internal: self.stores.internal.clone(),
        }
    }

    /// 停止后台任务、全部资源与告警中心。
    pub async fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        self.runtimes.shutdown().await;
        self.alarm.shutdown().await;
        info!("gateway_stopped");
    }
}

/// `run` 子命令：装配网关、加载资源并提供状态 API，收到 Ctrl-C 后退出。
pub async fn run(config: AppConfig) -> Result<(), GatewayError> {
    if let Some(arch) = &config.arch_support {
        info!(arch = %arch, "arch_support");
    }
    let stores = Stores::connect(&config).await?;
    let mut gateway = Gateway::build(config.clone(), stores);
    if let Some(path) = &config.resources_file {
        let file = ResourceFile::read(path).await?;
        gateway.load(&file).await;
    }
    gateway.start_background();

    let app = crate::build_app(gateway.state());
    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!(addr = %config.http_addr, "status_api_listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    gateway.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_file_accepts_plain_list() {
        let file = ResourceFile::parse(
            r#"[{"uuid":"u1","name":"in","type":"HTTP","kind":"source","config":{"port":8800}}]"#,
        )
        .unwrap();
        assert_eq!(file.resources.len(), 1);
        assert_eq!(file.resources[0].kind, ResourceKind::Source);
        assert_eq!(file.resources[0].config["port"], 8800);
        assert!(file.alarm_rules.is_empty());
    }

    #[test]
    fn test_resource_file_with_alarm_rules() {
        let file = ResourceFile::parse(
            r#"{
                "resources": [{"uuid":"t1","name":"out","type":"UDP_TARGET","kind":"target"}],
                "alarmRules": [{"uuid":"r1","threshold":2,"interval":10,"handleId":"t1",
                                "exprDefines":[{"expr":"temp > 1","eventType":"HOT"}]}]
            }"#,
        )
        .unwrap();
        assert_eq!(file.resources[0].kind, ResourceKind::Target);
        assert_eq!(file.alarm_rules[0].uuid, "r1");
        assert_eq!(file.alarm_rules[0].rule.threshold, 2);
        assert_eq!(file.alarm_rules[0].rule.handle_id, "t1");
    }

    #[test]
    fn test_resource_file_rejects_unknown_kind() {
        assert!(
            ResourceFile::parse(r#"[{"uuid":"u1","name":"x","type":"HTTP","kind":"plugin"}]"#)
                .is_err()
        );
    }
}
