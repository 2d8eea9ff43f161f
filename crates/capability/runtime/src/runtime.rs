//! 输入源 / 设备 / 输出目标 / 云边协同四类运行时门面。
//!
//! 四者都是 `ResourceManager` 的薄封装；源、设备与云边协同在加载时把绑定信息写入
//! inter-cache 槽，移除时删除。

use crate::error::RuntimeError;
use crate::intercache::{CECOLLA_SLOT, CacheValue, DEVICE_SLOT, InterCache, SOURCE_SLOT};
use crate::manager::{ResourceManager, UuidRegistry};
use crate::ports::PortRegistry;
use domain::{ConfigMap, Resource, ResourceKind, ResourceState};
use edge_telemetry::{record_target_failure, record_target_success};
use serde_json::json;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::warn;

/// 单类资源运行时：管理器加可选的 inter-cache 绑定槽。
#[derive(Clone)]
pub struct ResourceRuntime {
    manager: ResourceManager,
    intercache: Arc<InterCache>,
    ports: Arc<PortRegistry>,
    slot: Option<&'static str>,
}

impl ResourceRuntime {
    pub fn new(
        kind: ResourceKind,
        registry: Arc<UuidRegistry>,
        intercache: Arc<InterCache>,
        ports: Arc<PortRegistry>,
        slot: Option<&'static str>,
    ) -> Self {
        if let Some(slot) = slot {
            intercache.register_slot(slot);
        }
        Self {
            manager: ResourceManager::with_registry(kind, registry),
            intercache,
            ports,
            slot,
        }
    }

    pub fn manager(&self) -> &ResourceManager {
        &self.manager
    }

    pub fn intercache(&self) -> &Arc<InterCache> {
        &self.intercache
    }

    pub fn ports(&self) -> &Arc<PortRegistry> {
        &self.ports
    }

    pub async fn load(
        &self,
        uuid: &str,
        name: &str,
        type_tag: &str,
        config: ConfigMap,
        description: &str,
    ) -> Result<(), RuntimeError> {
        self.load_resource(Resource::new(uuid, name, type_tag, config, description))
            .await
    }

    pub async fn load_resource(&self, resource: Resource) -> Result<(), RuntimeError> {
        let binding = json!({
            "uuid": resource.uuid,
            "name": resource.name,
            "type": resource.type_tag,
        });
        let uuid = resource.uuid.clone();
        self.manager.load_resource(resource).await?;
        if let Some(slot) = self.slot {
            self.intercache
                .set(slot, &uuid, CacheValue::new(uuid.clone(), binding))?;
        }
        Ok(())
    }

    pub async fn restart(&self, uuid: &str) -> Result<(), RuntimeError> {
        let result = self.manager.restart(uuid).await;
        self.sync_binding(uuid, &result).await;
        result
    }

    /// 禁用资源；绑定保留到监督器移除资源后清理。
    pub async fn disable(&self, uuid: &str) -> Result<(), RuntimeError> {
        self.manager.disable(uuid).await
    }

    pub async fn stop(&self, uuid: &str) -> Result<(), RuntimeError> {
        self.manager.stop(uuid).await?;
        if let Some(slot) = self.slot {
            self.intercache.delete(slot, uuid);
        }
        Ok(())
    }

    pub async fn get_list(&self) -> Vec<Resource> {
        self.manager.get_list().await
    }

    pub async fn get_details(&self, uuid: &str) -> Result<Resource, RuntimeError> {
        self.manager.get_details(uuid).await
    }

    pub async fn get_status(&self, uuid: &str) -> Result<ResourceState, RuntimeError> {
        self.manager.get_status(uuid).await
    }

    /// 启动监督循环；每轮巡检后清理已被移除资源的绑定。
    pub fn start_monitoring(&self, period: Duration) -> JoinHandle<()> {
        let runtime = self.clone();
        let period = period.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                runtime.manager.supervise_once().await;
                runtime.prune_bindings();
            }
        })
    }

    /// 逆序停止全部资源。
    pub async fn stop_all(&self) {
        let mut uuids: Vec<String> = self
            .manager
            .get_list()
            .await
            .into_iter()
            .map(|r| r.uuid)
            .collect();
        uuids.reverse();
        for uuid in uuids {
            if let Err(err) = self.stop(&uuid).await {
                warn!(target: "edge.runtime", uuid = %uuid, error = %err, "resource_stop_failed");
            }
        }
    }

    fn prune_bindings(&self) {
        let Some(slot) = self.slot else {
            return;
        };
        let Some(bindings) = self.intercache.get_slot(slot) else {
            return;
        };
        for uuid in bindings.keys() {
            if !self.manager.has(uuid) {
                self.intercache.delete(slot, uuid);
            }
        }
    }

    async fn sync_binding(&self, uuid: &str, result: &Result<(), RuntimeError>) {
        let Some(slot) = self.slot else {
            return;
        };
        let (state, err_msg) = match result {
            Ok(()) => (
                self.manager
                    .get_status(uuid)
                    .await
                    .unwrap_or(ResourceState::Down),
                String::new(),
            ),
            Err(err) => (ResourceState::Down, err.to_string()),
        };
        self.intercache.update_status(slot, uuid, state, &err_msg);
    }
}

/// 输入源运行时。
#[derive(Clone)]
pub struct SourceRuntime(ResourceRuntime);

impl SourceRuntime {
    pub fn new(
        registry: Arc<UuidRegistry>,
        intercache: Arc<InterCache>,
        ports: Arc<PortRegistry>,
    ) -> Self {
        Self(ResourceRuntime::new(
            ResourceKind::Source,
            registry,
            intercache,
            ports,
            Some(SOURCE_SLOT),
        ))
    }
}

impl Deref for SourceRuntime {
    type Target = ResourceRuntime;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// 设备运行时。
#[derive(Clone)]
pub struct DeviceRuntime(ResourceRuntime);

impl DeviceRuntime {
    pub fn new(
        registry: Arc<UuidRegistry>,
        intercache: Arc<InterCache>,
        ports: Arc<PortRegistry>,
    ) -> Self {
        Self(ResourceRuntime::new(
            ResourceKind::Device,
            registry,
            intercache,
            ports,
            Some(DEVICE_SLOT),
        ))
    }

    pub async fn on_ctrl(&self, uuid: &str, cmd: &str, args: &[u8]) -> Result<Vec<u8>, RuntimeError> {
        on_ctrl(&self.0, uuid, cmd, args).await
    }
}

impl Deref for DeviceRuntime {
    type Target = ResourceRuntime;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// 云边协同运行时。
#[derive(Clone)]
pub struct CecollaRuntime(ResourceRuntime);

impl CecollaRuntime {
    pub fn new(
        registry: Arc<UuidRegistry>,
        intercache: Arc<InterCache>,
        ports: Arc<PortRegistry>,
    ) -> Self {
        Self(ResourceRuntime::new(
            ResourceKind::Cecolla,
            registry,
            intercache,
            ports,
            Some(CECOLLA_SLOT),
        ))
    }

    pub async fn on_ctrl(&self, uuid: &str, cmd: &str, args: &[u8]) -> Result<Vec<u8>, RuntimeError> {
        on_ctrl(&self.0, uuid, cmd, args).await
    }
}

impl Deref for CecollaRuntime {
    type Target = ResourceRuntime;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// 输出目标运行时。
#[derive(Clone)]
pub struct TargetRuntime(ResourceRuntime);

impl TargetRuntime {
    pub fn new(
        registry: Arc<UuidRegistry>,
        intercache: Arc<InterCache>,
        ports: Arc<PortRegistry>,
    ) -> Self {
        Self(ResourceRuntime::new(
            ResourceKind::Target,
            registry,
            intercache,
            ports,
            None,
        ))
    }

    /// 把一条数据写给指定目标。
    pub async fn to(&self, uuid: &str, data: &str) -> Result<(), RuntimeError> {
        let worker = self.0.manager.get_worker(uuid)?;
        let owned = data.to_string();
        let task_uuid = uuid.to_string();
        let joined = tokio::spawn(async move {
            match worker.as_target() {
                Some(target) => target.to(&owned).await,
                None => Err(RuntimeError::Unsupported(format!("{} is not a target", task_uuid))),
            }
        })
        .await;
        let result = match joined {
            Ok(result) => result,
            Err(err) if err.is_panic() => Err(RuntimeError::Panicked(uuid.to_string())),
            Err(err) => Err(RuntimeError::worker(err)),
        };
        match &result {
            Ok(()) => record_target_success(),
            Err(err) => {
                record_target_failure();
                warn!(target: "edge.target", uuid = %uuid, error = %err, "target_write_failed");
            }
        }
        result
    }
}

impl Deref for TargetRuntime {
    type Target = ResourceRuntime;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

async fn on_ctrl(
    runtime: &ResourceRuntime,
    uuid: &str,
    cmd: &str,
    args: &[u8],
) -> Result<Vec<u8>, RuntimeError> {
    let worker = runtime.manager.get_worker(uuid)?;
    let cmd_owned = cmd.to_string();
    let args_owned = args.to_vec();
    let joined = tokio::spawn(async move {
        match worker.as_controllable() {
            Some(ctrl) => ctrl.on_ctrl(&cmd_owned, &args_owned).await,
            None => Err(RuntimeError::Unsupported("on_ctrl".to_string())),
        }
    })
    .await;
    match joined {
        Ok(result) => result,
        Err(err) if err.is_panic() => Err(RuntimeError::Panicked(uuid.to_string())),
        Err(err) => Err(RuntimeError::worker(err)),
    }
}

/// 四类运行时的集合，共享 uuid 登记、inter-cache 与端口登记表。
#[derive(Clone)]
pub struct Runtimes {
    pub sources: SourceRuntime,
    pub devices: DeviceRuntime,
    pub targets: TargetRuntime,
    pub cecollas: CecollaRuntime,
}

impl Runtimes {
    pub fn new(intercache: Arc<InterCache>) -> Self {
        let registry = Arc::new(UuidRegistry::new());
        let ports = Arc::new(PortRegistry::new());
        Self {
            sources: SourceRuntime::new(registry.clone(), intercache.clone(), ports.clone()),
            devices: DeviceRuntime::new(registry.clone(), intercache.clone(), ports.clone()),
            targets: TargetRuntime::new(registry.clone(), intercache.clone(), ports.clone()),
            cecollas: CecollaRuntime::new(registry, intercache, ports),
        }
    }

    pub fn by_kind(&self, kind: ResourceKind) -> &ResourceRuntime {
        match kind {
            ResourceKind::Source => &self.sources.0,
            ResourceKind::Device => &self.devices.0,
            ResourceKind::Target => &self.targets.0,
            ResourceKind::Cecolla => &self.cecollas.0,
        }
    }

    /// 先停输入侧，最后停目标。
    pub async fn shutdown(&self) {
        self.sources.stop_all().await;
        self.devices.stop_all().await;
        self.cecollas.stop_all().await;
        self.targets.stop_all().await;
    }
}
