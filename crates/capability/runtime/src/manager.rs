//! 通用资源管理器与监督循环。
//!
//! - 类型注册：`register_type(tag, factory)`，未知类型 `load` 失败
//! - 资源表：按插入顺序保存，监督器按此顺序巡检
//! - 同一资源的 start / stop 由各自的操作锁串行化，Worker 调用不持有资源表锁
//! - Worker 调用在独立任务中执行，panic 被捕获并视为 DOWN

use crate::cancel::CancelToken;
use crate::error::RuntimeError;
use crate::worker::Worker;
use domain::{
    ConfigMap, OrderedMap, Resource, ResourceKind, ResourceState, ServiceRequest, ServiceResponse,
    ServiceSpec,
};
use edge_telemetry::{record_worker_panic, record_worker_restart, record_worker_start};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

/// Worker 工厂：由配置构造一个未初始化的 Worker。
pub type WorkerFactory =
    Arc<dyn Fn(&ConfigMap) -> Result<Box<dyn Worker>, RuntimeError> + Send + Sync>;

/// 跨类别的 uuid 唯一性登记。
#[derive(Debug, Default)]
pub struct UuidRegistry {
    claims: Mutex<HashMap<String, ResourceKind>>,
}

impl UuidRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&self, uuid: &str, kind: ResourceKind) -> Result<(), RuntimeError> {
        let mut claims = self.claims.lock().unwrap_or_else(|e| e.into_inner());
        if claims.contains_key(uuid) {
            return Err(RuntimeError::AlreadyExists(uuid.to_string()));
        }
        claims.insert(uuid.to_string(), kind);
        Ok(())
    }

    pub fn release(&self, uuid: &str) {
        let mut claims = self.claims.lock().unwrap_or_else(|e| e.into_inner());
        claims.remove(uuid);
    }

    pub fn kind_of(&self, uuid: &str) -> Option<ResourceKind> {
        let claims = self.claims.lock().unwrap_or_else(|e| e.into_inner());
        claims.get(uuid).copied()
    }
}

#[derive(Debug, Default)]
struct Lifecycle {
    started: bool,
    cancel: Option<CancelToken>,
}

struct Entry {
    resource: Resource,
    worker: Arc<dyn Worker>,
    lifecycle: Arc<AsyncMutex<Lifecycle>>,
    faulted: AtomicBool,
    disabled: AtomicBool,
}

impl Entry {
    async fn state(&self) -> ResourceState {
        if self.disabled.load(Ordering::Acquire) {
            return ResourceState::Disable;
        }
        if self.faulted.load(Ordering::Acquire) {
            return ResourceState::Down;
        }
        let worker = self.worker.clone();
        match guarded(&self.resource.uuid, async move { Ok(worker.status().await) }).await {
            Ok(state) => state,
            Err(_) => {
                self.faulted.store(true, Ordering::Release);
                ResourceState::Down
            }
        }
    }
}

/// 在独立任务中执行 Worker 调用，把 panic 转成错误。
async fn guarded<T, F>(uuid: &str, future: F) -> Result<T, RuntimeError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, RuntimeError>> + Send + 'static,
{
    match tokio::spawn(future).await {
        Ok(result) => result,
        Err(err) if err.is_panic() => {
            record_worker_panic();
            warn!(target: "edge.runtime", uuid = %uuid, "worker_panicked");
            Err(RuntimeError::Panicked(uuid.to_string()))
        }
        Err(err) => Err(RuntimeError::worker(err)),
    }
}

struct ManagerInner {
    kind: ResourceKind,
    factories: OrderedMap<String, WorkerFactory>,
    entries: OrderedMap<String, Arc<Entry>>,
    registry: Arc<UuidRegistry>,
}

/// 某一类资源的管理器。克隆共享同一张资源表。
#[derive(Clone)]
pub struct ResourceManager {
    inner: Arc<ManagerInner>,
}

enum Action {
    Start,
    Restart,
    Remove,
}

impl ResourceManager {
    pub fn new(kind: ResourceKind) -> Self {
        Self::with_registry(kind, Arc::new(UuidRegistry::new()))
    }

    pub fn with_registry(kind: ResourceKind, registry: Arc<UuidRegistry>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                kind,
                factories: OrderedMap::new(),
                entries: OrderedMap::new(),
                registry,
            }),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.inner.kind
    }

    pub fn register_type<F>(&self, type_tag: impl Into<String>, factory: F)
    where
        F: Fn(&ConfigMap) -> Result<Box<dyn Worker>, RuntimeError> + Send + Sync + 'static,
    {
        self.inner
            .factories
            .set(type_tag.into(), Arc::new(factory) as WorkerFactory);
    }

    pub fn type_tags(&self) -> Vec<String> {
        self.inner.factories.keys()
    }

    /// 构造并初始化 Worker，资源以 PENDING 入表，由监督器在下一次巡检时启动。
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
        let factory = self
            .inner
            .factories
            .get(&resource.type_tag)
            .ok_or_else(|| RuntimeError::UnsupportedType(resource.type_tag.clone()))?;
        self.inner.registry.claim(&resource.uuid, self.inner.kind)?;

        let worker = match self.build_worker(&factory, &resource).await {
            Ok(worker) => worker,
            Err(err) => {
                self.inner.registry.release(&resource.uuid);
                warn!(
                    target: "edge.runtime",
                    kind = self.inner.kind.as_str(),
                    uuid = %resource.uuid,
                    resource_type = %resource.type_tag,
                    error = %err,
                    "resource_load_failed"
                );
                return Err(err);
            }
        };

        let uuid = resource.uuid.clone();
        info!(
            target: "edge.runtime",
            kind = self.inner.kind.as_str(),
            uuid = %uuid,
            resource_type = %resource.type_tag,
            name = %resource.name,
            "resource_loaded"
        );
        let entry = Arc::new(Entry {
            resource: Resource {
                state: ResourceState::Pending,
                ..resource
            },
            worker,
            lifecycle: Arc::new(AsyncMutex::new(Lifecycle::default())),
            faulted: AtomicBool::new(false),
            disabled: AtomicBool::new(false),
        });
        if !self.inner.entries.insert_if_absent(uuid.clone(), entry) {
            return Err(RuntimeError::AlreadyExists(uuid));
        }
        Ok(())
    }

    async fn build_worker(
        &self,
        factory: &WorkerFactory,
        resource: &Resource,
    ) -> Result<Arc<dyn Worker>, RuntimeError> {
        let mut worker = (**factory)(&resource.config)?;
        worker.init(&resource.uuid, &resource.config).await?;
        Ok(Arc::from(worker))
    }

    /// 停止后用新的取消令牌重新启动；从未启动过的资源只做启动。
    pub async fn restart(&self, uuid: &str) -> Result<(), RuntimeError> {
        let entry = self.entry(uuid)?;
        let mut lifecycle = entry.lifecycle.clone().lock_owned().await;
        if !self.inner.entries.contains(&uuid.to_string()) {
            return Err(RuntimeError::NotFound(uuid.to_string()));
        }
        Self::restart_locked(&entry, &mut lifecycle).await
    }

    async fn restart_locked(entry: &Arc<Entry>, lifecycle: &mut Lifecycle) -> Result<(), RuntimeError> {
        let uuid = entry.resource.uuid.clone();
        if lifecycle.started {
            Self::stop_locked(entry, lifecycle).await;
            record_worker_restart();
        } else {
            record_worker_start();
        }

        let token = CancelToken::new();
        lifecycle.cancel = Some(token.clone());
        lifecycle.started = true;
        entry.faulted.store(false, Ordering::Release);
        entry.disabled.store(false, Ordering::Release);

        let worker = entry.worker.clone();
        let result = guarded(&uuid, async move { worker.start(token).await }).await;
        match &result {
            Ok(()) => {
                info!(target: "edge.runtime", uuid = %uuid, "worker_started");
            }
            Err(err) => {
                entry.faulted.store(true, Ordering::Release);
                warn!(target: "edge.runtime", uuid = %uuid, error = %err, "worker_start_failed");
            }
        }
        result
    }

    async fn stop_locked(entry: &Arc<Entry>, lifecycle: &mut Lifecycle) {
        if let Some(token) = lifecycle.cancel.take() {
            token.cancel();
        }
        if !lifecycle.started {
            return;
        }
        lifecycle.started = false;
        let worker = entry.worker.clone();
        let uuid = entry.resource.uuid.clone();
        let result = guarded(&uuid, async move {
            worker.stop().await;
            Ok(())
        })
        .await;
        if let Err(err) = result {
            warn!(target: "edge.runtime", uuid = %uuid, error = %err, "worker_stop_failed");
        }
    }

    /// 停止 Worker 并标记为 DISABLE，下一次巡检时移除。
    pub async fn disable(&self, uuid: &str) -> Result<(), RuntimeError> {
        let entry = self.entry(uuid)?;
        let mut lifecycle = entry.lifecycle.clone().lock_owned().await;
        if !self.inner.entries.contains(&uuid.to_string()) {
            return Err(RuntimeError::NotFound(uuid.to_string()));
        }
        entry.disabled.store(true, Ordering::Release);
        Self::stop_locked(&entry, &mut lifecycle).await;
        info!(
            target: "edge.runtime",
            kind = self.inner.kind.as_str(),
            uuid = %uuid,
            "resource_disabled"
        );
        Ok(())
    }

    /// 停止并移除资源。
    pub async fn stop(&self, uuid: &str) -> Result<(), RuntimeError> {
        let entry = self.entry(uuid)?;
        let mut lifecycle = entry.lifecycle.clone().lock_owned().await;
        self.remove_locked(&entry, &mut lifecycle).await
    }

    async fn remove_locked(
        &self,
        entry: &Arc<Entry>,
        lifecycle: &mut Lifecycle,
    ) -> Result<(), RuntimeError> {
        let uuid = entry.resource.uuid.clone();
        if self.inner.entries.delete(&uuid).is_none() {
            return Err(RuntimeError::NotFound(uuid));
        }
        Self::stop_locked(entry, lifecycle).await;
        self.inner.registry.release(&uuid);
        info!(
            target: "edge.runtime",
            kind = self.inner.kind.as_str(),
            uuid = %uuid,
            "resource_removed"
        );
        Ok(())
    }

    pub fn has(&self, uuid: &str) -> bool {
        self.inner.entries.contains(&uuid.to_string())
    }

    pub fn len(&self) -> usize {
        self.inner.entries.size()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    pub async fn get_status(&self, uuid: &str) -> Result<ResourceState, RuntimeError> {
        let entry = self.entry(uuid)?;
        Ok(entry.state().await)
    }

    /// 资源详情，`state` 为当前状态。
    pub async fn get_details(&self, uuid: &str) -> Result<Resource, RuntimeError> {
        let entry = self.entry(uuid)?;
        let mut resource = entry.resource.clone();
        resource.state = entry.state().await;
        Ok(resource)
    }

    /// 全部资源，按插入顺序。
    pub async fn get_list(&self) -> Vec<Resource> {
        let mut list = Vec::with_capacity(self.inner.entries.size());
        for entry in self.inner.entries.values() {
            let mut resource = entry.resource.clone();
            resource.state = entry.state().await;
            list.push(resource);
        }
        list
    }

    pub fn get_worker(&self, uuid: &str) -> Result<Arc<dyn Worker>, RuntimeError> {
        Ok(self.entry(uuid)?.worker.clone())
    }

    pub fn services(&self, uuid: &str) -> Result<Vec<ServiceSpec>, RuntimeError> {
        Ok(self.entry(uuid)?.worker.services())
    }

    pub async fn on_service(
        &self,
        uuid: &str,
        request: ServiceRequest,
    ) -> Result<ServiceResponse, RuntimeError> {
        let worker = self.get_worker(uuid)?;
        guarded(uuid, async move { Ok(worker.on_service(request).await) }).await
    }

    /// 一次监督巡检。
    ///
    /// 按插入顺序检查：已禁用的移除，未启动的启动，DOWN 的重启，STOP 的移除。
    /// 正在 start / stop 的资源本轮跳过。启动与重启并发执行，本函数等待全部完成。
    pub async fn supervise_once(&self) {
        let mut pending: JoinSet<()> = JoinSet::new();
        for (uuid, entry) in self.inner.entries.entries() {
            let Ok(mut lifecycle) = entry.lifecycle.clone().try_lock_owned() else {
                debug!(target: "edge.runtime", uuid = %uuid, "supervise_skip_busy");
                continue;
            };
            let action = if entry.disabled.load(Ordering::Acquire) {
                Some(Action::Remove)
            } else if !lifecycle.started {
                Some(Action::Start)
            } else {
                match entry.state().await {
                    ResourceState::Down => Some(Action::Restart),
                    ResourceState::Stop | ResourceState::Disable => Some(Action::Remove),
                    ResourceState::Up | ResourceState::Pending | ResourceState::Pause => None,
                }
            };
            match action {
                Some(Action::Start) | Some(Action::Restart) => {
                    pending.spawn(Self::supervised_restart(entry, lifecycle));
                }
                Some(Action::Remove) => {
                    if let Err(err) = self.remove_locked(&entry, &mut lifecycle).await {
                        debug!(target: "edge.runtime", uuid = %uuid, error = %err, "supervise_remove_skip");
                    }
                }
                None => {}
            }
        }
        while let Some(joined) = pending.join_next().await {
            if let Err(err) = joined {
                warn!(target: "edge.runtime", error = %err, "supervise_task_failed");
            }
        }
    }

    async fn supervised_restart(entry: Arc<Entry>, mut lifecycle: OwnedMutexGuard<Lifecycle>) {
        if let Err(err) = Self::restart_locked(&entry, &mut lifecycle).await {
            debug!(
                target: "edge.runtime",
                uuid = %entry.resource.uuid,
                error = %err,
                "supervise_restart_failed"
            );
        }
    }

    /// 启动监督循环，首次巡检立即执行。
    pub fn start_monitoring(&self, period: Duration) -> JoinHandle<()> {
        let manager = self.clone();
        let period = period.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                manager.supervise_once().await;
            }
        })
    }

    fn entry(&self, uuid: &str) -> Result<Arc<Entry>, RuntimeError> {
        self.inner
            .entries
            .get(&uuid.to_string())
            .ok_or_else(|| RuntimeError::NotFound(uuid.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_rejects_duplicate_claims() {
        let registry = UuidRegistry::new();
        registry.claim("u1", ResourceKind::Source).unwrap();
        assert_eq!(
            registry.claim("u1", ResourceKind::Target),
            Err(RuntimeError::AlreadyExists("u1".to_string()))
        );
        assert_eq!(registry.kind_of("u1"), Some(ResourceKind::Source));
        registry.release("u1");
        registry.claim("u1", ResourceKind::Target).unwrap();
    }
}
