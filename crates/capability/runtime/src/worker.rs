use crate::cancel::CancelToken;
use crate::error::RuntimeError;
use async_trait::async_trait;
use domain::{ConfigMap, ResourceState, ServiceRequest, ServiceResponse, ServiceSpec};
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

/// 受监督资源的运行时实现。
///
/// `init` 在装入 `Arc` 之前调用，只绑定配置，不做 I/O；
/// `start` 建立连接并拉起后台任务，所有任务都要监听传入的取消令牌；
/// `stop` 关闭连接并等待后台任务退出。
#[async_trait]
pub trait Worker: Send + Sync {
    async fn init(&mut self, uuid: &str, config: &ConfigMap) -> Result<(), RuntimeError>;

    async fn start(&self, cancel: CancelToken) -> Result<(), RuntimeError>;

    async fn status(&self) -> ResourceState;

    async fn stop(&self);

    fn services(&self) -> Vec<ServiceSpec> {
        Vec::new()
    }

    async fn on_service(&self, request: ServiceRequest) -> ServiceResponse {
        ServiceResponse::failed(format!("service not supported: {}", request.name))
    }

    /// 输出目标能力。
    fn as_target(&self) -> Option<&dyn Target> {
        None
    }

    /// 控制指令能力（设备、云边协同）。
    fn as_controllable(&self) -> Option<&dyn Controllable> {
        None
    }
}

/// 输出目标：接收规则引擎写出的值。
#[async_trait]
pub trait Target: Send + Sync {
    async fn to(&self, data: &str) -> Result<(), RuntimeError>;
}

/// 同步控制 RPC。
#[async_trait]
pub trait Controllable: Send + Sync {
    async fn on_ctrl(&self, cmd: &str, args: &[u8]) -> Result<Vec<u8>, RuntimeError>;
}

/// Worker 内部状态，非法迁移被忽略。
#[derive(Debug)]
pub struct StateCell {
    value: AtomicU8,
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new(ResourceState::Pending)
    }
}

impl StateCell {
    pub fn new(state: ResourceState) -> Self {
        Self {
            value: AtomicU8::new(state.as_u8()),
        }
    }

    pub fn get(&self) -> ResourceState {
        ResourceState::from_u8(self.value.load(Ordering::Acquire)).unwrap_or(ResourceState::Down)
    }

    /// 按状态机迁移，返回是否生效。
    pub fn transition(&self, next: ResourceState) -> bool {
        let mut current = self.value.load(Ordering::Acquire);
        loop {
            let from = ResourceState::from_u8(current).unwrap_or(ResourceState::Down);
            if !from.can_transition_to(next) {
                return false;
            }
            match self.value.compare_exchange(
                current,
                next.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// 新一轮启动：先回到 PENDING。
    pub fn begin_start(&self) {
        self.value
            .store(ResourceState::Pending.as_u8(), Ordering::Release);
    }
}

/// Worker 持有的后台任务组。
#[derive(Debug, Default)]
pub struct WorkerTasks {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    pub fn len(&self) -> usize {
        let handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        handles.iter().filter(|h| !h.is_finished()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 等待所有任务退出，超过宽限期的任务被 abort。
    pub async fn join(&self, grace: Duration) {
        let handles: Vec<JoinHandle<()>> = {
            let mut guard = self.handles.lock().unwrap_or_else(|e| e.into_inner());
            guard.drain(..).collect()
        };
        for mut handle in handles {
            if tokio::time::timeout(grace, &mut handle).await.is_err() {
                handle.abort();
            }
        }
    }
}
