//! 边缘网关共享领域模型。
//!
//! - `ResourceState`：六状态生命周期及合法迁移
//! - `Resource` / `ResourceKind`：受监督的资源单元
//! - `ServiceRequest` / `ServiceResponse`：对 Worker 的同步 RPC
//! - `OrderedMap`：保持插入顺序的并发 Map，所有注册表与资源表都基于它

pub mod ordered_map;
pub mod resource;
pub mod service;
pub mod state;

pub use ordered_map::OrderedMap;
pub use resource::{ConfigMap, Resource, ResourceKind};
pub use service::{ServiceArg, ServiceRequest, ServiceResponse, ServiceSpec};
pub use state::ResourceState;

/// 当前 Unix 毫秒时间戳。
pub fn now_epoch_ms() -> i64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_millis() as i64
}

/// 当前 Unix 秒时间戳。
pub fn now_epoch_secs() -> i64 {
    now_epoch_ms() / 1000
}
