//! # edge-gateway
//!
//! 网关主程序：命令行入口、运行时装配与只读为主的状态 API。
//!
//! | 路径 | 说明 |
//! |------|------|
//! | `GET /health` | 健康检查 |
//! | `GET /api/v1/metrics` | 网关计数器 |
//! | `GET /api/v1/{kind}` | 资源列表（`sources`/`devices`/`targets`/`cecollas`） |
//! | `GET /api/v1/{kind}/{uuid}` | 资源详情与状态 |
//! | `POST /api/v1/{kind}/{uuid}/restart` | 重启资源 |
//! | `POST /api/v1/{kind}/{uuid}/disable` | 禁用资源，下一次巡检时移除 |
//! | `DELETE /api/v1/{kind}/{uuid}` | 停止并移除资源 |
//! | `GET /api/v1/ports` | 硬件端口占用 |
//! | `GET /api/v1/alarm/logs` | 最近告警日志 |
//! | `GET/PUT/DELETE /api/v1/kv/{key}` | 内部 KV |

pub mod bootstrap;
pub mod cli;
mod handlers;
pub mod lock;
mod middleware;
pub mod routes;
mod utils;

pub use bootstrap::{Gateway, GatewayError, ResourceFile, ResourceSpec, Stores, run};

use axum::Router;
use edge_runtime::Runtimes;
use edge_storage::{AlarmLogStore, InternalStore};
use std::sync::Arc;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub runtimes: Runtimes,
    pub alarm_logs: Arc<dyn AlarmLogStore>,
    pub internal: Arc<dyn InternalStore>,
}

/// 组装状态 API：路由 + 请求 ID + 访问日志。
pub fn build_app(state: AppState) -> Router {
    routes::create_api_router()
        .with_state(state)
        .layer(axum::middleware::from_fn(middleware::request_context))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(middleware::MakeGatewayRequestId))
}
