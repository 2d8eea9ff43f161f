//! 路由定义

use super::AppState;
use super::handlers::*;
use axum::{
    Router,
    routing::{get, post},
};

/// 创建状态 API 路由。
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/metrics", get(get_metrics))
        .route("/api/v1/ports", get(list_ports))
        .route("/api/v1/alarm/logs", get(list_alarm_logs))
        .route("/api/v1/kv", get(list_kv_keys))
        .route(
            "/api/v1/kv/:key",
            get(get_kv).put(put_kv).delete(delete_kv),
        )
        .route("/api/v1/:kind", get(list_resources))
        .route(
            "/api/v1/:kind/:uuid",
            get(get_resource).delete(delete_resource),
        )
        .route("/api/v1/:kind/:uuid/restart", post(restart_resource))
        .route("/api/v1/:kind/:uuid/disable", post(disable_resource))
}
