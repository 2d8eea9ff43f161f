//! 内部 KV。
//!
//! - GET /api/v1/kv
//! - GET /api/v1/kv/{key}
//! - PUT /api/v1/kv/{key}（body 为字符串值）
//! - DELETE /api/v1/kv/{key}

use axum::{
    extract::{Path, State},
    response::Response,
};
use serde_json::json;

use crate::AppState;
use crate::utils::response::{bad_request_error, not_found_error, ok, storage_error};

pub async fn list_kv_keys(State(state): State<AppState>) -> Response {
    match state.internal.keys().await {
        Ok(keys) => ok(keys),
        Err(err) => storage_error(err),
    }
}

pub async fn get_kv(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    match state.internal.get(&key).await {
        Ok(Some(value)) => ok(json!({ "key": key, "value": value })),
        Ok(None) => not_found_error(format!("key not found: {}", key)),
        Err(err) => storage_error(err),
    }
}

pub async fn put_kv(
    State(state): State<AppState>,
    Path(key): Path<String>,
    value: String,
) -> Response {
    if key.trim().is_empty() {
        return bad_request_error("key is required");
    }
    match state.internal.set(&key, &value).await {
        Ok(()) => ok(json!({ "key": key, "value": value })),
        Err(err) => storage_error(err),
    }
}

pub async fn delete_kv(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    match state.internal.delete(&key).await {
        Ok(true) => ok(json!({ "key": key })),
        Ok(false) => not_found_error(format!("key not found: {}", key)),
        Err(err) => storage_error(err),
    }
}
