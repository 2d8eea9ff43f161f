//! 资源状态与运维操作。
//!
//! `{kind}` 接受 `sources` / `devices` / `targets` / `cecollas`（单数亦可）。

use axum::{
    extract::{Path, State},
    response::Response,
};
use domain::ResourceKind;
use edge_runtime::ResourceRuntime;
use serde_json::json;
use tracing::info;

use crate::AppState;
use crate::utils::response::{bad_request_error, ok, resource_to_dto, runtime_error};

fn runtime_for<'a>(
    state: &'a AppState,
    kind: &str,
) -> Result<(ResourceKind, &'a ResourceRuntime), Response> {
    let kind = ResourceKind::parse(kind)
        .ok_or_else(|| bad_request_error(format!("unknown resource kind: {}", kind)))?;
    Ok((kind, state.runtimes.by_kind(kind)))
}

pub async fn list_resources(State(state): State<AppState>, Path(kind): Path<String>) -> Response {
    let (kind, runtime) = match runtime_for(&state, &kind) {
        Ok(found) => found,
        Err(response) => return response,
    };
    let list = runtime
        .get_list()
        .await
        .into_iter()
        .map(|resource| resource_to_dto(kind, resource))
        .collect::<Vec<_>>();
    ok(list)
}

pub async fn get_resource(
    State(state): State<AppState>,
    Path((kind, uuid)): Path<(String, String)>,
) -> Response {
    let (kind, runtime) = match runtime_for(&state, &kind) {
        Ok(found) => found,
        Err(response) => return response,
    };
    match runtime.get_details(&uuid).await {
        Ok(resource) => ok(resource_to_dto(kind, resource)),
        Err(err) => runtime_error(err),
    }
}

pub async fn restart_resource(
    State(state): State<AppState>,
    Path((kind, uuid)): Path<(String, String)>,
) -> Response {
    let (kind, runtime) = match runtime_for(&state, &kind) {
        Ok(found) => found,
        Err(response) => return response,
    };
    info!(uuid = %uuid, kind = kind.as_str(), "resource_restart_requested");
    if let Err(err) = runtime.restart(&uuid).await {
        return runtime_error(err);
    }
    match runtime.get_details(&uuid).await {
        Ok(resource) => ok(resource_to_dto(kind, resource)),
        Err(err) => runtime_error(err),
    }
}

/// 禁用资源，监督器下一次巡检时移除。
pub async fn disable_resource(
    State(state): State<AppState>,
    Path((kind, uuid)): Path<(String, String)>,
) -> Response {
    let (kind, runtime) = match runtime_for(&state, &kind) {
        Ok(found) => found,
        Err(response) => return response,
    };
    info!(uuid = %uuid, kind = kind.as_str(), "resource_disable_requested");
    if let Err(err) = runtime.disable(&uuid).await {
        return runtime_error(err);
    }
    match runtime.get_details(&uuid).await {
        Ok(resource) => ok(resource_to_dto(kind, resource)),
        Err(err) => runtime_error(err),
    }
}

pub async fn delete_resource(
    State(state): State<AppState>,
    Path((kind, uuid)): Path<(String, String)>,
) -> Response {
    let (kind, runtime) = match runtime_for(&state, &kind) {
        Ok(found) => found,
        Err(response) => return response,
    };
    info!(uuid = %uuid, kind = kind.as_str(), "resource_delete_requested");
    match runtime.stop(&uuid).await {
        Ok(()) => ok(json!({ "uuid": uuid })),
        Err(err) => runtime_error(err),
    }
}
