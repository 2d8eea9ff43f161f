//! HTTP 响应辅助函数和 DTO 转换
//!
//! 所有错误返回统一的 ApiResponse 格式，HTTP 状态码与错误码对应。

use api_contract::{AlarmLogDto, ApiResponse, MetricsSnapshotDto, ResourceDto};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use domain::{Resource, ResourceKind};
use edge_runtime::RuntimeError;
use edge_storage::{AlarmLogRecord, StorageError};
use edge_telemetry::MetricsSnapshot;
use serde::Serialize;

pub fn ok<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

/// 错误请求响应
pub fn bad_request_error(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse::<()>::error("INVALID.REQUEST", message.into())),
    )
        .into_response()
}

/// 资源未找到错误响应
pub fn not_found_error(message: impl Into<String>) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::<()>::error("RESOURCE.NOT_FOUND", message.into())),
    )
        .into_response()
}

/// 运行时错误响应
pub fn runtime_error(err: RuntimeError) -> Response {
    match err {
        RuntimeError::NotFound(_) => not_found_error(err.to_string()),
        err => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::<()>::error("RUNTIME.ERROR", err.to_string())),
        )
            .into_response(),
    }
}

/// 存储错误响应
pub fn storage_error(err: StorageError) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::<()>::error("INTERNAL.ERROR", err.to_string())),
    )
        .into_response()
}

pub fn resource_to_dto(kind: ResourceKind, resource: Resource) -> ResourceDto {
    ResourceDto {
        uuid: resource.uuid,
        name: resource.name,
        type_tag: resource.type_tag,
        kind: kind.as_str().to_string(),
        state: resource.state.as_str().to_string(),
        description: resource.description,
        config: resource.config,
    }
}

pub fn metrics_to_dto(snapshot: MetricsSnapshot) -> MetricsSnapshotDto {
    MetricsSnapshotDto {
        frames_emitted: snapshot.frames_emitted,
        frames_dropped: snapshot.frames_dropped,
        checksum_errors: snapshot.checksum_errors,
        worker_starts: snapshot.worker_starts,
        worker_restarts: snapshot.worker_restarts,
        worker_panics: snapshot.worker_panics,
        target_success: snapshot.target_success,
        target_failure: snapshot.target_failure,
        lost_cache_saved: snapshot.lost_cache_saved,
        lost_cache_replayed: snapshot.lost_cache_replayed,
        inbound_events: snapshot.inbound_events,
        downlink_messages: snapshot.downlink_messages,
        alarms_fired: snapshot.alarms_fired,
    }
}

pub fn alarm_log_to_dto(record: AlarmLogRecord) -> AlarmLogDto {
    AlarmLogDto {
        uuid: record.uuid,
        ts: record.ts,
        rule_id: record.rule_id,
        source: record.source,
        event_type: record.event_type,
        summary: record.summary,
        info: record.info,
    }
}
