//! 告警日志查询。
//!
//! - GET /api/v1/alarm/logs?limit=

use axum::{
    extract::{Query, State},
    response::Response,
};
use serde::Deserialize;

use crate::AppState;
use crate::utils::response::{alarm_log_to_dto, ok, storage_error};

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct AlarmLogQuery {
    pub limit: Option<usize>,
}

pub async fn list_alarm_logs(
    State(state): State<AppState>,
    Query(query): Query<AlarmLogQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    match state.alarm_logs.list_recent(limit).await {
        Ok(records) => ok(records.into_iter().map(alarm_log_to_dto).collect::<Vec<_>>()),
        Err(err) => storage_error(err),
    }
}
