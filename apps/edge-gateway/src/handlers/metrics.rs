//! 网关计数器快照。
//!
//! - GET /api/v1/metrics

use axum::response::Response;
use edge_telemetry::metrics;

use crate::utils::response::{metrics_to_dto, ok};

pub async fn get_metrics() -> Response {
    ok(metrics_to_dto(metrics().snapshot()))
}
