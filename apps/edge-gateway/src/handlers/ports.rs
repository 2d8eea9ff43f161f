//! 硬件端口占用情况。
//!
//! - GET /api/v1/ports

use axum::{extract::State, response::Response};

use crate::AppState;
use crate::utils::response::ok;

pub async fn list_ports(State(state): State<AppState>) -> Response {
    ok(state.runtimes.devices.ports().list())
}
