use api_contract::HealthDto;
use axum::response::Response;

use crate::utils::response::ok;

pub async fn health() -> Response {
    ok(HealthDto {
        ok: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
