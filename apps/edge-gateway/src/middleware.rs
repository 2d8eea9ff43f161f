//! 请求上下文：request_id 由 `SetRequestIdLayer` 生成（或沿用调用方的 `x-request-id`），
//! trace_id 每个请求新建。

use axum::{
    body::Body,
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use edge_telemetry::new_request_ids;
use tower_http::request_id::{MakeRequestId, RequestId};
use tracing::Instrument;

#[derive(Debug, Clone, Copy, Default)]
pub struct MakeGatewayRequestId;

impl MakeRequestId for MakeGatewayRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&new_request_ids().request_id)
            .ok()
            .map(RequestId::new)
    }
}

pub async fn request_context(req: Request<Body>, next: Next) -> Response {
    let ids = new_request_ids();
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or(ids.request_id.as_str())
        .to_string();
    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        trace_id = %ids.trace_id,
        method = %req.method(),
        path = %req.uri().path()
    );

    let mut response = next.run(req).instrument(span).await;
    response.headers_mut().insert(
        "x-trace-id",
        HeaderValue::from_str(&ids.trace_id).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    response
}
