//! Request latency recording.

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

use crate::telemetry::metrics::record_request_latency;

/// Labels by route template so ids in the path do not explode cardinality.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let start = Instant::now();

    let response = next.run(request).await;

    record_request_latency(&method, &path, response.status().as_u16(), start.elapsed());
    response
}
