//! HTTP access logging.
//!
//! One structured entry per request with protocol, method, path, status,
//! response size, request id, latency and user agent. Logging is skipped for
//! paths on the configured ignore list or when disabled process-wide.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use http_body::Body as _;
use tower_http::request_id::{MakeRequestId, RequestId};
use tracing::info;

use crate::AppState;

pub(crate) const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request-id source for [`tower_http::request_id::SetRequestIdLayer`].
#[derive(Clone, Copy, Default)]
pub(crate) struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &http::Request<B>) -> Option<RequestId> {
        let id = uuid::Uuid::new_v4().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

pub(crate) async fn access_log(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    if state.access_log_disabled
        || state
            .access_log_ignored_paths
            .iter()
            .any(|p| p == req.uri().path())
    {
        return next.run(req).await;
    }

    let proto = format!("{:?}", req.version());
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let start = Instant::now();
    let response = next.run(req).await;

    // Streamed bodies have no exact size up front; log zero rather than
    // buffering the response.
    let size = response.body().size_hint().exact().unwrap_or(0);

    info!(
        proto,
        method,
        path,
        status = response.status().as_u16(),
        size,
        request_id,
        elapsed_us = start.elapsed().as_micros() as u64,
        user_agent,
        "HTTP request"
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_request_uuid_produces_parseable_header_values() {
        let mut make = MakeRequestUuid;
        let req = http::Request::builder().body(()).unwrap();

        let id = make.make_request_id(&req).unwrap();
        let value = id.header_value().to_str().unwrap().to_string();
        assert_eq!(value.len(), 36);

        let other = make
            .make_request_id(&req)
            .unwrap()
            .header_value()
            .to_str()
            .unwrap()
            .to_string();
        assert_ne!(value, other);
    }
}
