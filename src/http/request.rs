//! Inbound request instrumentation.
//!
//! # Responsibilities
//! - Build the per-request tracing span, tagged with a request ID
//!
//! # Design Decisions
//! - The ID lives in the span only; headers are never added on the way in or
//!   out, so coalesced callers see the same response and upstreams only see
//!   what the client sent
//! - A client-supplied `x-request-id` is reused, otherwise a UUID is generated

use axum::body::Body;
use axum::http::{HeaderName, Request};
use tower_http::request_id::{MakeRequestId, MakeRequestUuid};
use tracing::Span;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// The request's ID: the client's `x-request-id`, or a fresh UUID.
pub fn request_id(request: &Request<Body>) -> String {
    let supplied = request
        .headers()
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    supplied
        .or_else(|| {
            MakeRequestUuid
                .make_request_id(request)
                .and_then(|id| id.header_value().to_str().ok().map(str::to_owned))
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Span for one inbound request, tagged with its request ID.
pub fn make_request_span(request: &Request<Body>) -> Span {
    tracing::info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        request_id = %request_id(request),
    )
}
