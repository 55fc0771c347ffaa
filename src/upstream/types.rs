//! Request, response and error types exchanged with the upstream client.

use std::time::Duration;

use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode};
use thiserror::Error;
use url::Url;

/// A single upstream attempt, ready to send.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub url: Url,
    /// Inbound headers minus routing, host and framing headers.
    pub headers: HeaderMap,
    /// `None` for bodiless requests.
    pub body: Option<Bytes>,
}

/// A fully buffered upstream response.
///
/// Cheap to clone: the body is reference counted, so one winning response can
/// be handed to every waiter of a race group.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }
}

/// Failure of one upstream attempt.
///
/// Recorded against that attempt only; callers see it solely as the
/// "last error" of an exhausted race group.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    /// Connection, TLS or protocol failure.
    #[error("{0}")]
    Request(String),

    /// The attempt exceeded the client deadline.
    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),

    /// The upstream body exceeded the buffering limit.
    #[error("upstream body exceeds the {limit} byte limit")]
    BodyTooLarge { limit: usize },

    /// The upstream answered with a 4xx/5xx status.
    #[error("{status} from {method} {url}")]
    ErrorStatus {
        status: StatusCode,
        method: Method,
        url: Url,
    },

    /// The attempt task ended without producing a result.
    #[error("upstream attempt aborted: {0}")]
    Aborted(String),
}
