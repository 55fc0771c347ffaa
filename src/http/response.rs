//! Response conversion.
//!
//! # Responsibilities
//! - Turn the winning upstream response into the client response
//! - Map proxy errors to status codes and plain-text bodies
//!
//! # Design Decisions
//! - Status, headers and body of the winner pass through unchanged, except
//!   hop-by-hop headers, which describe the upstream connection only
//! - Error bodies are the error's display text

use axum::body::Body;
use axum::http::header::{CONNECTION, TRANSFER_ENCODING};
use axum::http::{HeaderMap, HeaderName};
use axum::response::{IntoResponse, Response};

use crate::hedging::ProxyError;
use crate::upstream::UpstreamResponse;

const KEEP_ALIVE: HeaderName = HeaderName::from_static("keep-alive");

/// Drop headers that only apply to the upstream hop.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    headers.remove(CONNECTION);
    headers.remove(TRANSFER_ENCODING);
    headers.remove(KEEP_ALIVE);
}

impl IntoResponse for UpstreamResponse {
    fn into_response(self) -> Response {
        let UpstreamResponse {
            status,
            mut headers,
            body,
        } = self;
        strip_hop_by_hop(&mut headers);

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hedging::HedgeError;
    use crate::upstream::UpstreamError;
    use axum::http::{HeaderValue, StatusCode};

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_upstream_response_passes_through() {
        let mut headers = HeaderMap::new();
        headers.insert("x-upstream", HeaderValue::from_static("yes"));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));

        let response =
            UpstreamResponse::new(StatusCode::CREATED, headers, "created").into_response();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-upstream"], "yes");
        assert!(!response.headers().contains_key(CONNECTION));
        assert!(!response.headers().contains_key(TRANSFER_ENCODING));
        assert_eq!(body_text(response).await, "created");
    }

    #[tokio::test]
    async fn test_error_responses() {
        let response = ProxyError::MissingTargetUrl("X-Target-Url".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(response).await, "Missing X-Target-Url header");

        let response = ProxyError::from(HedgeError::AllAttemptsFailed {
            last_error: UpstreamError::Request("refused".into()),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            body_text(response).await,
            "All upstream requests failed. Last error: refused"
        );
    }
}
