//! Outbound HTTP client.
//!
//! # Responsibilities
//! - Issue exactly one upstream call per attempt
//! - Enforce connect/request timeouts and the body buffering limit
//! - Classify failures into [`UpstreamError`]
//!
//! # Design Decisions
//! - Redirects are returned to the caller, never followed
//! - Response bodies are buffered so a winner can be shared between waiters
//! - 4xx/5xx responses count as failed attempts unless configured otherwise

use std::error::Error as _;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use reqwest::redirect::Policy;

use crate::config::{LimitsConfig, UpstreamConfig};
use crate::upstream::types::{UpstreamError, UpstreamRequest, UpstreamResponse};

/// Issues a single upstream attempt and returns an effectively raw response.
pub trait UpstreamClient: Send + Sync + 'static {
    fn send(
        &self,
        request: UpstreamRequest,
    ) -> impl Future<Output = Result<UpstreamResponse, UpstreamError>> + Send;
}

impl<C: UpstreamClient> UpstreamClient for Arc<C> {
    fn send(
        &self,
        request: UpstreamRequest,
    ) -> impl Future<Output = Result<UpstreamResponse, UpstreamError>> + Send {
        (**self).send(request)
    }
}

/// [`UpstreamClient`] backed by a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
    request_timeout: Duration,
    max_body_bytes: usize,
    error_status_is_failure: bool,
}

impl HttpUpstream {
    /// Build the client from configuration.
    pub fn new(config: &UpstreamConfig, limits: &LimitsConfig) -> Result<Self, reqwest::Error> {
        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(request_timeout)
            .redirect(Policy::none());
        if !config.use_system_proxy {
            builder = builder.no_proxy();
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            request_timeout,
            max_body_bytes: limits.max_body_bytes,
            error_status_is_failure: config.error_status_is_failure,
        })
    }

    fn classify(&self, error: reqwest::Error) -> UpstreamError {
        if error.is_timeout() {
            UpstreamError::Timeout(self.request_timeout)
        } else {
            UpstreamError::Request(error_chain(&error))
        }
    }
}

impl UpstreamClient for HttpUpstream {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
        let UpstreamRequest {
            method,
            url,
            headers,
            body,
        } = request;

        let mut builder = self
            .client
            .request(method.clone(), url.clone())
            .headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let mut response = builder.send().await.map_err(|e| self.classify(e))?;

        let status = response.status();
        if self.error_status_is_failure && (status.is_client_error() || status.is_server_error()) {
            return Err(UpstreamError::ErrorStatus {
                status,
                method,
                url,
            });
        }

        let limit = self.max_body_bytes;
        if response.content_length().is_some_and(|len| len > limit as u64) {
            return Err(UpstreamError::BodyTooLarge { limit });
        }

        let headers = response.headers().clone();
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| self.classify(e))? {
            if body.len() + chunk.len() > limit {
                return Err(UpstreamError::BodyTooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(UpstreamResponse::new(status, headers, Bytes::from(body)))
    }
}

/// Flatten an error and its sources into one message.
///
/// `reqwest` keeps the useful part ("Connection refused") in the source chain.
fn error_chain(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
