//! Request orchestration: one hedged attempt per inbound request.
//!
//! # Data Flow
//! ```text
//! InboundRequest
//!     → target header check (400 when absent or invalid)
//!     → KeyGenerator::compute_key
//!     → GroupRegistry::join_or_create (waiter + attempt number)
//!     → spawned attempt task → UpstreamClient::send
//!         success: retire group → complete_all(response)   (first one only)
//!         failure: record_failure → all failed? retire → complete_all(502)
//!     → caller awaits its waiter
//! ```
//!
//! # Design Decisions
//! - Every request dispatches its own attempt, even when it joins a group
//! - Attempts run on spawned tasks and are never cancelled; results that lose
//!   the race are discarded
//! - A failure is always reported to the attempt's own group, never to a newer
//!   group that reused the key

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::http::header::{
    InvalidHeaderName, CONTENT_LENGTH, CONTENT_TYPE, HOST, TRANSFER_ENCODING,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use url::Url;

use crate::config::HedgingConfig;
use crate::hedging::error::{HedgeError, ProxyError};
use crate::hedging::group::{AttemptNumber, RaceGroup, Waiter};
use crate::hedging::key::{KeyGenerator, RequestKey};
use crate::hedging::registry::GroupRegistry;
use crate::observability::metrics;
use crate::upstream::{UpstreamClient, UpstreamError, UpstreamRequest, UpstreamResponse};

/// An inbound request with its body already buffered.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Routes inbound requests through race groups to the upstream client.
pub struct Orchestrator<C> {
    inner: Arc<Inner<C>>,
}

struct Inner<C> {
    registry: GroupRegistry,
    keys: KeyGenerator,
    client: C,
    target_header: HeaderName,
    target_header_display: String,
}

impl<C> Clone for Orchestrator<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: UpstreamClient> Orchestrator<C> {
    /// Create an orchestrator with the given header names.
    pub fn new(client: C, target_header: HeaderName, credential_header: HeaderName) -> Self {
        let display = target_header.to_string();
        Self::build(client, target_header, display, credential_header)
    }

    /// Create an orchestrator from validated configuration.
    ///
    /// Client-facing messages name the target header as spelled in the config.
    pub fn from_config(client: C, config: &HedgingConfig) -> Result<Self, InvalidHeaderName> {
        let target_header = HeaderName::from_bytes(config.target_header.as_bytes())?;
        let credential_header = HeaderName::from_bytes(config.credential_header.as_bytes())?;
        Ok(Self::build(
            client,
            target_header,
            config.target_header.clone(),
            credential_header,
        ))
    }

    fn build(
        client: C,
        target_header: HeaderName,
        target_header_display: String,
        credential_header: HeaderName,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: GroupRegistry::new(),
                keys: KeyGenerator::new(credential_header),
                client,
                target_header,
                target_header_display,
            }),
        }
    }

    /// The registry of open race groups.
    pub fn registry(&self) -> &GroupRegistry {
        &self.inner.registry
    }

    /// Proxy one request, resolving with the outcome of its race group.
    pub async fn proxy(&self, request: InboundRequest) -> Result<UpstreamResponse, ProxyError> {
        let (raw_target, target) = self.target_url(&request.headers)?;
        let key = self.inner.keys.compute_key(
            &request.method,
            raw_target,
            &request.headers,
            &request.body,
        );

        let (waiter, resolution) = Waiter::channel();
        let (group, attempt) = self.inner.registry.join_or_create(key.clone(), waiter);

        let upstream = self.upstream_request(request, target);
        let this = self.clone();
        tokio::spawn(async move { this.run_attempt(key, group, attempt, upstream).await });

        let outcome = resolution.await.unwrap_or(Err(HedgeError::WaiterDropped));
        outcome.map_err(ProxyError::from)
    }

    fn target_url<'a>(&self, headers: &'a HeaderMap) -> Result<(&'a str, Url), ProxyError> {
        let display = &self.inner.target_header_display;
        let value = headers
            .get(&self.inner.target_header)
            .ok_or_else(|| ProxyError::MissingTargetUrl(display.clone()))?;
        let invalid = || ProxyError::InvalidTargetUrl(display.clone());

        let raw = value.to_str().map_err(|_| invalid())?;
        let url = Url::parse(raw).map_err(|_| invalid())?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid());
        }
        Ok((raw, url))
    }

    fn upstream_request(&self, request: InboundRequest, url: Url) -> UpstreamRequest {
        let InboundRequest {
            method,
            mut headers,
            body,
        } = request;

        headers.remove(&self.inner.target_header);
        headers.remove(HOST);
        headers.remove(CONTENT_LENGTH);
        headers.remove(TRANSFER_ENCODING);

        let bodiless = method == Method::GET || method == Method::DELETE || body.is_empty();
        let body = if bodiless {
            None
        } else {
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("application/octet-stream"),
                );
            }
            Some(body)
        };

        UpstreamRequest {
            method,
            url,
            headers,
            body,
        }
    }

    async fn run_attempt(
        self,
        key: RequestKey,
        group: Arc<RaceGroup>,
        attempt: AttemptNumber,
        request: UpstreamRequest,
    ) {
        tracing::debug!(
            key = %key,
            attempt,
            method = %request.method,
            url = %request.url,
            "Dispatching upstream attempt"
        );
        let started = Instant::now();

        // The send runs on its own task so a panic in the client still
        // reaches the group as a failed attempt.
        let inner = Arc::clone(&self.inner);
        let result = match tokio::spawn(async move { inner.client.send(request).await }).await {
            Ok(result) => result,
            Err(e) => Err(UpstreamError::Aborted(e.to_string())),
        };
        metrics::record_attempt_duration(started);

        match result {
            Ok(response) => self.on_success(&key, &group, attempt, response),
            Err(error) => self.on_failure(&key, &group, attempt, error),
        }
    }

    fn on_success(
        &self,
        key: &RequestKey,
        group: &Arc<RaceGroup>,
        attempt: AttemptNumber,
        response: UpstreamResponse,
    ) {
        if !self.inner.registry.retire(key, group, RaceGroup::try_complete) {
            tracing::debug!(key = %key, attempt, "Race already decided, discarding response");
            metrics::record_attempt("discarded");
            return;
        }

        let status = response.status;
        let resolved = group.complete_all(Ok(response));
        tracing::info!(
            key = %key,
            attempt,
            status = %status,
            waiters = resolved,
            attempts = group.attempts_dispatched(),
            "Attempt won the race"
        );
        metrics::record_attempt("won");
        metrics::record_group_completed("success", resolved);
    }

    fn on_failure(
        &self,
        key: &RequestKey,
        group: &Arc<RaceGroup>,
        attempt: AttemptNumber,
        error: UpstreamError,
    ) {
        tracing::warn!(key = %key, attempt, error = %error, "Upstream attempt failed");
        metrics::record_attempt("failed");

        if group.is_completed() {
            return;
        }
        group.record_failure(attempt, error.clone());
        if !group.all_attempts_failed() {
            return;
        }
        if !self
            .inner
            .registry
            .retire(key, group, RaceGroup::try_complete_if_all_failed)
        {
            return;
        }

        let last_error = group.last_error().unwrap_or(error);
        tracing::warn!(
            key = %key,
            attempts = group.attempts_dispatched(),
            last_error = %last_error,
            "All upstream attempts failed"
        );
        let resolved = group.complete_all(Err(HedgeError::AllAttemptsFailed { last_error }));
        metrics::record_group_completed("failure", resolved);
    }
}
