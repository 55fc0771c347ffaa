//! Error taxonomy of the hedging core.

use axum::http::StatusCode;
use thiserror::Error;

use crate::upstream::UpstreamError;

/// Outcome of a race group that did not produce a response.
///
/// Cloned to every waiter of the group.
#[derive(Debug, Clone, Error)]
pub enum HedgeError {
    /// Every dispatched attempt in the group failed.
    #[error("All upstream requests failed. Last error: {last_error}")]
    AllAttemptsFailed { last_error: UpstreamError },

    /// A waiter tried to join a group whose completion gate had already closed.
    #[error("Request group already completed")]
    GroupCompleted,

    /// The group was dropped without resolving this waiter.
    #[error("Request group dropped before resolving")]
    WaiterDropped,
}

/// Errors surfaced to the inbound caller.
#[derive(Debug, Clone, Error)]
pub enum ProxyError {
    /// The routing header is absent.
    #[error("Missing {0} header")]
    MissingTargetUrl(String),

    /// The routing header is not an absolute http(s) URL.
    #[error("Invalid {0} header")]
    InvalidTargetUrl(String),

    #[error(transparent)]
    Hedge(#[from] HedgeError),
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::MissingTargetUrl(_) | ProxyError::InvalidTargetUrl(_) => {
                StatusCode::BAD_REQUEST
            }
            ProxyError::Hedge(HedgeError::AllAttemptsFailed { .. }) => StatusCode::BAD_GATEWAY,
            ProxyError::Hedge(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
