//! Upstream (outbound) HTTP subsystem.
//!
//! # Data Flow
//! ```text
//! orchestrator builds UpstreamRequest
//!     → client.rs (UpstreamClient::send, one call per attempt)
//!     → UpstreamResponse (status, headers, buffered body)
//!       or UpstreamError (recorded against the attempt)
//! ```

pub mod client;
pub mod types;

pub use client::{HttpUpstream, UpstreamClient};
pub use types::{UpstreamError, UpstreamRequest, UpstreamResponse};
