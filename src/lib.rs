//! Hedging reverse proxy library.
//!
//! Forwards each request to the URL named in its `X-Target-Url` header.
//! Concurrent identical requests race their upstream attempts and share the
//! first successful response.

pub mod config;
pub mod hedging;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod upstream;

pub use config::schema::ProxyConfig;
pub use hedging::Orchestrator;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
