//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Hedging core and HTTP layer produce:
//!     → logging.rs (structured log events, per-request spans with request ID)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```

pub mod logging;
pub mod metrics;
