//! Request hedging and response fan-in.
//!
//! # Data Flow
//! ```text
//! key.rs          request identity → RequestKey
//! registry.rs     RequestKey → the single open RaceGroup (DashMap)
//! group.rs        waiters, attempt counters, completion gate
//! orchestrator.rs one upstream attempt per request, outcome → group
//! ```
//!
//! Concurrent requests with the same key each send their own upstream
//! attempt; the first success answers all of them, and they fail only once
//! every attempt in the group has failed.

pub mod error;
pub mod group;
pub mod key;
pub mod orchestrator;
pub mod registry;

pub use error::{HedgeError, ProxyError};
pub use group::{AttemptNumber, Outcome, RaceGroup, Waiter};
pub use key::{KeyGenerator, RequestKey};
pub use orchestrator::{InboundRequest, Orchestrator};
pub use registry::GroupRegistry;
