//! API layer
//!
//! HTTP handlers for:
//! - Session lifecycle endpoints
//! - Metrics (Prometheus)

pub mod metrics;
mod sessions;

pub use metrics::metrics_router;
pub use sessions::session_router;
