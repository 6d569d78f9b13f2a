//! Observability: metrics and access logging
//!
//! Structured access logs go through `tracing`; counters are rendered as
//! Prometheus text by the management API.

pub mod access_log;
pub mod metrics;

pub use access_log::{AccessLog, AccessLogEntry};
pub use metrics::{GatewayMetrics, MetricsSnapshot};
