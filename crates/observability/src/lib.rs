//! # taximap-observability
//!
//! Observability-Crate fuer Taximap:
//! - Prometheus-kompatible Metriken (`/metrics`)
//! - Structured Logging via tracing-subscriber
//! - Request-Timing Middleware

pub mod logging;
pub mod metrics;
pub mod middleware;

pub use logging::{log_filter_gueltig, log_format_aus_env, log_format_gueltig, logging_initialisieren};
pub use metrics::{metrics_router, RelayMetriken};
pub use middleware::{request_timing_layer, timing_middleware};
