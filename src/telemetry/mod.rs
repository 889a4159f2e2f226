//! Observability: tracing, metrics, and OpenTelemetry integration.

pub mod metrics;
pub mod tracing;

pub use metrics::{
    record_authz_decision, record_cache_lookup, record_login, CacheOutcome, LoginOutcome,
    MetricsState,
};
pub use tracing::init_telemetry;
