//! Observability infrastructure - Metrics

mod config;
mod metrics;

pub use config::MetricsConfig;
pub use metrics::{
    init_metrics, record_cache_lookup, record_cache_write, record_flood_registration,
    record_lock_acquisition, record_tag_invalidation, record_cache_delete, LookupOutcome,
    PrometheusMetrics,
};
