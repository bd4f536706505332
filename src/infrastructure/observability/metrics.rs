//! Prometheus metrics infrastructure
//!
//! The recording helpers go through the `metrics` facade and are no-ops until
//! a recorder is installed with [`init_metrics`].

use std::sync::Arc;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use super::config::MetricsConfig;

/// Prometheus metrics handle used to render the collected metrics
#[derive(Clone)]
pub struct PrometheusMetrics {
    handle: Arc<PrometheusHandle>,
}

impl PrometheusMetrics {
    /// Metrics in the Prometheus text format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Initialize Prometheus metrics
pub fn init_metrics(config: &MetricsConfig) -> Option<PrometheusMetrics> {
    if !config.enabled {
        tracing::debug!("Prometheus metrics disabled");
        return None;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            gauge!("tagcache_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);

            tracing::info!("Prometheus metrics initialized");

            Some(PrometheusMetrics {
                handle: Arc::new(handle),
            })
        }
        Err(e) => {
            tracing::error!("Failed to initialize Prometheus metrics: {}", e);
            None
        }
    }
}

/// How a cache lookup of one id ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupOutcome {
    Hit,
    Miss,
    /// Returned with `valid == false` to an allow-invalid read
    Invalid,
}

impl LookupOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::Invalid => "invalid",
        }
    }
}

pub fn record_cache_lookup(bin: &str, outcome: LookupOutcome) {
    let labels = [
        ("bin", bin.to_string()),
        ("outcome", outcome.as_str().to_string()),
    ];

    counter!("tagcache_lookups_total", &labels).increment(1);
}

pub fn record_cache_write(bin: &str) {
    counter!("tagcache_writes_total", "bin" => bin.to_string()).increment(1);
}

pub fn record_cache_delete(bin: &str, count: usize) {
    counter!("tagcache_deletes_total", "bin" => bin.to_string()).increment(count as u64);
}

pub fn record_tag_invalidation(count: usize) {
    counter!("tagcache_tag_invalidations_total").increment(count as u64);
}

pub fn record_lock_acquisition(acquired: bool) {
    let outcome = if acquired { "acquired" } else { "busy" };
    counter!("tagcache_lock_acquisitions_total", "outcome" => outcome).increment(1);
}

pub fn record_flood_registration(name: &str) {
    counter!("tagcache_flood_registrations_total", "event" => name.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_outcome_labels() {
        assert_eq!(LookupOutcome::Hit.as_str(), "hit");
        assert_eq!(LookupOutcome::Miss.as_str(), "miss");
        assert_eq!(LookupOutcome::Invalid.as_str(), "invalid");
    }

    #[test]
    fn test_disabled_metrics_install_nothing() {
        assert!(init_metrics(&MetricsConfig::default()).is_none());
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_cache_lookup("page", LookupOutcome::Hit);
        record_cache_write("page");
        record_cache_delete("page", 2);
        record_tag_invalidation(1);
        record_lock_acquisition(true);
        record_flood_registration("login");
    }
}
