//! Observability configuration

use serde::Deserialize;

/// Prometheus metrics configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct MetricsConfig {
    /// Install a Prometheus recorder and print the metrics after each command
    #[serde(default)]
    pub enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_disabled_by_default() {
        assert!(!MetricsConfig::default().enabled);

        let config: MetricsConfig = serde_json::from_str("{}").unwrap();
        assert!(!config.enabled);
    }
}
