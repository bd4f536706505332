use serde::Deserialize;

use crate::domain::CacheError;
use crate::infrastructure::cache::CacheSettings;
use crate::infrastructure::observability::MetricsConfig;
use crate::infrastructure::store::ConnectionSettings;

/// Prefix of the environment variables overriding file settings
pub const ENV_PREFIX: &str = "TAGCACHE";

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub store: ConnectionSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

fn default_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

impl AppConfig {
    /// Loads `config/default`, `config/local` and `TAGCACHE__*` variables
    ///
    /// Unreadable files and unparsable values are configuration errors.
    pub fn load() -> Result<Self, CacheError> {
        Self::load_with(config::Environment::with_prefix(ENV_PREFIX))
    }

    fn load_with(environment: config::Environment) -> Result<Self, CacheError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                environment
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("store.seeds")
                    .with_list_parse_key("store.replicas")
                    .try_parsing(true),
            )
            .build()
            .and_then(|config| config.try_deserialize::<Self>())
            .map_err(|e| CacheError::configuration(format!("Failed to load configuration: {}", e)))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;
    use crate::infrastructure::store::Topology;

    fn load(vars: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();

        AppConfig::load_with(config::Environment::with_prefix(ENV_PREFIX).source(Some(vars)))
            .unwrap()
    }

    #[test]
    fn test_defaults_without_sources() {
        let config = load(&[]);

        assert_eq!(config.store.topology, Topology::Single);
        assert_eq!(config.store.port, 6379);
        assert_eq!(config.cache.prefix, "tagcache");
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn test_environment_overrides() {
        let config = load(&[
            ("TAGCACHE__STORE__TOPOLOGY", "cluster"),
            ("TAGCACHE__STORE__SEEDS", "10.0.0.1:7000,10.0.0.2:7000"),
            ("TAGCACHE__STORE__READ_TIMEOUT", "0.5"),
            ("TAGCACHE__CACHE__PREFIX", "site"),
            ("TAGCACHE__LOGGING__FORMAT", "json"),
        ]);

        assert_eq!(config.store.topology, Topology::Cluster);
        assert_eq!(config.store.seeds, vec!["10.0.0.1:7000", "10.0.0.2:7000"]);
        assert_eq!(
            config.store.response_timeout().unwrap(),
            Duration::from_millis(500)
        );
        assert_eq!(config.cache.prefix, "site");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_unknown_topology_is_configuration_error() {
        let vars = HashMap::from([(
            "TAGCACHE__STORE__TOPOLOGY".to_string(),
            "clustr".to_string(),
        )]);

        let error =
            AppConfig::load_with(config::Environment::with_prefix(ENV_PREFIX).source(Some(vars)))
                .unwrap_err();

        assert!(matches!(error, CacheError::Configuration { .. }));
        assert!(error.to_string().contains("clustr"));
    }
}
