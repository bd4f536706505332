//! Cache backend factory for per-bin configuration

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use super::backend::StoreCacheBackend;
use crate::domain::cache::CacheBackend;
use crate::domain::checksum::CacheTagsChecksum;
use crate::domain::serialization::Serializer;
use crate::domain::store::{StoreClient, StoreKeys};
use crate::infrastructure::checksum::StoreCacheTagsChecksum;
use crate::infrastructure::serialization::JsonSerializer;

/// Settings of one bin
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BinSettings {
    /// Overrides the TTL of permanent items, in seconds
    #[serde(default)]
    pub permanent_ttl: Option<u64>,
}

/// Configuration shared by every bin
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    /// Namespace of every store key
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// TTL of permanent items, in seconds
    #[serde(default = "default_permanent_ttl")]
    pub permanent_ttl: u64,
    #[serde(default)]
    pub bins: HashMap<String, BinSettings>,
}

fn default_prefix() -> String {
    "tagcache".to_string()
}

fn default_permanent_ttl() -> u64 {
    // One year
    31_536_000
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            permanent_ttl: default_permanent_ttl(),
            bins: HashMap::new(),
        }
    }
}

impl CacheSettings {
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Sets the permanent TTL of one bin
    pub fn with_bin_permanent_ttl(mut self, bin: impl Into<String>, ttl: Duration) -> Self {
        self.bins.entry(bin.into()).or_default().permanent_ttl = Some(ttl.as_secs());
        self
    }

    /// Permanent TTL of `bin`, falling back to the shared default
    pub fn permanent_ttl_for(&self, bin: &str) -> Duration {
        let seconds = self
            .bins
            .get(bin)
            .and_then(|settings| settings.permanent_ttl)
            .unwrap_or(self.permanent_ttl);

        Duration::from_secs(seconds)
    }
}

/// Builds cache bins sharing one client, checksum provider and serializer
pub struct CacheBackendFactory {
    client: Arc<dyn StoreClient>,
    checksum: Arc<dyn CacheTagsChecksum>,
    serializer: Arc<dyn Serializer>,
    bin_serializers: HashMap<String, Arc<dyn Serializer>>,
    settings: CacheSettings,
}

impl fmt::Debug for CacheBackendFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheBackendFactory")
            .field("client", &self.client.name())
            .field("serializer", &self.serializer)
            .field("settings", &self.settings)
            .finish()
    }
}

impl CacheBackendFactory {
    /// Creates a factory using store tag counters and JSON serialization
    pub fn new(client: Arc<dyn StoreClient>, settings: CacheSettings) -> Self {
        let checksum = Arc::new(StoreCacheTagsChecksum::new(
            client.clone(),
            StoreKeys::new(settings.prefix.clone()),
        ));

        Self {
            client,
            checksum,
            serializer: Arc::new(JsonSerializer),
            bin_serializers: HashMap::new(),
            settings,
        }
    }

    /// Replaces the serializer used by bins without their own
    pub fn with_serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = serializer;
        self
    }

    /// Sets the serializer of one bin
    pub fn with_bin_serializer(
        mut self,
        bin: impl Into<String>,
        serializer: Arc<dyn Serializer>,
    ) -> Self {
        self.bin_serializers.insert(bin.into(), serializer);
        self
    }

    /// Checksum provider shared by every bin, used to invalidate tags
    pub fn checksum(&self) -> Arc<dyn CacheTagsChecksum> {
        Arc::clone(&self.checksum)
    }

    pub fn client(&self) -> Arc<dyn StoreClient> {
        Arc::clone(&self.client)
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Backend of `bin`
    pub fn get(&self, bin: &str) -> StoreCacheBackend {
        let serializer = self
            .bin_serializers
            .get(bin)
            .unwrap_or(&self.serializer)
            .clone();

        StoreCacheBackend::new(
            bin,
            self.client.clone(),
            self.checksum.clone(),
            serializer,
            StoreKeys::new(self.settings.prefix.clone()),
            self.settings.permanent_ttl_for(bin),
        )
    }

    /// Backend of `bin` as a trait object
    pub fn create(&self, bin: &str) -> Arc<dyn CacheBackend> {
        Arc::new(self.get(bin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cache::{CacheValue, Expiry};
    use crate::domain::checksum::UnitOfWork;
    use crate::infrastructure::store::InMemoryStore;

    #[test]
    fn test_default_settings() {
        let settings = CacheSettings::default();

        assert_eq!(settings.prefix, "tagcache");
        assert_eq!(settings.permanent_ttl_for("page"), Duration::from_secs(31_536_000));
    }

    #[test]
    fn test_bin_permanent_ttl_override() {
        let settings =
            CacheSettings::default().with_bin_permanent_ttl("render", Duration::from_secs(3600));

        assert_eq!(settings.permanent_ttl_for("render"), Duration::from_secs(3600));
        assert_eq!(settings.permanent_ttl_for("page"), Duration::from_secs(31_536_000));
    }

    #[test]
    fn test_settings_deserialize() {
        let settings: CacheSettings = serde_json::from_str(
            r#"{"prefix": "site", "bins": {"render": {"permanent_ttl": 60}}}"#,
        )
        .unwrap();

        assert_eq!(settings.prefix, "site");
        assert_eq!(settings.permanent_ttl, 31_536_000);
        assert_eq!(settings.permanent_ttl_for("render"), Duration::from_secs(60));
    }

    #[test]
    fn test_factory_applies_bin_settings() {
        let factory = CacheBackendFactory::new(
            Arc::new(InMemoryStore::new()),
            CacheSettings::default().with_bin_permanent_ttl("render", Duration::from_secs(60)),
        );

        assert_eq!(factory.get("render").permanent_ttl(), Duration::from_secs(60));
        assert_eq!(factory.get("page").bin(), "page");
    }

    #[tokio::test]
    async fn test_bins_share_checksum_provider() {
        let factory = CacheBackendFactory::new(
            Arc::new(InMemoryStore::new()),
            CacheSettings::default().with_prefix("site"),
        );
        let page = factory.create("page");
        let render = factory.create("render");
        let node = vec!["node:5".to_string()];
        let mut uow = UnitOfWork::new();

        page.set(&mut uow, "a", CacheValue::from("1"), Expiry::Permanent, &node)
            .await
            .unwrap();
        render
            .set(&mut uow, "a", CacheValue::from("1"), Expiry::Permanent, &node)
            .await
            .unwrap();

        factory.checksum().invalidate_tags(&mut uow, &node).await.unwrap();

        assert!(page.get(&mut uow, "a", false).await.unwrap().is_none());
        assert!(render.get(&mut uow, "a", false).await.unwrap().is_none());

        let keys = factory.client().hash_get_all("site:page:a").await.unwrap();
        assert_eq!(keys["cid"], "a");
    }
}
