//! Store client factory for runtime topology selection

use std::fmt;
use std::sync::Arc;

use tokio::sync::OnceCell;

use super::in_memory::InMemoryStore;
use super::redis::RedisStore;
use super::replicated::ReplicatedStore;
use super::settings::{ConnectionSettings, Topology};
use crate::domain::store::StoreClient;
use crate::domain::CacheError;

/// Resolves the store client once per process lifetime
///
/// The topology is chosen from the settings the first time [`client`] is
/// called; later calls return the same shared handle.
///
/// [`client`]: ClientFactory::client
pub struct ClientFactory {
    settings: ConnectionSettings,
    client: OnceCell<Arc<dyn StoreClient>>,
}

impl fmt::Debug for ClientFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientFactory")
            .field("topology", &self.settings.topology)
            .field("connected", &self.client.initialized())
            .finish()
    }
}

impl ClientFactory {
    /// Creates a new client factory
    pub fn new(settings: ConnectionSettings) -> Self {
        Self {
            settings,
            client: OnceCell::new(),
        }
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Shared client for the configured topology, connecting on first use
    pub async fn client(&self) -> Result<Arc<dyn StoreClient>, CacheError> {
        let client = self
            .client
            .get_or_try_init(|| create_client(&self.settings))
            .await?;

        Ok(Arc::clone(client))
    }
}

/// Connects a new client for the topology in `settings`
pub async fn create_client(
    settings: &ConnectionSettings,
) -> Result<Arc<dyn StoreClient>, CacheError> {
    tracing::debug!(topology = %settings.topology, "Creating store client");

    let client: Arc<dyn StoreClient> = match settings.topology {
        Topology::Memory => Arc::new(InMemoryStore::with_capacity(settings.max_capacity)),
        Topology::Single => Arc::new(RedisStore::connect(settings).await?),
        Topology::Replicated => Arc::new(ReplicatedStore::connect(settings).await?),
        Topology::Cluster => Arc::new(RedisStore::connect_cluster(settings).await?),
    };

    Ok(client)
}
