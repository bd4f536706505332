//! Flood control kept in store sorted sets

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::domain::clock::precise_now;
use crate::domain::flood::FloodControl;
use crate::domain::store::{StoreClient, StoreKeys};
use crate::domain::CacheError;
use crate::infrastructure::observability::record_flood_registration;

/// Records events in `<prefix>:flood:<name>:<identifier>`, scored by the time
/// they stop counting
///
/// The store expires the whole set once its newest event leaves the window.
pub struct StoreFlood {
    client: Arc<dyn StoreClient>,
    keys: StoreKeys,
}

impl fmt::Debug for StoreFlood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreFlood")
            .field("client", &self.client.name())
            .field("keys", &self.keys)
            .finish()
    }
}

impl StoreFlood {
    pub fn new(client: Arc<dyn StoreClient>, keys: StoreKeys) -> Self {
        Self { client, keys }
    }
}

#[async_trait]
impl FloodControl for StoreFlood {
    async fn register(
        &self,
        name: &str,
        window: Duration,
        identifier: &str,
    ) -> Result<(), CacheError> {
        let key = self.keys.flood_key(name, identifier);
        let expires_at = precise_now() + window.as_secs_f64();

        self.client
            .sorted_set_add(&key, expires_at, &Uuid::new_v4().to_string())
            .await?;

        let ttl = window.as_secs_f64().ceil().max(1.0) as i64;
        self.client.expire(&key, ttl).await?;

        debug!(event = name, identifier, window_secs = ttl, "Registered flood event");
        record_flood_registration(name);

        Ok(())
    }

    async fn clear(&self, name: &str, identifier: &str) -> Result<(), CacheError> {
        let key = self.keys.flood_key(name, identifier);
        self.client.delete(&key).await?;

        Ok(())
    }

    async fn is_allowed(
        &self,
        name: &str,
        threshold: usize,
        identifier: &str,
    ) -> Result<bool, CacheError> {
        let key = self.keys.flood_key(name, identifier);
        let count = self.client.sorted_set_count(&key, precise_now()).await?;

        Ok(count < threshold)
    }
}
