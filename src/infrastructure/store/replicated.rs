//! Primary/replica store client

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::connection::connect_node;
use super::settings::ConnectionSettings;
use super::redis::{RedisStore, Routing};
use crate::domain::store::{StoreClient, StoreOp, StoreReply};
use crate::domain::CacheError;

/// Sends writes to the primary and, when enabled, hash reads to the replicas
/// in turn
///
/// String values (tag counters, delete-all watermarks, locks) are always read
/// from the primary, so an invalidation that has returned is seen by every
/// later checksum read. Replicas only serve cache records, whose staleness is
/// caught by those checksums.
pub struct ReplicatedStore {
    primary: Arc<dyn StoreClient>,
    replicas: Vec<Arc<dyn StoreClient>>,
    read_from_replicas: bool,
    next_replica: AtomicUsize,
}

impl fmt::Debug for ReplicatedStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicatedStore")
            .field("primary", &self.primary.name())
            .field("replicas", &self.replicas.len())
            .field("read_from_replicas", &self.read_from_replicas)
            .finish()
    }
}

impl ReplicatedStore {
    pub fn new(
        primary: Arc<dyn StoreClient>,
        replicas: Vec<Arc<dyn StoreClient>>,
        read_from_replicas: bool,
    ) -> Self {
        Self {
            primary,
            replicas,
            read_from_replicas,
            next_replica: AtomicUsize::new(0),
        }
    }

    /// Connects to the primary and every replica
    pub async fn connect(settings: &ConnectionSettings) -> Result<Self, CacheError> {
        let connect_timeout = settings.connect_timeout()?;
        let response_timeout = settings.response_timeout()?;
        let replica_infos = settings.replica_infos()?;

        let primary = connect_node(
            settings.primary_info()?,
            settings.persistent,
            connect_timeout,
            response_timeout,
        )
        .await?;

        let mut replicas: Vec<Arc<dyn StoreClient>> = Vec::new();

        for info in replica_infos {
            let replica =
                connect_node(info, settings.persistent, connect_timeout, response_timeout).await?;
            replicas.push(Arc::new(RedisStore::new(replica, Routing::SingleNode, "redis")));
        }

        Ok(Self::new(
            Arc::new(RedisStore::new(primary, Routing::SingleNode, "redis")),
            replicas,
            settings.read_from_replicas,
        ))
    }

    fn reader(&self) -> &dyn StoreClient {
        if !self.read_from_replicas || self.replicas.is_empty() {
            return self.primary.as_ref();
        }

        let index = self.next_replica.fetch_add(1, Ordering::Relaxed) % self.replicas.len();
        self.replicas[index].as_ref()
    }
}

#[async_trait]
impl StoreClient for ReplicatedStore {
    fn name(&self) -> &'static str {
        "redis-replicated"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.primary.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.primary.set(key, value).await
    }

    async fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<String>>, CacheError> {
        self.primary.multi_get(keys).await
    }

    async fn hash_set_multiple(
        &self,
        key: &str,
        fields: &[(String, String)],
    ) -> Result<(), CacheError> {
        self.primary.hash_set_multiple(key, fields).await
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, CacheError> {
        self.reader().hash_get_all(key).await
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, CacheError> {
        self.reader().hash_get(key, field).await
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), CacheError> {
        self.primary.hash_set(key, field, value).await
    }

    async fn increment(&self, key: &str) -> Result<i64, CacheError> {
        self.primary.increment(key).await
    }

    async fn delete_multiple(&self, keys: &[String]) -> Result<usize, CacheError> {
        self.primary.delete_multiple(keys).await
    }

    async fn expire(&self, key: &str, seconds: i64) -> Result<bool, CacheError> {
        self.primary.expire(key, seconds).await
    }

    // Lock and flood state is always read from the primary
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        self.primary.set_if_absent(key, value, ttl).await
    }

    async fn extend_if_owner(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        self.primary.extend_if_owner(key, value, ttl).await
    }

    async fn delete_if_owner(&self, key: &str, value: &str) -> Result<bool, CacheError> {
        self.primary.delete_if_owner(key, value).await
    }

    async fn sorted_set_add(
        &self,
        key: &str,
        score: f64,
        member: &str,
    ) -> Result<(), CacheError> {
        self.primary.sorted_set_add(key, score, member).await
    }

    async fn sorted_set_count(&self, key: &str, min_score: f64) -> Result<usize, CacheError> {
        self.primary.sorted_set_count(key, min_score).await
    }

    fn supports_pipeline(&self) -> bool {
        self.primary.supports_pipeline()
    }

    async fn pipeline(&self, ops: &[StoreOp]) -> Result<Vec<StoreReply>, CacheError> {
        if ops.iter().all(StoreOp::reads_record) {
            self.reader().pipeline(ops).await
        } else {
            self.primary.pipeline(ops).await
        }
    }
}
