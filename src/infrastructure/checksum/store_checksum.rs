//! Tag checksums backed by store counters

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::checksum::{CacheTagsChecksum, UnitOfWork};
use crate::domain::store::{StoreClient, StoreKeys, StoreOp};
use crate::domain::CacheError;
use crate::infrastructure::observability::record_tag_invalidation;

/// Keeps one counter per tag at `<prefix>:cachetags:<tag>`
pub struct StoreCacheTagsChecksum {
    client: Arc<dyn StoreClient>,
    keys: StoreKeys,
}

impl std::fmt::Debug for StoreCacheTagsChecksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreCacheTagsChecksum")
            .field("client", &self.client.name())
            .field("keys", &self.keys)
            .finish()
    }
}

impl StoreCacheTagsChecksum {
    pub fn new(client: Arc<dyn StoreClient>, keys: StoreKeys) -> Self {
        Self { client, keys }
    }

    /// Reads the counters of `tags` missing from the unit of work's cache
    async fn fetch_uncached(&self, uow: &mut UnitOfWork, tags: &[String]) -> Result<(), CacheError> {
        let mut seen = HashSet::new();
        let missing: Vec<&String> = tags
            .iter()
            .filter(|tag| uow.cached_counter(tag).is_none() && seen.insert(tag.as_str()))
            .collect();

        if missing.is_empty() {
            return Ok(());
        }

        let keys: Vec<String> = missing.iter().map(|tag| self.keys.tag_key(tag)).collect();
        let values = self.client.multi_get(&keys).await?;

        if values.len() != missing.len() {
            return Err(CacheError::store(format!(
                "Expected {} tag counters, got {}",
                missing.len(),
                values.len()
            )));
        }

        for (tag, value) in missing.into_iter().zip(values) {
            let counter = match value {
                None => 0,
                Some(value) => value.parse::<i64>().map_err(|_| {
                    CacheError::contract(format!(
                        "Counter of tag '{}' is not an integer: '{}'",
                        tag, value
                    ))
                })?,
            };

            uow.cache_counter(tag, counter);
        }

        Ok(())
    }
}

#[async_trait]
impl CacheTagsChecksum for StoreCacheTagsChecksum {
    async fn get_current_checksum(
        &self,
        uow: &mut UnitOfWork,
        tags: &[String],
    ) -> Result<i64, CacheError> {
        for tag in tags {
            uow.clear_invalidated(tag);
        }

        self.calculate_checksum(uow, tags).await
    }

    async fn calculate_checksum(
        &self,
        uow: &mut UnitOfWork,
        tags: &[String],
    ) -> Result<i64, CacheError> {
        self.fetch_uncached(uow, tags).await?;

        Ok(tags
            .iter()
            .map(|tag| uow.cached_counter(tag).unwrap_or(0))
            .sum())
    }

    async fn invalidate_tags(
        &self,
        uow: &mut UnitOfWork,
        tags: &[String],
    ) -> Result<(), CacheError> {
        let mut invalidated = Vec::new();

        for tag in tags {
            if uow.mark_invalidated(tag) {
                uow.forget_counter(tag);
                invalidated.push(tag);
            }
        }

        if invalidated.is_empty() {
            return Ok(());
        }

        let ops: Vec<StoreOp> = invalidated
            .iter()
            .map(|tag| StoreOp::Increment {
                key: self.keys.tag_key(tag),
            })
            .collect();

        if let Err(e) = self.client.pipeline(&ops).await {
            // Let a retry in this unit of work increment again
            for tag in &invalidated {
                uow.clear_invalidated(tag);
            }
            return Err(e);
        }

        debug!(tags = ?invalidated, "Invalidated cache tags");
        record_tag_invalidation(invalidated.len());

        Ok(())
    }
}
