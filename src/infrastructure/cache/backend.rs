//! Cache bin backed by store hashes

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::domain::cache::{
    bin_tag, normalize_tags, CacheBackend, CacheItem, CacheRecord, CacheValue, Expiry,
    MultipleLookup, StoredData, VALID_FIELD,
};
use crate::domain::checksum::{CacheTagsChecksum, UnitOfWork};
use crate::domain::clock::{precise_now, unix_now};
use crate::domain::serialization::Serializer;
use crate::domain::store::{StoreClient, StoreKeys, StoreOp, StoreReply};
use crate::domain::CacheError;
use crate::infrastructure::observability::{
    record_cache_delete, record_cache_lookup, record_cache_write, LookupOutcome,
};

/// One cache bin stored as `<prefix>:<bin>:<cid>` hashes
///
/// Records are validated on read against:
/// - their expiration
/// - the current checksum of their tags
/// - the bin's delete-all watermark
pub struct StoreCacheBackend {
    bin: String,
    bin_tag: String,
    client: Arc<dyn StoreClient>,
    checksum: Arc<dyn CacheTagsChecksum>,
    serializer: Arc<dyn Serializer>,
    keys: StoreKeys,
    permanent_ttl: Duration,
}

impl fmt::Debug for StoreCacheBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreCacheBackend")
            .field("bin", &self.bin)
            .field("client", &self.client.name())
            .field("serializer", &self.serializer)
            .field("keys", &self.keys)
            .field("permanent_ttl", &self.permanent_ttl)
            .finish()
    }
}

impl StoreCacheBackend {
    pub fn new(
        bin: impl Into<String>,
        client: Arc<dyn StoreClient>,
        checksum: Arc<dyn CacheTagsChecksum>,
        serializer: Arc<dyn Serializer>,
        keys: StoreKeys,
        permanent_ttl: Duration,
    ) -> Self {
        let bin = bin.into();

        Self {
            bin_tag: bin_tag(&bin),
            bin,
            client,
            checksum,
            serializer,
            keys,
            permanent_ttl,
        }
    }

    /// TTL applied to permanent items
    pub fn permanent_ttl(&self) -> Duration {
        self.permanent_ttl
    }

    fn key(&self, cid: &str) -> String {
        self.keys.cache_key(&self.bin, cid)
    }

    /// The bin's delete-all watermark, read once per unit of work
    async fn last_delete_all(&self, uow: &mut UnitOfWork) -> Result<Option<f64>, CacheError> {
        if let Some(watermark) = uow.watermark(&self.bin) {
            return Ok(watermark);
        }

        let key = self.keys.last_delete_all_key(&self.bin);

        let watermark = match self.client.get(&key).await? {
            None => None,
            Some(value) => {
                let timestamp: f64 = value.parse().map_err(|_| {
                    CacheError::contract(format!(
                        "Delete-all watermark of bin '{}' is malformed: '{}'",
                        self.bin, value
                    ))
                })?;
                (timestamp > 0.0).then_some(timestamp)
            }
        };

        uow.record_watermark(&self.bin, watermark);
        Ok(watermark)
    }

    /// Reads the raw hashes of `keys`, one per key
    async fn fetch(&self, keys: &[String]) -> Result<Vec<HashMap<String, String>>, CacheError> {
        if let [key] = keys {
            return Ok(vec![self.client.hash_get_all(key).await?]);
        }

        let ops: Vec<StoreOp> = keys
            .iter()
            .map(|key| StoreOp::HashGetAll { key: key.clone() })
            .collect();

        let hashes = self
            .client
            .pipeline(&ops)
            .await?
            .into_iter()
            .map(StoreReply::into_hash)
            .collect::<Result<Vec<_>, _>>()?;

        if hashes.len() != keys.len() {
            return Err(CacheError::store(format!(
                "Expected {} cache records, got {}",
                keys.len(),
                hashes.len()
            )));
        }

        Ok(hashes)
    }

    /// Checks a stored record and decodes it
    ///
    /// Returns `None` when the record is not usable for this read.
    async fn expand_entry(
        &self,
        uow: &mut UnitOfWork,
        record: CacheRecord,
        allow_invalid: bool,
    ) -> Result<Option<CacheItem>, CacheError> {
        // An explicitly invalidated record is not checked any further
        let mut valid = record.valid;

        if valid {
            valid = record.expire.is_live_at(unix_now());

            if valid {
                valid = self
                    .checksum
                    .is_valid(uow, record.checksum, &record.tags)
                    .await?;
            }
        }

        if let Some(watermark) = self.last_delete_all(uow).await? {
            if record.created < watermark {
                return Ok(None);
            }
        }

        if !allow_invalid && !valid {
            return Ok(None);
        }

        let data = match record.data {
            StoredData::Raw(text) => CacheValue::Text(text),
            StoredData::Encoded { bytes, .. } => {
                CacheValue::Structured(self.serializer.decode(&bytes)?)
            }
        };

        Ok(Some(CacheItem {
            cid: record.cid,
            data,
            created: record.created,
            expire: record.expire,
            tags: record.tags,
            checksum: record.checksum,
            valid,
        }))
    }

    fn encode(&self, data: CacheValue) -> Result<StoredData, CacheError> {
        match data {
            CacheValue::Text(text) => Ok(StoredData::Raw(text)),
            CacheValue::Structured(value) => Ok(StoredData::Encoded {
                bytes: self.serializer.encode(&value)?,
                codec: self.serializer.codec(),
            }),
        }
    }
}

/// Whether a stored `valid` field marks the record valid
fn is_truthy(flag: &str) -> bool {
    !flag.is_empty() && flag != "0"
}

#[async_trait]
impl CacheBackend for StoreCacheBackend {
    fn bin(&self) -> &str {
        &self.bin
    }

    async fn get_multiple(
        &self,
        uow: &mut UnitOfWork,
        cids: &[String],
        allow_invalid: bool,
    ) -> Result<MultipleLookup, CacheError> {
        if cids.is_empty() {
            return Ok(MultipleLookup::default());
        }

        let keys: Vec<String> = cids.iter().map(|cid| self.key(cid)).collect();
        let hashes = self.fetch(&keys).await?;

        let mut found = HashMap::with_capacity(cids.len());

        for fields in hashes {
            let Some(record) = CacheRecord::from_fields(fields, self.serializer.codec())? else {
                continue;
            };

            if let Some(item) = self.expand_entry(uow, record, allow_invalid).await? {
                found.insert(item.cid.clone(), item);
            }
        }

        let missing: Vec<String> = cids
            .iter()
            .filter(|cid| !found.contains_key(cid.as_str()))
            .cloned()
            .collect();

        for cid in cids {
            let outcome = match found.get(cid) {
                Some(item) if item.valid => LookupOutcome::Hit,
                Some(_) => LookupOutcome::Invalid,
                None => LookupOutcome::Miss,
            };
            record_cache_lookup(&self.bin, outcome);
        }

        debug!(
            bin = %self.bin,
            requested = cids.len(),
            found = found.len(),
            "Cache lookup"
        );

        Ok(MultipleLookup { found, missing })
    }

    async fn set(
        &self,
        uow: &mut UnitOfWork,
        cid: &str,
        data: CacheValue,
        expire: Expiry,
        tags: &[String],
    ) -> Result<(), CacheError> {
        let tags = normalize_tags(tags, &self.bin_tag)?;
        let ttl = expire.ttl_at(unix_now(), self.permanent_ttl);
        let key = self.key(cid);

        // Never leave an already expired item readable
        if ttl <= 0 {
            self.client.delete(&key).await?;
        }

        let record = CacheRecord {
            cid: cid.to_string(),
            data: self.encode(data)?,
            created: precise_now(),
            expire,
            checksum: self.checksum.get_current_checksum(uow, &tags).await?,
            tags,
            valid: true,
        };

        self.client
            .pipeline(&[
                StoreOp::HashSetMultiple {
                    key: key.clone(),
                    fields: record.to_fields(),
                },
                StoreOp::Expire { key, seconds: ttl },
            ])
            .await?;

        debug!(bin = %self.bin, cid, ttl, checksum = record.checksum, "Stored cache item");
        record_cache_write(&self.bin);

        Ok(())
    }

    async fn delete_multiple(&self, cids: &[String]) -> Result<(), CacheError> {
        if cids.is_empty() {
            return Ok(());
        }

        let keys: Vec<String> = cids.iter().map(|cid| self.key(cid)).collect();
        let deleted = self.client.delete_multiple(&keys).await?;

        debug!(bin = %self.bin, requested = cids.len(), deleted, "Deleted cache items");
        record_cache_delete(&self.bin, deleted);

        Ok(())
    }

    async fn delete_all(&self, uow: &mut UnitOfWork) -> Result<(), CacheError> {
        // No item written before the watermark may share its timestamp
        tokio::time::sleep(Duration::from_millis(1)).await;

        let watermark = precise_now();
        let key = self.keys.last_delete_all_key(&self.bin);

        self.client.set(&key, &format!("{:.6}", watermark)).await?;
        uow.record_watermark(&self.bin, Some(watermark));

        info!(bin = %self.bin, watermark, "Deleted all cache items");

        Ok(())
    }

    async fn invalidate_multiple(&self, cids: &[String]) -> Result<(), CacheError> {
        let mut seen = HashSet::new();

        for cid in cids.iter().filter(|cid| seen.insert(cid.as_str())) {
            let key = self.key(cid);

            let is_valid = self
                .client
                .hash_get(&key, VALID_FIELD)
                .await?
                .is_some_and(|flag| is_truthy(&flag));

            if is_valid {
                self.client.hash_set(&key, VALID_FIELD, "0").await?;
                debug!(bin = %self.bin, cid = %cid, "Invalidated cache item");
            }
        }

        Ok(())
    }

    async fn invalidate_all(&self, uow: &mut UnitOfWork) -> Result<(), CacheError> {
        self.checksum
            .invalidate_tags(uow, std::slice::from_ref(&self.bin_tag))
            .await?;

        info!(bin = %self.bin, "Invalidated all cache items");

        Ok(())
    }
}
