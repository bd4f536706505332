//! In-process store client using moka

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache as MokaCache;
use tokio::sync::Mutex;

use crate::domain::clock::unix_now_millis;
use crate::domain::store::StoreClient;
use crate::domain::CacheError;

const WRONG_TYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

#[derive(Debug, Clone, PartialEq)]
enum MemoryValue {
    Text(String),
    Hash(HashMap<String, String>),
    SortedSet(HashMap<String, f64>),
}

/// Value stored in moka
#[derive(Debug, Clone)]
struct MemoryEntry {
    value: MemoryValue,
    /// Expiration timestamp (millis since epoch)
    expires_at: Option<i64>,
}

impl MemoryEntry {
    fn persistent(value: MemoryValue) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

/// Store client keeping every key in process memory
///
/// Mirrors the store semantics the backends rely on: string, hash and sorted
/// set values, per-key expiration, atomic increments and conditional writes.
/// Intended for development and tests; nothing is shared between processes.
///
/// Only hash values (cache records) count against the capacity and may be
/// evicted, which reads as a miss. Strings and sorted sets hold tag counters,
/// delete-all watermarks, locks and flood events and are never evicted.
#[derive(Debug)]
pub struct InMemoryStore {
    records: MokaCache<String, MemoryEntry>,
    pinned: MokaCache<String, MemoryEntry>,
    /// Serializes read-modify-write operations
    write_lock: Mutex<()>,
}

impl InMemoryStore {
    /// Creates an in-memory store with default capacity
    pub fn new() -> Self {
        Self::with_capacity(100_000)
    }

    /// Creates an in-memory store holding at most `max_capacity` hash keys
    pub fn with_capacity(max_capacity: u64) -> Self {
        Self {
            records: MokaCache::builder().max_capacity(max_capacity).build(),
            pinned: MokaCache::builder().build(),
            write_lock: Mutex::new(()),
        }
    }

    /// Live entry for `key`; expired entries read as absent
    async fn live(&self, key: &str) -> Option<MemoryEntry> {
        let entry = match self.pinned.get(key).await {
            Some(entry) => Some(entry),
            None => self.records.get(key).await,
        };

        entry.filter(|entry| !entry.is_expired(unix_now_millis()))
    }

    async fn put(&self, key: &str, entry: MemoryEntry) {
        let (target, other) = match entry.value {
            MemoryValue::Hash(_) => (&self.records, &self.pinned),
            MemoryValue::Text(_) | MemoryValue::SortedSet(_) => (&self.pinned, &self.records),
        };

        other.invalidate(key).await;
        target.insert(key.to_string(), entry).await;
    }

    async fn remove(&self, key: &str) -> Option<MemoryEntry> {
        let pinned = self.pinned.remove(key).await;
        let record = self.records.remove(key).await;
        pinned.or(record)
    }

    async fn text(&self, key: &str) -> Result<Option<String>, CacheError> {
        match self.live(key).await.map(|entry| entry.value) {
            None => Ok(None),
            Some(MemoryValue::Text(text)) => Ok(Some(text)),
            Some(_) => Err(wrong_type(key)),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn wrong_type(key: &str) -> CacheError {
    CacheError::store(format!("{} (key '{}')", WRONG_TYPE, key))
}

fn expires_in(ttl: Duration) -> i64 {
    let millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX).max(1);
    unix_now_millis().saturating_add(millis)
}

#[async_trait]
impl StoreClient for InMemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.text(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let _guard = self.write_lock.lock().await;

        self.put(key, MemoryEntry::persistent(MemoryValue::Text(value.to_string())))
            .await;
        Ok(())
    }

    async fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<String>>, CacheError> {
        let mut values = Vec::with_capacity(keys.len());

        for key in keys {
            // MGET reads keys of another type as nil
            let value = match self.live(key).await.map(|entry| entry.value) {
                Some(MemoryValue::Text(text)) => Some(text),
                _ => None,
            };
            values.push(value);
        }

        Ok(values)
    }

    async fn hash_set_multiple(
        &self,
        key: &str,
        fields: &[(String, String)],
    ) -> Result<(), CacheError> {
        let _guard = self.write_lock.lock().await;

        let mut entry = match self.live(key).await {
            Some(entry) => entry,
            None => MemoryEntry::persistent(MemoryValue::Hash(HashMap::new())),
        };

        let MemoryValue::Hash(hash) = &mut entry.value else {
            return Err(wrong_type(key));
        };

        hash.extend(fields.iter().cloned());

        self.put(key, entry).await;
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, CacheError> {
        match self.live(key).await.map(|entry| entry.value) {
            None => Ok(HashMap::new()),
            Some(MemoryValue::Hash(hash)) => Ok(hash),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, CacheError> {
        let mut hash = self.hash_get_all(key).await?;
        Ok(hash.remove(field))
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), CacheError> {
        self.hash_set_multiple(key, &[(field.to_string(), value.to_string())])
            .await
    }

    async fn increment(&self, key: &str) -> Result<i64, CacheError> {
        let _guard = self.write_lock.lock().await;

        let (current, expires_at) = match self.live(key).await {
            None => (0, None),
            Some(MemoryEntry {
                value: MemoryValue::Text(text),
                expires_at,
            }) => {
                let current = text.parse::<i64>().map_err(|_| {
                    CacheError::store(format!(
                        "Value of key '{}' is not an integer or out of range",
                        key
                    ))
                })?;
                (current, expires_at)
            }
            Some(_) => return Err(wrong_type(key)),
        };

        let next = current.checked_add(1).ok_or_else(|| {
            CacheError::store(format!("Increment of key '{}' would overflow", key))
        })?;

        self.put(
            key,
            MemoryEntry {
                value: MemoryValue::Text(next.to_string()),
                expires_at,
            },
        )
        .await;

        Ok(next)
    }

    async fn delete_multiple(&self, keys: &[String]) -> Result<usize, CacheError> {
        let _guard = self.write_lock.lock().await;

        let mut deleted = 0;
        let now = unix_now_millis();

        for key in keys {
            if let Some(entry) = self.remove(key).await {
                if !entry.is_expired(now) {
                    deleted += 1;
                }
            }
        }

        Ok(deleted)
    }

    async fn expire(&self, key: &str, seconds: i64) -> Result<bool, CacheError> {
        let _guard = self.write_lock.lock().await;

        let Some(mut entry) = self.live(key).await else {
            return Ok(false);
        };

        if seconds <= 0 {
            self.remove(key).await;
            return Ok(true);
        }

        entry.expires_at = Some(unix_now_millis().saturating_add(seconds.saturating_mul(1000)));
        self.put(key, entry).await;

        Ok(true)
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let _guard = self.write_lock.lock().await;

        if self.live(key).await.is_some() {
            return Ok(false);
        }

        self.put(
            key,
            MemoryEntry {
                value: MemoryValue::Text(value.to_string()),
                expires_at: Some(expires_in(ttl)),
            },
        )
        .await;

        Ok(true)
    }

    async fn extend_if_owner(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let _guard = self.write_lock.lock().await;

        match self.live(key).await {
            Some(mut entry) if entry.value == MemoryValue::Text(value.to_string()) => {
                entry.expires_at = Some(expires_in(ttl));
                self.put(key, entry).await;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_if_owner(&self, key: &str, value: &str) -> Result<bool, CacheError> {
        let _guard = self.write_lock.lock().await;

        match self.live(key).await {
            Some(entry) if entry.value == MemoryValue::Text(value.to_string()) => {
                self.remove(key).await;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn sorted_set_add(
        &self,
        key: &str,
        score: f64,
        member: &str,
    ) -> Result<(), CacheError> {
        let _guard = self.write_lock.lock().await;

        let mut entry = match self.live(key).await {
            Some(entry) => entry,
            None => MemoryEntry::persistent(MemoryValue::SortedSet(HashMap::new())),
        };

        let MemoryValue::SortedSet(members) = &mut entry.value else {
            return Err(wrong_type(key));
        };

        members.insert(member.to_string(), score);

        self.put(key, entry).await;
        Ok(())
    }

    async fn sorted_set_count(&self, key: &str, min_score: f64) -> Result<usize, CacheError> {
        match self.live(key).await.map(|entry| entry.value) {
            None => Ok(0),
            Some(MemoryValue::SortedSet(members)) => {
                Ok(members.values().filter(|score| **score >= min_score).count())
            }
            Some(_) => Err(wrong_type(key)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::store::{StoreOp, StoreReply};

    #[tokio::test]
    async fn test_set_and_get() {
        let store = InMemoryStore::new();

        store.set("key1", "value1").await.unwrap();

        assert_eq!(store.get("key1").await.unwrap(), Some("value1".to_string()));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_multi_get_keeps_order() {
        let store = InMemoryStore::new();
        store.set("a", "1").await.unwrap();
        store.set("c", "3").await.unwrap();

        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let values = store.multi_get(&keys).await.unwrap();

        assert_eq!(values, vec![Some("1".to_string()), None, Some("3".to_string())]);
    }

    #[tokio::test]
    async fn test_hash_fields_merge() {
        let store = InMemoryStore::new();

        store
            .hash_set_multiple("h", &[("a".to_string(), "1".to_string())])
            .await
            .unwrap();
        store.hash_set("h", "b", "2").await.unwrap();

        let hash = store.hash_get_all("h").await.unwrap();
        assert_eq!(hash.len(), 2);
        assert_eq!(store.hash_get("h", "b").await.unwrap(), Some("2".to_string()));
        assert!(store.hash_get_all("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_increment_starts_at_one() {
        let store = InMemoryStore::new();

        assert_eq!(store.increment("counter").await.unwrap(), 1);
        assert_eq!(store.increment("counter").await.unwrap(), 2);
        assert_eq!(store.get("counter").await.unwrap(), Some("2".to_string()));
    }

    #[tokio::test]
    async fn test_increment_rejects_non_integer() {
        let store = InMemoryStore::new();
        store.set("text", "abc").await.unwrap();

        let error = store.increment("text").await.unwrap_err();
        assert!(error.is_store_error());
    }

    #[tokio::test]
    async fn test_wrong_type_is_store_error() {
        let store = InMemoryStore::new();
        store.hash_set("h", "a", "1").await.unwrap();

        assert!(store.get("h").await.unwrap_err().is_store_error());
        assert!(store.increment("h").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_counts_existing_keys() {
        let store = InMemoryStore::new();
        store.set("a", "1").await.unwrap();
        store.set("b", "2").await.unwrap();

        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(store.delete_multiple(&keys).await.unwrap(), 2);
        assert_eq!(store.get("a").await.unwrap(), None);
        assert!(!store.delete("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_non_positive_expire_removes_key() {
        let store = InMemoryStore::new();
        store.set("a", "1").await.unwrap();

        assert!(store.expire("a", 0).await.unwrap());
        assert_eq!(store.get("a").await.unwrap(), None);
        assert!(!store.expire("a", 10).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_key_reads_as_absent() {
        let store = InMemoryStore::new();
        store
            .set_if_absent("lock", "owner", Duration::from_millis(20))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(store.get("lock").await.unwrap(), None);
        assert!(store
            .set_if_absent("lock", "other", Duration::from_secs(5))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_huge_ttl_does_not_expire_immediately() {
        let store = InMemoryStore::new();

        assert!(store
            .set_if_absent("lock", "a", Duration::from_millis(u64::MAX))
            .await
            .unwrap());
        assert_eq!(store.get("lock").await.unwrap(), Some("a".to_string()));
    }

    #[tokio::test]
    async fn test_conditional_writes_check_owner() {
        let store = InMemoryStore::new();
        let ttl = Duration::from_secs(5);

        assert!(store.set_if_absent("lock", "a", ttl).await.unwrap());
        assert!(!store.set_if_absent("lock", "b", ttl).await.unwrap());

        assert!(!store.extend_if_owner("lock", "b", ttl).await.unwrap());
        assert!(store.extend_if_owner("lock", "a", ttl).await.unwrap());

        assert!(!store.delete_if_owner("lock", "b").await.unwrap());
        assert!(store.delete_if_owner("lock", "a").await.unwrap());
        assert_eq!(store.get("lock").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sorted_set_count() {
        let store = InMemoryStore::new();

        store.sorted_set_add("events", 10.0, "a").await.unwrap();
        store.sorted_set_add("events", 20.0, "b").await.unwrap();
        store.sorted_set_add("events", 30.0, "c").await.unwrap();

        assert_eq!(store.sorted_set_count("events", 20.0).await.unwrap(), 2);
        assert_eq!(store.sorted_set_count("missing", 0.0).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_pipeline_runs_sequentially() {
        let store = InMemoryStore::new();
        assert!(!store.supports_pipeline());

        let replies = store
            .pipeline(&[
                StoreOp::Increment { key: "t".into() },
                StoreOp::Increment { key: "t".into() },
                StoreOp::Expire { key: "t".into(), seconds: 60 },
                StoreOp::Get { key: "t".into() },
            ])
            .await
            .unwrap();

        assert_eq!(
            replies,
            vec![
                StoreReply::Integer(1),
                StoreReply::Integer(2),
                StoreReply::Bool(true),
                StoreReply::Value(Some("2".to_string())),
            ]
        );
    }

    #[tokio::test]
    async fn test_capacity_never_evicts_counters() {
        let store = InMemoryStore::with_capacity(2);

        store.increment("cachetags:node:5").await.unwrap();
        store.set("page:_last_delete_all", "1700000000.000001").await.unwrap();

        for index in 0..50 {
            let key = format!("page:item-{}", index);
            store.hash_set(&key, "cid", &index.to_string()).await.unwrap();
        }
        store.records.run_pending_tasks().await;

        assert_eq!(store.get("cachetags:node:5").await.unwrap(), Some("1".to_string()));
        assert_eq!(
            store.get("page:_last_delete_all").await.unwrap(),
            Some("1700000000.000001".to_string())
        );
    }

    #[tokio::test]
    async fn test_set_replaces_hash_value() {
        let store = InMemoryStore::new();
        store.hash_set("k", "a", "1").await.unwrap();

        store.set("k", "plain").await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), Some("plain".to_string()));
        assert_eq!(store.delete_multiple(&["k".to_string()]).await.unwrap(), 1);
        assert!(store.hash_get_all("k").await.unwrap().is_empty());
    }
}
