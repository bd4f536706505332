//! Cache bin trait definition

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use super::entry::{CacheItem, CacheValue, CacheWrite, Expiry, MultipleLookup};
use crate::domain::checksum::UnitOfWork;
use crate::domain::CacheError;

/// Tag-invalidated cache bin
///
/// Every operation that consults tag checksums or the bin's delete-all
/// watermark takes the caller's [`UnitOfWork`], which holds the per-request
/// read caches.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Name of the bin
    fn bin(&self) -> &str;

    /// Reads one item; `allow_invalid` also returns expired or invalidated
    /// items with `valid == false`
    async fn get(
        &self,
        uow: &mut UnitOfWork,
        cid: &str,
        allow_invalid: bool,
    ) -> Result<Option<CacheItem>, CacheError> {
        let mut lookup = self
            .get_multiple(uow, &[cid.to_string()], allow_invalid)
            .await?;
        Ok(lookup.found.remove(cid))
    }

    /// Reads several items; ids without a usable item are returned in
    /// `missing`
    async fn get_multiple(
        &self,
        uow: &mut UnitOfWork,
        cids: &[String],
        allow_invalid: bool,
    ) -> Result<MultipleLookup, CacheError>;

    /// Stores an item with the current checksum of its tags
    async fn set(
        &self,
        uow: &mut UnitOfWork,
        cid: &str,
        data: CacheValue,
        expire: Expiry,
        tags: &[String],
    ) -> Result<(), CacheError>;

    async fn set_multiple(
        &self,
        uow: &mut UnitOfWork,
        items: Vec<CacheWrite>,
    ) -> Result<(), CacheError> {
        for item in items {
            self.set(uow, &item.cid, item.data, item.expire, &item.tags)
                .await?;
        }
        Ok(())
    }

    async fn delete(&self, cid: &str) -> Result<(), CacheError> {
        self.delete_multiple(&[cid.to_string()]).await
    }

    async fn delete_multiple(&self, cids: &[String]) -> Result<(), CacheError>;

    /// Treats every item written so far as absent, without enumerating keys
    async fn delete_all(&self, uow: &mut UnitOfWork) -> Result<(), CacheError>;

    /// Marks an item invalid without deleting it
    async fn invalidate(&self, cid: &str) -> Result<(), CacheError> {
        self.invalidate_multiple(&[cid.to_string()]).await
    }

    async fn invalidate_multiple(&self, cids: &[String]) -> Result<(), CacheError>;

    /// Invalidates every item of the bin through the bin tag
    async fn invalidate_all(&self, uow: &mut UnitOfWork) -> Result<(), CacheError>;

    async fn remove_bin(&self, uow: &mut UnitOfWork) -> Result<(), CacheError> {
        self.delete_all(uow).await
    }
}

/// Extension trait providing typed get/set operations
pub trait CacheBackendExt: CacheBackend {
    /// Reads a valid item and deserializes its data
    fn get_typed<'a, V>(
        &'a self,
        uow: &'a mut UnitOfWork,
        cid: &'a str,
    ) -> impl std::future::Future<Output = Result<Option<V>, CacheError>> + Send
    where
        V: DeserializeOwned + Send,
    {
        async move {
            let Some(item) = self.get(uow, cid, false).await? else {
                return Ok(None);
            };

            let value = match item.data {
                CacheValue::Text(text) => Value::String(text),
                CacheValue::Structured(value) => value,
            };

            let typed = serde_json::from_value(value).map_err(|e| {
                CacheError::serialization(format!(
                    "Failed to deserialize cache item '{}': {}",
                    cid, e
                ))
            })?;

            Ok(Some(typed))
        }
    }

    /// Serializes a value and stores it; strings are stored as plain text
    fn set_typed<'a, V>(
        &'a self,
        uow: &'a mut UnitOfWork,
        cid: &'a str,
        value: &'a V,
        expire: Expiry,
        tags: &'a [String],
    ) -> impl std::future::Future<Output = Result<(), CacheError>> + Send
    where
        V: Serialize + Sync,
    {
        async move {
            let value = serde_json::to_value(value).map_err(|e| {
                CacheError::serialization(format!(
                    "Failed to serialize cache item '{}': {}",
                    cid, e
                ))
            })?;

            let data = match value {
                Value::String(text) => CacheValue::Text(text),
                other => CacheValue::Structured(other),
            };

            self.set(uow, cid, data, expire, tags).await
        }
    }
}

// Blanket implementation for all types implementing CacheBackend
impl<T: CacheBackend + ?Sized> CacheBackendExt for T {}
