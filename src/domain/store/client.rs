//! Store client trait definition

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::domain::CacheError;

/// One operation queued in a pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOp {
    Get { key: String },
    HashGetAll { key: String },
    HashSetMultiple { key: String, fields: Vec<(String, String)> },
    Increment { key: String },
    Expire { key: String, seconds: i64 },
    Delete { keys: Vec<String> },
}

impl StoreOp {
    /// Whether the operation only reads a hash record
    pub fn reads_record(&self) -> bool {
        matches!(self, Self::HashGetAll { .. })
    }
}

/// Reply to one pipelined operation, in the order the operations were queued
#[derive(Debug, Clone, PartialEq)]
pub enum StoreReply {
    Value(Option<String>),
    Hash(HashMap<String, String>),
    Integer(i64),
    Bool(bool),
    Done,
}

impl StoreReply {
    /// Unwraps a hash reply
    pub fn into_hash(self) -> Result<HashMap<String, String>, CacheError> {
        match self {
            Self::Hash(fields) => Ok(fields),
            other => Err(CacheError::store(format!(
                "Expected a hash reply, got {:?}",
                other
            ))),
        }
    }
}

/// Connected handle to the key-value store
///
/// Every topology (single node, replicated, cluster, in-process) exposes the
/// same narrow operation surface. Pipelining is an optimization only: the
/// default `pipeline` issues the operations one by one and returns the same
/// ordered replies.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Name of the client implementation
    fn name(&self) -> &'static str;

    /// Reads a string value
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Writes a string value without expiration
    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;

    /// Reads several string values, one reply per key
    async fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<String>>, CacheError>;

    /// Writes several fields of a hash
    async fn hash_set_multiple(
        &self,
        key: &str,
        fields: &[(String, String)],
    ) -> Result<(), CacheError>;

    /// Reads every field of a hash; an absent key yields an empty map
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, CacheError>;

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, CacheError>;

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), CacheError>;

    /// Atomically increments an integer value, returning the new value
    async fn increment(&self, key: &str) -> Result<i64, CacheError>;

    /// Deletes keys, returning how many existed
    async fn delete_multiple(&self, keys: &[String]) -> Result<usize, CacheError>;

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let deleted = self.delete_multiple(&[key.to_string()]).await?;
        Ok(deleted > 0)
    }

    /// Sets a key's time to live; a non-positive value removes the key
    async fn expire(&self, key: &str, seconds: i64) -> Result<bool, CacheError>;

    /// Writes `value` only if `key` does not exist yet
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError>;

    /// Resets the time to live of `key` only while it still holds `value`
    async fn extend_if_owner(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError>;

    /// Deletes `key` only while it still holds `value`
    async fn delete_if_owner(&self, key: &str, value: &str) -> Result<bool, CacheError>;

    async fn sorted_set_add(&self, key: &str, score: f64, member: &str)
        -> Result<(), CacheError>;

    /// Counts sorted set members with a score of at least `min_score`
    async fn sorted_set_count(&self, key: &str, min_score: f64) -> Result<usize, CacheError>;

    /// Whether `pipeline` batches operations into one round-trip
    fn supports_pipeline(&self) -> bool {
        false
    }

    /// Executes operations in order, returning one reply per operation
    ///
    /// Pipelines are not transactional: a failure may leave earlier
    /// operations applied.
    async fn pipeline(&self, ops: &[StoreOp]) -> Result<Vec<StoreReply>, CacheError> {
        execute_sequentially(self, ops).await
    }
}

/// Runs pipelined operations one at a time against `client`
pub async fn execute_sequentially<C>(
    client: &C,
    ops: &[StoreOp],
) -> Result<Vec<StoreReply>, CacheError>
where
    C: StoreClient + ?Sized,
{
    let mut replies = Vec::with_capacity(ops.len());

    for op in ops {
        let reply = match op {
            StoreOp::Get { key } => StoreReply::Value(client.get(key).await?),
            StoreOp::HashGetAll { key } => StoreReply::Hash(client.hash_get_all(key).await?),
            StoreOp::HashSetMultiple { key, fields } => {
                client.hash_set_multiple(key, fields).await?;
                StoreReply::Done
            }
            StoreOp::Increment { key } => StoreReply::Integer(client.increment(key).await?),
            StoreOp::Expire { key, seconds } => {
                StoreReply::Bool(client.expire(key, *seconds).await?)
            }
            StoreOp::Delete { keys } => {
                StoreReply::Integer(client.delete_multiple(keys).await? as i64)
            }
        };
        replies.push(reply);
    }

    Ok(replies)
}
