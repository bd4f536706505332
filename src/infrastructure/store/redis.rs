//! Redis store client for the single-node and cluster topologies

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::try_join_all;
use redis::aio::ConnectionLike;
use redis::cluster::ClusterClientBuilder;
use redis::cluster_async::ClusterConnection;
use redis::{AsyncCommands, RedisError, Script};

use super::connection::{connect_node, NodeConnection};
use super::settings::ConnectionSettings;
use crate::domain::store::{StoreClient, StoreOp, StoreReply};
use crate::domain::CacheError;

const EXTEND_IF_OWNER: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("PEXPIRE", KEYS[1], ARGV[2])
end
return 0
"#;

const DELETE_IF_OWNER: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

/// How multi-key operations reach the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    /// Every key lives on one node: multi-key commands and pipelines are used
    SingleNode,
    /// Keys hash to different nodes: multi-key operations are split into
    /// concurrent per-key commands and pipelines run sequentially
    Sharded,
}

/// Redis store client over any async connection
pub struct RedisStore<C> {
    connection: C,
    routing: Routing,
    name: &'static str,
    extend_script: Script,
    delete_script: Script,
}

impl<C> fmt::Debug for RedisStore<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("name", &self.name)
            .field("routing", &self.routing)
            .field("connection", &"<Connection>")
            .finish()
    }
}

impl<C> RedisStore<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    /// Wraps an established connection
    pub fn new(connection: C, routing: Routing, name: &'static str) -> Self {
        Self {
            connection,
            routing,
            name,
            extend_script: Script::new(EXTEND_IF_OWNER),
            delete_script: Script::new(DELETE_IF_OWNER),
        }
    }

    pub fn routing(&self) -> Routing {
        self.routing
    }

    fn connection(&self) -> C {
        self.connection.clone()
    }
}

impl RedisStore<NodeConnection> {
    /// Connects to the single node described by `settings`
    pub async fn connect(settings: &ConnectionSettings) -> Result<Self, CacheError> {
        let connection = connect_node(
            settings.primary_info()?,
            settings.persistent,
            settings.connect_timeout()?,
            settings.response_timeout()?,
        )
        .await?;

        Ok(Self::new(connection, Routing::SingleNode, "redis"))
    }
}

impl RedisStore<ClusterConnection> {
    /// Connects to the cluster reachable through the configured seeds
    pub async fn connect_cluster(settings: &ConnectionSettings) -> Result<Self, CacheError> {
        let seeds = settings.cluster_seeds()?;
        let seed_count = seeds.len();

        let mut builder = ClusterClientBuilder::new(seeds)
            .connection_timeout(settings.connect_timeout()?)
            .response_timeout(settings.response_timeout()?);

        if let Some(password) = &settings.password {
            builder = builder.password(password.clone());
        }

        let client = builder.build().map_err(|e| {
            CacheError::configuration(format!("Failed to create Redis cluster client: {}", e))
        })?;

        let connection = client.get_async_connection().await.map_err(|e| {
            CacheError::configuration(format!("Failed to connect to Redis cluster: {}", e))
        })?;

        tracing::info!(seeds = seed_count, "Connected to Redis cluster");

        Ok(Self::new(connection, Routing::Sharded, "redis-cluster"))
    }
}

fn op_error(action: &str, key: &str, e: RedisError) -> CacheError {
    CacheError::store(format!("Failed to {} key '{}': {}", action, key, e))
}

fn millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn to_reply(op: &StoreOp, value: redis::Value) -> Result<StoreReply, RedisError> {
    Ok(match op {
        StoreOp::Get { .. } => StoreReply::Value(redis::from_redis_value(&value)?),
        StoreOp::HashGetAll { .. } => StoreReply::Hash(redis::from_redis_value(&value)?),
        StoreOp::HashSetMultiple { .. } => StoreReply::Done,
        StoreOp::Increment { .. } => StoreReply::Integer(redis::from_redis_value(&value)?),
        StoreOp::Expire { .. } => StoreReply::Bool(redis::from_redis_value(&value)?),
        StoreOp::Delete { .. } => StoreReply::Integer(redis::from_redis_value(&value)?),
    })
}

#[async_trait]
impl<C> StoreClient for RedisStore<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection();

        conn.get(key).await.map_err(|e| op_error("get", key, e))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let mut conn = self.connection();

        conn.set::<_, _, ()>(key, value)
            .await
            .map_err(|e| op_error("set", key, e))
    }

    async fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<String>>, CacheError> {
        match keys {
            [] => Ok(Vec::new()),
            [key] => Ok(vec![self.get(key).await?]),
            _ if self.routing == Routing::Sharded => {
                try_join_all(keys.iter().map(|key| self.get(key))).await
            }
            _ => {
                let mut conn = self.connection();

                redis::cmd("MGET")
                    .arg(keys)
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| {
                        CacheError::store(format!("Failed to get {} keys: {}", keys.len(), e))
                    })
            }
        }
    }

    async fn hash_set_multiple(
        &self,
        key: &str,
        fields: &[(String, String)],
    ) -> Result<(), CacheError> {
        if fields.is_empty() {
            return Ok(());
        }

        let mut conn = self.connection();

        conn.hset_multiple::<_, _, _, ()>(key, fields)
            .await
            .map_err(|e| op_error("write hash", key, e))
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, CacheError> {
        let mut conn = self.connection();

        conn.hgetall(key)
            .await
            .map_err(|e| op_error("read hash", key, e))
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection();

        conn.hget(key, field)
            .await
            .map_err(|e| op_error("read hash field of", key, e))
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), CacheError> {
        let mut conn = self.connection();

        conn.hset::<_, _, _, ()>(key, field, value)
            .await
            .map_err(|e| op_error("write hash field of", key, e))
    }

    async fn increment(&self, key: &str) -> Result<i64, CacheError> {
        let mut conn = self.connection();

        conn.incr(key, 1)
            .await
            .map_err(|e| op_error("increment", key, e))
    }

    async fn delete_multiple(&self, keys: &[String]) -> Result<usize, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }

        if self.routing == Routing::Sharded && keys.len() > 1 {
            let deleted = try_join_all(keys.iter().map(|key| async move {
                let mut conn = self.connection();
                conn.del::<_, usize>(key.as_str())
                    .await
                    .map_err(|e| op_error("delete", key, e))
            }))
            .await?;

            return Ok(deleted.into_iter().sum());
        }

        let mut conn = self.connection();

        conn.del(keys).await.map_err(|e| {
            CacheError::store(format!("Failed to delete {} keys: {}", keys.len(), e))
        })
    }

    async fn expire(&self, key: &str, seconds: i64) -> Result<bool, CacheError> {
        let mut conn = self.connection();

        conn.expire(key, seconds)
            .await
            .map_err(|e| op_error("set expiration of", key, e))
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let mut conn = self.connection();

        // SET NX PX replies OK when written and nil when the key existed
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|e| op_error("set_if_absent", key, e))?;

        Ok(result.is_some())
    }

    async fn extend_if_owner(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let mut conn = self.connection();

        let extended: i64 = self
            .extend_script
            .key(key)
            .arg(value)
            .arg(millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| op_error("extend", key, e))?;

        Ok(extended == 1)
    }

    async fn delete_if_owner(&self, key: &str, value: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection();

        let deleted: i64 = self
            .delete_script
            .key(key)
            .arg(value)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| op_error("release", key, e))?;

        Ok(deleted == 1)
    }

    async fn sorted_set_add(
        &self,
        key: &str,
        score: f64,
        member: &str,
    ) -> Result<(), CacheError> {
        let mut conn = self.connection();

        conn.zadd::<_, _, _, ()>(key, member, score)
            .await
            .map_err(|e| op_error("add to sorted set", key, e))
    }

    async fn sorted_set_count(&self, key: &str, min_score: f64) -> Result<usize, CacheError> {
        let mut conn = self.connection();

        conn.zcount(key, min_score, "+inf")
            .await
            .map_err(|e| op_error("count sorted set", key, e))
    }

    fn supports_pipeline(&self) -> bool {
        self.routing == Routing::SingleNode
    }

    async fn pipeline(&self, ops: &[StoreOp]) -> Result<Vec<StoreReply>, CacheError> {
        if !self.supports_pipeline() {
            return crate::domain::store::execute_sequentially(self, ops).await;
        }

        if ops.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();

        for op in ops {
            match op {
                StoreOp::Get { key } => {
                    pipe.get(key);
                }
                StoreOp::HashGetAll { key } => {
                    pipe.hgetall(key);
                }
                StoreOp::HashSetMultiple { key, fields } => {
                    pipe.hset_multiple(key, fields);
                }
                StoreOp::Increment { key } => {
                    pipe.incr(key, 1);
                }
                StoreOp::Expire { key, seconds } => {
                    pipe.expire(key, *seconds);
                }
                StoreOp::Delete { keys } => {
                    pipe.del(keys);
                }
            }
        }

        let mut conn = self.connection();

        let values: Vec<redis::Value> = pipe.query_async(&mut conn).await.map_err(|e| {
            CacheError::store(format!("Failed to execute pipeline of {} ops: {}", ops.len(), e))
        })?;

        if values.len() != ops.len() {
            return Err(CacheError::store(format!(
                "Pipeline returned {} replies for {} ops",
                values.len(),
                ops.len()
            )));
        }

        ops.iter()
            .zip(values)
            .map(|(op, value)| {
                to_reply(op, value).map_err(|e| {
                    CacheError::store(format!("Unexpected pipeline reply for {:?}: {}", op, e))
                })
            })
            .collect()
    }
}
