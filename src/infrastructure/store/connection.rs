//! Connections to a single Redis node

use std::fmt;
use std::time::Duration;

use redis::aio::{ConnectionLike, ConnectionManager, ConnectionManagerConfig, MultiplexedConnection};
use redis::{AsyncConnectionConfig, Client, Cmd, ConnectionInfo, Pipeline, RedisFuture, Value};

use crate::domain::CacheError;

/// Connection to one node, either auto-reconnecting or plain multiplexed
#[derive(Clone)]
pub enum NodeConnection {
    /// Reconnects on failure; kept for the process lifetime
    Managed(ConnectionManager),
    Multiplexed(MultiplexedConnection),
}

impl fmt::Debug for NodeConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Managed(_) => f.write_str("NodeConnection::Managed"),
            Self::Multiplexed(_) => f.write_str("NodeConnection::Multiplexed"),
        }
    }
}

impl ConnectionLike for NodeConnection {
    fn req_packed_command<'a>(&'a mut self, cmd: &'a Cmd) -> RedisFuture<'a, Value> {
        match self {
            Self::Managed(connection) => connection.req_packed_command(cmd),
            Self::Multiplexed(connection) => connection.req_packed_command(cmd),
        }
    }

    fn req_packed_commands<'a>(
        &'a mut self,
        cmd: &'a Pipeline,
        offset: usize,
        count: usize,
    ) -> RedisFuture<'a, Vec<Value>> {
        match self {
            Self::Managed(connection) => connection.req_packed_commands(cmd, offset, count),
            Self::Multiplexed(connection) => connection.req_packed_commands(cmd, offset, count),
        }
    }

    fn get_db(&self) -> i64 {
        match self {
            Self::Managed(connection) => connection.get_db(),
            Self::Multiplexed(connection) => connection.get_db(),
        }
    }
}

/// Opens a connection to one node
///
/// Failing to connect is a configuration error: the store is unusable and
/// the connection is not retried here.
pub async fn connect_node(
    info: ConnectionInfo,
    persistent: bool,
    connect_timeout: Duration,
    response_timeout: Duration,
) -> Result<NodeConnection, CacheError> {
    let address = info.addr.to_string();

    let client = Client::open(info).map_err(|e| {
        CacheError::configuration(format!("Failed to create Redis client for {}: {}", address, e))
    })?;

    let connection = if persistent {
        let config = ConnectionManagerConfig::new()
            .set_connection_timeout(connect_timeout)
            .set_response_timeout(response_timeout);

        ConnectionManager::new_with_config(client, config)
            .await
            .map(NodeConnection::Managed)
    } else {
        let config = AsyncConnectionConfig::new()
            .set_connection_timeout(connect_timeout)
            .set_response_timeout(response_timeout);

        client
            .get_multiplexed_async_connection_with_config(&config)
            .await
            .map(NodeConnection::Multiplexed)
    };

    let connection = connection.map_err(|e| {
        CacheError::configuration(format!("Failed to connect to Redis at {}: {}", address, e))
    })?;

    tracing::info!(address = %address, persistent, "Connected to Redis node");

    Ok(connection)
}
