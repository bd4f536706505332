//! Store connection settings

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use serde::Deserialize;

use crate::domain::CacheError;

/// Store layout the client talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    /// One Redis node
    #[default]
    Single,
    /// A primary node plus read replicas
    Replicated,
    /// Redis Cluster
    Cluster,
    /// In-process store
    Memory,
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topology::Single => write!(f, "single"),
            Topology::Replicated => write!(f, "replicated"),
            Topology::Cluster => write!(f, "cluster"),
            Topology::Memory => write!(f, "memory"),
        }
    }
}

impl FromStr for Topology {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single" | "redis" => Ok(Topology::Single),
            "replicated" | "primary_replica" => Ok(Topology::Replicated),
            "cluster" => Ok(Topology::Cluster),
            "memory" | "in_memory" | "inmemory" => Ok(Topology::Memory),
            _ => Err(CacheError::configuration(format!(
                "Unknown store topology: {}. Valid topologies: single, replicated, cluster, memory",
                s
            ))),
        }
    }
}

/// Connection parameters, resolved once per process
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub topology: Topology,
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    /// Database index (single and replicated topologies)
    pub base: i64,
    /// Connect timeout in seconds
    pub timeout: f64,
    /// Response timeout in seconds
    pub read_timeout: f64,
    /// Keep one auto-reconnecting connection for the process lifetime
    pub persistent: bool,
    /// Cluster seed nodes as `host:port`
    pub seeds: Vec<String>,
    /// Selects a seed list from `clusters` when `seeds` is empty
    pub cluster_name: Option<String>,
    pub clusters: HashMap<String, Vec<String>>,
    /// Replica nodes as `host:port`
    pub replicas: Vec<String>,
    pub read_from_replicas: bool,
    /// Maximum number of keys kept by the in-process store
    pub max_capacity: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            topology: Topology::Single,
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            base: 0,
            timeout: 2.0,
            read_timeout: 1.5,
            persistent: false,
            seeds: Vec::new(),
            cluster_name: None,
            clusters: HashMap::new(),
            replicas: Vec::new(),
            read_from_replicas: false,
            max_capacity: 100_000,
        }
    }
}

impl ConnectionSettings {
    /// Settings for the in-process store
    pub fn memory() -> Self {
        Self {
            topology: Topology::Memory,
            ..Default::default()
        }
    }

    /// Settings for one node at `host:port`
    pub fn single(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    pub fn connect_timeout(&self) -> Result<Duration, CacheError> {
        seconds("timeout", self.timeout)
    }

    pub fn response_timeout(&self) -> Result<Duration, CacheError> {
        seconds("read_timeout", self.read_timeout)
    }

    /// Connection info of the configured primary node
    pub fn primary_info(&self) -> Result<ConnectionInfo, CacheError> {
        if self.host.is_empty() {
            return Err(CacheError::configuration("Store host must not be empty"));
        }

        Ok(self.node_info(self.host.clone(), self.port, self.base))
    }

    /// Connection info of every configured replica
    pub fn replica_infos(&self) -> Result<Vec<ConnectionInfo>, CacheError> {
        if self.replicas.is_empty() {
            return Err(CacheError::configuration(
                "The replicated topology needs at least one replica",
            ));
        }

        self.replicas
            .iter()
            .map(|node| {
                let (host, port) = parse_node(node)?;
                Ok(self.node_info(host, port, self.base))
            })
            .collect()
    }

    /// Cluster seed nodes: explicit seeds, else the named seed list, else
    /// the configured host
    pub fn cluster_seeds(&self) -> Result<Vec<ConnectionInfo>, CacheError> {
        let nodes = if !self.seeds.is_empty() {
            self.seeds.clone()
        } else if let Some(name) = &self.cluster_name {
            self.clusters.get(name).cloned().ok_or_else(|| {
                CacheError::configuration(format!("No seeds configured for cluster '{}'", name))
            })?
        } else {
            vec![format!("{}:{}", self.host, self.port)]
        };

        if nodes.is_empty() {
            return Err(CacheError::configuration("Cluster seed list is empty"));
        }

        nodes
            .iter()
            .map(|node| {
                let (host, port) = parse_node(node)?;
                Ok(self.node_info(host, port, 0))
            })
            .collect()
    }

    fn node_info(&self, host: String, port: u16, db: i64) -> ConnectionInfo {
        ConnectionInfo {
            addr: ConnectionAddr::Tcp(host, port),
            redis: RedisConnectionInfo {
                db,
                password: self.password.clone(),
                ..Default::default()
            },
        }
    }
}

/// Splits `host:port`
fn parse_node(node: &str) -> Result<(String, u16), CacheError> {
    let invalid = || {
        CacheError::configuration(format!(
            "Invalid store node '{}', expected host:port",
            node
        ))
    };

    let (host, port) = node.trim().rsplit_once(':').ok_or_else(invalid)?;

    if host.is_empty() {
        return Err(invalid());
    }

    let port = port.parse().map_err(|_| invalid())?;

    Ok((host.to_string(), port))
}

fn seconds(name: &str, value: f64) -> Result<Duration, CacheError> {
    Duration::try_from_secs_f64(value)
        .ok()
        .filter(|duration| !duration.is_zero())
        .ok_or_else(|| {
            CacheError::configuration(format!(
                "Store {} must be a positive number of seconds, got {}",
                name, value
            ))
        })
}
