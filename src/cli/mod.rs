//! CLI module for tagcache
//!
//! Every invocation is one unit of work against the configured store:
//! - cache commands read and write one bin
//! - `lock` manages persistent locks
//! - `flood` registers and checks flood events

pub mod cache;
pub mod flood;
pub mod lock;

use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::domain::store::{StoreClient, StoreKeys};
use crate::infrastructure::cache::CacheBackendFactory;
use crate::infrastructure::logging;
use crate::infrastructure::observability::init_metrics;
use crate::infrastructure::store::ClientFactory;

/// tagcache - Tag-invalidated cache bins on Redis
#[derive(Parser)]
#[command(name = "tagcache")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Cache bin the cache commands operate on
    #[arg(long, short, global = true, default_value = "default")]
    pub bin: String,

    /// Print collected metrics after the command
    #[arg(long, global = true)]
    pub metrics: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[command(flatten)]
    Cache(cache::CacheCommand),

    /// Manage persistent locks
    #[command(subcommand)]
    Lock(lock::LockCommand),

    /// Register and check flood events
    #[command(subcommand)]
    Flood(flood::FloodCommand),
}

/// Everything a command needs, built once per invocation
pub struct Context {
    pub config: AppConfig,
    pub client: Arc<dyn StoreClient>,
}

impl Context {
    pub fn keys(&self) -> StoreKeys {
        StoreKeys::new(self.config.cache.prefix.clone())
    }

    pub fn cache_factory(&self) -> CacheBackendFactory {
        CacheBackendFactory::new(self.client.clone(), self.config.cache.clone())
    }

    #[cfg(test)]
    pub(crate) fn in_memory() -> Self {
        Self {
            config: AppConfig::default(),
            client: Arc::new(crate::infrastructure::store::InMemoryStore::new()),
        }
    }
}

/// Loads configuration, connects to the store and runs the command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let mut config = AppConfig::load()?;
    config.metrics.enabled |= cli.metrics;

    logging::init_logging(&config.logging);
    let metrics = init_metrics(&config.metrics);

    let client = ClientFactory::new(config.store.clone()).client().await?;
    let context = Context { config, client };

    match cli.command {
        Command::Cache(command) => cache::run(&context, &cli.bin, command).await?,
        Command::Lock(command) => lock::run(&context, command).await?,
        Command::Flood(command) => flood::run(&context, command).await?,
    }

    if let Some(metrics) = metrics {
        eprintln!("{}", metrics.render());
    }

    Ok(())
}
