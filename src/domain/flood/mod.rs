//! Flood domain - Event counting within a time window

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::CacheError;

/// Limits how often an event may happen per identifier
#[async_trait]
pub trait FloodControl: Send + Sync {
    /// Records one occurrence of `name` for `identifier`, kept for `window`
    async fn register(
        &self,
        name: &str,
        window: Duration,
        identifier: &str,
    ) -> Result<(), CacheError>;

    /// Forgets every recorded occurrence of `name` for `identifier`
    async fn clear(&self, name: &str, identifier: &str) -> Result<(), CacheError>;

    /// Whether fewer than `threshold` occurrences are still inside their
    /// window
    async fn is_allowed(
        &self,
        name: &str,
        threshold: usize,
        identifier: &str,
    ) -> Result<bool, CacheError>;
}
