//! Cache tag checksum trait definition

use async_trait::async_trait;

use super::context::UnitOfWork;
use crate::domain::CacheError;

/// Per-tag invalidation counters and the aggregate checksums built on them
///
/// The checksum of a tag set is the sum of its tags' counters. Invalidating a
/// tag increments its counter, which makes every stored checksum that
/// includes the tag stale without touching the records themselves.
#[async_trait]
pub trait CacheTagsChecksum: Send + Sync {
    /// Checksum to store with a record being written
    ///
    /// Clears the tags from the unit of work's invalidated set first, so a
    /// later invalidation in the same unit of work takes effect again.
    async fn get_current_checksum(
        &self,
        uow: &mut UnitOfWork,
        tags: &[String],
    ) -> Result<i64, CacheError>;

    /// Sum of the tags' counters, reading only tags not cached in `uow`
    async fn calculate_checksum(
        &self,
        uow: &mut UnitOfWork,
        tags: &[String],
    ) -> Result<i64, CacheError>;

    /// Whether `checksum` still matches the tags' current counters
    async fn is_valid(
        &self,
        uow: &mut UnitOfWork,
        checksum: i64,
        tags: &[String],
    ) -> Result<bool, CacheError> {
        Ok(checksum == self.calculate_checksum(uow, tags).await?)
    }

    /// Increments the counter of each tag not yet invalidated in `uow`
    async fn invalidate_tags(&self, uow: &mut UnitOfWork, tags: &[String])
        -> Result<(), CacheError>;

    /// Clears the unit of work's caches
    fn reset(&self, uow: &mut UnitOfWork) {
        uow.reset();
    }
}
