//! Lock domain - Store-backed mutual exclusion

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::CacheError;

/// Lock id shared by every persistent lock backend
pub const PERSISTENT_LOCK_ID: &str = "persistent";

/// First sleep of [`LockBackend::wait`], also its increment
pub const WAIT_STEP: Duration = Duration::from_millis(25);

/// Longest single sleep of [`LockBackend::wait`]
pub const WAIT_MAX_STEP: Duration = Duration::from_millis(500);

/// Identity stored as the value of every lock a backend holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOwner {
    /// A fresh identity generated for each backend instance (one request)
    PerRequest,
    /// The same identity for every backend instance, across requests
    Fixed(String),
}

impl LockOwner {
    /// Owner shared by persistent locks
    pub fn persistent() -> Self {
        Self::Fixed(PERSISTENT_LOCK_ID.to_string())
    }
}

/// Named locks with a timeout
#[async_trait]
pub trait LockBackend: Send + Sync {
    /// Identity of this backend's locks
    fn lock_id(&mut self) -> &str;

    /// Acquires `name` for `timeout`, or extends it if this backend already
    /// holds it
    async fn acquire(&mut self, name: &str, timeout: Duration) -> Result<bool, CacheError>;

    /// Whether nobody currently holds `name`
    async fn lock_may_be_available(&self, name: &str) -> Result<bool, CacheError>;

    /// Waits up to `delay` for `name` to become available
    ///
    /// Returns `false` as soon as the lock may be available and `true` if it
    /// is still held when the delay runs out.
    async fn wait(&self, name: &str, delay: Duration) -> Result<bool, CacheError> {
        let mut remaining = delay;
        let mut sleep = WAIT_STEP.min(remaining);

        while !remaining.is_zero() {
            tokio::time::sleep(sleep).await;
            remaining = remaining.saturating_sub(sleep);
            sleep = (sleep + WAIT_STEP).min(WAIT_MAX_STEP).min(remaining);

            if self.lock_may_be_available(name).await? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Releases `name` if this backend still owns it
    async fn release(&mut self, name: &str) -> Result<(), CacheError>;

    /// Releases every lock this backend holds
    async fn release_all(&mut self) -> Result<(), CacheError>;
}
