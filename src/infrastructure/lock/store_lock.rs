//! Locks kept as store keys holding the owner's lock id

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::lock::{LockBackend, LockOwner};
use crate::domain::store::{StoreClient, StoreKeys};
use crate::domain::CacheError;
use crate::infrastructure::observability::record_lock_acquisition;

const MIN_LOCK_TIMEOUT: Duration = Duration::from_millis(1);

/// Lock backend storing `<prefix>:lock:<name>` keys
///
/// The owner decides which lock id is written: a per-request backend uses a
/// fresh id and only ever recognizes its own locks, while every persistent
/// backend shares one id and so recognizes locks taken by earlier requests.
pub struct StoreLockBackend {
    client: Arc<dyn StoreClient>,
    keys: StoreKeys,
    owner: LockOwner,
    lock_id: Option<String>,
    /// Names of the locks this backend believes it holds
    locks: HashSet<String>,
    release_on_teardown: bool,
}

impl fmt::Debug for StoreLockBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreLockBackend")
            .field("owner", &self.owner)
            .field("lock_id", &self.lock_id)
            .field("locks", &self.locks)
            .field("release_on_teardown", &self.release_on_teardown)
            .finish()
    }
}

impl StoreLockBackend {
    /// Lock backend for one request, releasing its locks when dropped
    pub fn new(client: Arc<dyn StoreClient>, keys: StoreKeys) -> Self {
        Self::with_owner(client, keys, LockOwner::PerRequest, true)
    }

    /// Lock backend whose locks outlive the request that took them
    pub fn persistent(client: Arc<dyn StoreClient>, keys: StoreKeys) -> Self {
        Self::with_owner(client, keys, LockOwner::persistent(), false)
    }

    pub fn with_owner(
        client: Arc<dyn StoreClient>,
        keys: StoreKeys,
        owner: LockOwner,
        release_on_teardown: bool,
    ) -> Self {
        Self {
            client,
            keys,
            owner,
            lock_id: None,
            locks: HashSet::new(),
            release_on_teardown,
        }
    }

    /// Whether this backend holds `name` as far as it knows
    pub fn holds(&self, name: &str) -> bool {
        self.locks.contains(name)
    }

    fn owned_lock_id(&mut self) -> String {
        self.lock_id().to_string()
    }
}

#[async_trait]
impl LockBackend for StoreLockBackend {
    fn lock_id(&mut self) -> &str {
        let owner = &self.owner;

        self.lock_id.get_or_insert_with(|| match owner {
            LockOwner::PerRequest => Uuid::new_v4().to_string(),
            LockOwner::Fixed(id) => id.clone(),
        })
    }

    async fn acquire(&mut self, name: &str, timeout: Duration) -> Result<bool, CacheError> {
        let timeout = timeout.max(MIN_LOCK_TIMEOUT);
        let key = self.keys.lock_key(name);
        let id = self.owned_lock_id();

        let acquired = if self.locks.contains(name) {
            let extended = self.client.extend_if_owner(&key, &id, timeout).await?;

            if !extended {
                // Expired and taken by someone else in the meantime
                self.locks.remove(name);
            }
            extended
        } else {
            let acquired = self.client.set_if_absent(&key, &id, timeout).await?;

            if acquired {
                self.locks.insert(name.to_string());
            }
            acquired
        };

        debug!(lock = name, acquired, timeout_ms = timeout.as_millis() as u64, "Lock acquire");
        record_lock_acquisition(acquired);

        Ok(acquired)
    }

    async fn lock_may_be_available(&self, name: &str) -> Result<bool, CacheError> {
        let key = self.keys.lock_key(name);
        Ok(self.client.get(&key).await?.is_none())
    }

    async fn release(&mut self, name: &str) -> Result<(), CacheError> {
        self.locks.remove(name);

        let key = self.keys.lock_key(name);
        let id = self.owned_lock_id();

        let released = self.client.delete_if_owner(&key, &id).await?;
        debug!(lock = name, released, "Lock release");

        Ok(())
    }

    async fn release_all(&mut self) -> Result<(), CacheError> {
        let names: Vec<String> = self.locks.drain().collect();
        let id = self.owned_lock_id();
        let mut first_error = None;

        for name in names {
            let key = self.keys.lock_key(&name);

            if let Err(e) = self.client.delete_if_owner(&key, &id).await {
                warn!(lock = %name, error = %e, "Failed to release lock");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for StoreLockBackend {
    fn drop(&mut self) {
        if !self.release_on_teardown || self.locks.is_empty() {
            return;
        }

        let Some(id) = self.lock_id.clone() else {
            return;
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(locks = self.locks.len(), "No async runtime to release locks on teardown");
            return;
        };

        let client = Arc::clone(&self.client);
        let keys: Vec<String> = self
            .locks
            .drain()
            .map(|name| self.keys.lock_key(&name))
            .collect();

        runtime.spawn(async move {
            for key in keys {
                if let Err(e) = client.delete_if_owner(&key, &id).await {
                    warn!(key = %key, error = %e, "Failed to release lock on teardown");
                }
            }
        });
    }
}
