//! Per-follower mutual exclusion.
//!
//! Two trades arriving close together for the same follower must not race
//! on the same custodial balance or double-submit. Followers never share a
//! lock, so cross-follower parallelism is unaffected.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// Registry of per-follower mutexes, created on first use.
#[derive(Default)]
pub struct FollowerLocks {
    inner: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl FollowerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for one follower, waiting if a pipeline for that
    /// follower is already in flight.
    pub async fn acquire(&self, follower_id: &str) -> OwnedMutexGuard<()> {
        let existing = {
            let map = self.inner.read().await;
            map.get(follower_id).cloned()
        };

        let lock = match existing {
            Some(lock) => lock,
            None => {
                let mut map = self.inner.write().await;
                map.entry(follower_id.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(())))
                    .clone()
            }
        };

        lock.lock_owned().await
    }
}
