//! Per-offer mutual exclusion.
//!
//! The repository gives no transactional guarantees, so every
//! read-modify-write against one offer takes that offer's async lock first.
//! Lock entries are created on demand and live for the process lifetime;
//! offer ids are small monotonic integers so the map stays tiny.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of one async lock per offer id.
#[derive(Default)]
pub struct OfferLocks {
    inner: Mutex<HashMap<u64, Arc<Mutex<()>>>>,
}

impl OfferLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for `offer_id`, creating it on first use. The critical
    /// section lasts as long as the returned guard.
    pub async fn acquire(&self, offer_id: u64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(offer_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}
