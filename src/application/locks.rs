use crate::domain::cart::CartId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

const PRUNE_THRESHOLD: usize = 1024;

/// One async lock per cart id.
///
/// Every read-modify-write of a cart holds its lock, so interactive requests and
/// gateway callbacks touching the same cart are serialized while different carts
/// proceed in parallel.
#[derive(Debug, Default)]
pub struct CartLocks {
    locks: Mutex<HashMap<CartId, Arc<AsyncMutex<()>>>>,
}

impl CartLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, id: CartId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            if locks.len() > PRUNE_THRESHOLD {
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            locks.entry(id).or_default().clone()
        };
        lock.lock_owned().await
    }
}
