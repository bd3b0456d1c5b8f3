//! Per-lot mutual exclusion.
//!
//! Every mutation of a lot's price, winning bid or status happens inside the
//! lot's own async mutex, so concurrent bids on one lot serialize while
//! different lots proceed in parallel. The settler acquires the same lock
//! before finalizing, which is what keeps a late bid and a running settlement
//! from interleaving. The registry lock itself is held only long enough to
//! clone out the lot's mutex handle.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::ids::LotId;

#[derive(Default)]
pub struct LotLocks {
    inner: parking_lot::Mutex<HashMap<LotId, Arc<Mutex<()>>>>,
}

impl LotLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lot's mutex, creating it on first use. The guard owns an
    /// `Arc` to the mutex, so it stays valid even if the entry is dropped.
    pub async fn acquire(&self, lot_id: LotId) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut map = self.inner.lock();
            Arc::clone(map.entry(lot_id).or_default())
        };
        mutex.lock_owned().await
    }

    /// Drops the lock entry of a lot that will never be touched again.
    pub fn forget(&self, lot_id: LotId) {
        self.inner.lock().remove(&lot_id);
    }
}
