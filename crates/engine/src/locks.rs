//! Per-key lock coordination.
//!
//! Two flavors, matching how each kind of contention behaves:
//!
//! - Zone locks are try-acquire, fail-fast. Zone contention is adversarial
//!   (simultaneous attackers on one cell); failing immediately lets callers
//!   retry with backoff instead of stacking latency on a hot zone.
//! - User locks queue. EP critical sections are short, in-process compute
//!   with no external I/O, so waiting is safe. The wait is still bounded
//!   and surfaces as a retryable `Busy` instead of queuing without limit.

use crate::error::{Error, Result};
use crate::model::UserId;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, trace, warn};
use turf_grid::CellId;

/// Guard that releases its zone lock when dropped.
pub struct ZoneLockGuard {
    locks: ZoneLocks,
    cell: CellId,
}

impl Drop for ZoneLockGuard {
    fn drop(&mut self) {
        self.locks.release(&self.cell);
        trace!("Released zone lock for {}", self.cell);
    }
}

/// Non-blocking per-zone mutual exclusion.
#[derive(Clone, Default)]
pub struct ZoneLocks {
    held: Arc<Mutex<HashSet<CellId>>>,
}

impl ZoneLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt to lock a zone for exclusive processing. Returns `None`
    /// immediately if another operation holds it.
    pub fn try_acquire(&self, cell: &CellId) -> Option<ZoneLockGuard> {
        let mut held = self.held.lock();
        if held.insert(*cell) {
            debug!("Acquired zone lock for {}", cell);
            Some(ZoneLockGuard {
                locks: self.clone(),
                cell: *cell,
            })
        } else {
            debug!("Zone {} is already locked", cell);
            None
        }
    }

    fn release(&self, cell: &CellId) {
        self.held.lock().remove(cell);
    }

    /// Number of currently held locks (for debugging).
    pub fn held_count(&self) -> usize {
        self.held.lock().len()
    }
}

/// Guard over a user's ledger critical section.
#[derive(Debug)]
pub struct UserLockGuard {
    _inner: OwnedMutexGuard<()>,
}

/// Blocking per-user mutual exclusion with a bounded wait.
#[derive(Clone)]
pub struct UserLocks {
    table: Arc<Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>>,
    timeout: Duration,
}

impl UserLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            table: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        }
    }

    /// Wait for the user's lock, up to the configured timeout. Exceeding
    /// the bound yields `Busy` with no state touched.
    pub async fn acquire(&self, user_id: &UserId) -> Result<UserLockGuard> {
        let mutex = {
            let mut table = self.table.lock();
            table
                .entry(*user_id)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        match tokio::time::timeout(self.timeout, mutex.lock_owned()).await {
            Ok(guard) => {
                trace!("Acquired user lock for {}", user_id);
                Ok(UserLockGuard { _inner: guard })
            }
            Err(_) => {
                warn!(
                    "Timed out waiting {:?} for user lock {}",
                    self.timeout, user_id
                );
                Err(Error::Busy)
            }
        }
    }
}
