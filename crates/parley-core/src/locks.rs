//! Per-session serialization of read-modify-write cycles.

use parking_lot::Mutex;
use parley_session::SessionId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;

type LockTable = HashMap<SessionId, Arc<tokio::sync::Mutex<()>>>;

/// One async mutex per live session id.
///
/// Requests for the same session queue behind each other; different sessions
/// never contend. A table entry is dropped once its last holder releases it.
#[derive(Default)]
pub struct SessionLocks {
    table: Arc<Mutex<LockTable>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`.
    pub async fn lock(&self, id: SessionId) -> SessionGuard {
        let lock = {
            let mut table = self.table.lock();
            Arc::clone(table.entry(id).or_default())
        };
        let guard = lock.lock_owned().await;
        SessionGuard {
            id,
            guard: Some(guard),
            table: Arc::clone(&self.table),
        }
    }

    /// Number of sessions that currently hold or wait for a lock.
    pub fn active(&self) -> usize {
        self.table.lock().len()
    }
}

/// Exclusive access to one session until dropped.
pub struct SessionGuard {
    id: SessionId,
    guard: Option<OwnedMutexGuard<()>>,
    table: Arc<Mutex<LockTable>>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut table = self.table.lock();
        // Only the table's own reference left: nobody holds or awaits it.
        if table
            .get(&self.id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            table.remove(&self.id);
        }
    }
}
