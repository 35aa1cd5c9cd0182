//! Per-page two-phase lock manager.
//!
//! `small-db`'s own `ConcurrentStatus` (see its `transaction::concurrent_status`
//! module) builds an explicit wait-for graph and runs cycle detection before
//! every acquisition. This manager deliberately replaces that with bounded
//! retry plus broadcast wakeup (see DESIGN.md): any cycle is eventually broken
//! by whichever transaction's retry budget elapses first, trading a precise
//! deadlock detector for a much simpler monitor.

use std::collections::HashMap;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use log::{debug, warn};

use crate::error::{SmallError, SmallResult};
use crate::page_id::PageId;
use crate::transaction::TransactionId;

/// Default number of blocking retries `acquire` performs before giving up.
pub const RETRY_MAX: u32 = 3;

/// Default interval a blocked acquisition waits before re-evaluating.
pub const RETRY_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// A single holder's lock on a page, as tracked in the per-page holder table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLock {
    pub transaction_id: TransactionId,
    pub page_id: PageId,
    pub mode: LockMode,
}

struct LockTable {
    /// `page_id -> (tid -> mode)`. A page with an empty holder table is
    /// removed from this map entirely.
    lock_map: HashMap<PageId, HashMap<TransactionId, LockMode>>,
}

impl LockTable {
    fn new() -> Self {
        Self { lock_map: HashMap::new() }
    }

    fn holders_shared_only(&self, pid: &PageId, except: Option<TransactionId>) -> bool {
        match self.lock_map.get(pid) {
            None => true,
            Some(holders) => holders
                .iter()
                .all(|(tid, mode)| Some(*tid) == except || *mode == LockMode::Shared),
        }
    }

    fn sole_holder_is(&self, pid: &PageId, tid: TransactionId) -> bool {
        match self.lock_map.get(pid) {
            Some(holders) => holders.len() == 1 && holders.contains_key(&tid),
            None => false,
        }
    }
}

/// Arbitrates shared/exclusive access to pages across concurrent
/// transactions: grant, wait, or upgrade, with a bounded retry budget
/// standing in for deadlock detection.
pub struct LockManager {
    table: Mutex<LockTable>,
    condvar: Condvar,
    retry_max: u32,
    retry_interval: Duration,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager {
    pub fn new() -> Self {
        Self::with_retry_policy(RETRY_MAX, RETRY_INTERVAL)
    }

    pub fn with_retry_policy(retry_max: u32, retry_interval: Duration) -> Self {
        Self { table: Mutex::new(LockTable::new()), condvar: Condvar::new(), retry_max, retry_interval }
    }

    pub fn holds(&self, tid: TransactionId, pid: &PageId) -> bool {
        let table = self.table.lock().unwrap();
        table.lock_map.get(pid).map_or(false, |holders| holders.contains_key(&tid))
    }

    /// Attempts to acquire `requested` on `pid` for `tid`. Blocks (releasing
    /// the internal monitor while waiting) up to `retry_max` times at
    /// `retry_interval` intervals. Returns `true` once granted, `false` once
    /// the retry budget is exhausted.
    pub fn acquire(&self, pid: PageId, tid: TransactionId, requested: LockMode) -> bool {
        let mut table = self.table.lock().unwrap();

        for attempt in 0..=self.retry_max {
            match Self::try_grant(&mut table, pid, tid, requested) {
                Granted::Yes => return true,
                Granted::MustWait => {
                    if attempt == self.retry_max {
                        warn!(
                            "lock acquisition for {:?} on {} by {} exhausted retry budget",
                            requested, pid, tid
                        );
                        return false;
                    }
                    debug!(
                        "{} waiting for {:?} on {} (attempt {}/{})",
                        tid, requested, pid, attempt + 1, self.retry_max
                    );
                    let (guard, _timeout) =
                        self.condvar.wait_timeout(table, self.retry_interval).unwrap();
                    table = guard;
                }
            }
        }

        false
    }

    fn try_grant(
        table: &mut LockTable,
        pid: PageId,
        tid: TransactionId,
        requested: LockMode,
    ) -> Granted {
        let self_mode = table.lock_map.get(&pid).and_then(|holders| holders.get(&tid)).copied();

        match self_mode {
            Some(LockMode::Exclusive) => {
                // Already hold the strongest mode; any request is a no-op grant.
                Granted::Yes
            }
            Some(LockMode::Shared) => match requested {
                LockMode::Shared => Granted::Yes,
                LockMode::Exclusive => {
                    if table.sole_holder_is(&pid, tid) {
                        // Upgrade: remove the shared holder, install exclusive.
                        // No suspension happens between removal and insertion,
                        // so no other transaction can observe the empty slot.
                        let holders = table.lock_map.get_mut(&pid).unwrap();
                        holders.insert(tid, LockMode::Exclusive);
                        Granted::Yes
                    } else {
                        Granted::MustWait
                    }
                }
            },
            None => match requested {
                LockMode::Shared => {
                    if table.holders_shared_only(&pid, None) {
                        table
                            .lock_map
                            .entry(pid)
                            .or_insert_with(HashMap::new)
                            .insert(tid, LockMode::Shared);
                        Granted::Yes
                    } else {
                        Granted::MustWait
                    }
                }
                LockMode::Exclusive => {
                    if table.lock_map.get(&pid).map_or(true, |holders| holders.is_empty()) {
                        table
                            .lock_map
                            .entry(pid)
                            .or_insert_with(HashMap::new)
                            .insert(tid, LockMode::Exclusive);
                        Granted::Yes
                    } else {
                        Granted::MustWait
                    }
                }
            },
        }
    }

    /// Removes `tid` from `pid`'s holder table, removing the page entry if it
    /// becomes empty, then broadcasts a wakeup to every waiter.
    pub fn release(&self, tid: TransactionId, pid: &PageId) {
        {
            let mut table = self.table.lock().unwrap();
            if let Some(holders) = table.lock_map.get_mut(pid) {
                holders.remove(&tid);
                if holders.is_empty() {
                    table.lock_map.remove(pid);
                }
            }
        }
        self.condvar.notify_all();
    }

    /// Releases every lock `tid` holds.
    pub fn release_all(&self, tid: TransactionId) {
        let pages: Vec<PageId> = {
            let table = self.table.lock().unwrap();
            table
                .lock_map
                .iter()
                .filter(|(_, holders)| holders.contains_key(&tid))
                .map(|(pid, _)| *pid)
                .collect()
        };
        for pid in pages {
            self.release(tid, &pid);
        }
    }

    /// Snapshot of the current holders on `pid`, for tests and diagnostics.
    pub fn holders(&self, pid: &PageId) -> Vec<PageLock> {
        let table = self.table.lock().unwrap();
        table
            .lock_map
            .get(pid)
            .map(|holders| {
                holders
                    .iter()
                    .map(|(tid, mode)| PageLock { transaction_id: *tid, page_id: *pid, mode: *mode })
                    .collect()
            })
            .unwrap_or_default()
    }
}

enum Granted {
    Yes,
    MustWait,
}

/// Raises `acquire`'s bool outcome into a `SmallResult`, for callers that
/// want `?` rather than a bare bool (used by [`crate::buffer_pool::BufferPool`]).
pub fn acquire_or_abort(
    manager: &LockManager,
    pid: PageId,
    tid: TransactionId,
    requested: LockMode,
) -> SmallResult {
    if manager.acquire(pid, tid, requested) {
        Ok(())
    } else {
        let err = SmallError::aborted(format!(
            "{} could not acquire {:?} on {} within retry budget",
            tid, requested, pid
        ));
        err.show_backtrace();
        Err(err)
    }
}
