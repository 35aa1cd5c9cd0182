//! Transaction identity.
//!
//! The core treats [`TransactionId`] as an opaque, `Copy + Eq + Hash` key; it
//! never looks inside it. `Transaction` is the thin allocation/ergonomics
//! wrapper the rest of the teaching database actually calls, in the style of
//! `small-db`'s `transaction::tx::Transaction`: a monotonic counter hands out
//! fresh ids, and `commit()`/`abort()` forward to
//! [`crate::buffer_pool::BufferPool::transaction_complete`].

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::buffer_pool::BufferPool;
use crate::error::SmallResult;
use crate::external::{Catalog, DbFile, LogFile};

/// Opaque transaction identifier used as a key throughout the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "tx_{}", self.0)
    }
}

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// A transaction handle: an id plus the convenience methods callers use to
/// end it. A transaction starts implicitly the first time its id is used in
/// a `get_page` call; it ends with exactly one `commit()` or `abort()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Transaction {
    id: TransactionId,
}

impl Transaction {
    pub fn new() -> Self {
        let id = TransactionId(NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed));
        Self { id }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn commit<F, C, L>(&self, pool: &BufferPool<F, C, L>) -> SmallResult
    where
        F: DbFile,
        C: Catalog<F>,
        L: LogFile<F::P>,
    {
        pool.transaction_complete(self.id, true)
    }

    pub fn abort<F, C, L>(&self, pool: &BufferPool<F, C, L>) -> SmallResult
    where
        F: DbFile,
        C: Catalog<F>,
        L: LogFile<F::P>,
    {
        pool.transaction_complete(self.id, false)
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonically_increasing() {
        let a = Transaction::new();
        let b = Transaction::new();
        assert_ne!(a.id(), b.id());
        assert!(b.id().0 > a.id().0);
    }
}
