//! A transactional page cache for a teaching relational database: a
//! bounded, dirty-aware LRU cache composed with a two-phase page-level
//! lock manager behind a single [`buffer_pool::BufferPool`] façade.
//!
//! This crate does not define an on-disk page layout, a query planner, a WAL
//! format, or a network protocol; it is the component those layers sit on
//! top of, in the same role `small-db`'s `buffer_pool` module plays in the
//! full teaching database it was distilled from.

pub mod buffer_pool;
pub mod error;
pub mod external;
pub mod lock_manager;
pub mod lru_cache;
pub mod page;
pub mod page_id;
pub mod transaction;

pub use buffer_pool::{BufferPool, BufferPoolConfig, Permission};
pub use error::{SmallError, SmallResult};
pub use external::{Catalog, DbFile, LogFile};
pub use lock_manager::{LockManager, LockMode, PageLock};
pub use lru_cache::LruCache;
pub use page::{Page, SimplePage, DEFAULT_PAGE_SIZE};
pub use page_id::PageId;
pub use transaction::{Transaction, TransactionId};

use std::sync::Once;

static LOG_INIT: Once = Once::new();

/// Initializes `env_logger` exactly once. Tests and examples call this
/// instead of relying on implicit first-use initialization, mirroring
/// `small-db`'s own `init_log` test helper.
pub fn init_log() {
    LOG_INIT.call_once(|| {
        env_logger::Builder::from_default_env().format_timestamp_millis().init();
    });
}
