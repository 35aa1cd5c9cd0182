//! The `Page` contract the cache consumes. The core never interprets page
//! contents: it only needs identity, a dirty marker, and a before-image
//! snapshot for undo/rollback.

use crate::page_id::PageId;
use crate::transaction::TransactionId;

/// Default page size in bytes, matching `small-db`'s `PAGE_SIZE`. Overridable
/// only through [`crate::buffer_pool::BufferPoolConfig`] for tests.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// External contract every cached page must satisfy. The B+-tree/heap-file
/// layer that owns the real byte layout implements this; the core only calls
/// through it.
pub trait Page: Clone {
    fn id(&self) -> PageId;

    /// The transaction that last dirtied this page, or `None` if clean.
    fn is_dirty(&self) -> Option<TransactionId>;

    /// Set or clear the dirty owner.
    fn mark_dirty(&mut self, dirty: bool, tid: TransactionId);

    /// The snapshot captured at the last `set_before_image()` call (the
    /// redo/undo anchor).
    fn before_image(&self) -> Self;

    /// Capture current contents as the new before-image.
    fn set_before_image(&mut self);
}

/// A reference `Page` implementation: a fixed-size byte buffer plus the dirty
/// marker and before-image snapshot the contract requires. Used by the
/// in-memory/file-backed collaborators in [`crate::external`] and by tests;
/// it does not interpret the bytes it carries; defining an on-disk page
/// layout is out of scope for this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimplePage {
    id: PageId,
    data: Vec<u8>,
    before_image: Vec<u8>,
    dirtied_by: Option<TransactionId>,
}

impl SimplePage {
    pub fn new(id: PageId, data: Vec<u8>) -> Self {
        Self { id, before_image: data.clone(), data, dirtied_by: None }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Page for SimplePage {
    fn id(&self) -> PageId {
        self.id
    }

    fn is_dirty(&self) -> Option<TransactionId> {
        self.dirtied_by
    }

    fn mark_dirty(&mut self, dirty: bool, tid: TransactionId) {
        self.dirtied_by = if dirty { Some(tid) } else { None };
    }

    fn before_image(&self) -> Self {
        Self {
            id: self.id,
            data: self.before_image.clone(),
            before_image: self.before_image.clone(),
            dirtied_by: None,
        }
    }

    fn set_before_image(&mut self) {
        self.before_image = self.data.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tid() -> TransactionId {
        crate::transaction::Transaction::new().id()
    }

    #[test]
    fn mark_dirty_round_trips() {
        let mut page = SimplePage::new(PageId::new(0, 0), vec![0; DEFAULT_PAGE_SIZE]);
        let t = tid();
        assert_eq!(page.is_dirty(), None);
        page.mark_dirty(true, t);
        assert_eq!(page.is_dirty(), Some(t));
        page.mark_dirty(false, t);
        assert_eq!(page.is_dirty(), None);
    }

    #[test]
    fn before_image_reflects_last_snapshot() {
        let mut page = SimplePage::new(PageId::new(0, 0), vec![0u8; 4]);
        page.data_mut()[0] = 7;
        // before_image still reflects construction time.
        assert_eq!(page.before_image().data()[0], 0);

        page.set_before_image();
        page.data_mut()[0] = 9;
        assert_eq!(page.before_image().data()[0], 7);
        assert_eq!(page.data()[0], 9);
    }
}
