//! Bounded, dirty-aware LRU page cache.
//!
//! Strict LRU would evict dirty pages under pressure, which the NO-STEAL
//! policy forbids. A dirty page may only reach disk at commit. This cache
//! instead scans from the LRU end toward the MRU end for the first *clean*
//! entry, skipping dirty ones, and only fails with [`SmallError::NoEvictable`]
//! once every cached page is dirty.

use std::collections::HashMap;

use log::debug;

use crate::error::{SmallError, SmallResult};
use crate::page::Page;
use crate::page_id::PageId;

/// Fixed-capacity cache of pages keyed by [`PageId`], with recency tracking.
///
/// Recency is tracked with a plain `Vec<PageId>` ordered from least-recently
/// to most-recently used; this is the simplest structure that satisfies the
/// "scan from the LRU end toward MRU" eviction rule, and mirrors the scale at
/// which `small-db` itself keeps its page maps (a handful to a few hundred
/// entries) rather than reaching for an intrusive linked list.
pub struct LruCache<P: Page> {
    capacity: usize,
    pages: HashMap<PageId, P>,
    /// front (index 0) is least-recently-used, back is most-recently-used.
    recency: Vec<PageId>,
}

impl<P: Page> LruCache<P> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "LruCache capacity must be positive");
        Self { capacity, pages: HashMap::new(), recency: Vec::new() }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn contains(&self, pid: &PageId) -> bool {
        self.pages.contains_key(pid)
    }

    /// Returns the cached page, bumping it to the most-recently-used
    /// position, or `None` if it is not cached.
    pub fn get(&mut self, pid: &PageId) -> Option<P> {
        if !self.pages.contains_key(pid) {
            return None;
        }
        self.touch(pid);
        self.pages.get(pid).cloned()
    }

    /// Inserts or replaces `page` under `pid`, evicting a clean page if the
    /// cache is at capacity. Fails with `NoEvictable` if every cached page is
    /// dirty and `pid` is not already present.
    pub fn put(&mut self, pid: PageId, page: P) -> SmallResult {
        if self.pages.contains_key(&pid) {
            self.pages.insert(pid, page);
            self.touch(&pid);
            return Ok(());
        }

        if self.pages.len() >= self.capacity {
            self.evict_one()?;
        }

        self.pages.insert(pid, page);
        self.recency.push(pid);
        Ok(())
    }

    /// Unlinks and deletes the entry if present; no-op otherwise.
    pub fn remove(&mut self, pid: &PageId) {
        if self.pages.remove(pid).is_some() {
            self.recency.retain(|p| p != pid);
        }
    }

    /// All cached entries, in unspecified order. Used only by bulk
    /// flush/rollback scans.
    pub fn entries(&self) -> impl Iterator<Item = (&PageId, &P)> {
        self.pages.iter()
    }

    pub fn entries_mut(&mut self) -> impl Iterator<Item = (&PageId, &mut P)> {
        self.pages.iter_mut()
    }

    fn touch(&mut self, pid: &PageId) {
        if let Some(pos) = self.recency.iter().position(|p| p == pid) {
            let id = self.recency.remove(pos);
            self.recency.push(id);
        }
    }

    /// Scans from the LRU end toward MRU for the first non-dirty page and
    /// removes it. Fails if every cached page is dirty.
    fn evict_one(&mut self) -> SmallResult {
        let victim = self
            .recency
            .iter()
            .position(|pid| self.pages.get(pid).map_or(false, |p| p.is_dirty().is_none()));

        match victim {
            Some(pos) => {
                let pid = self.recency.remove(pos);
                debug!("evicting clean page {}", pid);
                self.pages.remove(&pid);
                Ok(())
            }
            None => Err(SmallError::no_evictable(format!(
                "all {} cached pages are dirty, nothing to evict",
                self.pages.len()
            ))),
        }
    }
}
