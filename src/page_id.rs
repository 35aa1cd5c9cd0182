use core::fmt;

/// Opaque identity of a page: a `(table_id, page_number)` pair.
///
/// `PageId` is a plain value type (`Copy`, hashable, and comparable by value)
/// so it can be used as a key in both the [`crate::lru_cache::LruCache`] and
/// the [`crate::lock_manager::LockManager`] without any indirection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageId {
    pub table_id: i32,
    pub page_number: i32,
}

impl PageId {
    pub fn new(table_id: i32, page_number: i32) -> Self {
        Self { table_id, page_number }
    }

    /// Canonical serialization: two signed 32-bit integers, `table_id` first.
    pub fn serialize(&self) -> [u8; 8] {
        let mut buf = [0u8; 8];
        buf[0..4].copy_from_slice(&self.table_id.to_be_bytes());
        buf[4..8].copy_from_slice(&self.page_number.to_be_bytes());
        buf
    }

    pub fn deserialize(bytes: &[u8; 8]) -> Self {
        let table_id = i32::from_be_bytes(bytes[0..4].try_into().unwrap());
        let page_number = i32::from_be_bytes(bytes[4..8].try_into().unwrap());
        Self { table_id, page_number }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<PageId table={} page={}>", self.table_id, self.page_number)
    }
}
