//! Collaborator contracts the core consumes, plus one reference
//! implementation of each.
//!
//! The core never needs a real heap file or B+-tree to be exercised or
//! tested against. It only needs something that satisfies `Catalog`,
//! `DbFile`, and `LogFile`. Expressing these as traits (rather than concrete
//! types reached through a `Database::global()` singleton, as `small-db`
//! itself does) keeps the buffer pool testable in isolation while still
//! describing exactly the interfaces `small-db`'s `btree::catalog`,
//! `btree::file`, and `tx_log::log_manager` modules play in the real system.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::debug;

use crate::error::SmallResult;
use crate::page::{Page, SimplePage, DEFAULT_PAGE_SIZE};
use crate::page_id::PageId;
use crate::transaction::TransactionId;

/// Looks up the `DbFile` backing a table. Lookup only; a valid `table_id` is
/// never expected to fail.
pub trait Catalog<F: DbFile> {
    fn get_file(&self, table_id: i32) -> Option<&F>;
}

/// The on-disk file backing one table's pages.
pub trait DbFile {
    type P: Page;

    fn read_page(&self, pid: PageId) -> SmallResult<Self::P>;
    fn write_page(&self, page: &Self::P) -> SmallResult;

    /// Inserts `tuple_bytes` and returns every page whose contents changed.
    fn insert_tuple(&self, tid: TransactionId, tuple_bytes: &[u8]) -> SmallResult<Vec<Self::P>>;

    /// Deletes the tuple stored at `pid` and returns every page whose
    /// contents changed.
    fn delete_tuple(&self, tid: TransactionId, pid: PageId) -> SmallResult<Vec<Self::P>>;
}

/// Appends redo/undo records. Invoked before `write_page` at commit.
pub trait LogFile<P: Page> {
    fn log_write(&self, tid: TransactionId, before: &P, after: &P) -> SmallResult;
}

/// A fixed-size-page file on disk, in the idiom of `small-db`'s `SmallFile`:
/// page `n` occupies bytes `[n * page_size, (n + 1) * page_size)`. Does not
/// interpret page contents; every page is an opaque byte buffer. Defining an
/// on-disk page layout is out of scope for this crate.
pub struct FileBackedDbFile {
    table_id: i32,
    page_size: usize,
    file: Mutex<File>,
}

impl FileBackedDbFile {
    pub fn new(table_id: i32, path: impl AsRef<Path>, page_size: usize) -> SmallResult<Self> {
        let file =
            OpenOptions::new().read(true).write(true).create(true).open(path.as_ref())?;
        Ok(Self { table_id, page_size, file: Mutex::new(file) })
    }

    pub fn with_default_page_size(table_id: i32, path: impl AsRef<Path>) -> SmallResult<Self> {
        Self::new(table_id, path, DEFAULT_PAGE_SIZE)
    }

    pub fn table_id(&self) -> i32 {
        self.table_id
    }

    /// Appends a new, empty page and returns its id.
    pub fn allocate_page(&self) -> SmallResult<PageId> {
        let mut file = self.file.lock().unwrap();
        let len = file.metadata()?.len();
        let page_number = (len / self.page_size as u64) as i32;
        file.seek(SeekFrom::Start(len))?;
        file.write_all(&vec![0u8; self.page_size])?;
        Ok(PageId::new(self.table_id, page_number))
    }
}

impl DbFile for FileBackedDbFile {
    type P = SimplePage;

    fn read_page(&self, pid: PageId) -> SmallResult<SimplePage> {
        debug!("reading page {} from disk", pid);
        let mut file = self.file.lock().unwrap();
        let offset = pid.page_number as u64 * self.page_size as u64;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; self.page_size];
        file.read_exact(&mut buf)?;
        Ok(SimplePage::new(pid, buf))
    }

    fn write_page(&self, page: &SimplePage) -> SmallResult {
        debug!("writing page {} to disk", page.id());
        let mut file = self.file.lock().unwrap();
        let offset = page.id().page_number as u64 * self.page_size as u64;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(page.data())?;
        Ok(())
    }

    /// Minimal placeholder insertion strategy: always appends a fresh page
    /// and writes `tuple_bytes` at its start. Real tuple packing/slotting is
    /// out of scope for the page cache core; this exists only so
    /// `BufferPool::insert_tuple` has something real to call in tests.
    fn insert_tuple(&self, tid: TransactionId, tuple_bytes: &[u8]) -> SmallResult<Vec<SimplePage>> {
        let pid = self.allocate_page()?;
        let mut page = self.read_page(pid)?;
        let n = tuple_bytes.len().min(self.page_size);
        page.data_mut()[..n].copy_from_slice(&tuple_bytes[..n]);
        page.mark_dirty(true, tid);
        Ok(vec![page])
    }

    fn delete_tuple(&self, tid: TransactionId, pid: PageId) -> SmallResult<Vec<SimplePage>> {
        let mut page = self.read_page(pid)?;
        page.data_mut().iter_mut().for_each(|b| *b = 0);
        page.mark_dirty(true, tid);
        Ok(vec![page])
    }
}

/// In-memory table registry, mirroring the lookup-only contract of
/// `small-db`'s `btree::catalog::Catalog`.
pub struct InMemoryCatalog {
    files: HashMap<i32, FileBackedDbFile>,
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self { files: HashMap::new() }
    }

    pub fn add_table(&mut self, file: FileBackedDbFile) {
        self.files.insert(file.table_id(), file);
    }
}

impl Catalog<FileBackedDbFile> for InMemoryCatalog {
    fn get_file(&self, table_id: i32) -> Option<&FileBackedDbFile> {
        self.files.get(&table_id)
    }
}

/// Appends `(tid, before, after)` records to a log file, grounded in
/// `small-db`'s `tx_log::log_manager::LogManager::log_update`, minus the
/// checkpoint/recovery machinery this crate does not implement (only the
/// commit-time hook is in scope here).
pub struct FileBackedLogFile {
    file: Mutex<File>,
    #[allow(dead_code)]
    path: PathBuf,
}

impl FileBackedLogFile {
    pub fn new(path: impl AsRef<Path>) -> SmallResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().append(true).create(true).open(&path)?;
        Ok(Self { file: Mutex::new(file), path })
    }
}

impl<P: Page> LogFile<P> for FileBackedLogFile
where
    P: PageDump,
{
    fn log_write(&self, tid: TransactionId, before: &P, after: &P) -> SmallResult {
        let mut file = self.file.lock().unwrap();
        writeln!(
            file,
            "UPDATE tid={} page={} before_len={} after_len={}",
            tid,
            after.id(),
            before.dump().len(),
            after.dump().len(),
        )?;
        Ok(())
    }
}

/// Lets `FileBackedLogFile` format a page's contents without depending on the
/// concrete `SimplePage` type.
pub trait PageDump {
    fn dump(&self) -> Vec<u8>;
}

impl PageDump for SimplePage {
    fn dump(&self) -> Vec<u8> {
        self.data().to_vec()
    }
}

/// A `LogFile` that records calls in memory instead of touching disk, used
/// by buffer-pool tests that want to assert ordering: `log_write` must
/// happen before `write_page`.
#[derive(Default)]
pub struct RecordingLogFile {
    pub records: Mutex<Vec<(TransactionId, Vec<u8>, Vec<u8>)>>,
}

impl LogFile<SimplePage> for RecordingLogFile {
    fn log_write(&self, tid: TransactionId, before: &SimplePage, after: &SimplePage) -> SmallResult {
        self.records.lock().unwrap().push((tid, before.dump(), after.dump()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Transaction;
    use tempfile::NamedTempFile;

    #[test]
    fn file_backed_db_file_round_trips_a_page() {
        let path = NamedTempFile::new().unwrap();
        let file = FileBackedDbFile::with_default_page_size(1, path.path()).unwrap();

        let pid = file.allocate_page().unwrap();
        let mut page = file.read_page(pid).unwrap();
        page.data_mut()[0] = 42;
        file.write_page(&page).unwrap();

        let reread = file.read_page(pid).unwrap();
        assert_eq!(reread.data()[0], 42);
    }

    #[test]
    fn insert_tuple_dirties_a_fresh_page() {
        let path = NamedTempFile::new().unwrap();
        let file = FileBackedDbFile::with_default_page_size(1, path.path()).unwrap();
        let tid = Transaction::new().id();

        let pages = file.insert_tuple(tid, b"hello").unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].is_dirty(), Some(tid));
    }

    #[test]
    fn recording_log_file_captures_before_and_after() {
        let log = RecordingLogFile::default();
        let tid = Transaction::new().id();
        let before = SimplePage::new(PageId::new(0, 0), vec![1; 4]);
        let mut after = before.clone();
        after.data_mut()[0] = 9;

        log.log_write(tid, &before, &after).unwrap();

        let records = log.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].1[0], 1);
        assert_eq!(records[0].2[0], 9);
    }
}
