use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page_cache::PageCacheShared;
use crate::storage::PAGE_SIZE;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// 1-based page number within the page file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageNo(pub u32);

impl fmt::Display for PageNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Page{}", self.0)
    }
}

/// Shared handle to a resident page.
pub type PageRef = Arc<Page>;

/// An in-memory copy of one page.
///
/// The byte buffer sits behind the page's exclusive lock. The page keeps a
/// weak handle to the cache it came from so it can hand itself back; the
/// cache owns its pages, never the other way round.
pub struct Page {
    pgno: PageNo,
    data: Mutex<Box<[u8; PAGE_SIZE]>>,
    dirty: AtomicBool,
    owner: Weak<PageCacheShared>,
}

impl Page {
    pub(crate) fn new(
        pgno: PageNo,
        data: Box<[u8; PAGE_SIZE]>,
        owner: Weak<PageCacheShared>,
    ) -> Self {
        Self {
            pgno,
            data: Mutex::new(data),
            dirty: AtomicBool::new(false),
            owner,
        }
    }

    pub fn page_number(&self) -> PageNo {
        self.pgno
    }

    /// Takes the page lock. The guard gives access to the page bytes.
    ///
    /// Do not hold the guard across `flush_page` or a release of the page's
    /// last reference; both take the lock themselves. To write the page out
    /// while holding the guard, use `PageCache::flush_locked`.
    pub fn lock(&self) -> MutexGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.lock()
    }

    /// Copies `bytes` into the page at `offset` under the page lock and marks
    /// the page dirty.
    pub fn write_at(&self, offset: usize, bytes: &[u8]) -> StorageResult<()> {
        let end = offset
            .checked_add(bytes.len())
            .filter(|&end| end <= PAGE_SIZE)
            .ok_or(StorageError::InvalidPageData {
                expected: PAGE_SIZE.saturating_sub(offset),
                actual: bytes.len(),
            })?;

        let mut data = self.lock();
        data[offset..end].copy_from_slice(bytes);
        self.set_dirty(true);
        Ok(())
    }

    /// Snapshot of the page bytes.
    pub fn to_vec(&self) -> Vec<u8> {
        self.lock().to_vec()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    pub fn set_dirty(&self, dirty: bool) {
        self.dirty.store(dirty, Ordering::SeqCst);
    }

    /// Returns this page to the cache it was loaded from.
    pub fn release(&self) -> StorageResult<()> {
        let owner = self.owner.upgrade().ok_or(StorageError::CacheClosed)?;
        owner.release(self.pgno)
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("pgno", &self.pgno)
            .field("dirty", &self.is_dirty())
            .finish()
    }
}
