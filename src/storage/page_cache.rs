//! Page cache over a single page file.
//!
//! Pages are loaded on demand into a [`RefCountCache`] and written back when
//! their last reference is released, if dirty. New pages skip the cache: they
//! are written and synced immediately and loaded again on first `get_page`.

use crate::config::MIN_CACHED_PAGES;
use crate::storage::buffer::{CacheKey, CacheLoader, RefCountCache};
use crate::storage::disk::{open_file, with_suffix, OpenMode, PageFile, PAGE_SIZE};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{Page, PageNo, PageRef};
use log::debug;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

pub const DB_SUFFIX: &str = ".db";

struct PageStore {
    file: PageFile,
    owner: Weak<PageCacheShared>,
}

impl PageStore {
    fn flush(&self, page: &Page) -> StorageResult<()> {
        let data = page.lock();
        self.file.write_page(page.page_number(), &data[..])
    }
}

impl CacheLoader for PageStore {
    type Value = PageRef;

    fn load(&self, key: CacheKey) -> StorageResult<PageRef> {
        let pgno = PageNo(key as u32);
        let mut data = Box::new([0u8; PAGE_SIZE]);
        self.file.read_page(pgno, &mut data[..])?;
        Ok(Arc::new(Page::new(pgno, data, self.owner.clone())))
    }

    fn unload(&self, _key: CacheKey, page: PageRef) -> StorageResult<()> {
        if page.is_dirty() {
            debug!("flushing dirty {} on eviction", page.page_number());
            self.flush(&page)?;
            page.set_dirty(false);
        }
        Ok(())
    }
}

/// State reachable from both the [`PageCache`] and the pages it hands out.
pub(crate) struct PageCacheShared {
    cache: RefCountCache<PageStore>,
    /// Highest page number ever issued.
    page_count: AtomicU32,
}

impl PageCacheShared {
    pub(crate) fn release(&self, pgno: PageNo) -> StorageResult<()> {
        self.cache.release(pgno.0 as CacheKey)
    }

    fn store(&self) -> &PageStore {
        self.cache.loader()
    }
}

pub struct PageCache {
    shared: Arc<PageCacheShared>,
    path: PathBuf,
}

impl fmt::Debug for PageCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageCache")
            .field("path", &self.path)
            .field("capacity", &self.capacity())
            .field("pages", &self.page_number())
            .finish()
    }
}

impl PageCache {
    /// Creates `<prefix>.db`, which must not exist yet.
    pub fn create(prefix: impl AsRef<Path>, memory_budget: u64) -> StorageResult<Self> {
        Self::acquire(prefix.as_ref(), memory_budget, OpenMode::Create)
    }

    /// Opens an existing `<prefix>.db`.
    pub fn open(prefix: impl AsRef<Path>, memory_budget: u64) -> StorageResult<Self> {
        Self::acquire(prefix.as_ref(), memory_budget, OpenMode::Open)
    }

    fn acquire(prefix: &Path, memory_budget: u64, mode: OpenMode) -> StorageResult<Self> {
        let capacity = (memory_budget / PAGE_SIZE as u64) as usize;
        if capacity < MIN_CACHED_PAGES {
            return Err(StorageError::MemTooSmall {
                capacity,
                min: MIN_CACHED_PAGES,
            });
        }

        let path = with_suffix(prefix, DB_SUFFIX);
        let file = PageFile::new(open_file(&path, mode)?);
        let pages = file.num_pages()?;

        let shared = Arc::new_cyclic(|owner| PageCacheShared {
            cache: RefCountCache::new(
                PageStore {
                    file,
                    owner: owner.clone(),
                },
                capacity,
            ),
            page_count: AtomicU32::new(pages),
        });

        debug!(
            "page cache {:?} ready: {} pages, capacity {}",
            path, pages, capacity
        );

        Ok(Self { shared, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Maximum number of resident pages.
    pub fn capacity(&self) -> usize {
        self.shared.cache.capacity()
    }

    /// Allocates the next page number and writes `init_data` to it durably.
    pub fn new_page(&self, init_data: &[u8]) -> StorageResult<PageNo> {
        if init_data.len() != PAGE_SIZE {
            return Err(StorageError::InvalidPageData {
                expected: PAGE_SIZE,
                actual: init_data.len(),
            });
        }

        let issued = self
            .shared
            .page_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_add(1))
            .map_err(|last| StorageError::PageNumbersExhausted { last })?;
        let pgno = PageNo(issued + 1);
        self.shared.store().file.write_page(pgno, init_data)?;
        Ok(pgno)
    }

    /// Returns the page and takes a reference on it. Pair with
    /// [`release`](Self::release) or [`Page::release`].
    pub fn get_page(&self, pgno: PageNo) -> StorageResult<PageRef> {
        self.shared.cache.get(pgno.0 as CacheKey)
    }

    pub fn release(&self, page: &Page) -> StorageResult<()> {
        self.shared.release(page.page_number())
    }

    /// Writes the page out and syncs, whatever its dirty flag or reference
    /// count.
    pub fn flush_page(&self, page: &Page) -> StorageResult<()> {
        self.shared.store().flush(page)
    }

    /// Like [`flush_page`](Self::flush_page), for a caller already holding
    /// the page lock: `data` is the guarded buffer of page `pgno`.
    pub fn flush_locked(&self, pgno: PageNo, data: &[u8]) -> StorageResult<()> {
        self.shared.store().file.write_page(pgno, data)
    }

    /// Cuts the file to exactly `max_pgno` pages and resets allocation so the
    /// next new page is `max_pgno + 1`.
    pub fn truncate_by_max_pgno(&self, max_pgno: u32) -> StorageResult<()> {
        self.shared.store().file.truncate(max_pgno)?;
        self.shared.page_count.store(max_pgno, Ordering::SeqCst);
        debug!("page file {:?} truncated to {} pages", self.path, max_pgno);
        Ok(())
    }

    /// Highest page number issued so far.
    pub fn page_number(&self) -> u32 {
        self.shared.page_count.load(Ordering::SeqCst)
    }

    /// Reference count currently held on `pgno`.
    pub fn ref_count(&self, pgno: PageNo) -> usize {
        self.shared.cache.ref_count(pgno.0 as CacheKey)
    }

    /// Number of pages currently in memory.
    pub fn resident_pages(&self) -> usize {
        self.shared.cache.len()
    }

    /// Writes back every dirty resident page, then releases the file.
    pub fn close(self) -> StorageResult<()> {
        self.shared.cache.close()?;
        self.shared.store().file.sync()?;
        debug!("page cache {:?} closed", self.path);
        Ok(())
    }
}
