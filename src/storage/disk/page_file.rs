use crate::storage::disk::{read_exact_at, write_all_at};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::PageNo;
use parking_lot::Mutex;
use std::fs::File;

pub const PAGE_SIZE: usize = 8192;

/// A file of fixed-size pages, numbered from 1, with no header.
///
/// Each call takes the file lock for the whole positioned read or write, so
/// I/O against the shared handle is serialized.
pub struct PageFile {
    file: Mutex<File>,
}

impl PageFile {
    pub fn new(file: File) -> Self {
        Self {
            file: Mutex::new(file),
        }
    }

    pub fn read_page(&self, pgno: PageNo, buf: &mut [u8]) -> StorageResult<()> {
        if buf.len() != PAGE_SIZE {
            return Err(StorageError::InvalidPageData {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }

        let file = self.file.lock();
        let allocated = Self::pages_in(&file)?;
        if pgno.0 == 0 || pgno.0 > allocated {
            return Err(StorageError::PageOutOfRange {
                pgno: pgno.0,
                allocated,
            });
        }

        read_exact_at(&file, buf, Self::page_offset(pgno))?;
        Ok(())
    }

    /// Writes a full page and forces it to disk before returning.
    pub fn write_page(&self, pgno: PageNo, data: &[u8]) -> StorageResult<()> {
        if data.len() != PAGE_SIZE {
            return Err(StorageError::InvalidPageData {
                expected: PAGE_SIZE,
                actual: data.len(),
            });
        }
        if pgno.0 == 0 {
            return Err(StorageError::PageOutOfRange {
                pgno: 0,
                allocated: self.num_pages()?,
            });
        }

        let file = self.file.lock();
        write_all_at(&file, data, Self::page_offset(pgno))?;
        file.sync_all()?;
        Ok(())
    }

    pub fn num_pages(&self) -> StorageResult<u32> {
        let file = self.file.lock();
        Self::pages_in(&file)
    }

    /// Cuts the file down to exactly `max_pgno` pages.
    pub fn truncate(&self, max_pgno: u32) -> StorageResult<()> {
        let file = self.file.lock();
        file.set_len(max_pgno as u64 * PAGE_SIZE as u64)?;
        file.sync_all()?;
        Ok(())
    }

    pub fn sync(&self) -> StorageResult<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }

    fn pages_in(file: &File) -> StorageResult<u32> {
        let file_size = file.metadata()?.len();
        Ok((file_size / PAGE_SIZE as u64) as u32)
    }

    fn page_offset(pgno: PageNo) -> u64 {
        (pgno.0 as u64 - 1) * PAGE_SIZE as u64
    }
}
