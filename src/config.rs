//! Configuration for opening the durability primitives together.

use crate::storage::disk::with_suffix;
use crate::storage::{DB_SUFFIX, PAGE_SIZE};
use crate::storage::wal::LOG_SUFFIX;
use crate::transaction::XID_SUFFIX;
use std::path::{Path, PathBuf};

/// Fewest pages a page cache may hold.
pub const MIN_CACHED_PAGES: usize = 10;

/// Default number of pages the page cache may keep resident.
pub const DEFAULT_CACHED_PAGES: u64 = 64;

/// Where the files live and how much memory the page cache may use.
#[derive(Debug, Clone)]
pub struct DurabilityConfig {
    /// Path prefix; each component appends its own suffix.
    pub path_prefix: PathBuf,
    /// Bytes available to the page cache. Capacity is this divided by the
    /// page size and must reach [`MIN_CACHED_PAGES`].
    pub memory_budget: u64,
}

impl Default for DurabilityConfig {
    fn default() -> Self {
        DurabilityConfig {
            path_prefix: PathBuf::from("duradb"),
            memory_budget: DEFAULT_CACHED_PAGES * PAGE_SIZE as u64,
        }
    }
}

impl DurabilityConfig {
    pub fn new(path_prefix: impl Into<PathBuf>) -> Self {
        Self {
            path_prefix: path_prefix.into(),
            ..Default::default()
        }
    }

    pub fn with_memory_budget(mut self, bytes: u64) -> Self {
        self.memory_budget = bytes;
        self
    }

    pub fn prefix(&self) -> &Path {
        &self.path_prefix
    }

    pub fn page_path(&self) -> PathBuf {
        with_suffix(&self.path_prefix, DB_SUFFIX)
    }

    pub fn log_path(&self) -> PathBuf {
        with_suffix(&self.path_prefix, LOG_SUFFIX)
    }

    pub fn xid_path(&self) -> PathBuf {
        with_suffix(&self.path_prefix, XID_SUFFIX)
    }
}
