//! Storage layer for duradb.
//!
//! Durable primitives over single backing files:
//!
//! - **PageFile**: positioned reads and writes of fixed-size (8KB) pages
//! - **RefCountCache**: bounded cache that keeps values while referenced
//! - **PageCache**: page cache built on the two above
//! - **Logger**: checksummed write-ahead log that heals a torn tail on open
//!
//! The page cache and the log never call each other; recovery code built on
//! top sequences them.

pub mod buffer;
pub mod disk;
pub mod error;
pub mod page;
pub mod page_cache;
pub mod wal;

pub use buffer::{CacheKey, CacheLoader, RefCountCache};
pub use disk::{PageFile, PAGE_SIZE};
pub use error::{StorageError, StorageResult};
pub use page::{Page, PageNo, PageRef};
pub use page_cache::{PageCache, DB_SUFFIX};
pub use wal::Logger;
