use crate::storage::error::StorageResult;

/// Cache keys are plain integers; callers map their own identifiers onto them.
pub type CacheKey = u64;

/// Hooks a [`RefCountCache`](super::RefCountCache) uses to bring values in and
/// out of memory.
///
/// Both hooks run without the cache's map lock held. While one runs, the key
/// is marked busy, so other callers asking for it wait.
pub trait CacheLoader: Send + Sync {
    type Value: Clone + Send + Sync;

    /// Produce the value for a key that is not resident.
    fn load(&self, key: CacheKey) -> StorageResult<Self::Value>;

    /// Called when a value leaves the cache, either because its last
    /// reference was released or because the cache is closing.
    fn unload(&self, key: CacheKey, value: Self::Value) -> StorageResult<()>;
}
