pub mod loader;

pub use loader::{CacheKey, CacheLoader};

use crate::storage::error::{StorageError, StorageResult};
use log::{debug, warn};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet};

struct Entry<V> {
    value: V,
    refs: usize,
}

struct CacheState<V> {
    entries: HashMap<CacheKey, Entry<V>>,
    /// Keys whose load or unload is in flight. They count against capacity.
    busy: HashSet<CacheKey>,
}

/// A bounded, reference-counted cache.
///
/// A value stays resident while at least one caller holds it and is unloaded
/// as soon as its count drops to zero. There is no recency tracking: when
/// every slot is taken, `get` fails with [`StorageError::CacheFull`] instead
/// of reclaiming anything.
pub struct RefCountCache<L: CacheLoader> {
    loader: L,
    state: Mutex<CacheState<L::Value>>,
    /// Signalled whenever a busy key settles.
    settled: Condvar,
    /// Zero means unbounded.
    capacity: usize,
}

impl<L: CacheLoader> RefCountCache<L> {
    pub fn new(loader: L, capacity: usize) -> Self {
        Self {
            loader,
            state: Mutex::new(CacheState {
                entries: HashMap::with_capacity(capacity),
                busy: HashSet::new(),
            }),
            settled: Condvar::new(),
            capacity,
        }
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the value for `key`, loading it if needed, and takes one
    /// reference on it.
    ///
    /// A caller that finds another thread loading the same key waits for that
    /// load and then takes a reference on its result; a key is never loaded
    /// twice concurrently.
    pub fn get(&self, key: CacheKey) -> StorageResult<L::Value> {
        let mut state = self.state.lock();
        loop {
            if state.busy.contains(&key) {
                self.settled.wait(&mut state);
                continue;
            }

            if let Some(entry) = state.entries.get_mut(&key) {
                entry.refs += 1;
                return Ok(entry.value.clone());
            }

            if self.capacity > 0 && state.entries.len() + state.busy.len() >= self.capacity {
                return Err(StorageError::CacheFull {
                    capacity: self.capacity,
                });
            }

            state.busy.insert(key);
            break;
        }
        drop(state);

        let loaded = self.loader.load(key);

        let mut state = self.state.lock();
        state.busy.remove(&key);
        let result = loaded.map(|value| {
            state.entries.insert(
                key,
                Entry {
                    value: value.clone(),
                    refs: 1,
                },
            );
            value
        });
        drop(state);
        self.settled.notify_all();

        result
    }

    /// Drops one reference on `key`. The last release unloads the value.
    pub fn release(&self, key: CacheKey) -> StorageResult<()> {
        let mut state = self.state.lock();
        match state.entries.get_mut(&key) {
            None => return Err(StorageError::NotHeld(key)),
            Some(entry) if entry.refs > 1 => {
                entry.refs -= 1;
                return Ok(());
            }
            Some(_) => {}
        }

        let Some(entry) = state.entries.remove(&key) else {
            return Err(StorageError::NotHeld(key));
        };
        state.busy.insert(key);
        drop(state);

        let unloaded = self.loader.unload(key, entry.value);

        self.state.lock().busy.remove(&key);
        self.settled.notify_all();

        unloaded
    }

    /// Current reference count of `key`, zero if it is not resident.
    pub fn ref_count(&self, key: CacheKey) -> usize {
        self.state
            .lock()
            .entries
            .get(&key)
            .map_or(0, |entry| entry.refs)
    }

    /// Number of resident values.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unloads every resident value regardless of its reference count.
    ///
    /// Only meant for shutdown. Returns the first unload error after trying
    /// all entries.
    pub fn close(&self) -> StorageResult<()> {
        let mut state = self.state.lock();
        while !state.busy.is_empty() {
            self.settled.wait(&mut state);
        }
        let drained: Vec<_> = state.entries.drain().collect();
        drop(state);

        debug!("closing cache with {} resident entries", drained.len());

        let mut first_err = None;
        for (key, entry) in drained {
            if let Err(e) = self.loader.unload(key, entry.value) {
                warn!("failed to unload key {} on close: {}", key, e);
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
