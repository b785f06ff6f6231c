use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::TileId;
use crate::directory::{DirEntry, Directory};

/// Result of a directory cache lookup.
pub enum DirCacheResult {
    /// The directory was not found in the cache.
    NotCached,
    /// The tile was not found in the directory.
    NotFound,
    /// The tile was found in the directory.
    Found(DirEntry),
}

impl From<Option<&DirEntry>> for DirCacheResult {
    fn from(entry: Option<&DirEntry>) -> Self {
        match entry {
            Some(entry) => Self::Found(entry.clone()),
            None => Self::NotFound,
        }
    }
}

/// A cache for leaf directories fetched during tile lookups, keyed by
/// their absolute byte offset in the archive.
pub trait DirectoryCache {
    /// Looks up `tile_id` in the cached directory at `offset`, if present.
    fn get_dir_entry(&self, offset: u64, tile_id: TileId) -> DirCacheResult;

    /// Inserts a directory into the cache, using the offset as a key.
    /// Note that the cache must be internally mutable.
    fn insert_dir(&self, offset: u64, directory: Directory);
}

/// A cache that does not cache anything.
pub struct NoCache;

impl DirectoryCache for NoCache {
    #[inline]
    fn get_dir_entry(&self, _offset: u64, _tile_id: TileId) -> DirCacheResult {
        DirCacheResult::NotCached
    }

    #[inline]
    fn insert_dir(&self, _offset: u64, _directory: Directory) {}
}

/// A simple `HashMap`-based directory cache with no eviction.
#[derive(Default, Clone)]
pub struct HashMapCache {
    cache: Arc<RwLock<HashMap<u64, Directory>>>,
}

impl DirectoryCache for HashMapCache {
    fn get_dir_entry(&self, offset: u64, tile_id: TileId) -> DirCacheResult {
        // Panic if the lock is poisoned is not something the user can handle
        #[expect(clippy::unwrap_used)]
        if let Some(dir) = self.cache.read().unwrap().get(&offset) {
            return dir.find_tile_id(tile_id.value()).into();
        }
        DirCacheResult::NotCached
    }

    fn insert_dir(&self, offset: u64, directory: Directory) {
        // Panic if the lock is poisoned is not something the user can handle
        #[expect(clippy::unwrap_used)]
        self.cache.write().unwrap().insert(offset, directory);
    }
}
