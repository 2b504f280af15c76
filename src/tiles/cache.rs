use super::types::TileImage;
use crate::core::geo::TileAddress;
use lru::LruCache;
use std::num::NonZeroUsize;

/// In-memory cache of decoded tiles using LRU eviction.
///
/// Owned by the UI context; a capacity of zero disables caching. Each entry
/// keeps the sequence of the request that produced it.
pub struct TileCache {
    cache: Option<LruCache<TileAddress, (u64, TileImage)>>,
}

impl TileCache {
    /// Create a new tile cache holding at most `capacity` tiles
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: NonZeroUsize::new(capacity).map(LruCache::new),
        }
    }

    /// Get a tile and mark it as recently used
    pub fn get(&mut self, address: &TileAddress) -> Option<TileImage> {
        self.cache.as_mut()?.get(address).map(|(_, image)| image.clone())
    }

    /// Store a tile unless the cache already holds a newer result for it.
    /// Returns whether the entry was written.
    pub fn put(&mut self, address: TileAddress, sequence: u64, image: TileImage) -> bool {
        let Some(cache) = self.cache.as_mut() else {
            return false;
        };
        if let Some((cached, _)) = cache.peek(&address) {
            if *cached > sequence {
                return false;
            }
        }
        cache.put(address, (sequence, image));
        true
    }

    /// Sequence of the cached result for `address`
    pub fn sequence(&self, address: &TileAddress) -> Option<u64> {
        self.cache.as_ref()?.peek(address).map(|(sequence, _)| *sequence)
    }

    pub fn contains(&self, address: &TileAddress) -> bool {
        self.cache
            .as_ref()
            .map(|cache| cache.contains(address))
            .unwrap_or(false)
    }

    pub fn remove(&mut self, address: &TileAddress) -> Option<TileImage> {
        self.cache.as_mut()?.pop(address).map(|(_, image)| image)
    }

    pub fn clear(&mut self) {
        if let Some(cache) = self.cache.as_mut() {
            cache.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.cache.as_ref().map(|cache| cache.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.cache.as_ref().map(|cache| cache.cap().get()).unwrap_or(0)
    }
}

impl std::fmt::Debug for TileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
