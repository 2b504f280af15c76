//! Core constants for the tile pipeline.
//! Keeping them in a single place makes it easier to tweak engine-wide magic numbers.

/// Default square tile size in pixels.
pub const TILE_SIZE: u32 = 256;

/// Deepest zoom level the tile grid supports.
pub const MAX_ZOOM: u8 = 22;

/// Tiles kept around the visible area on every side.
pub const DEFAULT_PREFETCH_MARGIN: u32 = 1;

/// Update cycles a tile may stay outside the visible+margin set before it is evicted.
pub const DEFAULT_EVICTION_GRACE: u32 = 1;

/// Requests handed to the worker context at once.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;

/// Decoded tiles kept in the LRU cache.
pub const DEFAULT_CACHE_SIZE: usize = 256;

/// Half-axis of the Web Mercator square, in degrees of latitude.
pub const MAX_LATITUDE: f64 = 85.0511287798;
