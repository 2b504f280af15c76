//! Configuration for the tile pipeline
//!
//! Options are grouped per component and resolved from a small set of
//! presets, or supplied wholesale through [`MapViewProfile::Custom`].

use crate::core::constants::{
    DEFAULT_CACHE_SIZE, DEFAULT_EVICTION_GRACE, DEFAULT_MAX_IN_FLIGHT, DEFAULT_PREFETCH_MARGIN,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum MapViewProfile {
    #[default]
    Balanced,
    LowResource,
    Custom(MapViewOptions),
}

impl MapViewProfile {
    pub fn resolve(&self) -> MapViewOptions {
        match self {
            Self::Balanced => MapViewOptions {
                fetch: FetchConfig {
                    max_in_flight: DEFAULT_MAX_IN_FLIGHT,
                    worker_threads: 1,
                    cache_size: DEFAULT_CACHE_SIZE,
                },
                viewport: ViewportConfig {
                    prefetch_margin: DEFAULT_PREFETCH_MARGIN,
                    eviction_grace: DEFAULT_EVICTION_GRACE,
                },
            },
            Self::LowResource => MapViewOptions {
                fetch: FetchConfig {
                    max_in_flight: 2,
                    worker_threads: 1,
                    cache_size: 32,
                },
                viewport: ViewportConfig {
                    prefetch_margin: 0,
                    eviction_grace: 1,
                },
            },
            Self::Custom(options) => options.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapViewOptions {
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub viewport: ViewportConfig,
}

impl Default for MapViewOptions {
    fn default() -> Self {
        MapViewProfile::default().resolve()
    }
}

impl MapViewOptions {
    /// Parses options from JSON, filling missing sections with defaults
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Tile fetch worker settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Requests dispatched to the worker context and not yet drained
    pub max_in_flight: usize,
    /// Threads of the worker context (1 = single-threaded runtime)
    pub worker_threads: usize,
    /// Decoded tiles kept in memory; 0 disables the cache
    pub cache_size: usize,
}

impl FetchConfig {
    /// Capacity of the worker → UI result queue.
    ///
    /// Every dispatched request produces at most one loading notification and
    /// exactly one terminal event, so the worker never blocks on a full queue.
    pub fn result_queue_capacity(&self) -> usize {
        self.max_in_flight.max(1) * 2
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            worker_threads: 1,
            cache_size: DEFAULT_CACHE_SIZE,
        }
    }
}

/// Visible-set and eviction settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    /// Tiles prefetched on every side of the visible area
    pub prefetch_margin: u32,
    /// Update cycles a cell may stay outside the visible+margin set
    pub eviction_grace: u32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            prefetch_margin: DEFAULT_PREFETCH_MARGIN,
            eviction_grace: DEFAULT_EVICTION_GRACE,
        }
    }
}
