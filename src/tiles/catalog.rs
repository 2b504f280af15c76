//! Immutable snapshot of the bound raster sources.
//!
//! The UI context and the worker context each hold an `Arc` of the same
//! catalog. Replacing the raster sources means building a new catalog and
//! handing it to the worker by message; nothing is mutated in place.

use super::source::{RasterSource, SourceInfo};
use crate::core::constants::{MAX_ZOOM, TILE_SIZE};
use crate::prelude::HashMap;
use crate::{MapError, Result};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_VERSION: AtomicU64 = AtomicU64::new(1);

pub struct RasterCatalog {
    version: u64,
    sources: Vec<Arc<dyn RasterSource>>,
    routes: HashMap<String, usize>,
    layers: Vec<String>,
    overlays: Vec<String>,
    zoom_levels: Vec<u8>,
    tile_size: u32,
}

impl RasterCatalog {
    /// Build a catalog routing every layer and overlay to the first source serving it
    pub fn new(sources: Vec<Arc<dyn RasterSource>>) -> Result<Self> {
        let tile_size = match sources.first() {
            Some(source) => source.tile_size(),
            None => TILE_SIZE,
        };

        let mut routes = HashMap::default();
        let mut layers = BTreeSet::new();
        let mut overlays = BTreeSet::new();
        let mut zoom_levels = BTreeSet::new();

        for (index, source) in sources.iter().enumerate() {
            let info = source.info();
            if source.tile_size() != tile_size {
                return Err(MapError::Catalog(format!(
                    "source '{}' uses {}px tiles, expected {}px",
                    info.name,
                    source.tile_size(),
                    tile_size
                )));
            }

            for layer in source.layers() {
                Self::add_route(&mut routes, &info, &layer, index);
                layers.insert(layer);
            }
            for overlay in source.overlays() {
                Self::add_route(&mut routes, &info, &overlay, index);
                overlays.insert(overlay);
            }
            let levels = source.zoom_levels();
            if let Some(&zoom) = levels.iter().find(|&&zoom| zoom > MAX_ZOOM) {
                log::error!("source '{}' offers zoom {}, above the maximum of {}", info.name, zoom, MAX_ZOOM);
                return Err(MapError::InvalidZoom(zoom));
            }
            zoom_levels.extend(levels);
        }

        let catalog = Self {
            version: NEXT_VERSION.fetch_add(1, Ordering::Relaxed),
            sources,
            routes,
            layers: layers.into_iter().collect(),
            overlays: overlays.into_iter().collect(),
            zoom_levels: zoom_levels.into_iter().collect(),
            tile_size,
        };
        log::info!(
            "raster catalog v{}: {} sources, {} layers, {} overlays, zoom {:?}",
            catalog.version,
            catalog.sources.len(),
            catalog.layers.len(),
            catalog.overlays.len(),
            catalog.zoom_levels
        );
        Ok(catalog)
    }

    fn add_route(routes: &mut HashMap<String, usize>, info: &SourceInfo, layer: &str, index: usize) {
        if routes.contains_key(layer) {
            log::warn!("layer '{}' of source '{}' is already served, ignoring", layer, info.name);
        } else {
            routes.insert(layer.to_string(), index);
        }
    }

    /// Catalog without any source
    pub fn empty() -> Self {
        Self {
            version: NEXT_VERSION.fetch_add(1, Ordering::Relaxed),
            sources: Vec::new(),
            routes: HashMap::default(),
            layers: Vec::new(),
            overlays: Vec::new(),
            zoom_levels: Vec::new(),
            tile_size: TILE_SIZE,
        }
    }

    /// Monotonic id of this snapshot
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Source serving `layer`, if any
    pub fn route(&self, layer: &str) -> Option<&Arc<dyn RasterSource>> {
        self.routes.get(layer).and_then(|&index| self.sources.get(index))
    }

    pub fn packages(&self) -> Vec<SourceInfo> {
        self.sources.iter().map(|source| source.info()).collect()
    }

    pub fn package_count(&self) -> usize {
        self.sources.len()
    }

    /// All background layers, sorted
    pub fn layers(&self) -> &[String] {
        &self.layers
    }

    /// All overlays, sorted
    pub fn overlays(&self) -> &[String] {
        &self.overlays
    }

    pub fn has_layer(&self, layer: &str) -> bool {
        self.layers.iter().any(|l| l == layer)
    }

    pub fn has_overlay(&self, overlay: &str) -> bool {
        self.overlays.iter().any(|o| o == overlay)
    }

    /// Union of every source's zoom levels, ascending
    pub fn zoom_levels(&self) -> &[u8] {
        &self.zoom_levels
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl std::fmt::Debug for RasterCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterCatalog")
            .field("version", &self.version)
            .field("packages", &self.packages())
            .field("layers", &self.layers)
            .field("overlays", &self.overlays)
            .field("zoom_levels", &self.zoom_levels)
            .field("tile_size", &self.tile_size)
            .finish()
    }
}
