//! # Kompas tile core
//!
//! Asynchronous tile fetch, cache and compose pipeline of the Kompas map
//! viewer.
//!
//! A [`TileFetchWorker`] runs raster source fetches on its own execution
//! context and posts result events back to the owning (UI) context, a
//! [`TileCompositor`] keeps one entity per visible tile with a stack of layer
//! slots, and a [`ViewportController`] turns viewport geometry into fetch
//! requests and evictions. [`MapView`] ties the three together.

pub mod core;
pub mod layers;
pub mod prelude;
pub mod runtime;
pub mod tiles;
pub use crate::core::constants;

// Re-export public API
pub use crate::core::{
    config::{FetchConfig, MapViewOptions, MapViewProfile, ViewportConfig},
    geo::{LatLng, PixelRect, Point, TileAddress, TileArea, TileCell},
    map_view::{MapView, OverlayState, TickReport},
    projection::{Projection, WebMercator},
    viewport::{Direction, UpdateReport, ViewState, ViewportController},
};

pub use crate::layers::{
    compositor::{ApplyOutcome, TileCanvas, TileCompositor},
    entity::TileEntity,
    slot::{LayerSlot, SlotContent, SlotId},
};

pub use crate::tiles::{
    cache::TileCache,
    catalog::RasterCatalog,
    registry::SourceRegistry,
    source::{FetchOutcome, FetchProgress, RasterSource, SourceInfo},
    types::{FetchRequest, LoadState, TileEvent, TileEventKind, TileImage, TileOutcome},
    worker::{CancelOutcome, TileFetchWorker},
};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, MapError>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "http")]
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Unknown raster source: {0}")]
    UnknownSource(String),

    #[error("Unknown layer: {0}")]
    UnknownLayer(String),

    #[error("Invalid zoom level: {0}")]
    InvalidZoom(u8),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Worker error: {0}")]
    Worker(String),
}

/// Error type alias for convenience
pub type Error = MapError;
