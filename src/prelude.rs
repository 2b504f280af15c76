//! Prelude module for common kompas types and traits
//!
//! Re-exports what an application embedding the tile core usually needs,
//! for importing with `use kompas::prelude::*;`

pub use crate::core::{
    config::{FetchConfig, MapViewOptions, MapViewProfile, ViewportConfig},
    geo::{LatLng, PixelRect, Point, TileAddress, TileCell},
    map_view::{MapView, OverlayState, TickReport},
    projection::{Projection, WebMercator},
    viewport::{Direction, ViewState, ViewportController},
};

pub use crate::layers::{
    compositor::{ApplyOutcome, TileCanvas, TileCompositor},
    slot::{SlotContent, SlotId},
};

pub use crate::tiles::{
    catalog::RasterCatalog,
    registry::SourceRegistry,
    source::{FetchOutcome, FetchProgress, RasterSource, SourceInfo},
    worker::TileFetchWorker,
};

pub use crate::{Error as MapError, Result};

pub use std::{sync::Arc, time::Duration};

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};
