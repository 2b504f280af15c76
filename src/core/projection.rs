//! Coordinate conversion between world pixels and WGS84.
//!
//! The tile core only needs this for the "coordinates under pointer" query;
//! everything else works in world pixels at an integer zoom level.

use crate::core::constants::MAX_LATITUDE;
use crate::core::geo::{LatLng, Point, TileCell};
use std::f64::consts::PI;

/// Converts between world pixel coordinates and geographic coordinates
pub trait Projection: Send + Sync {
    /// World pixel at `zoom` to geographic coordinates
    fn unproject(&self, world: Point, zoom: u8, tile_size: u32) -> LatLng;

    /// Geographic coordinates to world pixel at `zoom`
    fn project(&self, coords: LatLng, zoom: u8, tile_size: u32) -> Point;

    /// Cell containing the given coordinates
    fn cell_at(&self, coords: LatLng, zoom: u8, tile_size: u32) -> TileCell {
        let world = self.project(coords, zoom, tile_size);
        let max = TileCell::tiles_per_axis(zoom) as f64 - 1.0;
        let x = (world.x / tile_size as f64).floor().clamp(0.0, max);
        let y = (world.y / tile_size as f64).floor().clamp(0.0, max);
        TileCell::new(zoom, x as u32, y as u32)
    }
}

/// Spherical Web Mercator (EPSG:3857) slippy-map projection
#[derive(Debug, Clone, Copy, Default)]
pub struct WebMercator;

fn world_size(zoom: u8, tile_size: u32) -> f64 {
    tile_size as f64 * TileCell::tiles_per_axis(zoom) as f64
}

impl Projection for WebMercator {
    fn unproject(&self, world: Point, zoom: u8, tile_size: u32) -> LatLng {
        let size = world_size(zoom, tile_size);
        let lng = world.x / size * 360.0 - 180.0;
        let n = PI * (1.0 - 2.0 * world.y / size);
        let lat = n.sinh().atan().to_degrees();
        LatLng::new(lat, lng)
    }

    fn project(&self, coords: LatLng, zoom: u8, tile_size: u32) -> Point {
        let size = world_size(zoom, tile_size);
        let lat_rad = coords.lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
        let x = (coords.lng + 180.0) / 360.0 * size;
        let y = (1.0 - lat_rad.tan().asinh() / PI) / 2.0 * size;
        Point::new(x, y)
    }
}
