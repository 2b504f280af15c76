use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents a geographical coordinate with latitude and longitude
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Creates a new LatLng coordinate
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl Default for LatLng {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Represents a point in screen or world pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn add(&self, other: &Point) -> Point {
        Point::new(self.x + other.x, self.y + other.y)
    }

    pub fn subtract(&self, other: &Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }

    pub fn multiply(&self, scalar: f64) -> Point {
        Point::new(self.x * scalar, self.y * scalar)
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

impl Default for Point {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Axis-aligned rectangle in viewport pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelRect {
    pub min: Point,
    pub max: Point,
}

impl PixelRect {
    pub fn new(min: Point, max: Point) -> Self {
        Self { min, max }
    }

    /// Rectangle anchored at the origin with the given size
    pub fn from_size(size: Point) -> Self {
        Self::new(Point::new(0.0, 0.0), size)
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }
}

/// Grid position of a tile: zoom level plus integer tile coordinates.
///
/// This is a [`TileAddress`] without the layer name. Tile entities in the
/// compositor are keyed by cell, and every layer of that cell lives in one
/// entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCell {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCell {
    pub fn new(zoom: u8, x: u32, y: u32) -> Self {
        Self { zoom, x, y }
    }

    /// Number of tiles along one axis at this cell's zoom level
    pub fn tiles_per_axis(zoom: u8) -> u64 {
        1u64 << zoom.min(63)
    }

    /// Checks if the cell lies inside the tile grid of its zoom level
    pub fn is_valid(&self) -> bool {
        let max = Self::tiles_per_axis(self.zoom);
        (self.x as u64) < max && (self.y as u64) < max
    }

    /// Address of this cell in the given layer
    pub fn address(&self, layer: impl Into<String>) -> TileAddress {
        TileAddress::new(layer, self.zoom, self.x, self.y)
    }

    /// World pixel position of the tile's north-west corner
    pub fn origin(&self, tile_size: u32) -> Point {
        Point::new(
            self.x as f64 * tile_size as f64,
            self.y as f64 * tile_size as f64,
        )
    }
}

impl fmt::Display for TileCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Identifies one tile of one raster layer.
///
/// Immutable value type used as a lookup key; two addresses are equal iff
/// layer, zoom and both coordinates match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileAddress {
    pub layer: String,
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileAddress {
    pub fn new(layer: impl Into<String>, zoom: u8, x: u32, y: u32) -> Self {
        Self {
            layer: layer.into(),
            zoom,
            x,
            y,
        }
    }

    /// Grid position of this address
    pub fn cell(&self) -> TileCell {
        TileCell::new(self.zoom, self.x, self.y)
    }
}

impl fmt::Display for TileAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}/{}/{}", self.layer, self.zoom, self.x, self.y)
    }
}

/// Rectangular area of tiles at one zoom level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileArea {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl TileArea {
    pub fn new(zoom: u8, x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { zoom, x, y, w, h }
    }

    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    pub fn contains(&self, cell: &TileCell) -> bool {
        cell.zoom == self.zoom
            && cell.x >= self.x
            && cell.y >= self.y
            && (cell.x as u64) < self.x as u64 + self.w as u64
            && (cell.y as u64) < self.y as u64 + self.h as u64
    }

    /// All cells of the area in row-major order
    pub fn cells(&self) -> impl Iterator<Item = TileCell> + '_ {
        (self.y..self.y + self.h)
            .flat_map(move |y| (self.x..self.x + self.w).map(move |x| TileCell::new(self.zoom, x, y)))
    }
}
