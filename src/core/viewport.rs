use crate::core::config::ViewportConfig;
use crate::core::constants::MAX_ZOOM;
use crate::core::geo::{LatLng, PixelRect, Point, TileArea, TileCell};
use crate::core::projection::Projection;
use crate::layers::compositor::TileCompositor;
use crate::layers::slot::{SlotContent, SlotId};
use crate::prelude::{HashMap, HashSet};
use crate::tiles::types::FetchRequest;
use crate::tiles::worker::TileFetchWorker;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Compass direction of a continuous map move, in screen orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Top,
    TopLeft,
    Left,
    BottomLeft,
    Bottom,
    BottomRight,
    Right,
    TopRight,
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::Top,
        Direction::TopLeft,
        Direction::Left,
        Direction::BottomLeft,
        Direction::Bottom,
        Direction::BottomRight,
        Direction::Right,
        Direction::TopRight,
    ];

    /// Unit vector in screen pixels (y grows downwards)
    pub fn unit_vector(&self) -> Point {
        let d = std::f64::consts::FRAC_1_SQRT_2;
        match self {
            Self::Top => Point::new(0.0, -1.0),
            Self::TopLeft => Point::new(-d, -d),
            Self::Left => Point::new(-1.0, 0.0),
            Self::BottomLeft => Point::new(-d, d),
            Self::Bottom => Point::new(0.0, 1.0),
            Self::BottomRight => Point::new(d, d),
            Self::Right => Point::new(1.0, 0.0),
            Self::TopRight => Point::new(d, -d),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    Idle,
    Panning,
    Zooming,
}

/// What one [`ViewportController::update`] did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateReport {
    pub requested: usize,
    pub evicted: usize,
    pub cancelled: usize,
}

/// Turns viewport geometry into fetch requests and evictions.
///
/// The center is kept in world pixels of the current zoom level. Moving the
/// view only marks it dirty; [`update`](Self::update) does the diffing once
/// per tick.
#[derive(Debug)]
pub struct ViewportController {
    config: ViewportConfig,
    tile_size: u32,
    zoom_levels: Vec<u8>,
    zoom: u8,
    size: Point,
    center: Point,
    base_layer: Option<String>,
    overlays: BTreeSet<String>,
    state: ViewState,
    dirty: bool,
    zoom_changed: bool,
    visible: HashSet<TileCell>,
    /// Cells that left the visible set, with the cycle they left in
    leaving: HashMap<TileCell, u64>,
    cycle: u64,
}

/// Sorted, deduplicated levels the tile grid can address
fn supported_levels(mut levels: Vec<u8>) -> Vec<u8> {
    let before = levels.len();
    levels.retain(|&zoom| zoom <= MAX_ZOOM);
    if levels.len() != before {
        log::warn!("ignoring zoom levels above {}", MAX_ZOOM);
    }
    levels.sort_unstable();
    levels.dedup();
    levels
}

impl ViewportController {
    pub fn new(config: ViewportConfig, tile_size: u32, zoom_levels: Vec<u8>, size: Point) -> Self {
        let zoom_levels = supported_levels(zoom_levels);
        let zoom = zoom_levels.first().copied().unwrap_or(0);
        let mut controller = Self {
            config,
            tile_size,
            zoom_levels,
            zoom,
            size,
            center: Point::default(),
            base_layer: None,
            overlays: BTreeSet::new(),
            state: ViewState::Idle,
            dirty: true,
            zoom_changed: false,
            visible: HashSet::default(),
            leaving: HashMap::default(),
            cycle: 0,
        };
        let half = controller.world_size() / 2.0;
        controller.center = Point::new(half, half);
        controller
    }

    fn world_size(&self) -> f64 {
        self.tile_size as f64 * TileCell::tiles_per_axis(self.zoom) as f64
    }

    fn clamp_center(&self, center: Point) -> Point {
        let size = self.world_size();
        Point::new(center.x.clamp(0.0, size), center.y.clamp(0.0, size))
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    pub fn zoom_levels(&self) -> &[u8] {
        &self.zoom_levels
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn size(&self) -> Point {
        self.size
    }

    /// View center in world pixels
    pub fn center(&self) -> Point {
        self.center
    }

    /// World pixel at the top-left corner of the view
    pub fn origin(&self) -> Point {
        self.center.subtract(&self.size.multiply(0.5))
    }

    pub fn state(&self) -> ViewState {
        self.state
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty || self.zoom_changed
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn config(&self) -> &ViewportConfig {
        &self.config
    }

    pub fn has_zoom(&self, zoom: u8) -> bool {
        zoom <= MAX_ZOOM && (self.zoom_levels.is_empty() || self.zoom_levels.contains(&zoom))
    }

    /// Cells covered by the view plus the prefetch margin, clamped to the grid
    pub fn visible_area(&self) -> TileArea {
        if self.size.x <= 0.0 || self.size.y <= 0.0 {
            return TileArea::new(self.zoom, 0, 0, 0, 0);
        }
        let tile = self.tile_size as f64;
        let count = TileCell::tiles_per_axis(self.zoom) as i64;
        let margin = self.config.prefetch_margin as i64;
        let origin = self.origin();

        let span = |start: f64, extent: f64| -> (u32, u32) {
            let first = (start / tile).floor() as i64 - margin;
            let last = ((start + extent) / tile).ceil() as i64 + margin;
            let first = first.clamp(0, count);
            let last = last.clamp(0, count);
            (first as u32, (last - first).max(0) as u32)
        };
        let (x, w) = span(origin.x, self.size.x);
        let (y, h) = span(origin.y, self.size.y);
        TileArea::new(self.zoom, x, y, w, h)
    }

    /// Cells currently tracked as visible (after the last update)
    pub fn visible_cells(&self) -> &HashSet<TileCell> {
        &self.visible
    }

    pub fn pan_by(&mut self, delta: Point) {
        let next = self.clamp_center(self.center.add(&delta));
        if next != self.center {
            self.center = next;
            self.state = ViewState::Panning;
            self.dirty = true;
        }
    }

    /// Move `speed` pixels per second towards `direction` for `elapsed`
    pub fn move_towards(&mut self, direction: Direction, speed: f64, elapsed: Duration) {
        let delta = direction.unit_vector().multiply(speed * elapsed.as_secs_f64());
        self.pan_by(delta);
    }

    pub fn resize(&mut self, size: Point) {
        if size != self.size {
            self.size = Point::new(size.x.max(0.0), size.y.max(0.0));
            self.dirty = true;
        }
    }

    /// Switch to `level`, keeping the world point under `anchor` (screen
    /// pixels) in place. Returns false if the level is not available.
    pub fn zoom_to(&mut self, level: u8, anchor: Point) -> bool {
        if !self.has_zoom(level) {
            log::debug!("zoom level {} not available", level);
            return false;
        }
        if level == self.zoom {
            return true;
        }

        let offset = anchor.subtract(&self.size.multiply(0.5));
        let anchor_world = self.center.add(&offset);
        let scale = 2f64.powi(level as i32 - self.zoom as i32);

        self.zoom = level;
        self.center = self.clamp_center(anchor_world.multiply(scale).subtract(&offset));
        self.state = ViewState::Zooming;
        self.zoom_changed = true;
        self.dirty = true;
        true
    }

    pub fn zoom_in(&mut self, anchor: Point) -> bool {
        match self.next_zoom(true) {
            Some(level) => self.zoom_to(level, anchor),
            None => false,
        }
    }

    pub fn zoom_out(&mut self, anchor: Point) -> bool {
        match self.next_zoom(false) {
            Some(level) => self.zoom_to(level, anchor),
            None => false,
        }
    }

    fn next_zoom(&self, deeper: bool) -> Option<u8> {
        if self.zoom_levels.is_empty() {
            return if deeper {
                (self.zoom < MAX_ZOOM).then(|| self.zoom + 1)
            } else {
                self.zoom.checked_sub(1)
            };
        }
        if deeper {
            self.zoom_levels.iter().copied().find(|&z| z > self.zoom)
        } else {
            self.zoom_levels.iter().rev().copied().find(|&z| z < self.zoom)
        }
    }

    pub fn set_coords(&mut self, coords: LatLng, projection: &dyn Projection) {
        let center = projection.project(coords, self.zoom, self.tile_size);
        let center = self.clamp_center(center);
        if center != self.center {
            self.center = center;
            self.dirty = true;
        }
    }

    /// Geographic coordinates under the screen position `pos`
    pub fn coords_at(&self, pos: Point, projection: &dyn Projection) -> LatLng {
        let world = self.origin().add(&pos);
        projection.unproject(world, self.zoom, self.tile_size)
    }

    /// North-west and south-east corners of a screen rectangle
    pub fn viewed_area(&self, rect: PixelRect, projection: &dyn Projection) -> (LatLng, LatLng) {
        (
            self.coords_at(rect.min, projection),
            self.coords_at(rect.max, projection),
        )
    }

    pub fn base_layer(&self) -> Option<&str> {
        self.base_layer.as_deref()
    }

    /// Replace the background layer. Existing base slots are dropped.
    pub fn set_base_layer(
        &mut self,
        layer: Option<String>,
        compositor: &mut TileCompositor,
        worker: &mut TileFetchWorker,
    ) {
        if layer == self.base_layer {
            return;
        }
        worker.cancel_slot(&SlotId::Base);
        compositor.remove_slot_everywhere(&SlotId::Base);
        log::debug!("base layer {:?} -> {:?}", self.base_layer, layer);
        self.base_layer = layer;
        self.dirty = true;
    }

    pub fn overlays(&self) -> impl Iterator<Item = &String> {
        self.overlays.iter()
    }

    pub fn has_overlay(&self, name: &str) -> bool {
        self.overlays.contains(name)
    }

    pub fn add_overlay(&mut self, name: &str) -> bool {
        let added = self.overlays.insert(name.to_string());
        if added {
            self.dirty = true;
        }
        added
    }

    pub fn remove_overlay(
        &mut self,
        name: &str,
        compositor: &mut TileCompositor,
        worker: &mut TileFetchWorker,
    ) -> bool {
        if !self.overlays.remove(name) {
            return false;
        }
        let slot = SlotId::overlay(name);
        worker.cancel_slot(&slot);
        compositor.remove_slot_everywhere(&slot);
        self.dirty = true;
        true
    }

    /// Adopt the geometry of a new raster catalog. Every tracked cell is dropped.
    pub fn set_raster(&mut self, tile_size: u32, zoom_levels: Vec<u8>, compositor: &mut TileCompositor) {
        let world_center = self.center.multiply(1.0 / self.world_size().max(1.0));
        self.tile_size = tile_size;
        self.zoom_levels = supported_levels(zoom_levels);
        if !self.has_zoom(self.zoom) {
            let current = self.zoom;
            self.zoom = self
                .zoom_levels
                .iter()
                .copied()
                .min_by_key(|&z| (z as i32 - current as i32).abs())
                .unwrap_or(0);
        }
        self.center = world_center.multiply(self.world_size());

        compositor.set_tile_size(tile_size);
        compositor.clear();
        self.visible.clear();
        self.leaving.clear();
        self.zoom_changed = false;
        self.dirty = true;
    }

    /// Force the next update to recompute the visible set and retry failures
    pub fn refresh(&mut self) {
        self.dirty = true;
    }

    /// Run one update cycle: diff the visible set, request missing layers
    /// and evict cells that stayed outside for the grace period.
    pub fn update(&mut self, compositor: &mut TileCompositor, worker: &mut TileFetchWorker) -> UpdateReport {
        self.cycle += 1;
        let mut report = UpdateReport::default();

        if self.zoom_changed {
            // a different zoom is a disjoint address space
            for cell in compositor.cells() {
                if cell.zoom != self.zoom && compositor.remove_entity(cell).is_some() {
                    report.evicted += 1;
                }
            }
            report.cancelled += worker.retain_zoom(self.zoom);
            self.visible.clear();
            self.leaving.clear();
            // survivors at this zoom are kept only if the new area covers them
            for cell in compositor.cells() {
                self.leaving.insert(cell, self.cycle);
            }
            self.zoom_changed = false;
            self.dirty = true;
        }

        if self.dirty {
            let area = self.visible_area();
            let next: HashSet<TileCell> = area.cells().collect();
            for cell in self.visible.difference(&next) {
                self.leaving.entry(*cell).or_insert(self.cycle);
            }
            for cell in area.cells() {
                self.leaving.remove(&cell);
                let newly_visible = !self.visible.contains(&cell);
                report.requested += self.request_missing(cell, newly_visible, compositor, worker);
            }
            self.visible = next;
            self.dirty = false;
        }

        let grace = self.config.eviction_grace as u64;
        let cycle = self.cycle;
        let expired: Vec<TileCell> = self
            .leaving
            .iter()
            .filter(|&(_, &left)| cycle - left >= grace)
            .map(|(cell, _)| *cell)
            .collect();
        for cell in expired {
            self.leaving.remove(&cell);
            if compositor.remove_entity(cell).is_some() {
                report.evicted += 1;
            }
            report.cancelled += worker.cancel_cell(cell);
        }
        compositor.prune_empty();

        if report.requested > 0 || report.evicted > 0 {
            log::debug!(
                "update #{} at z{}: {} requested, {} evicted, {} cancelled",
                self.cycle,
                self.zoom,
                report.requested,
                report.evicted,
                report.cancelled
            );
        }
        self.state = ViewState::Idle;
        report
    }

    fn wanted_slots(&self) -> Vec<(SlotId, String)> {
        let mut slots = Vec::with_capacity(self.overlays.len() + 1);
        if let Some(base) = &self.base_layer {
            slots.push((SlotId::Base, base.clone()));
        }
        slots.extend(
            self.overlays
                .iter()
                .map(|name| (SlotId::overlay(name.clone()), name.clone())),
        );
        slots
    }

    fn request_missing(
        &self,
        cell: TileCell,
        newly_visible: bool,
        compositor: &mut TileCompositor,
        worker: &mut TileFetchWorker,
    ) -> usize {
        let mut requested = 0;
        for (slot, layer) in self.wanted_slots() {
            let address = cell.address(layer);
            let wanted = match compositor.slot(&cell, &slot).map(|s| &s.content) {
                None => true,
                Some(SlotContent::Ready(_)) => false,
                Some(SlotContent::Loading) => {
                    !worker.is_pending(&FetchRequest::new(address.clone(), slot.clone()))
                }
                Some(SlotContent::Failed(_)) => true,
                Some(SlotContent::NotFound) => newly_visible,
            };
            if !wanted {
                continue;
            }
            if let Some(sequence) = worker.request(address, slot.clone()) {
                compositor.set_layer_loading(cell, &slot, sequence);
                requested += 1;
            }
        }
        requested
    }
}
