//! Application context tying the fetch worker, the compositor and the
//! viewport controller together.
//!
//! A [`MapView`] is owned by the UI context. Call [`MapView::tick`] once per
//! UI iteration: it applies finished fetches and runs one viewport update.

use crate::core::config::MapViewOptions;
use crate::core::geo::{LatLng, PixelRect, Point, TileCell};
use crate::core::projection::{Projection, WebMercator};
use crate::core::viewport::{Direction, ViewportController};
use crate::layers::compositor::{ApplyOutcome, TileCanvas, TileCompositor};
use crate::layers::slot::SlotId;
use crate::tiles::catalog::RasterCatalog;
use crate::tiles::types::TileEvent;
use crate::tiles::worker::TileFetchWorker;
use crate::{MapError, Result};
use image::RgbaImage;
use std::sync::Arc;
use std::time::Duration;

/// Overlay name plus whether all of its visible tiles have settled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayState {
    pub name: String,
    pub loaded: bool,
}

/// Summary of one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub applied: usize,
    pub stale: usize,
    pub requested: usize,
    pub evicted: usize,
    pub cancelled: usize,
}

impl TickReport {
    pub fn is_quiet(&self) -> bool {
        *self == Self::default()
    }
}

pub struct MapView {
    catalog: Arc<RasterCatalog>,
    worker: TileFetchWorker,
    compositor: TileCompositor,
    controller: ViewportController,
    projection: Box<dyn Projection>,
    options: MapViewOptions,
}

impl MapView {
    /// Create a view of `size` pixels showing the first layer of `catalog`
    pub fn new(catalog: Arc<RasterCatalog>, size: Point, options: MapViewOptions) -> Result<Self> {
        let mut worker = TileFetchWorker::new(options.fetch.clone(), catalog.clone())?;
        let mut compositor = TileCompositor::new(catalog.tile_size());
        let mut controller = ViewportController::new(
            options.viewport.clone(),
            catalog.tile_size(),
            catalog.zoom_levels().to_vec(),
            size,
        );
        let base = catalog.layers().first().cloned();
        controller.set_base_layer(base, &mut compositor, &mut worker);

        Ok(Self {
            catalog,
            worker,
            compositor,
            controller,
            projection: Box::new(WebMercator),
            options,
        })
    }

    pub fn with_projection(mut self, projection: Box<dyn Projection>) -> Self {
        self.projection = projection;
        self
    }

    pub fn catalog(&self) -> &Arc<RasterCatalog> {
        &self.catalog
    }

    /// Bind a new raster catalog. Layer selection survives where the new
    /// catalog still serves it.
    pub fn set_catalog(&mut self, catalog: Arc<RasterCatalog>) {
        log::info!(
            "switching raster catalog v{} -> v{}",
            self.catalog.version(),
            catalog.version()
        );
        self.worker.rebind(catalog.clone());
        self.controller.set_raster(
            catalog.tile_size(),
            catalog.zoom_levels().to_vec(),
            &mut self.compositor,
        );

        let base = match self.controller.base_layer() {
            Some(layer) if catalog.has_layer(layer) => Some(layer.to_string()),
            _ => catalog.layers().first().cloned(),
        };
        self.controller
            .set_base_layer(base, &mut self.compositor, &mut self.worker);

        let dropped: Vec<String> = self
            .controller
            .overlays()
            .filter(|name| !catalog.has_overlay(name))
            .cloned()
            .collect();
        for name in dropped {
            self.controller
                .remove_overlay(&name, &mut self.compositor, &mut self.worker);
        }
        self.catalog = catalog;
    }

    pub fn layer(&self) -> Option<&str> {
        self.controller.base_layer()
    }

    pub fn set_layer(&mut self, layer: &str) -> Result<()> {
        if !self.catalog.has_layer(layer) {
            return Err(MapError::UnknownLayer(layer.to_string()));
        }
        self.controller
            .set_base_layer(Some(layer.to_string()), &mut self.compositor, &mut self.worker);
        Ok(())
    }

    /// Returns false if the overlay was already shown
    pub fn add_overlay(&mut self, name: &str) -> Result<bool> {
        if !self.catalog.has_overlay(name) {
            return Err(MapError::UnknownLayer(name.to_string()));
        }
        Ok(self.controller.add_overlay(name))
    }

    pub fn remove_overlay(&mut self, name: &str) -> bool {
        self.controller
            .remove_overlay(name, &mut self.compositor, &mut self.worker)
    }

    pub fn overlays(&self) -> Vec<String> {
        self.controller.overlays().cloned().collect()
    }

    pub fn overlay_states(&self) -> Vec<OverlayState> {
        self.controller
            .overlays()
            .map(|name| {
                let slot = SlotId::overlay(name.clone());
                let loaded = self.controller.visible_cells().iter().all(|cell| {
                    self.compositor
                        .slot(cell, &slot)
                        .map(|s| s.load_state().is_terminal())
                        .unwrap_or(false)
                });
                OverlayState {
                    name: name.clone(),
                    loaded,
                }
            })
            .collect()
    }

    pub fn zoom(&self) -> u8 {
        self.controller.zoom()
    }

    pub fn zoom_levels(&self) -> &[u8] {
        self.controller.zoom_levels()
    }

    fn view_center(&self) -> Point {
        self.controller.size().multiply(0.5)
    }

    pub fn zoom_in(&mut self) -> bool {
        let anchor = self.view_center();
        self.controller.zoom_in(anchor)
    }

    pub fn zoom_out(&mut self) -> bool {
        let anchor = self.view_center();
        self.controller.zoom_out(anchor)
    }

    /// Zoom keeping the point under `anchor` fixed; the view center by default
    pub fn zoom_to(&mut self, level: u8, anchor: Option<Point>) -> Result<()> {
        let anchor = anchor.unwrap_or_else(|| self.view_center());
        if self.controller.zoom_to(level, anchor) {
            Ok(())
        } else {
            Err(MapError::InvalidZoom(level))
        }
    }

    pub fn set_coords(&mut self, coords: LatLng) {
        self.controller.set_coords(coords, self.projection.as_ref());
    }

    /// Coordinates at the view center
    pub fn coords(&self) -> LatLng {
        self.coords_at(self.view_center())
    }

    /// Coordinates under a screen position
    pub fn coords_at(&self, pos: Point) -> LatLng {
        self.controller.coords_at(pos, self.projection.as_ref())
    }

    pub fn viewed_area(&self, rect: PixelRect) -> (LatLng, LatLng) {
        self.controller.viewed_area(rect, self.projection.as_ref())
    }

    pub fn move_map(&mut self, direction: Direction, speed: f64, elapsed: Duration) {
        self.controller.move_towards(direction, speed, elapsed);
    }

    pub fn pan_by(&mut self, delta: Point) {
        self.controller.pan_by(delta);
    }

    pub fn resize(&mut self, size: Point) {
        self.controller.resize(size);
    }

    pub fn refresh(&mut self) {
        self.controller.refresh();
    }

    /// Apply ready results and run one viewport update
    pub fn tick(&mut self) -> TickReport {
        let events = self.worker.drain_results();
        self.finish_tick(events)
    }

    /// Like [`tick`](Self::tick), but waits up to `timeout` for a result first
    pub fn tick_wait(&mut self, timeout: Duration) -> TickReport {
        let events = if self.controller.is_dirty() {
            self.worker.drain_results()
        } else {
            self.worker.wait_results(timeout)
        };
        self.finish_tick(events)
    }

    fn finish_tick(&mut self, events: Vec<TileEvent>) -> TickReport {
        let mut report = TickReport::default();
        for event in &events {
            match self.compositor.apply(event) {
                ApplyOutcome::Applied => report.applied += 1,
                ApplyOutcome::Stale => report.stale += 1,
            }
        }
        let update = self.controller.update(&mut self.compositor, &mut self.worker);
        report.requested = update.requested;
        report.evicted = update.evicted;
        report.cancelled = update.cancelled;
        report
    }

    /// Nothing pending and nothing left to recompute
    pub fn is_settled(&self) -> bool {
        self.worker.pending_count() == 0 && !self.controller.is_dirty()
    }

    pub fn paint(&self, canvas: &mut dyn TileCanvas) {
        self.compositor
            .paint(canvas, self.controller.zoom(), self.controller.origin());
    }

    pub fn take_damage(&mut self) -> Vec<TileCell> {
        self.compositor.take_damage()
    }

    pub fn flatten(&self, cell: &TileCell) -> Option<RgbaImage> {
        self.compositor.flatten(cell)
    }

    pub fn compositor(&self) -> &TileCompositor {
        &self.compositor
    }

    pub fn worker(&self) -> &TileFetchWorker {
        &self.worker
    }

    pub fn controller(&self) -> &ViewportController {
        &self.controller
    }

    pub fn options(&self) -> &MapViewOptions {
        &self.options
    }
}
