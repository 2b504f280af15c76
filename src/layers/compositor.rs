//! Owns the tile entities of the view and composes their layer stacks.
//!
//! All mutation happens on the UI context. Results coming from the fetch
//! worker go through [`TileCompositor::apply`], which discards anything
//! older than what a slot already shows.

use super::entity::TileEntity;
use super::slot::{LayerSlot, SlotContent, SlotId};
use crate::core::geo::{PixelRect, Point, TileCell};
use crate::prelude::{HashMap, HashSet};
use crate::tiles::types::{TileEvent, TileEventKind, TileImage};
use image::RgbaImage;

/// Result of applying a worker event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Entity or slot gone, or a newer result is already shown
    Stale,
}

/// Drawing backend for [`TileCompositor::paint`]
pub trait TileCanvas {
    /// Draw one layer of a tile. Called bottom-up for each entity.
    fn draw_layer(&mut self, cell: TileCell, slot: &SlotId, content: &SlotContent, rect: PixelRect);
}

#[derive(Debug)]
pub struct TileCompositor {
    tile_size: u32,
    entities: HashMap<TileCell, TileEntity>,
    damage: HashSet<TileCell>,
}

impl TileCompositor {
    pub fn new(tile_size: u32) -> Self {
        Self {
            tile_size,
            entities: HashMap::default(),
            damage: HashSet::default(),
        }
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Changing the tile size drops every entity
    pub fn set_tile_size(&mut self, tile_size: u32) {
        if tile_size != self.tile_size {
            self.tile_size = tile_size;
            self.clear();
        }
    }

    pub fn ensure_entity(&mut self, cell: TileCell) -> &mut TileEntity {
        self.entities
            .entry(cell)
            .or_insert_with(|| TileEntity::new(cell))
    }

    pub fn set_layer(&mut self, cell: TileCell, slot: &SlotId, image: TileImage, sequence: u64) -> ApplyOutcome {
        self.store(cell, slot, SlotContent::Ready(image), sequence)
    }

    pub fn set_layer_loading(&mut self, cell: TileCell, slot: &SlotId, sequence: u64) -> ApplyOutcome {
        self.store(cell, slot, SlotContent::Loading, sequence)
    }

    pub fn set_layer_not_found(&mut self, cell: TileCell, slot: &SlotId, sequence: u64) -> ApplyOutcome {
        self.store(cell, slot, SlotContent::NotFound, sequence)
    }

    pub fn set_layer_failed(
        &mut self,
        cell: TileCell,
        slot: &SlotId,
        reason: impl Into<String>,
        sequence: u64,
    ) -> ApplyOutcome {
        self.store(cell, slot, SlotContent::Failed(reason.into()), sequence)
    }

    fn store(&mut self, cell: TileCell, slot: &SlotId, content: SlotContent, sequence: u64) -> ApplyOutcome {
        let entity = self.ensure_entity(cell);
        if let Some(existing) = entity.slot(slot) {
            if existing.sequence > sequence {
                return ApplyOutcome::Stale;
            }
        }
        entity.set(LayerSlot::new(slot.clone(), content, sequence));
        self.damage.insert(cell);
        ApplyOutcome::Applied
    }

    /// Remove one layer; the entity goes away with its last slot
    pub fn remove_layer(&mut self, cell: TileCell, slot: &SlotId) -> bool {
        let Some(entity) = self.entities.get_mut(&cell) else {
            return false;
        };
        let removed = entity.remove(slot).is_some();
        if entity.is_empty() {
            self.entities.remove(&cell);
        }
        if removed {
            self.damage.insert(cell);
        }
        removed
    }

    /// Remove `slot` from every entity
    pub fn remove_slot_everywhere(&mut self, slot: &SlotId) -> usize {
        let cells: Vec<TileCell> = self
            .entities
            .iter()
            .filter(|(_, entity)| entity.slot(slot).is_some())
            .map(|(cell, _)| *cell)
            .collect();
        for cell in &cells {
            self.remove_layer(*cell, slot);
        }
        cells.len()
    }

    pub fn remove_entity(&mut self, cell: TileCell) -> Option<TileEntity> {
        let removed = self.entities.remove(&cell);
        if removed.is_some() {
            self.damage.insert(cell);
        }
        removed
    }

    /// Drop entities left without slots
    pub fn prune_empty(&mut self) -> usize {
        let before = self.entities.len();
        self.entities.retain(|_, entity| !entity.is_empty());
        before - self.entities.len()
    }

    /// Apply a worker event.
    ///
    /// Never creates entities or slots; an event for a cell that has been
    /// evicted is stale.
    pub fn apply(&mut self, event: &TileEvent) -> ApplyOutcome {
        let cell = event.request.cell();
        let Some(entity) = self.entities.get_mut(&cell) else {
            return ApplyOutcome::Stale;
        };
        let Some(slot) = entity.slot(&event.request.slot) else {
            return ApplyOutcome::Stale;
        };
        if event.sequence < slot.sequence {
            log::trace!(
                "stale result for {} (seq {} < {})",
                event.request.address,
                event.sequence,
                slot.sequence
            );
            return ApplyOutcome::Stale;
        }

        let content = match &event.kind {
            TileEventKind::Loading => {
                if event.sequence == slot.sequence {
                    // terminal result of the same request already shown, or no change
                    return if slot.load_state().is_terminal() {
                        ApplyOutcome::Stale
                    } else {
                        ApplyOutcome::Applied
                    };
                }
                SlotContent::Loading
            }
            TileEventKind::Finished(outcome) => SlotContent::from(outcome.clone()),
        };

        entity.set(LayerSlot::new(event.request.slot.clone(), content, event.sequence));
        self.damage.insert(cell);
        ApplyOutcome::Applied
    }

    pub fn entity(&self, cell: &TileCell) -> Option<&TileEntity> {
        self.entities.get(cell)
    }

    pub fn slot(&self, cell: &TileCell, slot: &SlotId) -> Option<&LayerSlot> {
        self.entities.get(cell).and_then(|entity| entity.slot(slot))
    }

    pub fn contains(&self, cell: &TileCell) -> bool {
        self.entities.contains_key(cell)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Cells with an entity, sorted
    pub fn cells(&self) -> Vec<TileCell> {
        let mut cells: Vec<TileCell> = self.entities.keys().copied().collect();
        cells.sort();
        cells
    }

    pub fn clear(&mut self) {
        self.damage.extend(self.entities.keys().copied());
        self.entities.clear();
    }

    /// Cells changed since the last call
    pub fn take_damage(&mut self) -> Vec<TileCell> {
        let mut cells: Vec<TileCell> = self.damage.drain().collect();
        cells.sort();
        cells
    }

    pub fn has_damage(&self) -> bool {
        !self.damage.is_empty()
    }

    /// Paint every entity at `zoom`, with `view_origin` the world pixel at
    /// the canvas top-left corner
    pub fn paint(&self, canvas: &mut dyn TileCanvas, zoom: u8, view_origin: Point) {
        let size = self.tile_size as f64;
        for cell in self.cells() {
            if cell.zoom != zoom {
                continue;
            }
            let Some(entity) = self.entities.get(&cell) else {
                continue;
            };
            let min = cell.origin(self.tile_size).subtract(&view_origin);
            let rect = PixelRect::new(min, min.add(&Point::new(size, size)));
            for slot in entity.slots() {
                canvas.draw_layer(cell, &slot.id, &slot.content, rect);
            }
        }
    }

    /// Compose the ready layers of `cell` into one image
    pub fn flatten(&self, cell: &TileCell) -> Option<RgbaImage> {
        let entity = self.entities.get(cell)?;
        let mut canvas = RgbaImage::new(self.tile_size, self.tile_size);
        for slot in entity.slots() {
            let Some(image) = slot.content.image() else {
                continue;
            };
            if image.dimensions() == (self.tile_size, self.tile_size) {
                image::imageops::overlay(&mut canvas, &**image, 0, 0);
            } else {
                let scaled = image::imageops::resize(
                    &**image,
                    self.tile_size,
                    self.tile_size,
                    image::imageops::FilterType::Triangle,
                );
                image::imageops::overlay(&mut canvas, &scaled, 0, 0);
            }
        }
        Some(canvas)
    }
}
