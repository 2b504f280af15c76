//! Per-tile layer composition
pub mod compositor;
pub mod entity;
pub mod slot;

pub use compositor::{ApplyOutcome, TileCanvas, TileCompositor};
pub use entity::TileEntity;
pub use slot::{LayerSlot, SlotContent, SlotId};
