use super::slot::{LayerSlot, SlotId};
use crate::core::geo::TileCell;
use std::collections::BTreeMap;

/// Composite of all layer slots shown at one tile cell
#[derive(Debug, Clone)]
pub struct TileEntity {
    pub cell: TileCell,
    slots: BTreeMap<SlotId, LayerSlot>,
}

impl TileEntity {
    pub fn new(cell: TileCell) -> Self {
        Self {
            cell,
            slots: BTreeMap::new(),
        }
    }

    pub fn slot(&self, id: &SlotId) -> Option<&LayerSlot> {
        self.slots.get(id)
    }

    /// Slots in paint order
    pub fn slots(&self) -> impl Iterator<Item = &LayerSlot> {
        self.slots.values()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub(crate) fn set(&mut self, slot: LayerSlot) {
        self.slots.insert(slot.id.clone(), slot);
    }

    pub(crate) fn remove(&mut self, id: &SlotId) -> Option<LayerSlot> {
        self.slots.remove(id)
    }

    /// True when every slot holds a terminal outcome
    pub fn is_settled(&self) -> bool {
        self.slots().all(|slot| slot.load_state().is_terminal())
    }
}
