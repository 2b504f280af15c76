use crate::tiles::types::{LoadState, TileImage, TileOutcome};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a layer inside a tile entity.
///
/// Slots paint in `Ord` order: the base layer first, then overlays sorted
/// by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SlotId {
    Base,
    Overlay(String),
}

impl SlotId {
    pub fn overlay(name: impl Into<String>) -> Self {
        Self::Overlay(name.into())
    }

    pub fn is_base(&self) -> bool {
        matches!(self, Self::Base)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base => write!(f, "base"),
            Self::Overlay(name) => write!(f, "overlay:{}", name),
        }
    }
}

/// What a slot currently shows
#[derive(Debug, Clone)]
pub enum SlotContent {
    /// Placeholder while the fetch runs
    Loading,
    Ready(TileImage),
    /// "No data" placeholder
    NotFound,
    Failed(String),
}

impl SlotContent {
    pub fn image(&self) -> Option<&TileImage> {
        match self {
            Self::Ready(image) => Some(image),
            _ => None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        !matches!(self, Self::Ready(_))
    }

    pub fn load_state(&self) -> LoadState {
        match self {
            Self::Loading => LoadState::Loading,
            Self::Ready(_) => LoadState::Ready,
            Self::NotFound => LoadState::NotFound,
            Self::Failed(_) => LoadState::Failed,
        }
    }
}

impl From<TileOutcome> for SlotContent {
    fn from(outcome: TileOutcome) -> Self {
        match outcome {
            TileOutcome::Ready(image) => Self::Ready(image),
            TileOutcome::NotFound => Self::NotFound,
            TileOutcome::Failed(reason) => Self::Failed(reason),
        }
    }
}

/// One layer of a tile entity
#[derive(Debug, Clone)]
pub struct LayerSlot {
    pub id: SlotId,
    pub content: SlotContent,
    /// Sequence of the request that produced `content`
    pub sequence: u64,
}

impl LayerSlot {
    pub fn new(id: SlotId, content: SlotContent, sequence: u64) -> Self {
        Self { id, content, sequence }
    }

    pub fn load_state(&self) -> LoadState {
        self.content.load_state()
    }
}
