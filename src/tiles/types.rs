//! Request and result types exchanged between the UI context and the worker

use crate::core::geo::{TileAddress, TileCell};
use crate::layers::slot::SlotId;
use image::RgbaImage;
use std::sync::Arc;

/// Decoded tile pixels, shared between the cache and compositor slots
pub type TileImage = Arc<RgbaImage>;

/// One (address, layer slot) pair to fetch.
///
/// At most one request per pair is outstanding at any time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchRequest {
    pub address: TileAddress,
    pub slot: SlotId,
}

impl FetchRequest {
    pub fn new(address: TileAddress, slot: SlotId) -> Self {
        Self { address, slot }
    }

    pub fn cell(&self) -> TileCell {
        self.address.cell()
    }
}

/// Terminal outcome of a fetch as seen by the UI context
#[derive(Debug, Clone)]
pub enum TileOutcome {
    Ready(TileImage),
    /// The tile legitimately does not exist
    NotFound,
    /// Transient backend or decoding error
    Failed(String),
}

impl TileOutcome {
    pub fn load_state(&self) -> LoadState {
        match self {
            Self::Ready(_) => LoadState::Ready,
            Self::NotFound => LoadState::NotFound,
            Self::Failed(_) => LoadState::Failed,
        }
    }
}

#[derive(Debug, Clone)]
pub enum TileEventKind {
    /// The source started loading; shown as a placeholder
    Loading,
    /// Exactly one per request
    Finished(TileOutcome),
}

/// Event posted from the worker context back to the UI context
#[derive(Debug, Clone)]
pub struct TileEvent {
    pub request: FetchRequest,
    pub sequence: u64,
    pub kind: TileEventKind,
}

impl TileEvent {
    pub fn loading(request: FetchRequest, sequence: u64) -> Self {
        Self {
            request,
            sequence,
            kind: TileEventKind::Loading,
        }
    }

    pub fn finished(request: FetchRequest, sequence: u64, outcome: TileOutcome) -> Self {
        Self {
            request,
            sequence,
            kind: TileEventKind::Finished(outcome),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, TileEventKind::Finished(_))
    }
}

/// Lifecycle of a single request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading,
    Ready,
    NotFound,
    Failed,
}

impl LoadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::NotFound | Self::Failed)
    }
}
