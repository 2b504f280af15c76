use super::types::{FetchRequest, TileEvent};
use crate::core::constants::TILE_SIZE;
use crate::core::geo::TileAddress;
use async_trait::async_trait;
use crossbeam_channel::{Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// Raw outcome of a raster source fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Encoded image bytes (PNG, JPEG, ...)
    Ready(Vec<u8>),
    NotFound,
    Failed(String),
}

/// Descriptive metadata of a raster package
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub packager: String,
}

/// Trait representing a pluggable raster backend.
///
/// Sources never panic or return errors across the worker boundary; every
/// fetch ends in one of the three [`FetchOutcome`]s.
#[async_trait]
pub trait RasterSource: Send + Sync {
    fn info(&self) -> SourceInfo;

    /// Layers this source can serve as the background
    fn layers(&self) -> Vec<String>;

    /// Layers this source can serve as overlays
    fn overlays(&self) -> Vec<String> {
        Vec::new()
    }

    fn zoom_levels(&self) -> Vec<u8>;

    fn tile_size(&self) -> u32 {
        TILE_SIZE
    }

    /// Fetch the encoded tile at `address`.
    ///
    /// Sources that take noticeable time should call [`FetchProgress::loading`]
    /// once they start.
    async fn fetch(&self, address: &TileAddress, progress: &FetchProgress) -> FetchOutcome;
}

/// Handle a source uses to report that a fetch is in progress
pub struct FetchProgress {
    tx: Option<Sender<TileEvent>>,
    request: FetchRequest,
    sequence: u64,
    reported: AtomicBool,
}

impl FetchProgress {
    pub(crate) fn new(tx: Sender<TileEvent>, request: FetchRequest, sequence: u64) -> Self {
        Self {
            tx: Some(tx),
            request,
            sequence,
            reported: AtomicBool::new(false),
        }
    }

    /// Progress handle that drops all notifications, for calling sources directly
    pub fn detached(request: FetchRequest) -> Self {
        Self {
            tx: None,
            request,
            sequence: 0,
            reported: AtomicBool::new(false),
        }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Report the `Loading` state. Only the first call has an effect.
    pub fn loading(&self) {
        if self.reported.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(TileEvent::loading(self.request.clone(), self.sequence)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                log::warn!("result queue full, dropping loading notice for {}", self.request.address);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    pub fn has_reported(&self) -> bool {
        self.reported.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::slot::SlotId;
    use crate::tiles::types::TileEventKind;

    fn request() -> FetchRequest {
        FetchRequest::new(TileAddress::new("base", 3, 1, 1), SlotId::Base)
    }

    #[test]
    fn test_loading_is_reported_once() {
        let (tx, rx) = crossbeam_channel::bounded(4);
        let progress = FetchProgress::new(tx, request(), 7);
        progress.loading();
        progress.loading();

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].sequence, 7);
        assert!(matches!(events[0].kind, TileEventKind::Loading));
        assert!(progress.has_reported());
    }

    #[test]
    fn test_detached_progress_is_silent() {
        let progress = FetchProgress::detached(request());
        progress.loading();
        assert!(progress.has_reported());
    }
}
