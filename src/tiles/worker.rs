//! Background tile fetching.
//!
//! [`TileFetchWorker`] lives on the UI context. It owns the request queue,
//! the dedup set and the decoded tile cache, and hands jobs to a worker
//! context running on its own Tokio runtime. Results come back over a
//! bounded crossbeam channel that the UI context drains once per tick.

use super::cache::TileCache;
use super::catalog::RasterCatalog;
use super::source::{FetchOutcome, FetchProgress};
use super::types::{FetchRequest, LoadState, TileEvent, TileEventKind, TileOutcome};
use crate::core::config::FetchConfig;
use crate::core::geo::{TileAddress, TileCell};
use crate::layers::slot::SlotId;
use crate::prelude::HashMap;
use crate::runtime::WorkerContext;
use crate::Result;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use futures::FutureExt;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

enum WorkerCommand {
    Fetch(FetchJob),
    Rebind(Arc<RasterCatalog>),
    Shutdown,
}

#[derive(Debug, Clone)]
struct FetchJob {
    request: FetchRequest,
    sequence: u64,
}

/// Result of [`TileFetchWorker::cancel`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The request had not started and was dropped
    Dequeued,
    /// The request is already running; its result will be ignored
    Detached,
    NotPending,
}

pub struct TileFetchWorker {
    config: FetchConfig,
    catalog: Arc<RasterCatalog>,
    commands: UnboundedSender<WorkerCommand>,
    results: Receiver<TileEvent>,
    queue: VecDeque<FetchJob>,
    pending: HashMap<FetchRequest, u64>,
    /// Events produced without a round trip (cache hits, unroutable layers)
    local: VecDeque<TileEvent>,
    dispatched: usize,
    next_sequence: u64,
    /// First sequence issued against the current catalog
    epoch: u64,
    cache: TileCache,
    context: WorkerContext,
}

impl TileFetchWorker {
    pub fn new(config: FetchConfig, catalog: Arc<RasterCatalog>) -> Result<Self> {
        let (commands, command_rx) = unbounded_channel();
        let (result_tx, results) = crossbeam_channel::bounded(config.result_queue_capacity());

        let context = WorkerContext::spawn(
            "kompas-fetch",
            config.worker_threads,
            run_worker(catalog.clone(), command_rx, result_tx),
        )?;

        log::info!(
            "tile fetch worker started: {} in flight, cache of {} tiles",
            config.max_in_flight.max(1),
            config.cache_size
        );

        Ok(Self {
            cache: TileCache::new(config.cache_size),
            config,
            catalog,
            commands,
            results,
            queue: VecDeque::new(),
            pending: HashMap::default(),
            local: VecDeque::new(),
            dispatched: 0,
            next_sequence: 1,
            epoch: 1,
            context,
        })
    }

    /// Issue a fetch for `address` into `slot`.
    ///
    /// Returns the sequence number stamped on the request, or `None` if an
    /// identical request is already outstanding.
    pub fn request(&mut self, address: TileAddress, slot: SlotId) -> Option<u64> {
        let request = FetchRequest::new(address, slot);
        if self.pending.contains_key(&request) {
            log::trace!("{} already pending for {}", request.address, request.slot);
            return None;
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.pending.insert(request.clone(), sequence);

        if let Some(image) = self.cache.get(&request.address) {
            log::trace!("cache hit for {}", request.address);
            self.local
                .push_back(TileEvent::finished(request, sequence, TileOutcome::Ready(image)));
        } else if self.catalog.route(&request.address.layer).is_none() {
            let reason = format!("no raster source for layer '{}'", request.address.layer);
            self.local
                .push_back(TileEvent::finished(request, sequence, TileOutcome::Failed(reason)));
        } else {
            self.queue.push_back(FetchJob { request, sequence });
            self.dispatch();
        }
        Some(sequence)
    }

    fn dispatch(&mut self) {
        let limit = self.config.max_in_flight.max(1);
        while self.dispatched < limit {
            let Some(job) = self.queue.pop_front() else {
                break;
            };
            match self.commands.send(WorkerCommand::Fetch(job)) {
                Ok(()) => self.dispatched += 1,
                Err(err) => {
                    if let WorkerCommand::Fetch(job) = err.0 {
                        log::error!("fetch worker stopped, failing {}", job.request.address);
                        let outcome = TileOutcome::Failed("fetch worker stopped".to_string());
                        self.local
                            .push_back(TileEvent::finished(job.request, job.sequence, outcome));
                    }
                }
            }
        }
    }

    /// Cancel the request for (`address`, `slot`).
    ///
    /// Queued requests are dropped; dispatched ones run to completion but are
    /// no longer tracked, so the pair can be requested again at once.
    pub fn cancel(&mut self, address: &TileAddress, slot: &SlotId) -> CancelOutcome {
        let request = FetchRequest::new(address.clone(), slot.clone());
        self.cancel_request(&request)
    }

    fn cancel_request(&mut self, request: &FetchRequest) -> CancelOutcome {
        let Some(sequence) = self.pending.remove(request) else {
            return CancelOutcome::NotPending;
        };

        if let Some(position) = self.queue.iter().position(|job| job.sequence == sequence) {
            self.queue.remove(position);
            return CancelOutcome::Dequeued;
        }
        let before = self.local.len();
        self.local.retain(|event| event.sequence != sequence);
        if self.local.len() != before {
            CancelOutcome::Dequeued
        } else {
            CancelOutcome::Detached
        }
    }

    /// Cancel every pending request on `cell`, whatever its layer
    pub fn cancel_cell(&mut self, cell: TileCell) -> usize {
        self.cancel_where(|request| request.cell() == cell)
    }

    /// Cancel every pending request targeting `slot`
    pub fn cancel_slot(&mut self, slot: &SlotId) -> usize {
        self.cancel_where(|request| &request.slot == slot)
    }

    /// Cancel every pending request outside `zoom`
    pub fn retain_zoom(&mut self, zoom: u8) -> usize {
        self.cancel_where(|request| request.address.zoom != zoom)
    }

    pub fn cancel_all(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        self.queue.clear();
        self.local.clear();
        count
    }

    fn cancel_where(&mut self, predicate: impl Fn(&FetchRequest) -> bool) -> usize {
        let doomed: Vec<FetchRequest> = self
            .pending
            .keys()
            .filter(|request| predicate(request))
            .cloned()
            .collect();
        for request in &doomed {
            self.cancel_request(request);
        }
        doomed.len()
    }

    /// Take every event that is ready now, in delivery order
    pub fn drain_results(&mut self) -> Vec<TileEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.local.pop_front() {
            self.settle(&event, false);
            events.push(event);
        }
        while let Ok(event) = self.results.try_recv() {
            self.settle(&event, true);
            events.push(event);
        }
        self.dispatch();
        events
    }

    /// Block up to `timeout` for the first event, then drain
    pub fn wait_results(&mut self, timeout: Duration) -> Vec<TileEvent> {
        if !self.local.is_empty() {
            return self.drain_results();
        }
        match self.results.recv_timeout(timeout) {
            Ok(event) => {
                self.settle(&event, true);
                let mut events = vec![event];
                events.extend(self.drain_results());
                events
            }
            Err(RecvTimeoutError::Timeout) => Vec::new(),
            Err(RecvTimeoutError::Disconnected) => {
                log::warn!("fetch worker disconnected");
                self.drain_results()
            }
        }
    }

    fn settle(&mut self, event: &TileEvent, remote: bool) {
        let TileEventKind::Finished(outcome) = &event.kind else {
            return;
        };
        if remote {
            self.dispatched = self.dispatched.saturating_sub(1);
        }
        if self.pending.get(&event.request) == Some(&event.sequence) {
            self.pending.remove(&event.request);
        }
        if let TileOutcome::Ready(image) = outcome {
            if event.sequence >= self.epoch
                && !self
                    .cache
                    .put(event.request.address.clone(), event.sequence, image.clone())
            {
                log::trace!("not caching older result for {}", event.request.address);
            }
        }
    }

    /// Swap the raster catalog.
    ///
    /// All pending requests are dropped and the cache cleared, since a layer
    /// name may now resolve to different pixels.
    pub fn rebind(&mut self, catalog: Arc<RasterCatalog>) {
        let dropped = self.cancel_all();
        self.cache.clear();
        self.epoch = self.next_sequence;
        self.catalog = catalog.clone();
        if self.commands.send(WorkerCommand::Rebind(catalog)).is_err() {
            log::error!("fetch worker stopped, rebind lost");
        }
        log::debug!(
            "fetch worker rebound to catalog v{}, {} requests dropped",
            self.catalog.version(),
            dropped
        );
    }

    pub fn catalog(&self) -> &Arc<RasterCatalog> {
        &self.catalog
    }

    pub fn is_pending(&self, request: &FetchRequest) -> bool {
        self.pending.contains_key(request)
    }

    pub fn pending_sequence(&self, request: &FetchRequest) -> Option<u64> {
        self.pending.get(request).copied()
    }

    /// `Loading` while the request is outstanding, `Idle` otherwise
    pub fn load_state(&self, request: &FetchRequest) -> LoadState {
        if self.is_pending(request) {
            LoadState::Loading
        } else {
            LoadState::Idle
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn queued_count(&self) -> usize {
        self.queue.len()
    }

    /// Jobs handed to the worker context whose result has not been drained
    pub fn in_flight_count(&self) -> usize {
        self.dispatched
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

impl Drop for TileFetchWorker {
    fn drop(&mut self) {
        let _ = self.commands.send(WorkerCommand::Shutdown);
        log::debug!("stopping {}", self.context.name());
    }
}

async fn run_worker(
    mut catalog: Arc<RasterCatalog>,
    mut commands: UnboundedReceiver<WorkerCommand>,
    results: Sender<TileEvent>,
) {
    while let Some(command) = commands.recv().await {
        match command {
            WorkerCommand::Fetch(job) => {
                tokio::spawn(run_job(catalog.clone(), job, results.clone()));
            }
            WorkerCommand::Rebind(next) => catalog = next,
            WorkerCommand::Shutdown => break,
        }
    }
    log::debug!("fetch worker loop finished");
}

async fn run_job(catalog: Arc<RasterCatalog>, job: FetchJob, results: Sender<TileEvent>) {
    let FetchJob { request, sequence } = job;

    let outcome = match catalog.route(&request.address.layer).cloned() {
        None => TileOutcome::Failed(format!(
            "no raster source for layer '{}'",
            request.address.layer
        )),
        Some(source) => {
            let progress = FetchProgress::new(results.clone(), request.clone(), sequence);
            let fetched = AssertUnwindSafe(source.fetch(&request.address, &progress))
                .catch_unwind()
                .await;
            match fetched {
                Ok(FetchOutcome::Ready(bytes)) => decode(&request.address, bytes).await,
                Ok(FetchOutcome::NotFound) => TileOutcome::NotFound,
                Ok(FetchOutcome::Failed(reason)) => {
                    log::warn!("fetching {} failed: {}", request.address, reason);
                    TileOutcome::Failed(reason)
                }
                Err(_) => {
                    log::error!("raster source '{}' panicked on {}", source.info().name, request.address);
                    TileOutcome::Failed("raster source panicked".to_string())
                }
            }
        }
    };

    post(&results, TileEvent::finished(request, sequence, outcome));
}

async fn decode(address: &TileAddress, bytes: Vec<u8>) -> TileOutcome {
    let decoded =
        tokio::task::spawn_blocking(move || image::load_from_memory(&bytes).map(|img| img.to_rgba8()))
            .await;
    match decoded {
        Ok(Ok(image)) => TileOutcome::Ready(Arc::new(image)),
        Ok(Err(e)) => {
            log::warn!("could not decode {}: {}", address, e);
            TileOutcome::Failed(format!("decode error: {}", e))
        }
        Err(e) => TileOutcome::Failed(format!("decode task failed: {}", e)),
    }
}

fn post(results: &Sender<TileEvent>, event: TileEvent) {
    match results.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(event)) => {
            // terminal events must not be lost, wait off the async threads
            let results = results.clone();
            tokio::task::spawn_blocking(move || {
                let _ = results.send(event);
            });
        }
        Err(TrySendError::Disconnected(_)) => {
            log::debug!("result queue closed, dropping event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiles::source::{RasterSource, SourceInfo};
    use async_trait::async_trait;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;

    fn png() -> Vec<u8> {
        let img = image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            4,
            4,
            image::Rgba([10, 20, 30, 255]),
        ));
        let mut bytes = Cursor::new(Vec::new());
        img.write_to(&mut bytes, image::ImageOutputFormat::Png).unwrap();
        bytes.into_inner()
    }

    struct GatedSource {
        gate: Arc<Semaphore>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RasterSource for GatedSource {
        fn info(&self) -> SourceInfo {
            SourceInfo {
                name: "gated".to_string(),
                ..Default::default()
            }
        }

        fn layers(&self) -> Vec<String> {
            vec!["base".to_string()]
        }

        fn zoom_levels(&self) -> Vec<u8> {
            (0..=5).collect()
        }

        async fn fetch(&self, address: &TileAddress, progress: &FetchProgress) -> FetchOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            progress.loading();
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
            match address.x {
                0 => FetchOutcome::Ready(png()),
                1 => FetchOutcome::NotFound,
                2 => FetchOutcome::Ready(vec![1, 2, 3]),
                _ => FetchOutcome::Failed("boom".to_string()),
            }
        }
    }

    fn worker(max_in_flight: usize) -> (TileFetchWorker, Arc<Semaphore>, Arc<AtomicUsize>) {
        let gate = Arc::new(Semaphore::new(0));
        let calls = Arc::new(AtomicUsize::new(0));
        let source: Arc<dyn RasterSource> = Arc::new(GatedSource {
            gate: gate.clone(),
            calls: calls.clone(),
        });
        let catalog = Arc::new(RasterCatalog::new(vec![source]).unwrap());
        let config = FetchConfig {
            max_in_flight,
            worker_threads: 1,
            cache_size: 16,
        };
        (TileFetchWorker::new(config, catalog).unwrap(), gate, calls)
    }

    fn collect_terminal(worker: &mut TileFetchWorker, count: usize) -> Vec<TileEvent> {
        let mut terminal = Vec::new();
        for _ in 0..200 {
            terminal.extend(
                worker
                    .wait_results(Duration::from_millis(20))
                    .into_iter()
                    .filter(TileEvent::is_terminal),
            );
            if terminal.len() >= count {
                break;
            }
        }
        terminal
    }

    #[test]
    fn test_duplicate_request_is_suppressed() {
        let (mut worker, gate, calls) = worker(4);
        let address = TileAddress::new("base", 3, 0, 0);

        assert!(worker.request(address.clone(), SlotId::Base).is_some());
        assert!(worker.request(address.clone(), SlotId::Base).is_none());
        assert_eq!(worker.pending_count(), 1);

        gate.add_permits(1);
        let events = collect_terminal(&mut worker, 1);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].kind, TileEventKind::Finished(TileOutcome::Ready(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(worker.pending_count(), 0);
        assert_eq!(worker.in_flight_count(), 0);
    }

    #[test]
    fn test_sequences_increase() {
        let (mut worker, gate, _) = worker(4);
        let a = worker.request(TileAddress::new("base", 3, 0, 0), SlotId::Base).unwrap();
        let b = worker.request(TileAddress::new("base", 3, 0, 1), SlotId::Base).unwrap();
        assert!(b > a);
        gate.add_permits(2);
        assert_eq!(collect_terminal(&mut worker, 2).len(), 2);
    }

    #[test]
    fn test_outcomes_are_typed() {
        let (mut worker, gate, _) = worker(4);
        worker.request(TileAddress::new("base", 3, 1, 0), SlotId::Base);
        worker.request(TileAddress::new("base", 3, 2, 0), SlotId::Base);
        worker.request(TileAddress::new("base", 3, 3, 0), SlotId::Base);
        gate.add_permits(3);

        let events = collect_terminal(&mut worker, 3);
        let state_of = |x: u32| {
            events
                .iter()
                .find(|e| e.request.address.x == x)
                .and_then(|e| match &e.kind {
                    TileEventKind::Finished(outcome) => Some(outcome.load_state()),
                    TileEventKind::Loading => None,
                })
        };
        assert_eq!(state_of(1), Some(LoadState::NotFound));
        // undecodable bytes
        assert_eq!(state_of(2), Some(LoadState::Failed));
        assert_eq!(state_of(3), Some(LoadState::Failed));
    }

    #[test]
    fn test_cancel_queued_request() {
        let (mut worker, gate, calls) = worker(1);
        let first = TileAddress::new("base", 3, 0, 0);
        let second = TileAddress::new("base", 3, 0, 1);
        worker.request(first.clone(), SlotId::Base);
        worker.request(second.clone(), SlotId::Base);
        assert_eq!(worker.queued_count(), 1);

        assert_eq!(worker.cancel(&second, &SlotId::Base), CancelOutcome::Dequeued);
        assert_eq!(worker.cancel(&first, &SlotId::Base), CancelOutcome::Detached);
        assert_eq!(worker.cancel(&first, &SlotId::Base), CancelOutcome::NotPending);

        gate.add_permits(1);
        let events = collect_terminal(&mut worker, 1);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].request.address, first);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cache_hit_skips_source() {
        let (mut worker, gate, calls) = worker(2);
        let address = TileAddress::new("base", 3, 0, 0);
        worker.request(address.clone(), SlotId::Base);
        gate.add_permits(1);
        collect_terminal(&mut worker, 1);
        assert!(worker.cache().contains(&address));

        worker.request(address, SlotId::Base);
        let events = worker.drain_results();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].kind, TileEventKind::Finished(TileOutcome::Ready(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_layer_fails_locally() {
        let (mut worker, _, calls) = worker(2);
        worker.request(TileAddress::new("roads", 3, 0, 0), SlotId::Overlay("roads".into()));
        let events = worker.drain_results();
        assert!(matches!(events[0].kind, TileEventKind::Finished(TileOutcome::Failed(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(worker.pending_count(), 0);
    }

    #[test]
    fn test_rebind_clears_state() {
        let (mut worker, gate, _) = worker(1);
        worker.request(TileAddress::new("base", 3, 0, 0), SlotId::Base);
        worker.request(TileAddress::new("base", 3, 0, 1), SlotId::Base);

        worker.rebind(Arc::new(RasterCatalog::empty()));
        assert_eq!(worker.pending_count(), 0);
        assert_eq!(worker.queued_count(), 0);
        assert!(worker.catalog().is_empty());

        gate.add_permits(1);
        collect_terminal(&mut worker, 1);
        assert!(worker.cache().is_empty());
    }
}
