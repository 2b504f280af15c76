//! End-to-end behaviour of the fetch worker and the compositor
mod common;

use common::{init_logging, solid_png, ScriptedSource, Script};
use kompas::{
    ApplyOutcome, CancelOutcome, FetchConfig, RasterCatalog, RasterSource, SlotId, TileAddress,
    TileCompositor, TileEvent, TileEventKind, TileFetchWorker, TileOutcome,
};
use std::sync::Arc;
use std::time::Duration;

fn setup(source: &Arc<ScriptedSource>, max_in_flight: usize) -> TileFetchWorker {
    setup_cached(source, max_in_flight, 0)
}

fn setup_cached(source: &Arc<ScriptedSource>, max_in_flight: usize, cache_size: usize) -> TileFetchWorker {
    let shared: Arc<dyn RasterSource> = source.clone();
    let catalog = Arc::new(RasterCatalog::new(vec![shared]).unwrap());
    let config = FetchConfig {
        max_in_flight,
        worker_threads: 2,
        cache_size,
    };
    TileFetchWorker::new(config, catalog).unwrap()
}

fn wait_for_call(source: &ScriptedSource, address: &TileAddress) {
    for _ in 0..100 {
        if source.calls(address) >= 1 {
            return;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    panic!("source never called for {}", address);
}

fn wait_terminal(worker: &mut TileFetchWorker, count: usize) -> Vec<TileEvent> {
    let mut events = Vec::new();
    for _ in 0..300 {
        events.extend(
            worker
                .wait_results(Duration::from_millis(10))
                .into_iter()
                .filter(TileEvent::is_terminal),
        );
        if events.len() >= count {
            return events;
        }
    }
    panic!("expected {} results, got {}", count, events.len());
}

#[test]
fn test_duplicate_request_dispatches_once() {
    init_logging();
    let source = ScriptedSource::new(&["base"], &[], vec![3]);
    source.set_default(Script::Gated(10));
    let mut worker = setup(&source, 4);
    let address = TileAddress::new("base", 3, 1, 1);

    let first = worker.request(address.clone(), SlotId::Base);
    let second = worker.request(address.clone(), SlotId::Base);
    assert!(first.is_some());
    assert!(second.is_none());

    source.open_gate(1);
    let events = wait_terminal(&mut worker, 1);
    assert_eq!(events.len(), 1);
    assert_eq!(source.calls(&address), 1);

    // after the terminal result the pair may be requested again
    source.set_default(Script::Ready(10));
    assert!(worker.request(address.clone(), SlotId::Base).is_some());
    wait_terminal(&mut worker, 1);
    assert_eq!(source.calls(&address), 2);
}

#[test]
fn test_older_result_never_replaces_newer() {
    init_logging();
    let source = ScriptedSource::new(&["base"], &[], vec![3]);
    let mut worker = setup(&source, 4);
    let mut compositor = TileCompositor::new(16);
    let address = TileAddress::new("base", 3, 1, 1);
    let cell = address.cell();

    // the older request stalls in the source
    source.set_script(address.clone(), Script::Gated(2));
    let older = worker.request(address.clone(), SlotId::Base).unwrap();
    compositor.set_layer_loading(cell, &SlotId::Base, older);
    wait_for_call(&source, &address);
    assert_eq!(worker.cancel(&address, &SlotId::Base), CancelOutcome::Detached);

    // the newer one answers at once
    source.set_script(address.clone(), Script::Ready(1));
    let newer = worker.request(address.clone(), SlotId::Base).unwrap();
    assert!(newer > older);
    compositor.set_layer_loading(cell, &SlotId::Base, newer);

    let events = wait_terminal(&mut worker, 1);
    assert_eq!(events[0].sequence, newer);
    assert_eq!(compositor.apply(&events[0]), ApplyOutcome::Applied);

    source.open_gate(1);
    let late = wait_terminal(&mut worker, 1);
    assert_eq!(late[0].sequence, older);
    assert_eq!(compositor.apply(&late[0]), ApplyOutcome::Stale);

    let slot = compositor.slot(&cell, &SlotId::Base).unwrap();
    assert_eq!(slot.sequence, newer);
    assert_eq!(slot.content.image().unwrap().get_pixel(0, 0)[0], 1);
}

#[test]
fn test_late_older_result_does_not_poison_cache() {
    init_logging();
    let source = ScriptedSource::new(&["base"], &[], vec![3]);
    let mut worker = setup_cached(&source, 4, 16);
    let address = TileAddress::new("base", 3, 1, 1);

    source.set_script(address.clone(), Script::Gated(2));
    let older = worker.request(address.clone(), SlotId::Base).unwrap();
    wait_for_call(&source, &address);
    assert_eq!(worker.cancel(&address, &SlotId::Base), CancelOutcome::Detached);

    source.set_script(address.clone(), Script::Ready(1));
    let newer = worker.request(address.clone(), SlotId::Base).unwrap();
    assert_eq!(wait_terminal(&mut worker, 1)[0].sequence, newer);

    source.open_gate(1);
    assert_eq!(wait_terminal(&mut worker, 1)[0].sequence, older);
    assert_eq!(worker.cache().sequence(&address), Some(newer));

    // served from the cache with the newest pixels
    let again = worker.request(address.clone(), SlotId::Base).unwrap();
    let events = wait_terminal(&mut worker, 1);
    assert_eq!(events[0].sequence, again);
    match &events[0].kind {
        TileEventKind::Finished(TileOutcome::Ready(image)) => assert_eq!(image.get_pixel(0, 0)[0], 1),
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(source.calls(&address), 2);
}

#[test]
fn test_in_flight_window_is_bounded() {
    init_logging();
    let source = ScriptedSource::new(&["base"], &[], vec![4]);
    source.set_default(Script::Gated(7));
    let mut worker = setup(&source, 2);

    for x in 0..5 {
        worker.request(TileAddress::new("base", 4, x, 0), SlotId::Base);
    }
    assert_eq!(worker.in_flight_count(), 2);
    assert_eq!(worker.queued_count(), 3);

    source.open_gate(5);
    let events = wait_terminal(&mut worker, 5);
    assert_eq!(events.len(), 5);
    assert_eq!(source.total_calls(), 5);
    assert_eq!(worker.pending_count(), 0);
    assert_eq!(worker.in_flight_count(), 0);
}

#[test]
fn test_loading_precedes_terminal_event() {
    init_logging();
    let source = ScriptedSource::new(&["base"], &[], vec![2]);
    let mut worker = setup(&source, 1);
    let address = TileAddress::new("base", 2, 0, 0);
    worker.request(address.clone(), SlotId::Base);

    let mut kinds = Vec::new();
    for _ in 0..300 {
        for event in worker.wait_results(Duration::from_millis(10)) {
            kinds.push(event.kind);
        }
        if kinds.iter().any(|k| matches!(k, TileEventKind::Finished(_))) {
            break;
        }
    }
    assert!(matches!(kinds.first(), Some(TileEventKind::Loading)));
    assert!(matches!(kinds.last(), Some(TileEventKind::Finished(TileOutcome::Ready(_)))));
}

#[test]
fn test_source_failure_is_reported() {
    init_logging();
    let source = ScriptedSource::new(&["base"], &[], vec![2]);
    source.set_default(Script::Failed);
    let mut worker = setup(&source, 1);
    worker.request(TileAddress::new("base", 2, 0, 0), SlotId::Base);

    let events = wait_terminal(&mut worker, 1);
    assert!(matches!(
        &events[0].kind,
        TileEventKind::Finished(TileOutcome::Failed(reason)) if reason == "scripted failure"
    ));
    // the helper really encodes decodable pngs
    assert!(image::load_from_memory(&solid_png(3, 4)).is_ok());
}

#[test]
fn test_undecodable_tile_is_failed() {
    init_logging();
    let source = ScriptedSource::new(&["base"], &[], vec![2]);
    source.set_default(Script::Garbage);
    let mut worker = setup(&source, 1);
    worker.request(TileAddress::new("base", 2, 0, 0), SlotId::Base);

    let events = wait_terminal(&mut worker, 1);
    assert!(matches!(
        &events[0].kind,
        TileEventKind::Finished(TileOutcome::Failed(reason)) if reason.starts_with("decode error")
    ));
}
