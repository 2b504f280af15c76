#![allow(dead_code)]

use async_trait::async_trait;
use kompas::{FetchOutcome, FetchProgress, MapView, RasterSource, SourceInfo, TileAddress};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// PNG of one solid grey value
pub fn solid_png(value: u8, size: u32) -> Vec<u8> {
    let img = image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
        size,
        size,
        image::Rgba([value, value, value, 255]),
    ));
    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, image::ImageOutputFormat::Png)
        .expect("png encoding");
    bytes.into_inner()
}

/// Behaviour of one address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Ready(u8),
    /// Wait for a gate permit, then answer with this grey value
    Gated(u8),
    NotFound,
    Failed,
    /// Bytes that are not an image
    Garbage,
}

/// Source answering from a per-address script and counting calls
pub struct ScriptedSource {
    layers: Vec<String>,
    overlays: Vec<String>,
    zoom_levels: Vec<u8>,
    tile_size: u32,
    default: Mutex<Script>,
    scripts: Mutex<HashMap<TileAddress, Script>>,
    calls: Mutex<HashMap<TileAddress, usize>>,
    gate: Semaphore,
}

impl ScriptedSource {
    pub fn new(layers: &[&str], overlays: &[&str], zoom_levels: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            layers: layers.iter().map(|l| l.to_string()).collect(),
            overlays: overlays.iter().map(|l| l.to_string()).collect(),
            zoom_levels,
            tile_size: 16,
            default: Mutex::new(Script::Ready(100)),
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            gate: Semaphore::new(0),
        })
    }

    pub fn set_default(&self, script: Script) {
        *self.default.lock().unwrap() = script;
    }

    pub fn set_script(&self, address: TileAddress, script: Script) {
        self.scripts.lock().unwrap().insert(address, script);
    }

    pub fn open_gate(&self, permits: usize) {
        self.gate.add_permits(permits);
    }

    pub fn calls(&self, address: &TileAddress) -> usize {
        self.calls.lock().unwrap().get(address).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    fn script(&self, address: &TileAddress) -> Script {
        let scripts = self.scripts.lock().unwrap();
        scripts
            .get(address)
            .copied()
            .unwrap_or(*self.default.lock().unwrap())
    }
}

#[async_trait]
impl RasterSource for ScriptedSource {
    fn info(&self) -> SourceInfo {
        SourceInfo {
            name: "scripted".to_string(),
            description: "Test tiles".to_string(),
            packager: "kompas tests".to_string(),
        }
    }

    fn layers(&self) -> Vec<String> {
        self.layers.clone()
    }

    fn overlays(&self) -> Vec<String> {
        self.overlays.clone()
    }

    fn zoom_levels(&self) -> Vec<u8> {
        self.zoom_levels.clone()
    }

    fn tile_size(&self) -> u32 {
        self.tile_size
    }

    async fn fetch(&self, address: &TileAddress, progress: &FetchProgress) -> FetchOutcome {
        *self.calls.lock().unwrap().entry(address.clone()).or_insert(0) += 1;
        let script = self.script(address);
        progress.loading();
        match script {
            Script::Ready(value) => FetchOutcome::Ready(solid_png(value, self.tile_size)),
            Script::Gated(value) => {
                if let Ok(permit) = self.gate.acquire().await {
                    permit.forget();
                }
                FetchOutcome::Ready(solid_png(value, self.tile_size))
            }
            Script::NotFound => FetchOutcome::NotFound,
            Script::Failed => FetchOutcome::Failed("scripted failure".to_string()),
            Script::Garbage => FetchOutcome::Ready(b"not a png".to_vec()),
        }
    }
}

/// Tick until nothing is pending or the attempts run out
pub fn settle(view: &mut MapView) {
    for _ in 0..300 {
        view.tick_wait(Duration::from_millis(10));
        if view.is_settled() {
            return;
        }
    }
    panic!("map view did not settle");
}
