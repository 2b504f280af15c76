//! Headless map viewer
//!
//! Binds one raster source, runs the tick loop for a while (optionally
//! panning) and can dump the composed tiles as PNG files.

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use kompas::{
    Direction, LatLng, MapView, MapViewOptions, MapViewProfile, Point, RasterCatalog,
    SourceRegistry,
};
use kompas::tiles::HttpSourceOptions;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Profile {
    Balanced,
    LowResource,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Heading {
    N,
    Nw,
    W,
    Sw,
    S,
    Se,
    E,
    Ne,
}

impl From<Heading> for Direction {
    fn from(heading: Heading) -> Self {
        match heading {
            Heading::N => Direction::Top,
            Heading::Nw => Direction::TopLeft,
            Heading::W => Direction::Left,
            Heading::Sw => Direction::BottomLeft,
            Heading::S => Direction::Bottom,
            Heading::Se => Direction::BottomRight,
            Heading::E => Direction::Right,
            Heading::Ne => Direction::TopRight,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "kompas-app", version, about = "Fetch and compose map tiles headlessly")]
struct Cli {
    /// Raster source kind, see --list-sources
    #[arg(long, default_value = "http")]
    source: String,

    /// Source options as JSON; OpenStreetMap for the bare http source
    #[arg(long, default_value = "{}")]
    source_options: String,

    /// Read source options from a JSON file instead
    #[arg(long)]
    source_file: Option<PathBuf>,

    /// Pipeline options (MapViewOptions) as a JSON file; overrides --profile
    #[arg(long)]
    options_file: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "balanced")]
    profile: Profile,

    /// Background layer, the first one of the source by default
    #[arg(long)]
    layer: Option<String>,

    /// Overlays to stack on the background
    #[arg(long)]
    overlay: Vec<String>,

    #[arg(long, default_value_t = 800.0)]
    width: f64,

    #[arg(long, default_value_t = 600.0)]
    height: f64,

    #[arg(long)]
    zoom: Option<u8>,

    #[arg(long, default_value_t = 50.0875)]
    lat: f64,

    #[arg(long, default_value_t = 14.4213)]
    lng: f64,

    /// Number of UI ticks to run
    #[arg(long, default_value_t = 100)]
    ticks: u32,

    /// Longest wait for results per tick, in milliseconds
    #[arg(long, default_value_t = 50)]
    tick_ms: u64,

    /// Keep moving the map in this direction
    #[arg(long, value_enum)]
    pan: Option<Heading>,

    /// Pan speed in pixels per second
    #[arg(long, default_value_t = 200.0)]
    speed: f64,

    /// Write every composed tile to this directory as z_x_y.png
    #[arg(long)]
    dump: Option<PathBuf>,

    /// Print the available source kinds and exit
    #[arg(long)]
    list_sources: bool,
}

fn load_options(cli: &Cli) -> Result<MapViewOptions> {
    match &cli.options_file {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            Ok(MapViewOptions::from_json(&json)?)
        }
        None => Ok(match cli.profile {
            Profile::Balanced => MapViewProfile::Balanced,
            Profile::LowResource => MapViewProfile::LowResource,
        }
        .resolve()),
    }
}

fn source_options(cli: &Cli) -> Result<serde_json::Value> {
    let json = match &cli.source_file {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?,
        None if cli.source == "http" && cli.source_options.trim() == "{}" => {
            return Ok(serde_json::to_value(HttpSourceOptions::openstreetmap())?);
        }
        None => cli.source_options.clone(),
    };
    serde_json::from_str(&json).context("parsing source options")
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let registry = SourceRegistry::with_builtin();

    if cli.list_sources {
        for (name, description) in registry.available() {
            println!("{:<12} {}", name, description);
        }
        return Ok(());
    }

    let options = load_options(&cli)?;
    let source = registry
        .instantiate(&cli.source, &source_options(&cli)?)
        .with_context(|| format!("creating '{}' source", cli.source))?;
    let catalog = Arc::new(RasterCatalog::new(vec![source])?);
    if catalog.layers().is_empty() {
        bail!("source '{}' serves no layers", cli.source);
    }

    let mut view = MapView::new(catalog, Point::new(cli.width, cli.height), options)?;
    if let Some(layer) = &cli.layer {
        view.set_layer(layer)?;
    }
    for overlay in &cli.overlay {
        view.add_overlay(overlay)?;
    }
    if let Some(zoom) = cli.zoom {
        view.zoom_to(zoom, None)?;
    }
    view.set_coords(LatLng::new(cli.lat, cli.lng));

    let started = Instant::now();
    let mut last = Instant::now();
    let (mut applied, mut stale, mut requested, mut evicted) = (0, 0, 0, 0);
    for _ in 0..cli.ticks {
        if let Some(heading) = cli.pan {
            view.move_map(heading.into(), cli.speed, last.elapsed());
        }
        last = Instant::now();

        let report = view.tick_wait(Duration::from_millis(cli.tick_ms));
        applied += report.applied;
        stale += report.stale;
        requested += report.requested;
        evicted += report.evicted;

        if cli.pan.is_none() && view.is_settled() {
            break;
        }
    }

    let center = view.coords();
    log::info!(
        "z{} at {:.5},{:.5} after {:?}: {} tiles, {} requested, {} applied, {} stale, {} evicted",
        view.zoom(),
        center.lat,
        center.lng,
        started.elapsed(),
        view.compositor().len(),
        requested,
        applied,
        stale,
        evicted
    );
    for overlay in view.overlay_states() {
        log::info!("overlay {}: {}", overlay.name, if overlay.loaded { "loaded" } else { "loading" });
    }

    if let Some(dir) = &cli.dump {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        let mut written = 0;
        for cell in view.compositor().cells() {
            if let Some(image) = view.flatten(&cell) {
                let path = dir.join(format!("{}_{}_{}.png", cell.zoom, cell.x, cell.y));
                image.save(&path).with_context(|| format!("writing {}", path.display()))?;
                written += 1;
            }
        }
        log::info!("wrote {} tiles to {}", written, dir.display());
    }

    Ok(())
}
