use super::source::{FetchOutcome, FetchProgress, RasterSource, SourceInfo};
use crate::core::constants::TILE_SIZE;
use crate::core::geo::TileAddress;
use crate::{MapError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

fn default_extension() -> String {
    "png".to_string()
}

fn default_tile_size() -> u32 {
    TILE_SIZE
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectorySourceOptions {
    #[serde(default)]
    pub name: String,
    pub root: PathBuf,
    /// Discovered from the sub-directories of `root` when empty
    #[serde(default)]
    pub layers: Vec<String>,
    #[serde(default)]
    pub overlays: Vec<String>,
    /// Discovered from the first layer when empty
    #[serde(default)]
    pub zoom_levels: Vec<u8>,
    #[serde(default = "default_tile_size")]
    pub tile_size: u32,
    #[serde(default = "default_extension")]
    pub extension: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub packager: String,
}

impl DirectorySourceOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            name: String::new(),
            root: root.into(),
            layers: Vec::new(),
            overlays: Vec::new(),
            zoom_levels: Vec::new(),
            tile_size: TILE_SIZE,
            extension: default_extension(),
            description: String::new(),
            packager: String::new(),
        }
    }
}

/// Raster source reading `<root>/<layer>/<z>/<x>/<y>.<ext>` files
#[derive(Debug, Clone)]
pub struct DirectoryRasterSource {
    options: DirectorySourceOptions,
}

fn sub_directories(path: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

impl DirectoryRasterSource {
    /// Open a tile directory, discovering layers and zoom levels not given
    pub fn open(mut options: DirectorySourceOptions) -> Result<Self> {
        if !options.root.is_dir() {
            return Err(MapError::Io(std::io::Error::new(
                ErrorKind::NotFound,
                format!("tile directory {} does not exist", options.root.display()),
            )));
        }
        if options.name.is_empty() {
            options.name = options
                .root
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("tiles")
                .to_string();
        }

        if options.layers.is_empty() {
            let overlays: BTreeSet<&String> = options.overlays.iter().collect();
            options.layers = sub_directories(&options.root)?
                .into_iter()
                .filter(|name| !overlays.contains(name))
                .collect();
        }

        if options.zoom_levels.is_empty() {
            let probe = options.layers.first().or(options.overlays.first());
            if let Some(layer) = probe {
                let zooms: BTreeSet<u8> = sub_directories(&options.root.join(layer))?
                    .iter()
                    .filter_map(|name| name.parse().ok())
                    .collect();
                options.zoom_levels = zooms.into_iter().collect();
            }
        }

        log::debug!(
            "opened tile directory {}: layers {:?}, zoom {:?}",
            options.root.display(),
            options.layers,
            options.zoom_levels
        );
        Ok(Self { options })
    }

    pub fn options(&self) -> &DirectorySourceOptions {
        &self.options
    }

    pub fn tile_path(&self, address: &TileAddress) -> PathBuf {
        self.options
            .root
            .join(&address.layer)
            .join(address.zoom.to_string())
            .join(address.x.to_string())
            .join(format!("{}.{}", address.y, self.options.extension))
    }
}

#[async_trait]
impl RasterSource for DirectoryRasterSource {
    fn info(&self) -> SourceInfo {
        SourceInfo {
            name: self.options.name.clone(),
            description: self.options.description.clone(),
            packager: self.options.packager.clone(),
        }
    }

    fn layers(&self) -> Vec<String> {
        self.options.layers.clone()
    }

    fn overlays(&self) -> Vec<String> {
        self.options.overlays.clone()
    }

    fn zoom_levels(&self) -> Vec<u8> {
        self.options.zoom_levels.clone()
    }

    fn tile_size(&self) -> u32 {
        self.options.tile_size
    }

    async fn fetch(&self, address: &TileAddress, _progress: &FetchProgress) -> FetchOutcome {
        let path = self.tile_path(address);
        match tokio::fs::read(&path).await {
            Ok(bytes) => FetchOutcome::Ready(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => FetchOutcome::NotFound,
            Err(e) => FetchOutcome::Failed(format!("{}: {}", path.display(), e)),
        }
    }
}
