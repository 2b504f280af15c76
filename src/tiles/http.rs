use super::source::{FetchOutcome, FetchProgress, RasterSource, SourceInfo};
use crate::core::constants::TILE_SIZE;
use crate::core::geo::TileAddress;
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Shared async client so connection pools and TLS setup are reused across tiles
static HTTP_CLIENT: OnceCell<reqwest::Client> = OnceCell::new();

fn http_client() -> reqwest::Result<&'static reqwest::Client> {
    HTTP_CLIENT.get_or_try_init(|| {
        reqwest::Client::builder()
            .user_agent(concat!("kompas/", env!("CARGO_PKG_VERSION")))
            .tcp_keepalive(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(16)
            .build()
    })
}

fn default_zoom_levels() -> Vec<u8> {
    (0..=18).collect()
}

fn default_tile_size() -> u32 {
    TILE_SIZE
}

fn default_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpSourceOptions {
    pub name: String,
    /// e.g. `https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png`; `{layer}`
    /// expands to the layer name
    pub url_template: String,
    #[serde(default)]
    pub subdomains: Vec<String>,
    pub layers: Vec<String>,
    #[serde(default)]
    pub overlays: Vec<String>,
    #[serde(default = "default_zoom_levels")]
    pub zoom_levels: Vec<u8>,
    #[serde(default = "default_tile_size")]
    pub tile_size: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub packager: String,
}

impl HttpSourceOptions {
    /// OpenStreetMap standard tiles
    pub fn openstreetmap() -> Self {
        Self {
            name: "OpenStreetMap".to_string(),
            url_template: "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            subdomains: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            layers: vec!["osm".to_string()],
            overlays: Vec::new(),
            zoom_levels: default_zoom_levels(),
            tile_size: TILE_SIZE,
            timeout_ms: default_timeout_ms(),
            description: "OpenStreetMap standard layer".to_string(),
            packager: "OpenStreetMap contributors".to_string(),
        }
    }
}

/// Raster source fetching slippy-map tiles over HTTP
#[derive(Debug, Clone)]
pub struct HttpRasterSource {
    options: HttpSourceOptions,
}

impl HttpRasterSource {
    pub fn new(options: HttpSourceOptions) -> Self {
        if !options.url_template.contains("{z}") {
            log::warn!("url template of '{}' has no {{z}} placeholder", options.name);
        }
        Self { options }
    }

    pub fn options(&self) -> &HttpSourceOptions {
        &self.options
    }

    /// Expand the URL template for `address`
    pub fn url(&self, address: &TileAddress) -> String {
        let subdomain = if self.options.subdomains.is_empty() {
            ""
        } else {
            let index = (address.x as usize + address.y as usize) % self.options.subdomains.len();
            self.options.subdomains[index].as_str()
        };
        self.options
            .url_template
            .replace("{layer}", &address.layer)
            .replace("{s}", subdomain)
            .replace("{z}", &address.zoom.to_string())
            .replace("{x}", &address.x.to_string())
            .replace("{y}", &address.y.to_string())
    }
}

#[async_trait]
impl RasterSource for HttpRasterSource {
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

    async fn fetch(&self, address: &TileAddress, progress: &FetchProgress) -> FetchOutcome {
        progress.loading();
        let url = self.url(address);

        let client = match http_client() {
            Ok(client) => client,
            Err(e) => return FetchOutcome::Failed(format!("http client: {}", e)),
        };
        let response = match client
            .get(&url)
            .timeout(Duration::from_millis(self.options.timeout_ms))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return FetchOutcome::Failed(e.to_string()),
        };

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            log::debug!("{} not found at {}", address, url);
            return FetchOutcome::NotFound;
        }
        if !status.is_success() {
            return FetchOutcome::Failed(format!("HTTP {} for {}", status, url));
        }

        match response.bytes().await {
            Ok(bytes) => {
                log::debug!("downloaded {} ({} bytes)", address, bytes.len());
                FetchOutcome::Ready(bytes.to_vec())
            }
            Err(e) => FetchOutcome::Failed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_template_expansion() {
        let source = HttpRasterSource::new(HttpSourceOptions {
            url_template: "https://tiles.example.org/{layer}/{z}/{x}/{y}.png".to_string(),
            layers: vec!["terrain".to_string()],
            ..HttpSourceOptions::openstreetmap()
        });
        let url = source.url(&TileAddress::new("terrain", 10, 553, 346));
        assert_eq!(url, "https://tiles.example.org/terrain/10/553/346.png");
    }

    #[test]
    fn test_subdomains_rotate() {
        let source = HttpRasterSource::new(HttpSourceOptions::openstreetmap());
        assert!(source.url(&TileAddress::new("osm", 1, 0, 0)).starts_with("https://a."));
        assert!(source.url(&TileAddress::new("osm", 1, 1, 0)).starts_with("https://b."));
        assert!(source.url(&TileAddress::new("osm", 1, 1, 1)).starts_with("https://c."));
    }

    #[test]
    fn test_options_defaults_from_json() {
        let options: HttpSourceOptions = serde_json::from_value(serde_json::json!({
            "name": "osm",
            "url_template": "https://tile.openstreetmap.org/{z}/{x}/{y}.png",
            "layers": ["osm"]
        }))
        .unwrap();
        assert_eq!(options.zoom_levels.len(), 19);
        assert_eq!(options.tile_size, 256);
        assert_eq!(options.timeout_ms, 10_000);

        let source = HttpRasterSource::new(options);
        assert_eq!(source.info().name, "osm");
        assert!(source.overlays().is_empty());
    }
}
