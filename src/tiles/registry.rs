//! Named factories for raster sources.
//!
//! The application picks source kinds by name at runtime and hands each
//! factory a JSON options value, which the factory deserialises into its own
//! options struct.

use super::directory::{DirectoryRasterSource, DirectorySourceOptions};
use super::source::RasterSource;
use crate::{MapError, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

pub type SourceFactory = Box<dyn Fn(&serde_json::Value) -> Result<Arc<dyn RasterSource>> + Send + Sync>;

struct Registration {
    description: String,
    factory: SourceFactory,
}

#[derive(Default)]
pub struct SourceRegistry {
    factories: BTreeMap<String, Registration>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every source kind compiled into the crate
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();

        #[cfg(feature = "http")]
        registry.register("http", "Slippy-map tiles from a URL template", |options| {
            let options: super::http::HttpSourceOptions = serde_json::from_value(options.clone())?;
            let source: Arc<dyn RasterSource> = Arc::new(super::http::HttpRasterSource::new(options));
            Ok(source)
        });

        registry.register("directory", "Tiles stored as <layer>/<z>/<x>/<y> files", |options| {
            let options: DirectorySourceOptions = serde_json::from_value(options.clone())?;
            let source: Arc<dyn RasterSource> = Arc::new(DirectoryRasterSource::open(options)?);
            Ok(source)
        });

        registry
    }

    /// Register a factory; an existing one with the same name is replaced
    pub fn register<F>(&mut self, name: &str, description: &str, factory: F)
    where
        F: Fn(&serde_json::Value) -> Result<Arc<dyn RasterSource>> + Send + Sync + 'static,
    {
        let previous = self.factories.insert(
            name.to_string(),
            Registration {
                description: description.to_string(),
                factory: Box::new(factory),
            },
        );
        if previous.is_some() {
            log::warn!("raster source factory '{}' replaced", name);
        }
    }

    /// Names and descriptions, sorted by name
    pub fn available(&self) -> Vec<(String, String)> {
        self.factories
            .iter()
            .map(|(name, registration)| (name.clone(), registration.description.clone()))
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn instantiate(&self, name: &str, options: &serde_json::Value) -> Result<Arc<dyn RasterSource>> {
        let registration = self
            .factories
            .get(name)
            .ok_or_else(|| MapError::UnknownSource(name.to_string()))?;
        let source = (registration.factory)(options)?;
        log::info!("instantiated raster source '{}' ({})", source.info().name, name);
        Ok(source)
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("factories", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::TileAddress;
    use crate::tiles::source::{FetchOutcome, FetchProgress, SourceInfo};
    use async_trait::async_trait;

    struct Blank(String);

    #[async_trait]
    impl RasterSource for Blank {
        fn info(&self) -> SourceInfo {
            SourceInfo {
                name: self.0.clone(),
                ..Default::default()
            }
        }

        fn layers(&self) -> Vec<String> {
            vec![self.0.clone()]
        }

        fn zoom_levels(&self) -> Vec<u8> {
            vec![0]
        }

        async fn fetch(&self, _address: &TileAddress, _progress: &FetchProgress) -> FetchOutcome {
            FetchOutcome::NotFound
        }
    }

    #[test]
    fn test_register_and_instantiate() {
        let mut registry = SourceRegistry::new();
        registry.register("blank", "Always empty", |options| {
            let name = options["name"].as_str().unwrap_or("blank").to_string();
            let source: Arc<dyn RasterSource> = Arc::new(Blank(name));
            Ok(source)
        });

        assert!(registry.contains("blank"));
        assert_eq!(registry.available(), vec![("blank".to_string(), "Always empty".to_string())]);

        let source = registry
            .instantiate("blank", &serde_json::json!({ "name": "void" }))
            .unwrap();
        assert_eq!(source.layers(), vec!["void".to_string()]);
    }

    #[test]
    fn test_unknown_source() {
        let registry = SourceRegistry::with_builtin();
        assert!(registry.contains("directory"));
        let result = registry.instantiate("wms", &serde_json::Value::Null);
        assert!(matches!(result, Err(MapError::UnknownSource(name)) if name == "wms"));
    }

    #[test]
    fn test_bad_options_are_reported() {
        let registry = SourceRegistry::with_builtin();
        let result = registry.instantiate("directory", &serde_json::json!({ "root": 5 }));
        assert!(matches!(result, Err(MapError::Serialization(_))));
    }
}
