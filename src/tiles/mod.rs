pub mod cache;
pub mod catalog;
pub mod directory;
#[cfg(feature = "http")]
pub mod http;
pub mod registry;
pub mod source;
pub mod types;
pub mod worker;

// Re-exports for convenience
pub use catalog::RasterCatalog;
pub use directory::{DirectoryRasterSource, DirectorySourceOptions};
#[cfg(feature = "http")]
pub use http::{HttpRasterSource, HttpSourceOptions};
pub use registry::SourceRegistry;
pub use source::{FetchOutcome, FetchProgress, RasterSource, SourceInfo};
pub use worker::TileFetchWorker;
