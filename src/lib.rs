//! # Remote Raster
//!
//! A tile-read/cache/fetch engine that presents a remotely served, tiled
//! imagery source as a randomly-addressable 2D raster.
//!
//! Callers request arbitrary pixel windows and receive decoded pixel data;
//! the engine translates those requests into discrete image-tile downloads,
//! reconciles them against a tile cache, and assembles the results into the
//! requested window.
//!
//! ## Features
//!
//! - **Clustered fetches**: a large window read decomposes into per-block
//!   reads, but a read hint clusters them into one batched tile fetch
//! - **Sibling piggy-back**: one downloaded tile feeds the blocks of every
//!   band at once, so co-located bands never re-download it
//! - **Cache reconciliation**: cache short-circuit before the network, cache
//!   fallback after a failed download, insert-after-decode so broken
//!   downloads never poison the cache
//! - **Overviews**: reduced-resolution access by shifting the tile zoom level
//! - **Speculative prefetch**: advise-read warms the cache ahead of reads,
//!   with an explosion guard and dedup against the previous call
//! - **Point queries**: feature information at a pixel or geographic
//!   coordinate, wrapped in a `<LocationInfo>` envelope
//!
//! ## Architecture
//!
//! - [`config`] - resolved dataset configuration and validation
//! - [`minidriver`] - adapter contract from tile coordinates to service URLs
//! - [`http`] - batched HTTP fetch contract
//! - [`cache`] - tile cache contract and an in-memory implementation
//! - [`tile`] - decoded tile images and band remapping
//! - [`block`] - resident block store shared across bands
//! - [`band`] - band/overview model
//! - [`dataset`] - the public read surface
//! - [`engine`] - the tile read engine
//! - [`exception`] - service-exception sniffing and parsing
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use remote_raster::{DataWindow, Dataset, DatasetConfig, MemoryTileCache, TemplateDriver};
//! # use remote_raster::{FetchRequest, FetchResponse, HttpFetcher, HttpOptions};
//! # struct Transport;
//! # #[async_trait::async_trait]
//! # impl HttpFetcher for Transport {
//! #     async fn fetch_batch(&self, r: &[FetchRequest]) -> Vec<FetchResponse> { unimplemented!() }
//! #     async fn fetch(&self, _: &url::Url, _: &HttpOptions) -> FetchResponse { unimplemented!() }
//! # }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let window = DataWindow::new(-180.0, 90.0, 180.0, -90.0, 4096, 2048);
//!     let config = DatasetConfig::new(window, 3);
//!
//!     let dataset = Dataset::new(
//!         config,
//!         Arc::new(TemplateDriver::new("https://tiles.example.com/{z}/{x}/{y}.png")),
//!         Arc::new(Transport),
//!         Some(Arc::new(MemoryTileCache::new())),
//!     )?;
//!
//!     // Red band of the top-left 512x512 window
//!     let pixels = dataset.read_window(0, None, 0, 0, 512, 512).await?;
//!     assert_eq!(pixels.len(), 512 * 512);
//!     Ok(())
//! }
//! ```

pub mod band;
pub mod block;
pub mod cache;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod exception;
pub mod http;
pub mod minidriver;
pub mod tile;

// Re-export commonly used types
pub use band::Band;
pub use block::{BlockKey, BlockStore};
pub use cache::{CacheItemStatus, MemoryTileCache, TileCache, DEFAULT_TILE_CACHE_CAPACITY};
pub use config::{
    ColorInterpretation, ColorTable, DataWindow, DatasetConfig, HttpOptions,
    OverviewDimComputation, PixelType, YOrigin, DEFAULT_BLOCK_SIZE, DEFAULT_CLUSTER_RADIUS,
    DEFAULT_MAX_ADVISE_TILES, DEFAULT_MAX_CONNECTIONS, DEFAULT_USER_AGENT,
};
pub use dataset::{Dataset, LocationQuery};
pub use engine::ReadHint;
pub use error::{ConfigError, ReadError};
pub use exception::{looks_like_exception, parse_exception, wrap_location_info};
pub use http::{FetchRequest, FetchResponse, HttpFetcher};
pub use minidriver::{
    ImageRequestInfo, MiniDriver, MiniDriverCapabilities, TemplateDriver, TileRequestOutcome,
    TiledImageRequestInfo,
};
pub use tile::{band_fill_map, BandFill, TileImage};
