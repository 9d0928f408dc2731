//! Dataset configuration types.
//!
//! All values here are already resolved: parsing a service description file
//! into these structures is the job of an outer layer. `DatasetConfig`
//! validates once at dataset construction and is immutable afterwards.

use std::collections::HashSet;
use std::time::Duration;

use crate::error::ConfigError;

// =============================================================================
// Default Values
// =============================================================================

/// Default block (and tile) edge length in pixels.
pub const DEFAULT_BLOCK_SIZE: u32 = 1024;

/// Default HTTP timeout in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 300;

/// Default maximum concurrent connections for one batch fetch.
pub const DEFAULT_MAX_CONNECTIONS: usize = 2;

/// Default clustering radius for hinted single-block reads.
///
/// A radius of 15 clusters at most a 31x31 tile window around the block of
/// interest.
pub const DEFAULT_CLUSTER_RADIUS: u32 = 15;

/// Default cap on the number of tiles one prefetch call may request.
pub const DEFAULT_MAX_ADVISE_TILES: u64 = 1000;

/// Default user agent sent with tile requests.
pub const DEFAULT_USER_AGENT: &str = concat!("remote-raster/", env!("CARGO_PKG_VERSION"));

// =============================================================================
// Data Window
// =============================================================================

/// Which edge of the geographic window pixel row 0 maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum YOrigin {
    Top,
    Bottom,
    #[default]
    Default,
}

/// The geographic extent and pixel resolution the dataset covers at full
/// resolution, plus the tile indexing origin of the remote service.
///
/// Validated once by [`DatasetConfig::validate`]; immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct DataWindow {
    /// Geographic bounding box, upper-left corner
    pub x0: f64,
    pub y0: f64,

    /// Geographic bounding box, lower-right corner
    pub x1: f64,
    pub y1: f64,

    /// Pixel extent at full resolution
    pub sx: u32,
    pub sy: u32,

    /// Tile grid coordinates of the dataset origin at the base zoom level
    pub tx: i64,
    pub ty: i64,

    /// Base tile zoom level (0..=30)
    pub tlevel: u8,

    /// Y axis convention of the tile grid
    pub y_origin: YOrigin,
}

impl DataWindow {
    /// Create a data window with a zero tile origin at level 0.
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64, sx: u32, sy: u32) -> Self {
        Self {
            x0,
            y0,
            x1,
            y1,
            sx,
            sy,
            tx: 0,
            ty: 0,
            tlevel: 0,
            y_origin: YOrigin::Default,
        }
    }

    /// Geographic width of one pixel at full resolution.
    pub fn resolution_x(&self) -> f64 {
        (self.x1 - self.x0) / f64::from(self.sx)
    }

    /// Geographic height of one pixel at full resolution (signed).
    pub fn resolution_y(&self) -> f64 {
        (self.y1 - self.y0) / f64::from(self.sy)
    }
}

// =============================================================================
// Pixel Model
// =============================================================================

/// Pixel data type of the dataset's bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelType {
    #[default]
    U8,
    U16,
}

impl PixelType {
    /// Size of one pixel sample in bytes.
    pub fn size(self) -> usize {
        match self {
            PixelType::U8 => 1,
            PixelType::U16 => 2,
        }
    }

    /// The value used when synthesizing a fully opaque component.
    pub fn opaque_value(self) -> f64 {
        match self {
            PixelType::U8 => 255.0,
            PixelType::U16 => 65535.0,
        }
    }
}

/// Default color interpretation assigned to each band, by band count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorInterpretation {
    Gray,
    Red,
    Green,
    Blue,
    Alpha,
    Undefined,
}

impl ColorInterpretation {
    /// The conventional interpretation of band `index` in an `n`-band layout.
    pub fn default_for(n: usize, index: usize) -> Self {
        use ColorInterpretation::*;
        match (n, index) {
            (1, 0) => Gray,
            (2, 0) => Gray,
            (2, 1) => Alpha,
            (3, 0) | (4, 0) => Red,
            (3, 1) | (4, 1) => Green,
            (3, 2) | (4, 2) => Blue,
            (4, 3) => Alpha,
            _ => Undefined,
        }
    }
}

/// A color table for expanding single-band indexed tiles, up to 256 entries
/// of RGBA components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorTable {
    entries: Vec<[u8; 4]>,
}

impl ColorTable {
    /// Build a color table from RGBA entries; at most 256 are kept.
    pub fn new(entries: Vec<[u8; 4]>) -> Self {
        let mut entries = entries;
        entries.truncate(256);
        Self { entries }
    }

    /// Number of entries in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Component `component` (0=R..3=A) of entry `index`.
    ///
    /// Indices beyond the populated entries expand to 0 in every component.
    pub fn component(&self, index: u8, component: usize) -> u8 {
        self.entries
            .get(usize::from(index))
            .map(|e| e[component])
            .unwrap_or(0)
    }

    /// The synthetic grayscale table used when a single-band tile feeds a
    /// multi-band dataset that has no explicit table: gray in the color
    /// components and full opacity in the alpha component. Two-band (
    /// luma + alpha) targets get an opaque second component instead.
    pub fn gray(dest_bands: usize) -> Self {
        let entries = (0..=255u8)
            .map(|i| {
                if dest_bands == 2 {
                    [i, 255, i, 255]
                } else {
                    [i, i, i, 255]
                }
            })
            .collect();
        Self { entries }
    }
}

// =============================================================================
// HTTP Options
// =============================================================================

/// Per-dataset options forwarded with every tile request.
///
/// The transport honoring these lives behind the
/// [`HttpFetcher`](crate::http::HttpFetcher) contract.
#[derive(Debug, Clone)]
pub struct HttpOptions {
    /// Per-request timeout
    pub timeout: Duration,

    /// Upper bound on concurrent connections inside one batch fetch
    pub max_connections: usize,

    /// User agent header
    pub user_agent: String,

    /// Optional referer header
    pub referer: Option<String>,

    /// Optional `user:password` credentials
    pub user_password: Option<String>,

    /// Skip TLS certificate verification
    pub unsafe_tls: bool,

    /// Optional accept header
    pub accept: Option<String>,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            referer: None,
            user_password: None,
            unsafe_tls: false,
            accept: None,
        }
    }
}

// =============================================================================
// Overview sizing
// =============================================================================

/// How an overview's pixel extent is derived from the base extent and the
/// overview scale. Which policy applies is a minidriver capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverviewDimComputation {
    /// Arithmetic rounding: `size * scale + 0.5`
    #[default]
    Rounded,
    /// Truncation: `size * scale`
    Truncated,
}

// =============================================================================
// Dataset Configuration
// =============================================================================

/// Complete, resolved configuration of one dataset.
#[derive(Debug, Clone)]
pub struct DatasetConfig {
    /// Geographic data window and tile indexing origin
    pub data_window: DataWindow,

    /// Number of raster bands (>= 1)
    pub band_count: usize,

    /// Pixel data type shared by all bands
    pub pixel_type: PixelType,

    /// Block (tile) size in pixels
    pub block_x: u32,
    pub block_y: u32,

    /// Clamp per-tile geographic requests to the data window extent
    pub clamp_requests: bool,

    /// Explicit overview count; `None` derives one (see [`DatasetConfig::overview_count`])
    pub overviews: Option<u32>,

    /// HTTP status codes treated as "tile intentionally empty"
    pub zero_block_codes: HashSet<u16>,

    /// Downgrade parsed service exceptions to empty tiles
    pub zero_block_on_exception: bool,

    /// Enable speculative prefetch
    pub use_advise_read: bool,

    /// Decode-verify prefetched tiles before inserting them into the cache
    pub verify_advise_read: bool,

    /// Suppress all network fetches; reads resolve from cache or nodata
    pub offline: bool,

    /// Options forwarded with every HTTP request
    pub http: HttpOptions,

    /// Per-band nodata values; an index past the end falls back to entry 0
    pub nodata: Vec<f64>,

    /// Per-band declared minimum values
    pub min: Vec<f64>,

    /// Per-band declared maximum values
    pub max: Vec<f64>,

    /// Color table applied when expanding single-band indexed tiles
    pub color_table: Option<ColorTable>,

    /// Radius of the hinted single-block-read cluster, in tiles
    pub cluster_radius: u32,

    /// Cap on tiles requested by one prefetch call
    pub max_advise_tiles: u64,
}

impl DatasetConfig {
    /// A configuration with the given window and band count and defaults for
    /// everything else.
    pub fn new(data_window: DataWindow, band_count: usize) -> Self {
        Self {
            data_window,
            band_count,
            pixel_type: PixelType::U8,
            block_x: DEFAULT_BLOCK_SIZE,
            block_y: DEFAULT_BLOCK_SIZE,
            clamp_requests: true,
            overviews: None,
            zero_block_codes: HashSet::from([204]),
            zero_block_on_exception: false,
            use_advise_read: false,
            verify_advise_read: true,
            offline: false,
            http: HttpOptions::default(),
            nodata: Vec::new(),
            min: Vec::new(),
            max: Vec::new(),
            color_table: None,
            cluster_radius: DEFAULT_CLUSTER_RADIUS,
            max_advise_tiles: DEFAULT_MAX_ADVISE_TILES,
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let w = &self.data_window;
        if w.sx == 0 || w.sy == 0 {
            return Err(ConfigError::InvalidWindowSize { sx: w.sx, sy: w.sy });
        }
        if w.tlevel > 30 {
            return Err(ConfigError::InvalidTileLevel(w.tlevel));
        }
        if self.band_count == 0 {
            return Err(ConfigError::InvalidBandCount(self.band_count));
        }
        if self.block_x == 0 || self.block_y == 0 {
            return Err(ConfigError::InvalidBlockSize {
                bx: self.block_x,
                by: self.block_y,
            });
        }
        if let Some(&code) = self.zero_block_codes.iter().find(|&&c| c < 100) {
            return Err(ConfigError::InvalidZeroBlockCode(code));
        }
        if self.max_advise_tiles == 0 {
            return Err(ConfigError::InvalidAdviseTileCap);
        }
        Ok(())
    }

    /// Number of overview levels to build.
    ///
    /// An explicit count wins. Otherwise a nonzero tile level is used
    /// directly (each overview shifts the tile grid one level up), and as a
    /// last resort the count follows from halving the raster down to the
    /// minimum overview size.
    pub fn overview_count(&self) -> u32 {
        if let Some(n) = self.overviews {
            return n;
        }
        if self.data_window.tlevel > 0 {
            return u32::from(self.data_window.tlevel);
        }
        let min_overview_size = 32.max(self.block_x.min(self.block_y));
        let smaller = self.data_window.sx.min(self.data_window.sy);
        if smaller <= min_overview_size {
            return 0;
        }
        let a = (f64::from(smaller)).log2() - f64::from(min_overview_size).log2();
        (a.ceil() as u32).min(32)
    }

    /// Nodata value for one band, or `None` when no nodata is declared.
    pub fn nodata_for(&self, band: usize) -> Option<f64> {
        band_value(&self.nodata, band)
    }

    /// Declared minimum for one band.
    pub fn min_for(&self, band: usize) -> Option<f64> {
        band_value(&self.min, band)
    }

    /// Declared maximum for one band.
    pub fn max_for(&self, band: usize) -> Option<f64> {
        band_value(&self.max, band)
    }

    /// Bytes in one resident block for one band.
    pub fn block_len(&self) -> usize {
        self.block_x as usize * self.block_y as usize * self.pixel_type.size()
    }
}

/// Entry for the band index, or the first entry when the vector is shorter.
fn band_value(v: &[f64], band: usize) -> Option<f64> {
    v.get(band).or_else(|| v.first()).copied()
}

// =============================================================================
// Tests
// =============================================================================
