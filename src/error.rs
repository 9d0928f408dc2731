use thiserror::Error;
use url::Url;

use crate::config::PixelType;

/// Errors detected while validating dataset configuration.
///
/// All of these are fatal at dataset construction time: a dataset is never
/// created with a partially valid configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Data window pixel extent must be strictly positive
    #[error("Invalid data window size {sx} x {sy}, both dimensions must be positive")]
    InvalidWindowSize { sx: u32, sy: u32 },

    /// Tile level outside the supported range (shifting the tile origin by
    /// more than 30 levels would overflow)
    #[error("Invalid tile level {0}, expected 0..=30")]
    InvalidTileLevel(u8),

    /// Band count must be at least 1
    #[error("Invalid band count {0}, at least one band is required")]
    InvalidBandCount(usize),

    /// Block dimensions must be strictly positive
    #[error("Invalid block size {bx} x {by}, both dimensions must be positive")]
    InvalidBlockSize { bx: u32, by: u32 },

    /// Invalid HTTP status code in the zero-block allow-list
    #[error("Invalid zero-block HTTP status code {0}")]
    InvalidZeroBlockCode(u16),

    /// Prefetch tile cap must allow at least one tile
    #[error("max_advise_tiles must be at least 1")]
    InvalidAdviseTileCap,
}

/// Errors raised while satisfying a block read or a prefetch request.
///
/// Hard failures carry the offending tile's coordinates and URL so a bad
/// tile can be diagnosed without bisecting a whole raster read.
#[derive(Debug, Clone, Error)]
pub enum ReadError {
    /// The minidriver could not produce a request for a tile
    #[error("Minidriver error for tile ({x}, {y}): {message}")]
    MiniDriver { x: i64, y: i64, message: String },

    /// A tile download failed and neither the cache fallback nor the
    /// zero-block allow-list recovered it
    #[error(
        "Unable to download tile ({x}, {y})\nURL: {url}\nHTTP status code: {status}, error: {message}\n\
         Add the HTTP status code to the zero-block code set to ignore this error"
    )]
    Download {
        x: i64,
        y: i64,
        url: Url,
        status: u16,
        message: String,
    },

    /// The server answered with a parseable exception document
    #[error("The server returned exception{}: {message}", .code.as_deref().map(|c| format!(" code '{c}'")).unwrap_or_default())]
    ServiceException {
        code: Option<String>,
        message: String,
    },

    /// The server returned an XML body that is not a known exception report
    #[error("The server returned an unknown exception (URL: {url})")]
    UnknownException { url: Url },

    /// A downloaded tile could not be decoded as an image
    #[error("Unable to decode tile image (URL: {url}): {message}")]
    Decode { url: Url, message: String },

    /// The decoded tile does not match the block geometry
    #[error(
        "Incorrect size {sx} x {sy} of downloaded block, expected {esx} x {esy}, max {bx} x {by}"
    )]
    BlockSize {
        sx: u32,
        sy: u32,
        esx: u32,
        esy: u32,
        bx: u32,
        by: u32,
    },

    /// Color tables expand to at most 4 components
    #[error("Color table supports at most 4 components, {0} requested")]
    ColorTableComponents(usize),

    /// No remap rule exists between the tile's and the dataset's band layouts
    #[error("Cannot map a {src}-band tile into {dest} bands")]
    BandRemap { src: usize, dest: usize },

    /// The decoded tile's sample type does not match the dataset's
    #[error("Tile pixel type {actual:?} does not match dataset pixel type {expected:?}")]
    PixelTypeMismatch {
        expected: PixelType,
        actual: PixelType,
    },

    /// The minidriver declares no affine pixel-to-geographic mapping
    #[error("The service does not define a geotransform")]
    NoGeoTransform,

    /// Band or overview index outside the dataset's range
    #[error("Band {band} overview {overview:?} does not exist")]
    NoSuchBand {
        band: usize,
        overview: Option<usize>,
    },

    /// The requested pixel window falls outside the raster
    #[error("Window ({x0}, {y0}) {sx} x {sy} is outside the raster")]
    WindowOutOfBounds { x0: u32, y0: u32, sx: u32, sy: u32 },

    /// Prefetch explosion guard: the advised window would need too many tiles
    #[error("Too many tiles for prefetch: {requested} requested, at most {max} allowed")]
    TooManyTiles { requested: u64, max: u64 },

    /// Advise-read requires a tile cache to warm
    #[error("Prefetch requires a configured tile cache")]
    NoCache,
}
