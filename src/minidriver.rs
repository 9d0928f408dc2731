//! Minidriver contract.
//!
//! A minidriver is the pluggable adapter that turns a tile coordinate into a
//! fetchable request for one specific service protocol. The engine depends
//! only on this interface; dialect details of how a tile coordinate becomes
//! a URL live entirely behind it. Implementations are selected at dataset
//! construction.

use async_trait::async_trait;
use url::Url;

use crate::config::OverviewDimComputation;
use crate::error::ReadError;

/// Geographic sub-window covered by one tile, plus its pixel extent.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequestInfo {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    pub sx: u32,
    pub sy: u32,
}

/// Protocol tile coordinates of one tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiledImageRequestInfo {
    pub x: i64,
    pub y: i64,
    pub level: i32,
}

/// What the minidriver produced for a tile coordinate.
#[derive(Debug, Clone, PartialEq)]
pub enum TileRequestOutcome {
    /// A fetchable request, optionally a byte range within a larger resource
    Request {
        url: Url,
        byte_range: Option<(u64, u64)>,
    },
    /// The service defines this tile as empty; no fetch will ever succeed
    NoData,
}

/// Static capabilities a minidriver declares at dataset construction.
#[derive(Debug, Clone, Copy)]
pub struct MiniDriverCapabilities {
    /// The service's data window maps affinely to pixel space
    pub has_geotransform: bool,

    /// The service answers feature-info (point query) requests
    pub has_getinfo: bool,

    /// How overview pixel extents are derived from the scale factor
    pub overview_dim_computation: OverviewDimComputation,
}

impl Default for MiniDriverCapabilities {
    fn default() -> Self {
        Self {
            has_geotransform: true,
            has_getinfo: false,
            overview_dim_computation: OverviewDimComputation::Rounded,
        }
    }
}

/// Adapter from tile coordinates to service requests.
#[async_trait]
pub trait MiniDriver: Send + Sync {
    /// The driver's static capabilities.
    fn capabilities(&self) -> MiniDriverCapabilities;

    /// Produce the fetch request for one tile, or signal that the tile is
    /// defined-empty.
    async fn tiled_image_request(
        &self,
        iri: &ImageRequestInfo,
        tiri: &TiledImageRequestInfo,
    ) -> Result<TileRequestOutcome, ReadError>;

    /// Produce the feature-info URL for a point query at the given pixel
    /// offsets within the tile. `None` when the service has no coverage
    /// there (or no feature-info support at all).
    async fn tiled_image_info(
        &self,
        iri: &ImageRequestInfo,
        tiri: &TiledImageRequestInfo,
        pixel_x: u32,
        pixel_y: u32,
    ) -> Option<Url>;
}

// =============================================================================
// Template driver
// =============================================================================

/// Reference minidriver substituting tile coordinates into a URL template.
///
/// `{x}`, `{y}` and `{z}` expand to the tile column, row and zoom level. An
/// optional feature-info template additionally understands `{i}` and `{j}`
/// for the pixel offsets within the tile.
pub struct TemplateDriver {
    template: String,
    info_template: Option<String>,
    capabilities: MiniDriverCapabilities,
}

impl TemplateDriver {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            info_template: None,
            capabilities: MiniDriverCapabilities::default(),
        }
    }

    /// Add a feature-info template, enabling the `has_getinfo` capability.
    pub fn with_info_template(mut self, template: impl Into<String>) -> Self {
        self.info_template = Some(template.into());
        self.capabilities.has_getinfo = true;
        self
    }

    /// Override the overview dimension computation policy.
    pub fn with_overview_dim_computation(mut self, policy: OverviewDimComputation) -> Self {
        self.capabilities.overview_dim_computation = policy;
        self
    }

    fn expand(template: &str, tiri: &TiledImageRequestInfo) -> String {
        template
            .replace("{x}", &tiri.x.to_string())
            .replace("{y}", &tiri.y.to_string())
            .replace("{z}", &tiri.level.to_string())
    }
}

#[async_trait]
impl MiniDriver for TemplateDriver {
    fn capabilities(&self) -> MiniDriverCapabilities {
        self.capabilities
    }

    async fn tiled_image_request(
        &self,
        _iri: &ImageRequestInfo,
        tiri: &TiledImageRequestInfo,
    ) -> Result<TileRequestOutcome, ReadError> {
        // Tiles above the service's zoom range do not exist
        if tiri.level < 0 || tiri.x < 0 || tiri.y < 0 {
            return Ok(TileRequestOutcome::NoData);
        }
        let expanded = Self::expand(&self.template, tiri);
        let url = Url::parse(&expanded).map_err(|e| ReadError::MiniDriver {
            x: tiri.x,
            y: tiri.y,
            message: format!("invalid URL '{expanded}': {e}"),
        })?;
        Ok(TileRequestOutcome::Request {
            url,
            byte_range: None,
        })
    }

    async fn tiled_image_info(
        &self,
        _iri: &ImageRequestInfo,
        tiri: &TiledImageRequestInfo,
        pixel_x: u32,
        pixel_y: u32,
    ) -> Option<Url> {
        let template = self.info_template.as_deref()?;
        let expanded = Self::expand(template, tiri)
            .replace("{i}", &pixel_x.to_string())
            .replace("{j}", &pixel_y.to_string());
        Url::parse(&expanded).ok()
    }
}

// =============================================================================
// Tests
// =============================================================================
