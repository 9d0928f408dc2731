//! Dataset: configuration owner and public read surface.
//!
//! A `Dataset` binds a validated [`DatasetConfig`] to a minidriver, an HTTP
//! fetcher and an optional tile cache, builds the band/overview tree, and
//! exposes window reads, speculative prefetch and point queries. All pixel
//! I/O funnels into the tile read engine in `engine.rs`.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use crate::band::Band;
use crate::block::{BlockKey, BlockStore};
use crate::cache::TileCache;
use crate::config::{ColorInterpretation, DatasetConfig};
use crate::engine::ReadHint;
use crate::error::{ConfigError, ReadError};
use crate::exception::wrap_location_info;
use crate::http::HttpFetcher;
use crate::minidriver::MiniDriver;

/// Tolerance applied when matching a requested downsampling factor to an
/// overview level during prefetch.
const OVERVIEW_FACTOR_TOLERANCE: f64 = 1.2;

/// A point query: either a pixel address or a geographic coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocationQuery {
    /// Column and row at base resolution
    Pixel(u32, u32),
    /// Geographic coordinate inside the data window
    Geo(f64, f64),
}

/// A remotely served tiled image source addressed as a 2D raster.
pub struct Dataset {
    pub(crate) config: DatasetConfig,
    pub(crate) minidriver: Arc<dyn MiniDriver>,
    pub(crate) http: Arc<dyn HttpFetcher>,
    pub(crate) cache: Option<Arc<dyn TileCache>>,
    pub(crate) bands: Vec<Band>,
    pub(crate) blocks: BlockStore,

    /// Last point query (URL, wrapped result), shared by all bands
    location_memo: Mutex<Option<(Url, Option<String>)>>,
}

impl Dataset {
    /// Validate the configuration and build the band/overview tree.
    pub fn new(
        config: DatasetConfig,
        minidriver: Arc<dyn MiniDriver>,
        http: Arc<dyn HttpFetcher>,
        cache: Option<Arc<dyn TileCache>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let policy = minidriver.capabilities().overview_dim_computation;
        let overview_count = config.overview_count();

        let mut bands = Vec::with_capacity(config.band_count);
        for i in 0..config.band_count {
            let mut band =
                Band::new(&config, i, 1.0, None, policy).ok_or(ConfigError::InvalidWindowSize {
                    sx: config.data_window.sx,
                    sy: config.data_window.sy,
                })?;
            for level in 0..overview_count {
                let scale = 0.5f64.powi(level as i32 + 1);
                match Band::new(&config, i, scale, Some(level as usize), policy) {
                    Some(overview) => band.push_overview(overview),
                    // The raster ran out of pixels before the requested depth
                    None => break,
                }
            }
            bands.push(band);
        }

        Ok(Self {
            config,
            minidriver,
            http,
            cache,
            bands,
            blocks: BlockStore::new(),
            location_memo: Mutex::new(None),
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The resolved configuration this dataset was built from.
    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    /// One band's resolution tree.
    pub fn band(&self, band: usize) -> Option<&Band> {
        self.bands.get(band)
    }

    pub fn x_size(&self) -> u32 {
        self.config.data_window.sx
    }

    pub fn y_size(&self) -> u32 {
        self.config.data_window.sy
    }

    /// Affine pixel-to-geographic transform
    /// `[x0, rx, 0, y0, 0, ry]`, when the minidriver defines one.
    pub fn geo_transform(&self) -> Result<[f64; 6], ReadError> {
        if !self.minidriver.capabilities().has_geotransform {
            return Err(ReadError::NoGeoTransform);
        }
        let w = &self.config.data_window;
        Ok([w.x0, w.resolution_x(), 0.0, w.y0, 0.0, w.resolution_y()])
    }

    /// Nodata value declared for one band.
    pub fn nodata(&self, band: usize) -> Option<f64> {
        self.config.nodata_for(band)
    }

    /// Declared minimum for one band.
    pub fn min(&self, band: usize) -> Option<f64> {
        self.config.min_for(band)
    }

    /// Declared maximum for one band.
    pub fn max(&self, band: usize) -> Option<f64> {
        self.config.max_for(band)
    }

    /// Conventional color interpretation of one band.
    pub fn color_interpretation(&self, band: usize) -> ColorInterpretation {
        ColorInterpretation::default_for(self.config.band_count, band)
    }

    // =========================================================================
    // Window reads
    // =========================================================================

    /// Read a pixel window of one band (optionally of one of its overviews)
    /// into a row-major sample buffer in native byte order.
    pub async fn read_window(
        &self,
        band: usize,
        overview: Option<usize>,
        x0: u32,
        y0: u32,
        sx: u32,
        sy: u32,
    ) -> Result<Vec<u8>, ReadError> {
        let hint = ReadHint::new(x0, y0, sx, sy, overview);
        self.read_window_hinted(band, overview, x0, y0, sx, sy, &hint)
            .await
    }

    /// Read the same pixel window of every band at base resolution. One hint
    /// spans all bands, so the whole read costs a single tile batch.
    pub async fn read_bands_window(
        &self,
        x0: u32,
        y0: u32,
        sx: u32,
        sy: u32,
    ) -> Result<Vec<Vec<u8>>, ReadError> {
        let hint = ReadHint::new(x0, y0, sx, sy, None);
        let mut out = Vec::with_capacity(self.bands.len());
        for band in 0..self.bands.len() {
            out.push(
                self.read_window_hinted(band, None, x0, y0, sx, sy, &hint)
                    .await?,
            );
        }
        Ok(out)
    }

    async fn read_window_hinted(
        &self,
        band: usize,
        overview: Option<usize>,
        x0: u32,
        y0: u32,
        sx: u32,
        sy: u32,
        hint: &ReadHint,
    ) -> Result<Vec<u8>, ReadError> {
        let band_ref = self.band_ref(band, overview)?;
        if sx == 0
            || sy == 0
            || x0.checked_add(sx).map_or(true, |x| x > band_ref.x_size())
            || y0.checked_add(sy).map_or(true, |y| y > band_ref.y_size())
        {
            return Err(ReadError::WindowOutOfBounds { x0, y0, sx, sy });
        }

        let px = self.config.pixel_type.size();
        let bxs = self.config.block_x;
        let bys = self.config.block_y;
        let mut out = vec![0u8; sx as usize * sy as usize * px];

        let bx0 = x0 / bxs;
        let bx1 = (x0 + sx - 1) / bxs;
        let by0 = y0 / bys;
        let by1 = (y0 + sy - 1) / bys;

        for by in by0..=by1 {
            for bx in bx0..=bx1 {
                let key = BlockKey {
                    band,
                    overview,
                    x: i64::from(bx),
                    y: i64::from(by),
                };
                let bytes = match self.blocks.get(&key).await {
                    Some(bytes) => bytes,
                    None => {
                        let mut block = vec![0u8; self.config.block_len()];
                        self.read_block(
                            band_ref,
                            i64::from(bx),
                            i64::from(by),
                            &mut block,
                            Some(hint),
                        )
                        .await?;
                        Bytes::from(block)
                    }
                };

                // Copy the block's intersection with the window
                let block_x0 = bx * bxs;
                let block_y0 = by * bys;
                let ix0 = x0.max(block_x0);
                let ix1 = (x0 + sx).min(block_x0 + bxs);
                let iy0 = y0.max(block_y0);
                let iy1 = (y0 + sy).min(block_y0 + bys);
                let run = (ix1 - ix0) as usize * px;

                for row in iy0..iy1 {
                    let src = ((row - block_y0) as usize * bxs as usize
                        + (ix0 - block_x0) as usize)
                        * px;
                    let dst =
                        ((row - y0) as usize * sx as usize + (ix0 - x0) as usize) * px;
                    out[dst..dst + run].copy_from_slice(&bytes[src..src + run]);
                }
            }
        }

        Ok(out)
    }

    // =========================================================================
    // Speculative prefetch
    // =========================================================================

    /// Prefetch the tiles covering a pixel window into the tile cache,
    /// delegating to the first band.
    pub async fn advise_read(
        &self,
        x0: u32,
        y0: u32,
        sx: u32,
        sy: u32,
        buffer_size: Option<(u32, u32)>,
    ) -> Result<(), ReadError> {
        self.advise_read_band(0, x0, y0, sx, sy, buffer_size).await
    }

    /// Prefetch for one band. `buffer_size` is the caller's intended output
    /// extent; a smaller one selects the matching overview to warm instead.
    ///
    /// A no-op when prefetch is disabled or the dataset is offline. Fails
    /// without a cache to warm, and when the window would need more than
    /// `max_advise_tiles` tiles.
    pub async fn advise_read_band(
        &self,
        band: usize,
        x0: u32,
        y0: u32,
        sx: u32,
        sy: u32,
        buffer_size: Option<(u32, u32)>,
    ) -> Result<(), ReadError> {
        if !self.config.use_advise_read || self.config.offline {
            return Ok(());
        }
        if self.cache.is_none() {
            return Err(ReadError::NoCache);
        }

        let base = self.band_ref(band, None)?;
        if sx == 0
            || sy == 0
            || x0.checked_add(sx).map_or(true, |x| x > base.x_size())
            || y0.checked_add(sy).map_or(true, |y| y > base.y_size())
        {
            return Err(ReadError::WindowOutOfBounds { x0, y0, sx, sy });
        }

        // When the caller is downsampling, warm the overview it will read
        let mut target = base;
        if let Some((bsx, bsy)) = buffer_size {
            if bsx > 0 && bsy > 0 && (bsx < sx || bsy < sy) {
                let desired =
                    (f64::from(sx) / f64::from(bsx)).min(f64::from(sy) / f64::from(bsy));
                for n in 0..base.overview_count() {
                    if let Some(overview) = base.overview_band(n) {
                        if 1.0 / overview.scale() <= desired * OVERVIEW_FACTOR_TOLERANCE {
                            target = overview;
                        } else {
                            break;
                        }
                    }
                }
            }
        }

        // Rescale the window into the selected overview's pixel space
        let (mut wx0, mut wy0, mut wsx, mut wsy) = (x0, y0, sx, sy);
        if target.overview().is_some() {
            let scale = target.scale();
            wx0 = ((f64::from(x0) * scale) as u32).min(target.x_size() - 1);
            wy0 = ((f64::from(y0) * scale) as u32).min(target.y_size() - 1);
            wsx = ((f64::from(sx) * scale) as u32).clamp(1, target.x_size() - wx0);
            wsy = ((f64::from(sy) * scale) as u32).clamp(1, target.y_size() - wy0);
        }

        let bx0 = i64::from(wx0 / self.config.block_x);
        let bx1 = i64::from((wx0 + wsx - 1) / self.config.block_x);
        let by0 = i64::from(wy0 / self.config.block_y);
        let by1 = i64::from((wy0 + wsy - 1) / self.config.block_y);

        let requested = (bx1 - bx0 + 1) as u64 * (by1 - by0 + 1) as u64;
        if requested > self.config.max_advise_tiles {
            return Err(ReadError::TooManyTiles {
                requested,
                max: self.config.max_advise_tiles,
            });
        }

        if target.advise_repeats((bx0, by0, bx1, by1)).await {
            debug!(band, bx0, by0, bx1, by1, "prefetch range repeats the previous call");
            return Ok(());
        }

        self.read_blocks(target, bx0, by0, None, bx0, by0, bx1, by1, true)
            .await
    }

    // =========================================================================
    // Point query
    // =========================================================================

    /// Feature information at one location, wrapped in a `<LocationInfo>`
    /// envelope. `None` when the location is outside the raster, the service
    /// does not answer point queries, or it has no coverage there.
    pub async fn location_info(
        &self,
        query: LocationQuery,
    ) -> Result<Option<String>, ReadError> {
        if !self.minidriver.capabilities().has_getinfo {
            return Ok(None);
        }
        let w = &self.config.data_window;
        let (col, row) = match query {
            LocationQuery::Pixel(col, row) => (i64::from(col), i64::from(row)),
            LocationQuery::Geo(x, y) => (
                ((x - w.x0) / w.resolution_x()).floor() as i64,
                ((y - w.y0) / w.resolution_y()).floor() as i64,
            ),
        };
        if col < 0 || row < 0 || col >= i64::from(w.sx) || row >= i64::from(w.sy) {
            return Ok(None);
        }

        let band = match self.bands.first() {
            Some(band) => band,
            None => return Ok(None),
        };
        let bx = col / i64::from(self.config.block_x);
        let by = row / i64::from(self.config.block_y);
        let pixel_x = (col % i64::from(self.config.block_x)) as u32;
        let pixel_y = (row % i64::from(self.config.block_y)) as u32;

        let (iri, tiri) = band.compute_request_info(&self.config, bx, by);
        let url = match self
            .minidriver
            .tiled_image_info(&iri, &tiri, pixel_x, pixel_y)
            .await
        {
            Some(url) => url,
            None => return Ok(None),
        };

        let mut memo = self.location_memo.lock().await;
        if let Some((last_url, result)) = memo.as_ref() {
            if *last_url == url {
                return Ok(result.clone());
            }
        }

        let response = self.http.fetch(&url, &self.config.http).await;
        let result = if response.status == 200 && !response.body.is_empty() {
            Some(wrap_location_info(&String::from_utf8_lossy(&response.body)))
        } else {
            debug!(url = %url, status = response.status, "point query returned no data");
            None
        };
        *memo = Some((url, result.clone()));
        Ok(result)
    }

    // =========================================================================
    // Internal
    // =========================================================================

    pub(crate) fn band_ref(
        &self,
        band: usize,
        overview: Option<usize>,
    ) -> Result<&Band, ReadError> {
        let base = self
            .bands
            .get(band)
            .ok_or(ReadError::NoSuchBand { band, overview })?;
        match overview {
            None => Ok(base),
            Some(n) => base
                .overview_band(n)
                .ok_or(ReadError::NoSuchBand { band, overview }),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
