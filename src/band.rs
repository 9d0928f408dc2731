//! Band and overview model.
//!
//! A band describes one resolution level of one raster component. The base
//! band has scale 1.0; each overview halves (or otherwise reduces) the
//! resolution and owns an index that shifts the tile grid one zoom level up.

use tokio::sync::Mutex;

use crate::config::{DatasetConfig, OverviewDimComputation};
use crate::minidriver::{ImageRequestInfo, TiledImageRequestInfo};

/// One resolution level of one raster band.
pub struct Band {
    /// 0-based band number within the dataset
    index: usize,

    /// Resolution scale relative to the base band (1.0 = base)
    scale: f64,

    /// Overview index; `None` for the base resolution
    overview: Option<usize>,

    /// Pixel extent at this resolution
    x_size: u32,
    y_size: u32,

    /// Block size, shared with the dataset
    block_x: u32,
    block_y: u32,

    /// Reduced-resolution levels, strictly decreasing scale (base band only)
    overviews: Vec<Band>,

    /// Block range of the immediately preceding prefetch, for dedup.
    /// Unsynchronized per the engine's single-reader model.
    last_advise: Mutex<Option<(i64, i64, i64, i64)>>,
}

impl Band {
    /// Build a band at the given scale. Returns `None` when the scaled
    /// extent collapses to zero.
    pub(crate) fn new(
        config: &DatasetConfig,
        index: usize,
        scale: f64,
        overview: Option<usize>,
        policy: OverviewDimComputation,
    ) -> Option<Self> {
        let (x_size, y_size) = match policy {
            OverviewDimComputation::Rounded => (
                (f64::from(config.data_window.sx) * scale + 0.5) as u32,
                (f64::from(config.data_window.sy) * scale + 0.5) as u32,
            ),
            OverviewDimComputation::Truncated => (
                (f64::from(config.data_window.sx) * scale) as u32,
                (f64::from(config.data_window.sy) * scale) as u32,
            ),
        };
        if x_size == 0 || y_size == 0 {
            return None;
        }
        Some(Self {
            index,
            scale,
            overview,
            x_size,
            y_size,
            block_x: config.block_x,
            block_y: config.block_y,
            overviews: Vec::new(),
            last_advise: Mutex::new(None),
        })
    }

    pub(crate) fn push_overview(&mut self, band: Band) {
        debug_assert!(self
            .overviews
            .last()
            .map(|prev| band.scale < prev.scale)
            .unwrap_or(band.scale < self.scale));
        self.overviews.push(band);
    }

    /// 0-based band number.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Resolution scale relative to the base band.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Overview index, `None` at base resolution.
    pub fn overview(&self) -> Option<usize> {
        self.overview
    }

    /// Pixel extent of this resolution level.
    pub fn x_size(&self) -> u32 {
        self.x_size
    }

    pub fn y_size(&self) -> u32 {
        self.y_size
    }

    /// Number of overview levels below this band.
    pub fn overview_count(&self) -> usize {
        self.overviews.len()
    }

    /// One overview band.
    pub fn overview_band(&self, n: usize) -> Option<&Band> {
        self.overviews.get(n)
    }

    /// Block grid extent of this resolution level.
    pub fn blocks_x(&self) -> i64 {
        (i64::from(self.x_size) + i64::from(self.block_x) - 1) / i64::from(self.block_x)
    }

    pub fn blocks_y(&self) -> i64 {
        (i64::from(self.y_size) + i64::from(self.block_y) - 1) / i64::from(self.block_y)
    }

    /// How many zoom levels this band sits above the base tile level.
    pub fn level_shift(&self) -> u8 {
        match self.overview {
            Some(i) => (i + 1) as u8,
            None => 0,
        }
    }

    /// The pixel extent a decoded tile must at least cover for block (x, y):
    /// full blocks inside the raster, the remainder at the right/bottom edge.
    pub fn expected_block_size(&self, x: i64, y: i64) -> (u32, u32) {
        let clamp_x = |v: i64| v.clamp(0, i64::from(self.x_size));
        let clamp_y = |v: i64| v.clamp(0, i64::from(self.y_size));
        let esx = clamp_x((x + 1) * i64::from(self.block_x)) - clamp_x(x * i64::from(self.block_x));
        let esy = clamp_y((y + 1) * i64::from(self.block_y)) - clamp_y(y * i64::from(self.block_y));
        (esx as u32, esy as u32)
    }

    /// Geographic window and protocol tile coordinates for block (x, y).
    pub fn compute_request_info(
        &self,
        config: &DatasetConfig,
        x: i64,
        y: i64,
    ) -> (ImageRequestInfo, TiledImageRequestInfo) {
        let w = &config.data_window;

        let mut x0 = (x * i64::from(self.block_x)).max(0);
        let mut y0 = (y * i64::from(self.block_y)).max(0);
        let mut x1 = ((x + 1) * i64::from(self.block_x)).max(0);
        let mut y1 = ((y + 1) * i64::from(self.block_y)).max(0);
        if config.clamp_requests {
            x0 = x0.min(i64::from(self.x_size));
            y0 = y0.min(i64::from(self.y_size));
            x1 = x1.min(i64::from(self.x_size));
            y1 = y1.min(i64::from(self.y_size));
        }

        let rx = (w.x1 - w.x0) / f64::from(self.x_size);
        let ry = (w.y1 - w.y0) / f64::from(self.y_size);
        // The two corners use different formulas so corner requests come out
        // exact for the window edges
        let iri = ImageRequestInfo {
            x0: x0 as f64 * rx + w.x0,
            y0: y0 as f64 * ry + w.y0,
            x1: w.x1 - (f64::from(self.x_size) - x1 as f64) * rx,
            y1: w.y1 - (f64::from(self.y_size) - y1 as f64) * ry,
            sx: (x1 - x0) as u32,
            sy: (y1 - y0) as u32,
        };

        let shift = u32::from(self.level_shift());
        let tiri = TiledImageRequestInfo {
            x: (w.tx >> shift) + x,
            y: (w.ty >> shift) + y,
            level: i32::from(w.tlevel) - shift as i32,
        };

        (iri, tiri)
    }

    /// Record a prefetch block range; `true` when it repeats the previous
    /// one exactly and the prefetch can be skipped.
    pub(crate) async fn advise_repeats(&self, range: (i64, i64, i64, i64)) -> bool {
        let mut last = self.last_advise.lock().await;
        if *last == Some(range) {
            return true;
        }
        *last = Some(range);
        false
    }
}

// =============================================================================
// Tests
// =============================================================================
