//! The tile read engine.
//!
//! [`Dataset::read_blocks`](crate::dataset::Dataset) satisfies one read (or
//! prefetch) of a rectangular cluster of tile blocks on behalf of one band,
//! sharing every downloaded tile across all bands of the dataset. The flow
//! per tile is: need decision, minidriver query, cache short-circuit, offline
//! handling, enqueue; then one batch fetch for the whole cluster and a
//! per-result reconciliation against the cache and the zero-block rules.

use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use tracing::{debug, warn};

use crate::band::Band;
use crate::block::BlockKey;
use crate::cache::CacheItemStatus;
use crate::config::{ColorTable, PixelType};
use crate::dataset::Dataset;
use crate::error::ReadError;
use crate::exception::{looks_like_exception, parse_exception};
use crate::http::FetchRequest;
use crate::minidriver::TileRequestOutcome;
use crate::tile::{band_fill_map, BandFill, TileImage};

// =============================================================================
// Read hint
// =============================================================================

/// The pixel window of an in-progress multi-block read.
///
/// A window read decomposes into many single-block reads; without a hint each
/// of those would fetch one tile at a time. The window read builds one hint
/// and threads it into every per-block call so the first block read can
/// cluster its fetch across the window. The hint retires itself (one-shot)
/// once a single cluster has covered its whole block range.
pub struct ReadHint {
    x0: u32,
    y0: u32,
    sx: u32,
    sy: u32,
    overview: Option<usize>,
    spent: AtomicBool,
}

impl ReadHint {
    /// A hint for the given pixel window at the given overview level.
    pub fn new(x0: u32, y0: u32, sx: u32, sy: u32, overview: Option<usize>) -> Self {
        Self {
            x0,
            y0,
            sx,
            sy,
            overview,
            spent: AtomicBool::new(false),
        }
    }

    /// The overview level the hinted window addresses.
    pub fn overview(&self) -> Option<usize> {
        self.overview
    }

    /// Whether a previous clustered read already covered the whole window.
    pub fn is_spent(&self) -> bool {
        self.spent.load(Ordering::Relaxed)
    }

    fn spend(&self) {
        self.spent.store(true, Ordering::Relaxed);
    }

    /// Inclusive block range covering the hinted pixel window.
    fn block_range(&self, block_x: u32, block_y: u32) -> (i64, i64, i64, i64) {
        let bx0 = i64::from(self.x0 / block_x);
        let by0 = i64::from(self.y0 / block_y);
        let bx1 = i64::from((self.x0 + self.sx.max(1) - 1) / block_x);
        let by1 = i64::from((self.y0 + self.sy.max(1) - 1) / block_y);
        (bx0, by0, bx1, by1)
    }
}

/// Fill a block buffer with one sample value repeated.
fn fill_sample_value(buf: &mut [u8], pixel: PixelType, value: f64) {
    match pixel {
        PixelType::U8 => buf.fill(value as u8),
        PixelType::U16 => {
            let sample = (value as u16).to_ne_bytes();
            for chunk in buf.chunks_exact_mut(2) {
                chunk.copy_from_slice(&sample);
            }
        }
    }
}

/// How a decoded tile's samples reach the dataset's band layout.
enum RemapPlan<'a> {
    /// Expand a single indexed band through a color table
    Table(&'a ColorTable),
    /// Per-destination-band copy/synthesize slots
    Map(&'static [BandFill]),
}

// =============================================================================
// Engine
// =============================================================================

impl Dataset {
    /// Satisfy a read (or prefetch) of the block cluster
    /// [bx0..=bx1] x [by0..=by1] for `band`.
    ///
    /// `target` is the caller's buffer for the block at (`target_x`,
    /// `target_y`) of the calling band; prefetch passes `None`. The first
    /// hard failure aborts the call; tiles reconciled before it keep their
    /// cache entries and block writes.
    pub(crate) async fn read_blocks(
        &self,
        band: &Band,
        target_x: i64,
        target_y: i64,
        mut target: Option<&mut [u8]>,
        bx0: i64,
        by0: i64,
        bx1: i64,
        by1: i64,
        advise: bool,
    ) -> Result<(), ReadError> {
        let mut queue: Vec<FetchRequest> = Vec::new();

        for iy in by0..=by1 {
            for ix in bx0..=bx1 {
                if !advise && !self.tile_needed(band, ix, iy, target_x, target_y).await {
                    continue;
                }

                let (iri, tiri) = band.compute_request_info(&self.config, ix, iy);
                let (url, byte_range) =
                    match self.minidriver.tiled_image_request(&iri, &tiri).await? {
                        TileRequestOutcome::Request { url, byte_range } => (url, byte_range),
                        TileRequestOutcome::NoData => {
                            if !advise {
                                let t = if ix == target_x && iy == target_y {
                                    target.as_deref_mut()
                                } else {
                                    None
                                };
                                self.empty_block(band, ix, iy, t).await;
                            }
                            continue;
                        }
                    };

                if let Some(cache) = &self.cache {
                    if cache.item_status(&url).await == CacheItemStatus::Ok {
                        if advise {
                            continue;
                        }
                        if let Some(bytes) = cache.get(&url).await {
                            let t = if ix == target_x && iy == target_y {
                                target.as_deref_mut()
                            } else {
                                None
                            };
                            if self.read_tile_from_cache(band, &bytes, ix, iy, t).await {
                                debug!(url = %url, "tile served from cache");
                                continue;
                            }
                        }
                    }
                }

                if self.config.offline {
                    if !advise {
                        let t = if ix == target_x && iy == target_y {
                            target.as_deref_mut()
                        } else {
                            None
                        };
                        self.empty_block(band, ix, iy, t).await;
                    }
                    continue;
                }

                queue.push(FetchRequest {
                    x: ix,
                    y: iy,
                    url,
                    byte_range,
                    options: self.config.http.clone(),
                });
            }
        }

        if queue.is_empty() {
            return Ok(());
        }

        let responses = self.http.fetch_batch(&queue).await;
        debug_assert_eq!(responses.len(), queue.len());

        for (request, response) in queue.iter().zip(responses) {
            let success = response.status == 200
                || (response.status == 206
                    && request.byte_range.map(|(_, len)| len > 0).unwrap_or(false));

            if success && !response.body.is_empty() {
                if looks_like_exception(&response.body) {
                    let err = parse_exception(&response.body, &request.url);
                    if self.config.zero_block_on_exception {
                        warn!(url = %request.url, error = %err, "service exception downgraded to empty block");
                        if !advise {
                            let t = if request.x == target_x && request.y == target_y {
                                target.as_deref_mut()
                            } else {
                                None
                            };
                            self.empty_block(band, request.x, request.y, t).await;
                        }
                        continue;
                    }
                    return Err(err);
                }

                // A prefetch without verification trusts the transport and
                // caches the bytes as-is
                if advise && !self.config.verify_advise_read {
                    if let Some(cache) = &self.cache {
                        cache.insert(&request.url, response.body.clone()).await;
                    }
                    continue;
                }

                let img =
                    TileImage::decode(&response.body).map_err(|message| ReadError::Decode {
                        url: request.url.clone(),
                        message,
                    })?;

                if advise {
                    self.check_tile_geometry(band, request.x, request.y, &img)?;
                } else {
                    let t = if request.x == target_x && request.y == target_y {
                        target.as_deref_mut()
                    } else {
                        None
                    };
                    self.write_tile_to_blocks(band, &img, request.x, request.y, t)
                        .await?;
                }

                // A broken download must never poison the cache: insert only
                // after the decode succeeded
                if let Some(cache) = &self.cache {
                    cache.insert(&request.url, response.body.clone()).await;
                }
            } else {
                let mut recovered = false;
                if let Some(cache) = &self.cache {
                    if let Some(bytes) = cache.get(&request.url).await {
                        if advise {
                            recovered = true;
                        } else {
                            let t = if request.x == target_x && request.y == target_y {
                                target.as_deref_mut()
                            } else {
                                None
                            };
                            recovered = self
                                .read_tile_from_cache(band, &bytes, request.x, request.y, t)
                                .await;
                            if recovered {
                                debug!(url = %request.url, status = response.status,
                                       "download failed, tile recovered from cache");
                            }
                        }
                    }
                }
                if !recovered {
                    if self.config.zero_block_codes.contains(&response.status) {
                        if !advise {
                            let t = if request.x == target_x && request.y == target_y {
                                target.as_deref_mut()
                            } else {
                                None
                            };
                            self.empty_block(band, request.x, request.y, t).await;
                        }
                    } else {
                        return Err(ReadError::Download {
                            x: request.x,
                            y: request.y,
                            url: request.url.clone(),
                            status: response.status,
                            message: response.error.clone(),
                        });
                    }
                }
            }
        }

        Ok(())
    }

    /// Read one block for one band, clustering across the hinted window when
    /// the block lies inside it.
    pub(crate) async fn read_block(
        &self,
        band: &Band,
        x: i64,
        y: i64,
        buffer: &mut [u8],
        hint: Option<&ReadHint>,
    ) -> Result<(), ReadError> {
        let (mut bx0, mut by0, mut bx1, mut by1) = (x, y, x, y);

        if let Some(hint) = hint {
            if !hint.is_spent() && hint.overview() == band.overview() {
                let (hbx0, hby0, hbx1, hby1) =
                    hint.block_range(self.config.block_x, self.config.block_y);
                if hbx0 <= x && x <= hbx1 && hby0 <= y && y <= hby1 {
                    let r = i64::from(self.config.cluster_radius);
                    bx0 = (x - r).max(hbx0);
                    bx1 = (x + r).min(hbx1);
                    by0 = (y - r).max(hby0);
                    by1 = (y + r).min(hby1);
                    // One cluster covered the whole hinted window; later
                    // block reads resolve from the block store
                    if (bx0, by0, bx1, by1) == (hbx0, hby0, hbx1, hby1) {
                        hint.spend();
                    }
                }
            }
        }

        self.read_blocks(band, x, y, Some(buffer), bx0, by0, bx1, by1, false)
            .await
    }

    /// Whether the tile at (x, y) must be fetched: always for the caller's
    /// own block, otherwise when any band's block there is not resident.
    async fn tile_needed(&self, band: &Band, x: i64, y: i64, target_x: i64, target_y: i64) -> bool {
        if x == target_x && y == target_y {
            return true;
        }
        for b in 0..self.config.band_count {
            let key = BlockKey {
                band: b,
                overview: band.overview(),
                x,
                y,
            };
            if !self.blocks.contains(&key).await {
                return true;
            }
        }
        false
    }

    /// Fill every band's block at (x, y) with its nodata value (0 when none).
    pub(crate) async fn empty_block(
        &self,
        band: &Band,
        x: i64,
        y: i64,
        mut target: Option<&mut [u8]>,
    ) {
        for b in 0..self.config.band_count {
            let key = BlockKey {
                band: b,
                overview: band.overview(),
                x,
                y,
            };
            let is_target = b == band.index() && target.is_some();
            if !is_target && self.blocks.contains(&key).await {
                continue;
            }

            let mut block = vec![0u8; self.config.block_len()];
            let value = self.config.nodata_for(b).unwrap_or(0.0);
            if value != 0.0 {
                fill_sample_value(&mut block, self.config.pixel_type, value);
            }
            if is_target {
                if let Some(t) = target.as_deref_mut() {
                    t.copy_from_slice(&block);
                }
            }
            self.blocks.put(key, Bytes::from(block)).await;
        }
    }

    /// Decode cached tile bytes and write their blocks; `false` means the
    /// cached entry could not be used and the tile is still needed.
    async fn read_tile_from_cache(
        &self,
        band: &Band,
        bytes: &Bytes,
        x: i64,
        y: i64,
        target: Option<&mut [u8]>,
    ) -> bool {
        match TileImage::decode(bytes) {
            Ok(img) => self
                .write_tile_to_blocks(band, &img, x, y, target)
                .await
                .is_ok(),
            Err(message) => {
                debug!(x, y, error = %message, "cached tile bytes failed to decode");
                false
            }
        }
    }

    fn check_tile_geometry(
        &self,
        band: &Band,
        x: i64,
        y: i64,
        img: &TileImage,
    ) -> Result<(), ReadError> {
        let (esx, esy) = band.expected_block_size(x, y);
        if img.width() > self.config.block_x
            || img.height() > self.config.block_y
            || img.width() < esx
            || img.height() < esy
        {
            return Err(ReadError::BlockSize {
                sx: img.width(),
                sy: img.height(),
                esx,
                esy,
                bx: self.config.block_x,
                by: self.config.block_y,
            });
        }
        Ok(())
    }

    /// Distribute one decoded tile into the resident blocks of every band,
    /// remapping the source layout into the dataset's.
    pub(crate) async fn write_tile_to_blocks(
        &self,
        band: &Band,
        img: &TileImage,
        x: i64,
        y: i64,
        mut target: Option<&mut [u8]>,
    ) -> Result<(), ReadError> {
        self.check_tile_geometry(band, x, y, img)?;

        let n = self.config.band_count;
        let pixel = self.config.pixel_type;
        if img.pixel_type() != pixel {
            return Err(ReadError::PixelTypeMismatch {
                expected: pixel,
                actual: img.pixel_type(),
            });
        }

        let gray;
        let plan = if img.bands() == 1 && n > 1 && n <= 4 && pixel == PixelType::U8 {
            // Indexed (or implicitly gray) single-band tiles expand through
            // a color table; without an explicit one the synthetic gray
            // table replicates the index and synthesizes full opacity
            match &self.config.color_table {
                Some(table) => RemapPlan::Table(table),
                None => {
                    gray = ColorTable::gray(n);
                    RemapPlan::Table(&gray)
                }
            }
        } else if img.bands() == 1 && n > 4 && self.config.color_table.is_some() {
            return Err(ReadError::ColorTableComponents(n));
        } else {
            RemapPlan::Map(band_fill_map(img.bands(), n).ok_or(ReadError::BandRemap {
                src: img.bands(),
                dest: n,
            })?)
        };

        let px = pixel.size();
        let w = img.width() as usize;
        let h = img.height() as usize;
        let stride = self.config.block_x as usize * px;
        let row_len = w * px;

        for b in 0..n {
            let key = BlockKey {
                band: b,
                overview: band.overview(),
                x,
                y,
            };
            let is_target = b == band.index() && target.is_some();
            if !is_target && self.blocks.contains(&key).await {
                continue;
            }

            let mut block = vec![0u8; self.config.block_len()];
            match &plan {
                RemapPlan::Table(table) => {
                    let indices = img.plane(0).ok_or(ReadError::BandRemap {
                        src: img.bands(),
                        dest: n,
                    })?;
                    for row in 0..h {
                        for col in 0..w {
                            block[row * stride + col] =
                                table.component(indices[row * w + col], b);
                        }
                    }
                }
                RemapPlan::Map(fills) => match fills[b] {
                    BandFill::Copy(s) => {
                        let plane = img.plane(s).ok_or(ReadError::BandRemap {
                            src: img.bands(),
                            dest: n,
                        })?;
                        for row in 0..h {
                            block[row * stride..row * stride + row_len]
                                .copy_from_slice(&plane[row * row_len..(row + 1) * row_len]);
                        }
                    }
                    BandFill::Opaque => {
                        fill_sample_value(&mut block, pixel, pixel.opaque_value());
                    }
                },
            }

            if is_target {
                if let Some(t) = target.as_deref_mut() {
                    t.copy_from_slice(&block);
                }
            }
            self.blocks.put(key, Bytes::from(block)).await;
        }

        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
