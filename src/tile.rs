//! Decoded tile images and band remapping.
//!
//! A downloaded tile rarely matches the dataset's band layout exactly: a
//! gray PNG may feed an RGBA dataset, an RGB JPEG may feed a two-band one.
//! [`band_fill_map`] is the fixed remap table deciding, per destination
//! band, whether to copy a source band or synthesize a constant opaque
//! component.

use image::DynamicImage;

use crate::config::PixelType;

/// How one destination band is filled from a source tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandFill {
    /// Copy the source band with this 0-based index
    Copy(usize),
    /// Synthesize a constant fully-opaque component
    Opaque,
}

/// The remap table keyed by (source band count 1-4, destination band count
/// 1-4). `None` when either count is outside 1-4.
pub fn band_fill_map(source_bands: usize, dest_bands: usize) -> Option<&'static [BandFill]> {
    use BandFill::*;

    static MAP_1_TO_1: [BandFill; 1] = [Copy(0)];
    static MAP_N_TO_1: [BandFill; 1] = [Copy(0)];

    static MAP_1_TO_2: [BandFill; 2] = [Copy(0), Opaque];
    static MAP_2_TO_2: [BandFill; 2] = [Copy(0), Copy(1)];
    static MAP_3_TO_2: [BandFill; 2] = [Copy(0), Opaque];
    static MAP_4_TO_2: [BandFill; 2] = [Copy(0), Copy(3)];

    static MAP_1_TO_3: [BandFill; 3] = [Copy(0), Copy(0), Copy(0)];
    static MAP_2_TO_3: [BandFill; 3] = [Copy(0), Copy(0), Copy(0)];
    static MAP_3_TO_3: [BandFill; 3] = [Copy(0), Copy(1), Copy(2)];
    static MAP_4_TO_3: [BandFill; 3] = [Copy(0), Copy(1), Copy(2)];

    static MAP_1_TO_4: [BandFill; 4] = [Copy(0), Copy(0), Copy(0), Opaque];
    static MAP_2_TO_4: [BandFill; 4] = [Copy(0), Copy(0), Copy(0), Copy(1)];
    static MAP_3_TO_4: [BandFill; 4] = [Copy(0), Copy(1), Copy(2), Opaque];
    static MAP_4_TO_4: [BandFill; 4] = [Copy(0), Copy(1), Copy(2), Copy(3)];

    let map: &'static [BandFill] = match (source_bands, dest_bands) {
        (1, 1) => &MAP_1_TO_1,
        (2..=4, 1) => &MAP_N_TO_1,
        (1, 2) => &MAP_1_TO_2,
        (2, 2) => &MAP_2_TO_2,
        (3, 2) => &MAP_3_TO_2,
        (4, 2) => &MAP_4_TO_2,
        (1, 3) => &MAP_1_TO_3,
        (2, 3) => &MAP_2_TO_3,
        (3, 3) => &MAP_3_TO_3,
        (4, 3) => &MAP_4_TO_3,
        (1, 4) => &MAP_1_TO_4,
        (2, 4) => &MAP_2_TO_4,
        (3, 4) => &MAP_3_TO_4,
        (4, 4) => &MAP_4_TO_4,
        _ => return None,
    };
    Some(map)
}

/// One decoded tile image, stored as per-band planes of raw samples in
/// native byte order.
#[derive(Debug, Clone)]
pub struct TileImage {
    width: u32,
    height: u32,
    pixel: PixelType,
    planes: Vec<Vec<u8>>,
}

impl TileImage {
    /// Decode JPEG or PNG bytes into band planes.
    ///
    /// 8-bit sources keep their band count (gray, gray+alpha, RGB, RGBA);
    /// 16-bit sources are kept as stored so a U16 dataset receives
    /// unconverted samples. Anything else normalizes to 8-bit RGBA.
    pub fn decode(data: &[u8]) -> Result<Self, String> {
        let img = image::load_from_memory(data).map_err(|e| e.to_string())?;
        Ok(Self::from_dynamic(img))
    }

    fn from_dynamic(img: DynamicImage) -> Self {
        let width = img.width();
        let height = img.height();
        match img {
            DynamicImage::ImageLuma8(buf) => {
                Self::from_samples_u8(width, height, 1, buf.as_raw())
            }
            DynamicImage::ImageLumaA8(buf) => {
                Self::from_samples_u8(width, height, 2, buf.as_raw())
            }
            DynamicImage::ImageRgb8(buf) => Self::from_samples_u8(width, height, 3, buf.as_raw()),
            DynamicImage::ImageRgba8(buf) => {
                Self::from_samples_u8(width, height, 4, buf.as_raw())
            }
            DynamicImage::ImageLuma16(buf) => {
                Self::from_samples_u16(width, height, 1, buf.as_raw())
            }
            DynamicImage::ImageLumaA16(buf) => {
                Self::from_samples_u16(width, height, 2, buf.as_raw())
            }
            DynamicImage::ImageRgb16(buf) => {
                Self::from_samples_u16(width, height, 3, buf.as_raw())
            }
            DynamicImage::ImageRgba16(buf) => {
                Self::from_samples_u16(width, height, 4, buf.as_raw())
            }
            other => {
                let buf = other.to_rgba8();
                Self::from_samples_u8(width, height, 4, buf.as_raw())
            }
        }
    }

    fn from_samples_u8(width: u32, height: u32, bands: usize, interleaved: &[u8]) -> Self {
        let count = width as usize * height as usize;
        let mut planes = vec![Vec::with_capacity(count); bands];
        for chunk in interleaved.chunks_exact(bands) {
            for (b, plane) in planes.iter_mut().enumerate() {
                plane.push(chunk[b]);
            }
        }
        Self {
            width,
            height,
            pixel: PixelType::U8,
            planes,
        }
    }

    fn from_samples_u16(width: u32, height: u32, bands: usize, interleaved: &[u16]) -> Self {
        let count = width as usize * height as usize;
        let mut planes = vec![Vec::with_capacity(count * 2); bands];
        for chunk in interleaved.chunks_exact(bands) {
            for (b, plane) in planes.iter_mut().enumerate() {
                plane.extend_from_slice(&chunk[b].to_ne_bytes());
            }
        }
        Self {
            width,
            height,
            pixel: PixelType::U16,
            planes,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of source bands.
    pub fn bands(&self) -> usize {
        self.planes.len()
    }

    /// Sample type the planes are stored as.
    pub fn pixel_type(&self) -> PixelType {
        self.pixel
    }

    /// Raw samples of one band plane, row-major, native byte order.
    pub fn plane(&self, band: usize) -> Option<&[u8]> {
        self.planes.get(band).map(|p| p.as_slice())
    }
}

// =============================================================================
// Tests
// =============================================================================
