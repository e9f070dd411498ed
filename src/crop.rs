//! Crop engine: pure transform from source bytes plus a rectangle to an
//! encoded derivative.

use image::{GenericImageView, ImageFormat, ImageReader};
use std::io::Cursor;

/// Crop rectangle in source-image pixel coordinates, origin top-left.
///
/// Width and height are strictly positive by construction. The rectangle is
/// not validated against any particular image here; [`crop`] rejects regions
/// that fall outside the source it is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "RawCropBox")]
pub struct CropBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Wire shape of a crop box before invariants are checked.
#[derive(Debug, Clone, Copy, serde::Deserialize)]
struct RawCropBox {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl TryFrom<RawCropBox> for CropBox {
    type Error = InvalidCropBox;

    fn try_from(raw: RawCropBox) -> Result<Self, Self::Error> {
        CropBox::new(raw.x, raw.y, raw.width, raw.height)
    }
}

impl CropBox {
    /// Builds a crop box, rejecting degenerate rectangles.
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Result<CropBox, InvalidCropBox> {
        if width == 0 || height == 0 {
            return Err(InvalidCropBox { width, height });
        }
        Ok(CropBox {
            x,
            y,
            width,
            height,
        })
    }

    /// Whether the rectangle lies fully inside a `source_width` x
    /// `source_height` image. Computed in u64 so `x + width` cannot wrap.
    fn fits_within(&self, source_width: u32, source_height: u32) -> bool {
        self.x as u64 + self.width as u64 <= source_width as u64
            && self.y as u64 + self.height as u64 <= source_height as u64
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("crop box must have positive dimensions, got {width}x{height}")]
pub struct InvalidCropBox {
    pub width: u32,
    pub height: u32,
}

/// Crops `bytes` to `region` and re-encodes the result.
///
/// The input format is guessed from the byte content; the output is always
/// JPEG, matching what retrieval serves. Regions extending past the source
/// dimensions are rejected rather than clamped, so a caller holding a stale
/// or mistaken rectangle hears about it instead of silently getting a
/// different crop.
///
/// # Errors
/// - `CropError::DecodeFailed` if the bytes are not a decodable image.
/// - `CropError::OutOfBounds` if the region extends past the source.
/// - `CropError::EncodeFailed` if JPEG encoding fails.
pub fn crop(bytes: &[u8], region: CropBox) -> Result<Vec<u8>, CropError> {
    let img = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| CropError::DecodeFailed(image::ImageError::IoError(e)))?
        .decode()
        .map_err(CropError::DecodeFailed)?;

    let (source_width, source_height) = img.dimensions();
    if !region.fits_within(source_width, source_height) {
        return Err(CropError::OutOfBounds {
            region,
            source_width,
            source_height,
        });
    }

    let cropped = img.crop_imm(region.x, region.y, region.width, region.height);

    // The JPEG encoder has no alpha support, so flatten to RGB first.
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(cropped.to_rgb8())
        .write_to(&mut out, ImageFormat::Jpeg)
        .map_err(CropError::EncodeFailed)?;

    Ok(out.into_inner())
}

/// Errors that can occur while producing a cropped derivative.
#[derive(Debug, thiserror::Error)]
pub enum CropError {
    #[error("failed to decode source image: {0}")]
    DecodeFailed(#[source] image::ImageError),

    #[error(
        "crop region {region:?} extends past source dimensions {source_width}x{source_height}"
    )]
    OutOfBounds {
        region: CropBox,
        source_width: u32,
        source_height: u32,
    },

    #[error("failed to encode cropped image: {0}")]
    EncodeFailed(#[source] image::ImageError),
}
