//! Thumbnail rendering
//!
//! Sources are decoded with their EXIF orientation applied, scaled in one of
//! two modes and always re-encoded as baseline JPEG:
//! - fit: the longer side becomes `resolution`, the shorter side is floored
//!   by the same ratio
//! - crop: the centered square of the shorter side is scaled to
//!   `resolution` x `resolution`

use std::io::Cursor;

use image::codecs::bmp::BmpDecoder;
use image::codecs::gif::GifDecoder;
use image::codecs::jpeg::{JpegDecoder, JpegEncoder};
use image::codecs::png::PngDecoder;
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{AnimationDecoder, DynamicImage, GenericImageView, ImageDecoder, ImageError};

use super::format::SourceFormat;
use crate::core::config::DEFAULT_THUMBNAIL_QUALITY;
use crate::core::error::{Result, VaultError};

/// Scaling mode of a derivative
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleMode {
    Fit,
    Crop,
}

impl ScaleMode {
    pub fn from_cropped(cropped: bool) -> Self {
        if cropped {
            ScaleMode::Crop
        } else {
            ScaleMode::Fit
        }
    }
}

/// Renders JPEG thumbnails at a fixed quality
#[derive(Debug, Clone, Copy)]
pub struct Thumbnailer {
    quality: u8,
}

impl Default for Thumbnailer {
    fn default() -> Self {
        Self::new(DEFAULT_THUMBNAIL_QUALITY)
    }
}

impl Thumbnailer {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Render `source` bytes into an encoded JPEG derivative
    pub fn render(&self, source: &[u8], resolution: u32, mode: ScaleMode) -> Result<Vec<u8>> {
        if resolution == 0 {
            return Err(VaultError::InvalidResolution { resolution });
        }

        let format = SourceFormat::sniff(source);
        if format.may_animate() && is_animated(source, format)? {
            return Err(VaultError::UnsupportedSource {
                reason: "animated images cannot be thumbnailed".to_string(),
            });
        }

        let img = decode(source, format)?;
        let scaled = match mode {
            ScaleMode::Fit => scale_to_fit(&img, resolution),
            ScaleMode::Crop => crop_and_scale(&img, resolution),
        };
        encode_jpeg(&scaled, self.quality)
    }
}

/// Output dimensions for fit mode
pub fn fit_dimensions(width: u32, height: u32, resolution: u32) -> (u32, u32) {
    let scale = |side: u32, longer: u32| -> u32 {
        let scaled = u64::from(side) * u64::from(resolution) / u64::from(longer.max(1));
        (scaled as u32).max(1)
    };

    if width >= height {
        (resolution, scale(height, width))
    } else {
        (scale(width, height), resolution)
    }
}

fn scale_to_fit(img: &DynamicImage, resolution: u32) -> DynamicImage {
    let (width, height) = img.dimensions();
    let (new_width, new_height) = fit_dimensions(width, height, resolution);
    img.resize_exact(new_width, new_height, FilterType::Lanczos3)
}

fn crop_and_scale(img: &DynamicImage, resolution: u32) -> DynamicImage {
    let (width, height) = img.dimensions();
    let side = width.min(height);
    let x = (width - side) / 2;
    let y = (height - side) / 2;

    img.crop_imm(x, y, side, side)
        .resize_exact(resolution, resolution, FilterType::Lanczos3)
}

/// More than one decodable frame means the source is animated
fn is_animated(source: &[u8], format: SourceFormat) -> Result<bool> {
    let reader = Cursor::new(source);
    match format {
        SourceFormat::Gif => Ok(has_several_frames(
            GifDecoder::new(reader).map_err(source_error)?,
        )),
        SourceFormat::Png => {
            let decoder = PngDecoder::new(reader).map_err(source_error)?;
            if !decoder.is_apng().map_err(source_error)? {
                return Ok(false);
            }
            Ok(has_several_frames(decoder.apng().map_err(source_error)?))
        }
        _ => Ok(false),
    }
}

fn has_several_frames<'a, D: AnimationDecoder<'a>>(decoder: D) -> bool {
    decoder
        .into_frames()
        .take(2)
        .filter(|frame| frame.is_ok())
        .count()
        > 1
}

fn decode(source: &[u8], format: SourceFormat) -> Result<DynamicImage> {
    let reader = Cursor::new(source);
    match format {
        SourceFormat::Jpeg => decode_oriented(JpegDecoder::new(reader).map_err(source_error)?),
        SourceFormat::Png => decode_oriented(PngDecoder::new(reader).map_err(source_error)?),
        SourceFormat::Gif => decode_oriented(GifDecoder::new(reader).map_err(source_error)?),
        SourceFormat::Bmp => decode_oriented(BmpDecoder::new(reader).map_err(source_error)?),
        SourceFormat::Unsupported => Err(VaultError::UnsupportedSource {
            reason: "unrecognized image signature".to_string(),
        }),
    }
}

fn decode_oriented<D: ImageDecoder>(mut decoder: D) -> Result<DynamicImage> {
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let mut img = DynamicImage::from_decoder(decoder).map_err(source_error)?;
    img.apply_orientation(orientation);
    Ok(img)
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    // JPEG has no alpha channel
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());

    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    rgb.write_with_encoder(encoder)?;
    Ok(buffer)
}

/// Sources are decoded from memory, so even I/O errors mean bad data
fn source_error(err: ImageError) -> VaultError {
    VaultError::UnsupportedSource {
        reason: err.to_string(),
    }
}
