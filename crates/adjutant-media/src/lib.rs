//! Image normalization for model-bound payloads.
//!
//! Every image that reaches the model endpoint, whether attached by a
//! user or produced by a tool, passes through [`normalize`]. The output
//! satisfies `longest side <= MAX_DIMENSION` and `bytes <= MAX_BYTES`,
//! with EXIF orientation applied, or carries `within_limits = false` when
//! even the smallest reduction attempt could not meet the byte budget.
//!
//! Normalization never grows a payload: compliant inputs pass through
//! byte-identical, and a pending rotation on a compliant input is baked
//! in losslessly only when the re-encode comes out no larger than the
//! original (otherwise the original bytes keep their orientation tag).

use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::metadata::Orientation;
use image::{DynamicImage, ImageReader};
use tracing::{debug, warn};

pub use error::MediaError;

mod error;

/// Maximum longest side in pixels.
pub const MAX_DIMENSION: u32 = 2000;

/// Maximum encoded size in bytes.
pub const MAX_BYTES: usize = 5 * 1024 * 1024;

/// Reduction grid: target longest sides crossed with JPEG qualities,
/// tried in order until an attempt fits the byte budget.
const TARGET_SIDES: [u32; 4] = [2000, 1600, 1200, 800];
const JPEG_QUALITIES: [u8; 3] = [85, 70, 50];

/// A normalized image ready for the model endpoint.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    /// False when the smallest reduction attempt still exceeded
    /// [`MAX_BYTES`]; the bytes are the best that could be done.
    pub within_limits: bool,
}

impl NormalizedImage {
    /// Base64 encoding of the bytes, as carried in content blocks.
    pub fn to_base64(&self) -> String {
        B64.encode(&self.bytes)
    }
}

/// Normalize raw image bytes.
///
/// Returns an error only when the input cannot be decoded at all;
/// callers are expected to replace the image with an explanatory text
/// block in that case.
pub fn normalize(raw: &[u8]) -> Result<NormalizedImage, MediaError> {
    let reader = ImageReader::new(Cursor::new(raw))
        .with_guessed_format()
        .map_err(|e| MediaError::Decode(e.to_string()))?;

    let format = reader.format().ok_or(MediaError::UnsupportedFormat)?;
    let mime_type = mime_for_format(format);

    let mut decoder = reader
        .into_decoder()
        .map_err(|e| MediaError::Decode(e.to_string()))?;
    let orientation = image::ImageDecoder::orientation(&mut decoder)
        .unwrap_or(Orientation::NoTransforms);

    let mut img =
        DynamicImage::from_decoder(decoder).map_err(|e| MediaError::Decode(e.to_string()))?;

    let needs_rotation = orientation != Orientation::NoTransforms;
    let (stored_width, stored_height) = (img.width(), img.height());
    if needs_rotation {
        img.apply_orientation(orientation);
    }

    let (width, height) = (img.width(), img.height());
    let longest = width.max(height);

    if longest <= MAX_DIMENSION && raw.len() <= MAX_BYTES {
        // Compliant input with no pending rotation passes through
        // untouched.
        if !needs_rotation {
            return Ok(NormalizedImage {
                bytes: raw.to_vec(),
                mime_type,
                width,
                height,
                within_limits: true,
            });
        }

        // The image only needs its rotation baked in; re-encode
        // losslessly rather than through the lossy reduction grid, and
        // only when that does not grow the payload.
        let rotated = encode_png(&img)?;
        if rotated.bytes.len() <= raw.len() {
            return Ok(rotated);
        }

        // A lossless re-encode would grow the payload. Keep the
        // original bytes; the orientation tag stays with them.
        debug!(
            input_bytes = raw.len(),
            rotated_bytes = rotated.bytes.len(),
            "rotation re-encode would grow the image; keeping original bytes"
        );
        return Ok(NormalizedImage {
            bytes: raw.to_vec(),
            mime_type,
            width: stored_width,
            height: stored_height,
            within_limits: true,
        });
    }

    reduce(img, raw.len())
}

/// Normalize a base64-encoded image block payload.
pub fn normalize_base64(data: &str) -> Result<NormalizedImage, MediaError> {
    let raw = B64
        .decode(data.trim())
        .map_err(|e| MediaError::Base64(e.to_string()))?;
    normalize(&raw)
}

/// Walk the reduction grid until an attempt fits the byte budget.
fn reduce(img: DynamicImage, input_len: usize) -> Result<NormalizedImage, MediaError> {
    let mut smallest: Option<NormalizedImage> = None;

    for &side in &TARGET_SIDES {
        let scaled = scale_to_fit(&img, side);
        for &quality in &JPEG_QUALITIES {
            let attempt = encode_jpeg(&scaled, quality)?;
            debug!(
                side,
                quality,
                bytes = attempt.bytes.len(),
                "image reduction attempt"
            );

            if attempt.bytes.len() <= MAX_BYTES {
                return Ok(attempt);
            }
            if smallest
                .as_ref()
                .map(|s| attempt.bytes.len() < s.bytes.len())
                .unwrap_or(true)
            {
                smallest = Some(attempt);
            }
        }
    }

    let mut best = smallest.expect("reduction grid is non-empty");
    warn!(
        input_bytes = input_len,
        output_bytes = best.bytes.len(),
        "image could not be reduced below the byte limit; returning smallest attempt"
    );
    best.within_limits = false;
    Ok(best)
}

/// Downscale preserving aspect ratio so the longest side is at most
/// `side`. Never upscales.
fn scale_to_fit(img: &DynamicImage, side: u32) -> DynamicImage {
    let longest = img.width().max(img.height());
    if longest <= side {
        img.clone()
    } else {
        img.resize(side, side, image::imageops::FilterType::Lanczos3)
    }
}

fn encode_png(img: &DynamicImage) -> Result<NormalizedImage, MediaError> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png)
        .map_err(|e| MediaError::Encode(e.to_string()))?;

    Ok(NormalizedImage {
        bytes: out.into_inner(),
        mime_type: "image/png".to_string(),
        width: img.width(),
        height: img.height(),
        within_limits: true,
    })
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<NormalizedImage, MediaError> {
    // JPEG has no alpha channel.
    let rgb = img.to_rgb8();
    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(&rgb)
        .map_err(|e| MediaError::Encode(e.to_string()))?;

    Ok(NormalizedImage {
        bytes: out.into_inner(),
        mime_type: "image/jpeg".to_string(),
        width: rgb.width(),
        height: rgb.height(),
        within_limits: true,
    })
}

fn mime_for_format(format: image::ImageFormat) -> String {
    match format {
        image::ImageFormat::Png => "image/png",
        image::ImageFormat::Jpeg => "image/jpeg",
        image::ImageFormat::Gif => "image/gif",
        image::ImageFormat::WebP => "image/webp",
        image::ImageFormat::Bmp => "image/bmp",
        image::ImageFormat::Tiff => "image/tiff",
        _ => "application/octet-stream",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 251) as u8, (y % 241) as u8, ((x + y) % 239) as u8])
        });
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn jpeg_bytes(img: RgbImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut out, 85)
            .encode_image(&img)
            .unwrap();
        out.into_inner()
    }

    /// Splice an EXIF APP1 segment carrying the given orientation tag
    /// into an encoded JPEG (the encoders do not write EXIF).
    fn with_exif_orientation(jpeg: &[u8], orientation: u16) -> Vec<u8> {
        let mut tiff = Vec::new();
        tiff.extend_from_slice(b"II"); // little-endian TIFF
        tiff.extend_from_slice(&42u16.to_le_bytes());
        tiff.extend_from_slice(&8u32.to_le_bytes()); // IFD0 offset
        tiff.extend_from_slice(&1u16.to_le_bytes()); // one entry
        tiff.extend_from_slice(&0x0112u16.to_le_bytes()); // Orientation
        tiff.extend_from_slice(&3u16.to_le_bytes()); // SHORT
        tiff.extend_from_slice(&1u32.to_le_bytes());
        tiff.extend_from_slice(&orientation.to_le_bytes());
        tiff.extend_from_slice(&[0, 0]); // value field padding
        tiff.extend_from_slice(&0u32.to_le_bytes()); // no next IFD

        let mut app1 = b"Exif\0\0".to_vec();
        app1.extend_from_slice(&tiff);

        let mut out = jpeg[..2].to_vec(); // SOI
        out.extend_from_slice(&[0xFF, 0xE1]);
        out.extend_from_slice(&((app1.len() + 2) as u16).to_be_bytes());
        out.extend_from_slice(&app1);
        out.extend_from_slice(&jpeg[2..]);
        out
    }

    #[test]
    fn small_image_passes_through_byte_identical() {
        let raw = png_bytes(640, 480);
        let normalized = normalize(&raw).unwrap();
        assert!(normalized.within_limits);
        assert_eq!(normalized.bytes, raw);
        assert_eq!(normalized.mime_type, "image/png");
    }

    #[test]
    fn oversized_image_is_scaled_down() {
        let raw = png_bytes(3000, 1000);
        let normalized = normalize(&raw).unwrap();
        assert!(normalized.within_limits);
        assert!(normalized.width.max(normalized.height) <= MAX_DIMENSION);
        assert!(normalized.bytes.len() <= MAX_BYTES);
        assert_eq!(normalized.mime_type, "image/jpeg");
    }

    #[test]
    fn aspect_ratio_is_preserved() {
        let raw = png_bytes(4000, 2000);
        let normalized = normalize(&raw).unwrap();
        // 2:1 source stays 2:1 after the fit.
        assert_eq!(normalized.width, 2000);
        assert_eq!(normalized.height, 1000);
    }

    #[test]
    fn small_rotated_image_is_rotated_without_growing() {
        // Orientation 6: rotate 90 degrees clockwise. A flat image
        // re-encodes smaller as PNG, so the rotation gets baked in.
        let raw = jpeg_bytes(RgbImage::from_pixel(64, 48, image::Rgb([30, 90, 200])));
        let tagged = with_exif_orientation(&raw, 6);

        let normalized = normalize(&tagged).unwrap();
        assert!(normalized.within_limits);
        assert!(normalized.bytes.len() <= tagged.len());
        assert_eq!((normalized.width, normalized.height), (48, 64));
        assert_eq!(normalized.mime_type, "image/png");
    }

    #[test]
    fn rotated_noise_image_never_grows() {
        // Pseudo-noise defeats lossless compression; whichever branch
        // the rotation takes, the output must not exceed the input.
        let img = RgbImage::from_fn(64, 48, |x, y| {
            let mut v = x.wrapping_mul(31).wrapping_add(y.wrapping_mul(271)).wrapping_add(7);
            v ^= v << 13;
            v ^= v >> 17;
            v ^= v << 5;
            image::Rgb([(v & 0xFF) as u8, ((v >> 8) & 0xFF) as u8, ((v >> 16) & 0xFF) as u8])
        });
        let raw = jpeg_bytes(img);
        let tagged = with_exif_orientation(&raw, 6);

        let normalized = normalize(&tagged).unwrap();
        assert!(normalized.within_limits);
        assert!(normalized.bytes.len() <= tagged.len());
    }

    #[test]
    fn normalization_is_idempotent() {
        let raw = png_bytes(3000, 3000);
        let first = normalize(&raw).unwrap();
        let second = normalize(&first.bytes).unwrap();
        assert_eq!(second.bytes, first.bytes);
    }

    #[test]
    fn garbage_input_is_a_decode_error() {
        let result = normalize(b"not an image at all");
        assert!(result.is_err());
    }

    #[test]
    fn base64_round_trip() {
        let raw = png_bytes(100, 100);
        let encoded = B64.encode(&raw);
        let normalized = normalize_base64(&encoded).unwrap();
        assert_eq!(normalized.bytes, raw);
    }
}
