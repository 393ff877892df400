//! Client-side image preparation.
//!
//! The "fast" path bounds the longest edge and re-encodes as JPEG at a
//! fixed quality before upload; the "original" path passes the payload
//! through untouched.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;

use glasschat_shared::constants::{FAST_IMAGE_JPEG_QUALITY, FAST_IMAGE_MAX_DIMENSION};

use crate::error::MediaError;

/// User-toggled upload fidelity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageQuality {
    /// Downscale to [`FAST_IMAGE_MAX_DIMENSION`] and re-encode as JPEG.
    Fast,
    /// Upload the original bytes unmodified.
    Original,
}

/// Prepare an image payload for upload according to the quality toggle.
pub fn prepare_image(bytes: &[u8], quality: ImageQuality) -> Result<Vec<u8>, MediaError> {
    match quality {
        ImageQuality::Original => Ok(bytes.to_vec()),
        ImageQuality::Fast => downscale_to_jpeg(bytes),
    }
}

fn downscale_to_jpeg(bytes: &[u8]) -> Result<Vec<u8>, MediaError> {
    let decoded = image::load_from_memory(bytes)?;

    let bounded = if decoded.width().max(decoded.height()) > FAST_IMAGE_MAX_DIMENSION {
        decoded.resize(
            FAST_IMAGE_MAX_DIMENSION,
            FAST_IMAGE_MAX_DIMENSION,
            FilterType::Triangle,
        )
    } else {
        decoded
    };

    // JPEG carries no alpha channel; flatten before encoding.
    let rgb = DynamicImage::ImageRgb8(bounded.to_rgb8());

    let mut out = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut out, FAST_IMAGE_JPEG_QUALITY);
    rgb.write_with_encoder(encoder)?;
    Ok(out.into_inner())
}
