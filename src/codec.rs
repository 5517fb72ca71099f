//! Conversions between in-memory images and their base64 wire form.

use std::io::Cursor;

use base64ct::{Base64, Encoding};
use image::imageops::FilterType;
use image::{DynamicImage, ImageOutputFormat};
use thiserror::Error;
use tracing::error;

/// Fixed dimensions an image is resized to before it is sent for captioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub width: u32,
    pub height: u32,
}

impl Bounds {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::new(512, 512)
    }
}

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Failed to encode image as PNG: {0}")]
    Encode(#[source] image::ImageError),

    #[error("Invalid base64 payload: {0}")]
    Base64(base64ct::Error),

    #[error("Payload is not a decodable image: {0}")]
    Image(#[source] image::ImageError),
}

/// Serializes the image as PNG.
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, CodecError> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
        .map_err(|e| {
            error!("Error encoding image: {e}");
            CodecError::Encode(e)
        })?;
    Ok(bytes)
}

/// Serializes the image as PNG and base64 encodes the result.
#[tracing::instrument(level = "debug", skip(image), fields(width = image.width(), height = image.height()))]
pub fn encode(image: &DynamicImage) -> Result<String, CodecError> {
    Ok(Base64::encode_string(&encode_png(image)?))
}

/// Reverses [`encode`], accepting any image format `image` can guess.
#[tracing::instrument(level = "debug", skip(payload), fields(len = payload.len()))]
pub fn decode(payload: &str) -> Result<DynamicImage, CodecError> {
    let bytes = Base64::decode_vec(payload.trim()).map_err(|e| {
        error!("Error decoding Base64 image: {e}");
        CodecError::Base64(e)
    })?;
    image::load_from_memory(&bytes).map_err(|e| {
        error!("Error decoding Base64 image: {e}");
        CodecError::Image(e)
    })
}

/// Resizes to exactly `bounds`, ignoring the source aspect ratio.
pub fn resize(image: &DynamicImage, bounds: Bounds) -> DynamicImage {
    image.resize_exact(bounds.width, bounds.height, FilterType::Lanczos3)
}
