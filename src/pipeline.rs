//! The caption and generation steps, and their composition.

use anyhow::Result;
use image::DynamicImage;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::client::{InferenceClient, InferenceError, InferenceOutput};
use crate::codec::{self, Bounds, CodecError};
use crate::config::Config;

const CAPTION_FIELD: &str = "generated_text";
const IMAGE_FIELD: &str = "generated_image";

#[derive(Error, Debug)]
pub enum CaptionError {
    #[error("Failed to encode image: {0}")]
    Encode(#[from] CodecError),

    #[error("Captioning request failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("Captioning response has no generated_text field")]
    Malformed,
}

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Generation request failed: {0}")]
    Failed(#[from] InferenceError),

    #[error("Generated image could not be decoded: {0}")]
    Decode(#[from] CodecError),

    #[error("Generation response has neither an image nor a generated_image field")]
    Malformed,

    #[error("No caption to generate an image from")]
    NoCaption,
}

/// Outcome of [`Pipeline::caption_and_generate`]. The caption is kept even
/// when generation fails.
#[derive(Debug)]
pub struct CaptionAndImage {
    pub caption: Result<String, CaptionError>,
    pub image: Result<DynamicImage, GenerationError>,
}

/// Captioning and generation over two hosted endpoints sharing one client.
#[derive(Debug, Clone)]
pub struct Pipeline {
    client: InferenceClient,
    caption_endpoint: Url,
    generation_endpoint: Url,
    bounds: Bounds,
}

impl Pipeline {
    pub fn new(client: InferenceClient, caption_endpoint: Url, generation_endpoint: Url) -> Self {
        Self {
            client,
            caption_endpoint,
            generation_endpoint,
            bounds: Bounds::default(),
        }
    }

    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            InferenceClient::new(&config.api_key),
            config.caption_url()?,
            config.generation_url()?,
        )
        .with_bounds(config.bounds()))
    }

    /// Resizes, encodes and captions `image`.
    #[tracing::instrument(level = "info", skip(self, image))]
    pub async fn caption(&self, image: &DynamicImage) -> Result<String, CaptionError> {
        let resized = codec::resize(image, self.bounds);
        let payload = codec::encode(&resized)?;

        match self.client.call(&payload, &self.caption_endpoint).await? {
            InferenceOutput::Json(value) => match first_string_field(&value, CAPTION_FIELD) {
                Some(caption) => {
                    info!("Generated caption: {caption}");
                    Ok(caption.to_string())
                }
                None => {
                    warn!("Unexpected caption format: {value}");
                    Err(CaptionError::Malformed)
                }
            },
            InferenceOutput::Image(_) => {
                warn!("Captioning endpoint answered with an image");
                Err(CaptionError::Malformed)
            }
        }
    }

    /// Generates an image from a text prompt.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn generate_image(&self, prompt: &str) -> Result<DynamicImage, GenerationError> {
        match self.client.call(prompt, &self.generation_endpoint).await? {
            InferenceOutput::Image(image) => Ok(image),
            InferenceOutput::Json(value) => match first_string_field(&value, IMAGE_FIELD) {
                Some(encoded) => Ok(codec::decode(encoded)?),
                None => {
                    warn!("Unexpected output format: {value}");
                    Err(GenerationError::Malformed)
                }
            },
        }
    }

    /// Captions `image`, then generates a new image from that caption.
    ///
    /// Generation is skipped when captioning fails.
    #[tracing::instrument(level = "info", skip(self, image))]
    pub async fn caption_and_generate(&self, image: &DynamicImage) -> CaptionAndImage {
        let caption = self.caption(image).await;
        let image = match &caption {
            Ok(text) => self.generate_image(text).await,
            Err(e) => {
                warn!("Skipping generation: {e}");
                Err(GenerationError::NoCaption)
            }
        };
        CaptionAndImage { caption, image }
    }
}

/// `[{"<field>": "..."}, ...]` → the string in the first element.
fn first_string_field<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value
        .as_array()
        .and_then(|items| items.first())
        .and_then(|item| item.get(field))
        .and_then(Value::as_str)
}
