//! The browser page and the conversion of pipeline outcomes into the text
//! and images it displays. Failures are shown as ordinary output.

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::codec;
use crate::pipeline::{CaptionError, GenerationError};

pub const CAPTION_ENCODE_FAILED: &str = "Failed to encode image to Base64.";
pub const CAPTION_FAILED: &str = "Failed to generate caption.";
pub const GENERATION_REQUEST_FAILED: &str =
    "Image generation failed. Check API limits or input size.";
pub const GENERATION_FAILED: &str = "Image generation failed.";
pub const CAPTION_AND_GENERATION_FAILED: &str =
    "Image generation failed. Try reducing image size or restarting the application.";

/// What the image output shows: a base64 PNG, or a message in its place.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ImageOutput {
    pub image: Option<String>,
    pub message: Option<String>,
}

impl ImageOutput {
    fn message(text: &str) -> Self {
        Self {
            image: None,
            message: Some(text.to_string()),
        }
    }
}

pub fn caption_text(result: &Result<String, CaptionError>) -> String {
    match result {
        Ok(caption) => caption.clone(),
        Err(CaptionError::Encode(_)) => CAPTION_ENCODE_FAILED.to_string(),
        Err(_) => CAPTION_FAILED.to_string(),
    }
}

pub fn generation_failure(err: &GenerationError) -> &'static str {
    match err {
        GenerationError::Failed(_) => GENERATION_REQUEST_FAILED,
        _ => GENERATION_FAILED,
    }
}

/// Output of the "Generate Image" button.
pub fn generated_image(result: Result<DynamicImage, GenerationError>) -> ImageOutput {
    match result {
        Ok(image) => encode_for_display(&image),
        Err(e) => ImageOutput::message(generation_failure(&e)),
    }
}

/// Image output of the "Caption and Generate" button, which reports every
/// generation failure with the same message.
pub fn composed_image(result: Result<DynamicImage, GenerationError>) -> ImageOutput {
    match result {
        Ok(image) => encode_for_display(&image),
        Err(_) => ImageOutput::message(CAPTION_AND_GENERATION_FAILED),
    }
}

fn encode_for_display(image: &DynamicImage) -> ImageOutput {
    match codec::encode(image) {
        Ok(encoded) => ImageOutput {
            image: Some(encoded),
            message: None,
        },
        Err(e) => {
            error!("Cannot display generated image: {e}");
            ImageOutput::message(GENERATION_FAILED)
        }
    }
}

pub const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Describe-and-Generate Game</title>
    <style>
        body { font-family: sans-serif; max-width: 760px; margin: 2em auto; padding: 0 1em; color: #222; }
        fieldset { border: 1px solid #ccc; border-radius: 8px; margin-bottom: 1em; }
        button { margin: 0.5em 0.5em 0.5em 0; padding: 0.5em 1em; cursor: pointer; }
        button:disabled { cursor: wait; }
        textarea { width: 100%; min-height: 3em; }
        img { max-width: 100%; display: block; margin-top: 0.5em; }
        .message { color: #a33; }
    </style>
</head>
<body>
    <h1>Describe-and-Generate Game 🖍️</h1>

    <fieldset>
        <legend>Upload an Image</legend>
        <input type="file" id="upload" accept="image/*">
        <img id="preview" alt="">
    </fieldset>

    <button id="btn-caption">Generate Caption</button>

    <fieldset>
        <legend>Generated Caption</legend>
        <textarea id="caption"></textarea>
    </fieldset>

    <button id="btn-image">Generate Image</button>

    <fieldset>
        <legend>Generated Image</legend>
        <p class="message" id="message"></p>
        <img id="output" alt="">
    </fieldset>

    <button id="btn-all">Caption and Generate</button>

    <script>
        const upload = document.getElementById('upload');
        const preview = document.getElementById('preview');
        const caption = document.getElementById('caption');
        const output = document.getElementById('output');
        const message = document.getElementById('message');
        const buttons = document.querySelectorAll('button');

        upload.addEventListener('change', () => {
            const file = upload.files[0];
            preview.src = file ? URL.createObjectURL(file) : '';
        });

        function showImage(result) {
            output.src = result.image ? 'data:image/png;base64,' + result.image : '';
            message.textContent = result.message || '';
        }

        function uploadForm() {
            const file = upload.files[0];
            if (!file) {
                throw new Error('Upload an image first.');
            }
            const form = new FormData();
            form.append('image', file);
            return form;
        }

        async function run(action) {
            buttons.forEach(b => b.disabled = true);
            try {
                await action();
            } catch (err) {
                message.textContent = err.message;
            } finally {
                buttons.forEach(b => b.disabled = false);
            }
        }

        async function post(path, init) {
            const response = await fetch(path, Object.assign({ method: 'POST' }, init));
            const body = await response.json();
            if (!response.ok) {
                throw new Error(body.error || response.statusText);
            }
            return body;
        }

        document.getElementById('btn-caption').addEventListener('click', () => run(async () => {
            const result = await post('/caption', { body: uploadForm() });
            caption.value = result.caption;
        }));

        document.getElementById('btn-image').addEventListener('click', () => run(async () => {
            const result = await post('/generate', {
                headers: { 'Content-Type': 'application/json' },
                body: JSON.stringify({ prompt: caption.value }),
            });
            showImage(result);
        }));

        document.getElementById('btn-all').addEventListener('click', () => run(async () => {
            const result = await post('/caption-and-generate', { body: uploadForm() });
            caption.value = result.caption;
            showImage(result);
        }));
    </script>
</body>
</html>
"#;
