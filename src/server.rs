use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::bail_app;
use crate::error::{AppError, AppResult};
use crate::pipeline::Pipeline;
use crate::ui::{self, ImageOutput};

// 10 MB
const UPLOAD_LIMIT: usize = 10_000_000;
const IMAGE_FIELD: &str = "image";

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CaptionResponse {
    pub caption: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct GenerateRequest {
    pub prompt: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CaptionAndGenerateResponse {
    pub caption: String,
    #[serde(flatten)]
    pub output: ImageOutput,
}

pub fn router(pipeline: Pipeline) -> Router {
    let upload_router = Router::new()
        .route("/caption", post(handle_caption))
        .route("/caption-and-generate", post(handle_caption_and_generate))
        .layer(DefaultBodyLimit::max(UPLOAD_LIMIT));

    Router::new()
        .route("/", get(handle_index))
        .route("/health", get(handle_health))
        .route("/generate", post(handle_generate))
        .merge(upload_router)
        .layer(TraceLayer::new_for_http())
        .with_state(AppState {
            pipeline: Arc::new(pipeline),
        })
}

pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutting down..."),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }
}

async fn handle_index() -> Html<&'static str> {
    Html(ui::INDEX_HTML)
}

async fn handle_health() -> &'static str {
    "ok"
}

#[axum_macros::debug_handler]
async fn handle_caption(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<CaptionResponse>)> {
    let image = read_upload(multipart).await?;
    let caption = state.pipeline.caption(&image).await;
    Ok((
        StatusCode::OK,
        Json(CaptionResponse {
            caption: ui::caption_text(&caption),
        }),
    ))
}

#[axum_macros::debug_handler]
async fn handle_generate(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> AppResult<(StatusCode, Json<ImageOutput>)> {
    let image = state.pipeline.generate_image(&req.prompt).await;
    Ok((StatusCode::OK, Json(ui::generated_image(image))))
}

#[axum_macros::debug_handler]
async fn handle_caption_and_generate(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<CaptionAndGenerateResponse>)> {
    let image = read_upload(multipart).await?;
    let out = state.pipeline.caption_and_generate(&image).await;
    Ok((
        StatusCode::OK,
        Json(CaptionAndGenerateResponse {
            caption: ui::caption_text(&out.caption),
            output: ui::composed_image(out.image),
        }),
    ))
}

fn is_image_upload_mime(content: &str) -> bool {
    content.starts_with("image/") || content == "application/octet-stream"
}

/// Reads and decodes the single `image` field of an upload form.
async fn read_upload(mut multipart: Multipart) -> AppResult<DynamicImage> {
    let mut opt_bytes = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::new(e.status(), e.body_text()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(IMAGE_FIELD) => {
                if field
                    .content_type()
                    .map_or(false, |content| !is_image_upload_mime(content))
                {
                    bail_app!(
                        StatusCode::BAD_REQUEST,
                        "Invalid mime type in content-type header for image field"
                    );
                }
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::new(e.status(), e.body_text()))?;
                opt_bytes = Some(bytes);
            }
            Some(name) => bail_app!(StatusCode::BAD_REQUEST, "Unknown field {}", name),
            None => {}
        }
    }

    let Some(bytes) = opt_bytes else {
        bail_app!(
            StatusCode::BAD_REQUEST,
            "Missing field image in multipart form"
        );
    };

    image::load_from_memory(&bytes).map_err(|e| {
        AppError::new(
            StatusCode::BAD_REQUEST,
            format!("Uploaded file is not a supported image: {e}"),
        )
    })
}
