use std::fmt::Debug;

use image::{DynamicImage, ImageFormat};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

const JSON_MIME_TYPE: &str = "application/json";
const JPEG_MIME_TYPE: &str = "image/jpeg";

/// Body of every inference request.
#[derive(Serialize, Debug)]
pub struct InferenceRequest<'a> {
    pub inputs: &'a str,
}

/// A successful endpoint response, classified by its declared content type.
#[derive(Debug, Clone)]
pub enum InferenceOutput {
    Json(Value),
    Image(DynamicImage),
}

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode JSON response: {source}")]
    Json {
        #[source]
        source: serde_json::Error,
        raw: String,
    },

    #[error("Error processing JPEG image: {0}")]
    Image(#[source] image::ImageError),

    #[error("Unexpected Content-Type: {}", .0.as_deref().unwrap_or("<none>"))]
    UnexpectedContentType(Option<String>),
}

/// Authenticated client for hosted inference endpoints.
#[derive(Clone)]
pub struct InferenceClient {
    http: Client,
    api_key: String,
}

impl Debug for InferenceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceClient")
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl InferenceClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.into(),
        }
    }

    /// Use a custom `reqwest::Client` (for connection pooling, proxies, TLS).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// Posts `{"inputs": inputs}` to `endpoint` once, without retrying.
    ///
    /// Only a `200 OK` answer is a success. Its body is parsed according to
    /// the media type of the `Content-Type` header: JSON bodies are returned
    /// as-is and JPEG bodies are decoded. Every failure is logged before it is
    /// returned.
    #[tracing::instrument(level = "info", skip(self, inputs, endpoint), fields(endpoint = %endpoint, inputs_len = inputs.len()))]
    pub async fn call(&self, inputs: &str, endpoint: &Url) -> Result<InferenceOutput, InferenceError> {
        let network_err = |source: reqwest::Error| {
            error!("Request to {endpoint} failed: {source}");
            InferenceError::Network {
                url: endpoint.to_string(),
                source,
            }
        };

        let resp = self
            .http
            .post(endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&InferenceRequest { inputs })
            .send()
            .await
            .map_err(network_err)?;

        let status = resp.status();
        if status != StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            error!("Error {}: {}", status.as_u16(), body);
            return Err(InferenceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        match content_type.as_deref().map(media_type).as_deref() {
            Some(JSON_MIME_TYPE) => {
                let raw = resp.text().await.map_err(network_err)?;
                match serde_json::from_str::<Value>(&raw) {
                    Ok(value) => {
                        debug!("API JSON Response: {value}");
                        Ok(InferenceOutput::Json(value))
                    }
                    Err(source) => {
                        error!("Failed to decode JSON response: {source}");
                        error!("Raw Response: {raw}");
                        Err(InferenceError::Json { source, raw })
                    }
                }
            }
            Some(JPEG_MIME_TYPE) => {
                info!("Received binary JPEG image data");
                let bytes = resp.bytes().await.map_err(network_err)?;
                image::load_from_memory_with_format(&bytes, ImageFormat::Jpeg)
                    .map(InferenceOutput::Image)
                    .map_err(|e| {
                        error!("Error processing JPEG image: {e}");
                        InferenceError::Image(e)
                    })
            }
            _ => {
                warn!("Unexpected Content-Type: {content_type:?}");
                Err(InferenceError::UnexpectedContentType(content_type))
            }
        }
    }
}

/// Strips parameters such as `; charset=utf-8` and normalises case.
fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use axum::http::{header, HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use image::{GenericImageView, Rgb, RgbImage};
    use serde_json::json;

    use super::*;
    use crate::test_support::{jpeg_bytes, respond, serve};

    #[test]
    fn media_type_ignores_parameters_and_case() {
        assert_eq!(media_type("application/json"), "application/json");
        assert_eq!(media_type("Application/JSON; charset=utf-8"), "application/json");
        assert_eq!(media_type(" image/jpeg "), "image/jpeg");
    }

    #[tokio::test]
    async fn json_body_is_returned_unchanged() {
        let body = json!([{"generated_text": "a dog"}, {"score": 0.5}]);
        let url = serve(respond(StatusCode::OK, "application/json", body.to_string())).await;

        let output = InferenceClient::new("key").call("hello", &url).await.unwrap();
        match output {
            InferenceOutput::Json(value) => assert_eq!(value, body),
            other => panic!("expected JSON, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn json_with_charset_is_accepted() {
        let url = serve(respond(
            StatusCode::OK,
            "application/json; charset=utf-8",
            "{\"ok\":true}",
        ))
        .await;

        let output = InferenceClient::new("key").call("hello", &url).await.unwrap();
        assert!(matches!(output, InferenceOutput::Json(v) if v == json!({"ok": true})));
    }

    #[tokio::test]
    async fn request_carries_bearer_token_and_inputs() {
        let router = Router::new().route(
            "/",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                Json(json!({
                    "authorization": headers[header::AUTHORIZATION].to_str().unwrap(),
                    "content_type": headers[header::CONTENT_TYPE].to_str().unwrap(),
                    "body": body,
                }))
            }),
        );
        let url = serve(router).await;

        let output = InferenceClient::new("secret").call("a prompt", &url).await.unwrap();
        let InferenceOutput::Json(echo) = output else {
            panic!("expected JSON echo");
        };
        assert_eq!(echo["authorization"], "Bearer secret");
        assert_eq!(echo["content_type"], "application/json");
        assert_eq!(echo["body"], json!({"inputs": "a prompt"}));
    }

    #[tokio::test]
    async fn non_ok_status_fails_regardless_of_body() {
        let body = json!([{"generated_text": "a dog"}]).to_string();
        let url = serve(respond(StatusCode::NOT_FOUND, "application/json", body.clone())).await;

        let err = InferenceClient::new("key").call("hello", &url).await.unwrap_err();
        match err {
            InferenceError::Status { status, body: text } => {
                assert_eq!(status, 404);
                assert_eq!(text, body);
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn other_success_codes_are_failures() {
        let url = serve(respond(StatusCode::ACCEPTED, "application/json", "[]")).await;
        let err = InferenceClient::new("key").call("hello", &url).await.unwrap_err();
        assert!(matches!(err, InferenceError::Status { status: 202, .. }));
    }

    #[tokio::test]
    async fn malformed_json_keeps_raw_text() {
        let url = serve(respond(StatusCode::OK, "application/json", "{not json")).await;

        let err = InferenceClient::new("key").call("hello", &url).await.unwrap_err();
        assert!(matches!(err, InferenceError::Json { raw, .. } if raw == "{not json"));
    }

    #[tokio::test]
    async fn jpeg_body_is_decoded() {
        let source = DynamicImage::ImageRgb8(RgbImage::from_fn(64, 48, |x, y| {
            Rgb([(x * 4) as u8, (y * 5) as u8, 100])
        }));
        let url = serve(respond(StatusCode::OK, "image/jpeg", jpeg_bytes(&source))).await;

        let output = InferenceClient::new("key").call("hello", &url).await.unwrap();
        let InferenceOutput::Image(decoded) = output else {
            panic!("expected an image");
        };
        assert_eq!(decoded.dimensions(), (64, 48));

        let (a, b) = (source.to_rgb8(), decoded.to_rgb8());
        let total: u64 = a
            .as_raw()
            .iter()
            .zip(b.as_raw())
            .map(|(x, y)| x.abs_diff(*y) as u64)
            .sum();
        let mean = total as f64 / a.as_raw().len() as f64;
        assert!(mean < 8.0, "mean channel error {mean} too large");
    }

    #[tokio::test]
    async fn corrupt_jpeg_fails() {
        let url = serve(respond(StatusCode::OK, "image/jpeg", "not a jpeg")).await;
        let err = InferenceClient::new("key").call("hello", &url).await.unwrap_err();
        assert!(matches!(err, InferenceError::Image(_)));
    }

    #[tokio::test]
    async fn unexpected_content_type_fails() {
        let url = serve(respond(StatusCode::OK, "text/html", "<html></html>")).await;
        let err = InferenceClient::new("key").call("hello", &url).await.unwrap_err();
        assert!(matches!(
            err,
            InferenceError::UnexpectedContentType(Some(ct)) if ct == "text/html"
        ));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_network_error() {
        // Nothing listens on the discard port.
        let url = Url::parse("http://127.0.0.1:9/").unwrap();
        let err = InferenceClient::new("key").call("hello", &url).await.unwrap_err();
        assert!(matches!(err, InferenceError::Network { .. }));
    }
}
