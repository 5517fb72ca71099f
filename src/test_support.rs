//! Throwaway HTTP servers standing in for the hosted inference endpoints.

use std::io::Cursor;

use axum::http::{header, StatusCode};
use axum::routing::post;
use axum::Router;
use image::{DynamicImage, ImageOutputFormat};
use tokio::net::TcpListener;
use url::Url;

/// Serves `router` on an ephemeral local port and returns its base URL.
pub(crate) async fn serve(router: Router) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    Url::parse(&format!("http://{addr}/")).unwrap()
}

/// A router answering every `POST /` with the same canned response.
pub(crate) fn respond(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Vec<u8>>,
) -> Router {
    let body: Vec<u8> = body.into();
    Router::new().route(
        "/",
        post(move || {
            let body = body.clone();
            async move { (status, [(header::CONTENT_TYPE, content_type)], body) }
        }),
    )
}

pub(crate) fn jpeg_bytes(image: &DynamicImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Jpeg(95))
        .unwrap();
    bytes
}
