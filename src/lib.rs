//! Describe-and-Generate: caption an uploaded image with a hosted
//! image-to-text endpoint, then turn the caption back into an image with a
//! hosted text-to-image endpoint.

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod server;
pub mod telemetry;
pub mod ui;

#[cfg(test)]
mod test_support;
