use anyhow::{bail, Context, Result};
use clap_serde_derive::ClapSerde;
use url::Url;

use crate::codec::Bounds;

/// Runtime configuration, read once at startup and never mutated afterwards.
#[derive(ClapSerde, Debug, Clone)]
pub struct Config {
    /// The address the listener binds to
    #[default("0.0.0.0".to_string())]
    #[arg(short, long, env = "ADDRESS")]
    pub address: String,

    /// The port the listener binds to
    #[default(7860)]
    #[arg(short, long, env = "PORT1")]
    pub port: u16,

    /// Bearer token sent to both inference endpoints
    #[arg(long, env = "HF_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Image captioning (image to text) endpoint URL
    #[arg(long, env = "HF_API_ITT_BASE")]
    pub caption_endpoint: String,

    /// Image generation (text to image) endpoint URL
    #[arg(long, env = "HF_API_TTI_BASE")]
    pub generation_endpoint: String,

    /// Width images are resized to before captioning
    #[default(512)]
    #[arg(long)]
    pub resize_width: u32,

    /// Height images are resized to before captioning
    #[default(512)]
    #[arg(long)]
    pub resize_height: u32,

    /// OTLP collector endpoint, telemetry export is disabled when empty
    #[arg(long, env = "OTEL_ENDPOINT")]
    pub otel_endpoint: String,

    /// Log to the console even when exporting to a collector
    #[arg(long, env = "CONSOLE")]
    pub console: bool,
}

pub type ConfigOpt = <Config as ClapSerde>::Opt;

impl Config {
    /// Reads the optional TOML file and layers the command line and
    /// environment values on top of it.
    pub fn load(config_file: Option<&str>, cli: ConfigOpt) -> Result<Self> {
        let config = match config_file {
            Some(path) => Config::from(Self::from_toml(path)?).merge(cli),
            None => Config::from(cli),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(path: &str) -> Result<ConfigOpt> {
        let str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {path}"))?;
        let opt = toml::from_str(&str)
            .with_context(|| format!("Failed to parse configuration file {path}"))?;
        Ok(opt)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            bail!("Missing API key, set HF_API_KEY or pass --api-key");
        }
        self.caption_url()?;
        self.generation_url()?;
        if self.resize_width == 0 || self.resize_height == 0 {
            bail!(
                "Resize bounds must be non-zero, got {}x{}",
                self.resize_width,
                self.resize_height
            );
        }
        Ok(())
    }

    pub fn caption_url(&self) -> Result<Url> {
        parse_endpoint("caption", &self.caption_endpoint)
    }

    pub fn generation_url(&self) -> Result<Url> {
        parse_endpoint("generation", &self.generation_endpoint)
    }

    pub fn bounds(&self) -> Bounds {
        Bounds::new(self.resize_width, self.resize_height)
    }

    pub fn otel_endpoint(&self) -> Option<&str> {
        Some(self.otel_endpoint.as_str()).filter(|e| !e.is_empty())
    }
}

fn parse_endpoint(name: &str, value: &str) -> Result<Url> {
    if value.trim().is_empty() {
        bail!("Missing {name} endpoint URL");
    }
    Url::parse(value).with_context(|| format!("Invalid {name} endpoint URL {value}"))
}
