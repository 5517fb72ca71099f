use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use reqwest::Url;

#[derive(Parser)]
#[command(author, version, about = "Exit non-zero unless the server answers its health check")]
struct Args {
    /// Health endpoint to probe
    #[arg(default_value = "http://127.0.0.1:7860/health")]
    url: Url,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let response = reqwest::blocking::get(args.url.clone())
        .with_context(|| format!("Failed to reach {}", args.url))?;
    if !response.status().is_success() {
        eprintln!("{} answered {}", args.url, response.status());
        return Ok(ExitCode::FAILURE);
    }

    Ok(ExitCode::SUCCESS)
}
