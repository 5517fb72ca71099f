use anyhow::Result;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use describe_generate::config::{Config, ConfigOpt};
use describe_generate::exit_err;
use describe_generate::pipeline::Pipeline;
use describe_generate::server::{router, shutdown_signal};
use describe_generate::telemetry::{init_telemetry, shutdown_telemetry};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to an optional TOML configuration file
    #[arg(short, long, env)]
    config_file: Option<String>,

    /// Configuration options
    #[command(flatten)]
    pub opt_config: ConfigOpt,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = match Config::load(args.config_file.as_deref(), args.opt_config) {
        Ok(config) => config,
        Err(err) => {
            tracing_subscriber::fmt::init();
            exit_err!(1, "Invalid configuration: {:#}", err);
        }
    };
    init_telemetry(config.otel_endpoint(), config.console)?;

    let pipeline = Pipeline::from_config(&config)?;
    info!(
        "Captioning with {}, generating with {}",
        config.caption_url()?,
        config.generation_url()?
    );

    let listener = TcpListener::bind(format!("{}:{}", config.address, config.port)).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(pipeline))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown_telemetry();
    Ok(())
}
