use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use image::DynamicImage;

use describe_generate::codec;
use describe_generate::config::{Config, ConfigOpt};
use describe_generate::pipeline::Pipeline;
use describe_generate::telemetry::init_telemetry;
use describe_generate::ui;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to an optional TOML configuration file
    #[arg(short, long, env)]
    config_file: Option<String>,

    /// Configuration options
    #[command(flatten)]
    opt_config: ConfigOpt,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a caption for an image
    Caption {
        /// Image file to describe
        image: PathBuf,
    },
    /// Generate an image from a text prompt
    Generate {
        /// Text prompt
        prompt: String,

        /// Where to write the generated PNG
        #[arg(short, long, default_value = "generated.png")]
        output: PathBuf,
    },
    /// Caption an image, then generate a new image from the caption
    CaptionAndGenerate {
        /// Image file to describe
        image: PathBuf,

        /// Where to write the generated PNG
        #[arg(short, long, default_value = "generated.png")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let config = Config::load(args.config_file.as_deref(), args.opt_config)?;
    init_telemetry(config.otel_endpoint(), config.console)?;
    let pipeline = Pipeline::from_config(&config)?;

    let succeeded = match args.cmd {
        Commands::Caption { image } => {
            let caption = pipeline.caption(&open_image(&image)?).await;
            println!("{}", ui::caption_text(&caption));
            caption.is_ok()
        }
        Commands::Generate { prompt, output } => match pipeline.generate_image(&prompt).await {
            Ok(generated) => {
                save_png(&generated, &output).await?;
                true
            }
            Err(e) => {
                println!("{}", ui::generation_failure(&e));
                false
            }
        },
        Commands::CaptionAndGenerate { image, output } => {
            let out = pipeline.caption_and_generate(&open_image(&image)?).await;
            println!("{}", ui::caption_text(&out.caption));
            match out.image {
                Ok(generated) => {
                    save_png(&generated, &output).await?;
                    out.caption.is_ok()
                }
                Err(_) => {
                    println!("{}", ui::CAPTION_AND_GENERATION_FAILED);
                    false
                }
            }
        }
    };

    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn open_image(path: &Path) -> Result<DynamicImage> {
    image::open(path).with_context(|| format!("Failed to open image {}", path.display()))
}

async fn save_png(image: &DynamicImage, path: &Path) -> Result<()> {
    tokio::fs::write(path, codec::encode_png(image)?)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Generated image written to {}", path.display());
    Ok(())
}
