// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "shader-sampling")]
#[command(about = "Generate WGSL sampling programs")]
#[command(version)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a polar resampling program
    Polar {
        /// Source width
        #[arg(long, default_value = "1920")]
        src_width: u32,

        /// Source height
        #[arg(long, default_value = "1080")]
        src_height: u32,

        /// Output width
        #[arg(long, default_value = "1280")]
        width: u32,

        /// Output height
        #[arg(long, default_value = "720")]
        height: u32,

        /// Source texture format
        #[arg(short, long, default_value = "rgba16float")]
        format: String,

        /// Filter preset, overrides the configuration
        #[arg(short, long)]
        preset: Option<String>,
    },

    /// Generate a deband program
    Deband {
        /// Source width
        #[arg(long, default_value = "1920")]
        width: u32,

        /// Source height
        #[arg(long, default_value = "1080")]
        height: u32,

        /// Noise seed
        #[arg(short, long)]
        seed: Option<f32>,
    },

    /// Show the device capabilities used for generation
    Caps,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=shader_sampling=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let config = cli::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Polar {
            src_width,
            src_height,
            width,
            height,
            format,
            preset,
        } => cli::generate_polar(
            &config,
            (src_width, src_height),
            (width, height),
            &format,
            preset.as_deref(),
        ),
        Commands::Deband {
            width,
            height,
            seed,
        } => cli::generate_deband(&config, (width, height), seed),
        Commands::Caps => cli::show_caps(&config),
    }
}
