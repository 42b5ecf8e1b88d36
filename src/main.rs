// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tether_camera::Config;

mod cli;

#[derive(Parser)]
#[command(name = "tether-camera")]
#[command(about = "Tethered camera controller: live view, recording and file transfer")]
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
    /// Drive the virtual device headless: live view, recording and a picture
    Demo {
        /// Recording duration in seconds
        #[arg(short, long, default_value = "3")]
        duration: u64,

        /// Output directory for pictures and recordings (default: from config)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run in terminal mode (renders live view to the terminal)
    Terminal,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Terminal mode owns the screen; it installs its own file logger
    if !matches!(cli.command, Commands::Terminal) {
        // Set RUST_LOG environment variable to control log level
        // Examples: RUST_LOG=debug, RUST_LOG=tether_camera=debug, RUST_LOG=info
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_target(true)
            .with_level(true)
            .init();
    }

    let config = match cli.config.as_deref() {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Demo { duration, output } => cli::run_demo(config, duration, output),
        Commands::Terminal => tether_camera::terminal::run(config),
    }
}
