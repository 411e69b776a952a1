//! Vodlink CLI - Headless host for the session bridge
//!
//! Features:
//! - Run scripted method calls (one JSON object per line)
//! - Play a single source end to end and print its events
//!
//! Sessions are backed by the simulated engine, so nothing is decoded or
//! rendered; the full command and event pipeline still runs.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

/// Vodlink CLI - Video session bridge host
#[derive(Parser)]
#[command(name = "vodlink")]
#[command(version)]
#[command(about = "Drive video playback sessions through the vodlink bridge", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text", global = true)]
    format: String,

    #[command(flatten)]
    host: HostArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Settings for the in-process host
#[derive(clap::Args, Debug, Clone)]
pub struct HostArgs {
    /// Directory bundled assets are copied into before playback
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Directory bundled assets are read from
    #[arg(long, default_value = ".", global = true)]
    pub asset_root: PathBuf,

    /// Events held per session while no consumer is attached
    #[arg(long, global = true)]
    pub buffer_capacity: Option<usize>,

    /// Duration of the simulated media in milliseconds
    #[arg(
        long,
        default_value = "10000",
        global = true,
        value_parser = clap::value_parser!(i64).range(1..)
    )]
    pub media_duration: i64,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute method calls from a script (stdin when omitted)
    Run {
        /// File with one JSON method call per line
        script: Option<PathBuf>,
    },

    /// Play one source until it ends and print its events
    Play {
        /// URI, or asset path with --asset
        source: String,

        /// Treat the source as a bundled asset path
        #[arg(long)]
        asset: bool,

        /// Progress interval in milliseconds
        #[arg(short, long, default_value = "500")]
        interval: u64,

        /// Seconds to wait before giving up
        #[arg(short, long, default_value = "60")]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    vodlink_core::init();

    match cli.command {
        Commands::Run { script } => {
            commands::run(&cli.host, script, &cli.format).await?;
        }
        Commands::Play {
            source,
            asset,
            interval,
            timeout,
        } => {
            commands::play(&cli.host, &source, asset, interval, timeout, &cli.format).await?;
        }
    }

    Ok(())
}
