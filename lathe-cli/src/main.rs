//! Lathe CLI: train configured experiments and inspect their checkpoints.

mod commands;
mod demo;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Lathe: configuration-driven training runs with checkpoints and resume
#[derive(Parser, Debug)]
#[command(name = "lathe", version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors to stderr
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Directory for the JSON log file (defaults to the platform data directory)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Train the experiment described by a configuration file
    Train {
        /// Configuration file (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Checkpoint to resume from
        #[arg(short, long)]
        resume: Option<PathBuf>,

        /// Run directory name under save_dir/name (defaults to MMDD_HHMM)
        #[arg(long)]
        run_id: Option<String>,
    },
    /// Show a checkpoint's contents, or list the checkpoints in a run directory
    Inspect {
        /// Checkpoint file or run directory
        checkpoint: PathBuf,
    },
    /// List registered models, datasets, transforms, optimizers and schedulers
    Components,
}

fn stderr_filter(verbose: u8, quiet: bool) -> &'static str {
    match verbose {
        0 if quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(stderr_filter(cli.verbose, cli.quiet)));

    let log_dir = cli.log_dir.clone().unwrap_or_else(|| {
        directories::ProjectDirs::from("dev", "lathe", "lathe")
            .map(|d| d.data_dir().join("logs"))
            .unwrap_or_else(|| PathBuf::from("."))
    });
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "lathe.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    commands::handle_command(cli.command)
}
