//! Fraghaul entry point.
//!
//! Moves large files into and out of a content-addressed storage network in
//! fixed-size fragments: split locally, upload concurrently, record the
//! fragment → root-hash manifest, and later reassemble from hashes alone.

mod commands;
mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[derive(Parser)]
#[command(name = "fraghaul", version, about = "Chunked file transfer to content-addressed storage")]
struct Cli {
    /// Path to the TOML config file (default: ./fraghaul.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Split a file into fragment files under the output directory.
    Split {
        /// Source file to split.
        file: PathBuf,
    },
    /// Upload fragments from a directory and write the manifest.
    Upload {
        /// Directory holding chunk_NNN.dat fragment files
        /// (default: the configured output directory).
        chunk_dir: Option<PathBuf>,
    },
    /// Reassemble a file from a manifest.
    Retrieve {
        /// Manifest file recorded by `upload`.
        manifest: PathBuf,
        /// Path for the reconstructed file.
        output: PathBuf,
    },
    /// Full pipeline: split, upload, retrieve into <file>.reconstructed.
    Run {
        /// Source file to move through the pipeline.
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    // Ctrl-C flips the token; in-flight backend calls observe it.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling");
                cancel.cancel();
            }
        });
    }

    let result = match cli.command {
        Command::Split { file } => commands::split(&config, &file).map(|_| ()),
        Command::Upload { chunk_dir } => {
            let dir = chunk_dir.unwrap_or_else(|| config.transfer.output_dir.clone());
            commands::upload(&config, &cancel, &dir).await.map(|_| ())
        }
        Command::Retrieve { manifest, output } => {
            commands::retrieve(&config, &cancel, &manifest, &output).await
        }
        Command::Run { file } => commands::run(&config, &cancel, &file).await,
    };

    match result {
        Ok(()) => {
            info!("done");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = format!("{e:#}"), "command failed");
            ExitCode::FAILURE
        }
    }
}
