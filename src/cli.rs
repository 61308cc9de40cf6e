//! Command-line surface

use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Phase {
    /// Run the listing command on the server
    Generate,
    /// Download and decompress the listing
    FetchMetadata,
    /// Diff the listing against the local tree and print the changes
    Compare,
    /// Compare, then fetch every changed file
    Sync,
    /// Generate + fetch-metadata + sync
    Full,
}

impl Phase {
    pub fn generates(self) -> bool {
        matches!(self, Phase::Generate | Phase::Full)
    }

    pub fn fetches_metadata(self) -> bool {
        matches!(self, Phase::FetchMetadata | Phase::Full)
    }

    pub fn compares(self) -> bool {
        matches!(self, Phase::Compare | Phase::Sync | Phase::Full)
    }

    pub fn transfers(self) -> bool {
        matches!(self, Phase::Sync | Phase::Full)
    }
}

/// Command-line arguments
#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "snapsync - one-way snapshot-and-diff mirror of a remote SFTP tree"
)]
pub struct Args {
    /// Which part of the pipeline to run
    #[arg(long, value_enum, default_value_t = Phase::Full)]
    pub phase: Phase,

    /// TOML config file; environment variables override it
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Remote as sftp://[user@]host[:port]/path (overrides host/port/user/REMOTE_DIR)
    #[arg(long)]
    pub remote: Option<String>,

    /// Local mirror root (overrides LOCAL_DIR)
    #[arg(long)]
    pub local: Option<PathBuf>,

    /// Relative path prefix to skip; repeatable, added to IGNORE_PATHS
    #[arg(long = "ignore", action = ArgAction::Append)]
    pub ignore: Vec<String>,

    /// List what would be fetched without fetching
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Remove the listing from the server once downloaded
    #[arg(long)]
    pub cleanup_remote: bool,

    /// Show stages and per-file operations
    #[arg(short, long)]
    pub verbose: bool,

    /// Show a progress bar while fetching
    #[arg(short, long)]
    pub progress: bool,

    /// Append text log lines to file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Append per-file JSONL outcomes to file
    #[arg(long)]
    pub journal: Option<PathBuf>,
}
