//! Command line interface.

pub mod command;

use std::{path::PathBuf, time::Duration};

use chrono::{NaiveDate, NaiveDateTime};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use mrms::config::{ARCHIVE_BASE_URL, LIVE_BASE_URL};

#[derive(Parser)]
#[command(version, about, long_about = None)]
/// Contains the commands
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory fetched files are stored in
    #[arg(long, global = true, env = "MRMS_STORAGE_DIR")]
    pub storage_dir: Option<PathBuf>,

    /// Base URL of the real-time server
    #[arg(long, global = true, env = "MRMS_LIVE_URL", default_value = LIVE_BASE_URL)]
    pub live_url: String,

    /// Base URL of the archive server
    #[arg(long, global = true, env = "MRMS_ARCHIVE_URL", default_value = ARCHIVE_BASE_URL)]
    pub archive_url: String,

    /// Log level, overridden by RUST_LOG
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch the current files from the real-time server
    Live {
        /// Grid dimension directory, e.g. 2D or 3D
        #[arg(long, default_value = "2D")]
        dimension: String,
        #[command(flatten)]
        fetch: FetchArgs,
    },
    /// Fetch one day of files from the archive server
    Archive {
        /// Day to fetch, YYYY-MM-DD
        #[arg(long)]
        date: NaiveDate,
        #[command(flatten)]
        fetch: FetchArgs,
    },
    /// List matching files in a local LDM drop directory
    Ldm {
        /// Drop directory
        #[arg(long)]
        dir: PathBuf,
        /// Product name substring, repeatable
        #[arg(short, long = "product", required = true)]
        products: Vec<String>,
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Show the product and valid time of a local file
    Inspect {
        path: PathBuf,
        /// Naming convention of the file name: ncep or ldm
        #[arg(long, default_value = "ncep")]
        convention: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct RangeArgs {
    /// Earliest valid time, e.g. 2023-06-01T12:00:00
    #[arg(long, requires = "end")]
    pub start: Option<NaiveDateTime>,
    /// Latest valid time
    #[arg(long, requires = "start")]
    pub end: Option<NaiveDateTime>,
    /// Exclude the start and end times themselves
    #[arg(long)]
    pub exclusive: bool,
}

#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    /// Product name, repeatable
    #[arg(short, long = "product", required = true)]
    pub products: Vec<String>,
    #[command(flatten)]
    pub range: RangeArgs,
    /// Fetch files even if they are already stored
    #[arg(long)]
    pub overwrite: bool,
    /// Keep the compressed files
    #[arg(long)]
    pub no_extract: bool,
    /// Fetch one file at a time
    #[arg(long, conflicts_with = "workers")]
    pub serial: bool,
    /// Number of parallel fetches, capped at the number of CPUs
    #[arg(long)]
    pub workers: Option<usize>,
    /// Per-file timeout in seconds, 0 disables it [default: 300]
    #[arg(long)]
    pub timeout: Option<u64>,
    /// Keep going when a file fails
    #[arg(long, conflicts_with = "abort_on_failure")]
    pub tolerate_failures: bool,
    /// Stop at the first failed file
    #[arg(long)]
    pub abort_on_failure: bool,
}

/// Creates a spinner.
pub fn create_spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner().with_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));

    bar
}

/// Creates a progress bar.
pub fn create_progress_bar(size: u64, message: String) -> ProgressBar {
    let style = ProgressStyle::with_template("[{eta_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");

    ProgressBar::new(size).with_message(message).with_style(style)
}

// -- Tests -------------------------------------------------------------------
