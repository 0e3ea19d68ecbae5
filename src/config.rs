//! Defaults for the ingest pipeline.

use std::{path::PathBuf, time::Duration};

pub const LIVE_BASE_URL: &str = "https://mrms.ncep.noaa.gov/data";
pub const ARCHIVE_BASE_URL: &str = "https://mtarchive.geol.iastate.edu";

/// Only compressed GRIB2 files are listed from the HTTP servers.
pub const LISTING_EXTENSION: &str = "gz";

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub live_base_url: String,
    pub archive_base_url: String,
    pub storage_dir: PathBuf,
    /// Upper bound on a single file's transfer and extraction. Extraction
    /// stops at the next block once it passes.
    pub task_timeout: Option<Duration>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            live_base_url: LIVE_BASE_URL.to_string(),
            archive_base_url: ARCHIVE_BASE_URL.to_string(),
            storage_dir: default_storage_dir(),
            task_timeout: Some(Duration::from_secs(300)),
        }
    }
}

/// `<data dir>/mrms`, or `./mrms` when the platform has no data directory.
pub fn default_storage_dir() -> PathBuf {
    storage_dir_under(dirs::data_dir())
}

fn storage_dir_under(data_dir: Option<PathBuf>) -> PathBuf {
    data_dir.unwrap_or_else(|| PathBuf::from(".")).join("mrms")
}
