//! Error types shared by the ingest pipeline.

use std::{path::PathBuf, time::Duration};

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// A local file the caller referenced does not exist.
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("unsupported naming convention `{0}` (expected `ncep` or `ldm`)")]
    UnsupportedFormat(String),

    /// The naming convention was recognised but the path did not match it.
    #[error("unable to discern product and valid time from `{path}`: {reason}")]
    MetadataParse { path: String, reason: String },

    #[error("request for `{url}` returned {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    /// One or more files of a batch failed and the batch was aborted.
    #[error("{} file(s) failed to fetch: {}", .failures.len(), failed_urls(.failures))]
    Batch { failures: Vec<FetchFailure> },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("fetch cancelled")]
    Cancelled,

    #[error("dataset `{}` has not been loaded", .0.display())]
    NotLoaded(PathBuf),

    #[error("decoder failed: {0}")]
    Decode(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Pattern(#[from] glob::PatternError),

    #[error(transparent)]
    Glob(#[from] glob::GlobError),

    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
}

/// A single file that could not be fetched, kept so callers know which
/// timestamps are missing from a batch.
#[derive(Debug)]
pub struct FetchFailure {
    pub url: String,
    pub error: Error,
}

fn failed_urls(failures: &[FetchFailure]) -> String {
    failures
        .iter()
        .map(|f| f.url.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
