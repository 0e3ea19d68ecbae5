//! Splits discovered files into those already on disk and those to fetch.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::source::RemoteFileRef;

const COMPRESSION_SUFFIX: &str = ".gz";

/// Where a remote file lives (or will live) once fetched and extracted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalFileRef {
    pub local_path: PathBuf,
}

impl LocalFileRef {
    pub fn new(local_path: impl Into<PathBuf>) -> Self {
        Self {
            local_path: local_path.into(),
        }
    }
}

/// Maps a remote file to `{storage_dir}/{prefix}{basename}` minus `.gz`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamingRule {
    pub prefix: &'static str,
}

impl NamingRule {
    /// Live server files already carry the `MRMS_` prefix.
    pub const LIVE: NamingRule = NamingRule { prefix: "" };
    pub const ARCHIVE: NamingRule = NamingRule { prefix: "MRMS_" };

    /// The path of the file after extraction.
    pub fn local_path(&self, remote: &RemoteFileRef, storage_dir: &Path) -> LocalFileRef {
        let name = remote.basename();
        let name = name.strip_suffix(COMPRESSION_SUFFIX).unwrap_or(name);

        LocalFileRef::new(storage_dir.join(format!("{}{}", self.prefix, name)))
    }

    /// The path the transfer writes to, before extraction.
    pub fn download_path(&self, remote: &RemoteFileRef, storage_dir: &Path) -> PathBuf {
        storage_dir.join(format!("{}{}", self.prefix, remote.basename()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTask {
    pub remote: RemoteFileRef,
    /// Compressed transfer target.
    pub download_path: PathBuf,
    pub local: LocalFileRef,
}

impl FetchTask {
    pub fn is_compressed(&self) -> bool {
        self.download_path != self.local.local_path
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestPlan {
    pub to_skip: Vec<LocalFileRef>,
    pub to_fetch: Vec<FetchTask>,
}

impl IngestPlan {
    pub fn len(&self) -> usize {
        self.to_skip.len() + self.to_fetch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builds the plan. With `overwrite` every ref is fetched; otherwise refs
/// whose local path exists are skipped.
pub fn plan(
    refs: &[RemoteFileRef],
    storage_dir: &Path,
    rule: NamingRule,
    overwrite: bool,
) -> IngestPlan {
    let mut plan = IngestPlan::default();

    for remote in refs {
        let local = rule.local_path(remote, storage_dir);

        if !overwrite && local.local_path.exists() {
            plan.to_skip.push(local);
        } else {
            plan.to_fetch.push(FetchTask {
                remote: remote.clone(),
                download_path: rule.download_path(remote, storage_dir),
                local,
            });
        }
    }

    info!(
        skip = plan.to_skip.len(),
        fetch = plan.to_fetch.len(),
        "ingest plan built"
    );

    plan
}

// -- Tests -------------------------------------------------------------------
