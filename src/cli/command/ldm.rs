use std::path::Path;

use anyhow::Result;
use mrms::{
    listing::DirectoryLister,
    metadata::{self, NamingConvention},
    source::SourceAdapter,
};

use crate::cli::RangeArgs;

/// Lists the drop directory files matching any of `products`. They are
/// already local, so nothing is fetched.
pub async fn ldm(dir: &Path, products: &[String], range: &RangeArgs) -> Result<String> {
    let source = SourceAdapter::local_drop(dir);
    let mut files: Vec<String> = source
        .discover(&DirectoryLister::default(), products.to_vec())
        .await?
        .into_iter()
        .map(|file| file.server_url)
        .collect();

    // Drop files carry LDM names, so their time comes from the resolver.
    if let Some(range) = range.time_range() {
        files.retain(|file| {
            metadata::resolve_with(file, NamingConvention::Ldm)
                .ok()
                .and_then(|meta| meta.valid_time)
                .is_some_and(|time| range.contains(time))
        });
    }

    files.push(format!("{} matching file(s) in `{}`", files.len(), dir.display()));

    Ok(files.join("\n"))
}

// -- Tests -------------------------------------------------------------------
