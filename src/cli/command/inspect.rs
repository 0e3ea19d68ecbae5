use std::path::Path;

use anyhow::Result;
use mrms::{dataset::Dataset, metadata::NamingConvention};

/// Prints what the file name says about a local file.
pub fn inspect(path: &Path, convention: &str) -> Result<String> {
    let parsed: NamingConvention = convention.parse()?;
    let dataset = Dataset::open(path, convention)?;

    let product = dataset.product().unwrap_or("unknown");
    let valid = dataset
        .valid_time()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "unknown".to_string());

    Ok(format!(
        "{}\n  convention: {}\n  product:    {}\n  valid time: {}",
        dataset.path().display(),
        parsed,
        product,
        valid
    ))
}

// -- Tests -------------------------------------------------------------------
