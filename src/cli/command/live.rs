use anyhow::Result;
use mrms::{config::IngestConfig, source::SourceAdapter};

use super::{ingest, summarise};
use crate::cli::FetchArgs;

/// Fetches the current files of each product from the real-time server.
pub async fn live(dimension: &str, args: &FetchArgs, config: &IngestConfig) -> Result<String> {
    let source = SourceAdapter::live(dimension).with_base_url(config.live_base_url.as_str());
    let report = ingest(source, args, config).await?;

    Ok(summarise(&report, &config.storage_dir))
}
