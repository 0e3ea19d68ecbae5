use anyhow::Result;
use chrono::NaiveDate;
use mrms::{config::IngestConfig, source::SourceAdapter};

use super::{ingest, summarise};
use crate::cli::FetchArgs;

/// Fetches one archived day of each product. Files are stored with an
/// `MRMS_` prefix so they follow the NCEP naming convention.
pub async fn archive(date: NaiveDate, args: &FetchArgs, config: &IngestConfig) -> Result<String> {
    let source = SourceAdapter::archive(date).with_base_url(config.archive_base_url.as_str());
    let report = ingest(source, args, config).await?;

    Ok(summarise(&report, &config.storage_dir))
}
