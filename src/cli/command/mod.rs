pub mod archive;
pub mod inspect;
pub mod ldm;
pub mod live;

use std::{path::Path, time::Duration};

use anyhow::Result;
use reqwest::Client;

use mrms::{
    config::IngestConfig,
    fetch::{Concurrency, FailurePolicy, FetchExecutor, FetchOptions, FetchReport},
    filter::TimeRange,
    listing::DirectoryLister,
    plan,
    source::SourceAdapter,
};

pub use archive::archive;
pub use inspect::inspect;
pub use ldm::ldm;
pub use live::live;

use super::{create_progress_bar, create_spinner, Cli, FetchArgs, RangeArgs};

impl Cli {
    /// Defaults overridden by whatever was given on the command line.
    pub fn ingest_config(&self) -> IngestConfig {
        let mut config = IngestConfig {
            live_base_url: self.live_url.clone(),
            archive_base_url: self.archive_url.clone(),
            ..IngestConfig::default()
        };
        if let Some(dir) = &self.storage_dir {
            config.storage_dir = dir.clone();
        }

        config
    }
}

impl RangeArgs {
    pub fn time_range(&self) -> Option<TimeRange> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some(TimeRange::new(start, end, !self.exclusive)),
            _ => None,
        }
    }
}

impl FetchArgs {
    pub fn options(&self, source: &SourceAdapter, config: &IngestConfig) -> FetchOptions {
        let concurrency = if self.serial {
            Concurrency::Sequential
        } else {
            Concurrency::Parallel {
                workers: self.workers,
            }
        };

        let failure_policy = if self.tolerate_failures {
            FailurePolicy::Tolerate
        } else if self.abort_on_failure {
            FailurePolicy::Abort
        } else {
            source.default_failure_policy()
        };

        FetchOptions {
            extract: !self.no_extract,
            concurrency,
            timeout: match self.timeout {
                Some(0) => None,
                Some(secs) => Some(Duration::from_secs(secs)),
                None => config.task_timeout,
            },
            failure_policy,
        }
    }
}

/// Discover, filter, plan and fetch from an HTTP source.
async fn ingest(source: SourceAdapter, args: &FetchArgs, config: &IngestConfig) -> Result<FetchReport> {
    let client = Client::new();
    let lister = DirectoryLister::new(client.clone());

    let bar = create_spinner("Listing server directories...".to_string());
    let mut refs = source.discover(&lister, args.products.clone()).await?;
    bar.finish_with_message(format!("Found {} files", refs.len()));

    if let Some(range) = args.range.time_range() {
        refs = range.filter(refs);
    }

    let plan = plan::plan(&refs, &config.storage_dir, source.naming_rule(), args.overwrite);

    let pb = create_progress_bar(plan.to_fetch.len() as u64, "Fetching files...".to_string());
    let executor = FetchExecutor::new(client, args.options(&source, config)).with_progress(pb.clone());
    let report = executor.run(plan).await;
    pb.finish_with_message("Files fetched");

    Ok(report?)
}

/// One line per stored file, then the failures, then a count.
pub fn summarise(report: &FetchReport, storage_dir: &Path) -> String {
    let mut lines: Vec<String> = report
        .local_files()
        .map(|file| file.local_path.display().to_string())
        .collect();

    for failure in &report.failures {
        lines.push(format!("failed: {} ({})", failure.url, failure.error));
    }

    lines.push(format!(
        "{} file(s) in `{}`, {} failed",
        report.local_files().count(),
        storage_dir.display(),
        report.failures.len()
    ));

    lines.join("\n")
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod test {
    use chrono::NaiveDate;
    use clap::Parser;
    use mrms::{error::FetchFailure, error::Error, plan::LocalFileRef};

    use super::*;
    use crate::cli::Commands;

    fn fetch_args(extra: &[&str]) -> FetchArgs {
        let mut argv = vec!["mrms", "live", "-p", "PrecipRate"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Commands::Live { fetch, .. } => fetch,
            _ => unreachable!(),
        }
    }

    #[test]
    fn should_follow_source_failure_policy_by_default() {
        let args = fetch_args(&[]);
        let date = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();

        assert_eq!(
            args.options(&SourceAdapter::live("2D"), &IngestConfig::default()).failure_policy,
            FailurePolicy::Abort
        );
        assert_eq!(
            args.options(&SourceAdapter::archive(date), &IngestConfig::default()).failure_policy,
            FailurePolicy::Tolerate
        );

        let args = fetch_args(&["--abort-on-failure"]);
        assert_eq!(
            args.options(&SourceAdapter::archive(date), &IngestConfig::default()).failure_policy,
            FailurePolicy::Abort
        );
    }

    #[test]
    fn should_map_fetch_flags_to_options() {
        let options = fetch_args(&["--serial", "--no-extract", "--timeout", "0"])
            .options(&SourceAdapter::live("2D"), &IngestConfig::default());

        assert_eq!(options.concurrency, Concurrency::Sequential);
        assert!(!options.extract);
        assert_eq!(options.timeout, None);

        let options = fetch_args(&["--workers", "3"])
            .options(&SourceAdapter::live("2D"), &IngestConfig::default());
        assert_eq!(options.concurrency, Concurrency::Parallel { workers: Some(3) });
        assert_eq!(options.timeout, Some(Duration::from_secs(300)));
    }

    #[test]
    fn should_build_time_range_only_with_both_bounds() {
        let args = fetch_args(&[
            "--start",
            "2023-06-01T12:00:00",
            "--end",
            "2023-06-01T13:00:00",
            "--exclusive",
        ]);
        let range = args.range.time_range().unwrap();

        assert!(!range.inclusive);
        assert!(fetch_args(&[]).range.time_range().is_none());
    }

    #[test]
    fn should_override_config_from_flags() {
        let cli = Cli::parse_from([
            "mrms",
            "--storage-dir",
            "/srv/mrms",
            "--archive-url",
            "http://mirror.local",
            "inspect",
            "a.grib2",
        ]);
        let config = cli.ingest_config();

        assert_eq!(config.storage_dir, std::path::PathBuf::from("/srv/mrms"));
        assert_eq!(config.archive_base_url, "http://mirror.local");
        assert_eq!(config.task_timeout, Some(Duration::from_secs(300)));
    }

    #[test]
    fn should_summarise_failures() {
        let report = FetchReport {
            files: vec![Some(LocalFileRef::new("/data/a.grib2")), None],
            failures: vec![FetchFailure {
                url: "https://host/b.grib2.gz".to_string(),
                error: Error::Cancelled,
            }],
        };

        let summary = summarise(&report, Path::new("/data"));

        assert!(summary.contains("/data/a.grib2"));
        assert!(summary.contains("failed: https://host/b.grib2.gz"));
        assert!(summary.ends_with("1 file(s) in `/data`, 1 failed"));
    }
}
