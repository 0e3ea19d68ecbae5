//! Executes an ingest plan: download, extract, report.

use std::{num::NonZeroUsize, thread, time::Duration};

use futures::{stream, StreamExt};
use indicatif::ProgressBar;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::{
    download::{download_file, extract_gz},
    error::{Error, FetchFailure, Result},
    plan::{FetchTask, IngestPlan, LocalFileRef},
};

/// How many fetches may run at once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Concurrency {
    #[default]
    Sequential,
    /// Capped at the available hardware parallelism. `None` uses all of it.
    Parallel { workers: Option<usize> },
}

impl Concurrency {
    pub fn pool_size(&self) -> usize {
        match self {
            Concurrency::Sequential => 1,
            Concurrency::Parallel { workers } => {
                let available = thread::available_parallelism()
                    .map(NonZeroUsize::get)
                    .unwrap_or(1);
                workers.map_or(available, |requested| requested.clamp(1, available))
            }
        }
    }
}

/// What to do when a single file of a batch fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop the batch and return the failure.
    #[default]
    Abort,
    /// Record an empty slot for the file and carry on.
    Tolerate,
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Decompress `.gz` downloads and delete the compressed file.
    pub extract: bool,
    pub concurrency: Concurrency,
    pub timeout: Option<Duration>,
    pub failure_policy: FailurePolicy,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            extract: true,
            concurrency: Concurrency::default(),
            timeout: None,
            failure_policy: FailurePolicy::default(),
        }
    }
}

/// Skipped files first in plan order, then one slot per fetched file in plan
/// order. A `None` slot is a tolerated failure, listed in `failures`.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub files: Vec<Option<LocalFileRef>>,
    pub failures: Vec<FetchFailure>,
}

impl FetchReport {
    pub fn local_files(&self) -> impl Iterator<Item = &LocalFileRef> {
        self.files.iter().flatten()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct FetchExecutor {
    client: Client,
    options: FetchOptions,
    cancel: CancellationToken,
    progress: Option<ProgressBar>,
}

impl FetchExecutor {
    pub fn new(client: Client, options: FetchOptions) -> Self {
        Self {
            client,
            options,
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    /// Ticks `bar` once per finished fetch, successful or not.
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = Some(bar);
        self
    }

    /// Cancelling the token fails every pending and in-flight fetch.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    #[instrument(skip_all, fields(skip = plan.to_skip.len(), fetch = plan.to_fetch.len()))]
    pub async fn run(&self, plan: IngestPlan) -> Result<FetchReport> {
        let workers = self.options.concurrency.pool_size();
        let mut report = FetchReport {
            files: plan.to_skip.into_iter().map(Some).collect(),
            failures: Vec::new(),
        };

        // Cancelled on abort so in-flight fetches stop and clean up.
        let run_cancel = self.cancel.child_token();
        let cancel = &run_cancel;

        // `buffered` keeps results in task order whatever order they finish in.
        let mut results = stream::iter(plan.to_fetch)
            .map(move |task| async move {
                let result = self.fetch_one(&task, cancel).await;
                (task, result)
            })
            .buffered(workers);

        while let Some((task, result)) = results.next().await {
            match result {
                Ok(local) => report.files.push(Some(local)),
                Err(error) => {
                    warn!(url = %task.remote.server_url, %error, "fetch failed");
                    let failure = FetchFailure {
                        url: task.remote.server_url,
                        error,
                    };

                    match self.options.failure_policy {
                        FailurePolicy::Abort => {
                            run_cancel.cancel();
                            while results.next().await.is_some() {}
                            return Err(Error::Batch {
                                failures: vec![failure],
                            });
                        }
                        FailurePolicy::Tolerate => {
                            report.files.push(None);
                            report.failures.push(failure);
                        }
                    }
                }
            }
        }

        info!(
            files = report.files.len(),
            failed = report.failures.len(),
            workers,
            "fetch complete"
        );

        Ok(report)
    }

    /// Runs one task to completion. A timeout cancels the task and waits for
    /// it to stop, so a reported failure never leaves a file behind.
    async fn fetch_one(&self, task: &FetchTask, cancel: &CancellationToken) -> Result<LocalFileRef> {
        let task_cancel = cancel.child_token();
        let result = match self.options.timeout {
            Some(limit) => {
                let work = self.transfer(task, &task_cancel);
                tokio::pin!(work);
                tokio::select! {
                    result = &mut work => result,
                    _ = tokio::time::sleep(limit) => {
                        task_cancel.cancel();
                        match work.await {
                            Err(Error::Cancelled) => Err(Error::Timeout(limit)),
                            other => other,
                        }
                    }
                }
            }
            None => self.transfer(task, &task_cancel).await,
        };

        if matches!(result, Err(Error::Timeout(_) | Error::Cancelled)) {
            let _ = tokio::fs::remove_file(&task.download_path).await;
        }
        if let Some(bar) = &self.progress {
            bar.inc(1);
        }

        result
    }

    async fn transfer(&self, task: &FetchTask, cancel: &CancellationToken) -> Result<LocalFileRef> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let Some(parent) = task.download_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = download_file(&self.client, &task.remote.server_url, &task.download_path) => {
                result?;
            }
        }

        if !self.options.extract || !task.is_compressed() {
            return Ok(LocalFileRef::new(task.download_path.clone()));
        }

        // Awaited to the end; extraction stops itself once `cancel` fires.
        let gz_path = task.download_path.clone();
        let out_path = task.local.local_path.clone();
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || extract_gz(&gz_path, &out_path, &cancel)).await??;

        Ok(task.local.clone())
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, fs, io::Write, path::Path};

    use flate2::{write::GzEncoder, Compression};
    use httpmock::prelude::*;
    use httpmock::MockServer;
    use tempfile::TempDir;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use super::*;
    use crate::{
        plan::{plan, NamingRule},
        source::RemoteFileRef,
    };

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn serve(server: &MockServer, names: &[&str]) -> Vec<RemoteFileRef> {
        names
            .iter()
            .map(|name| {
                let path = format!("/PrecipRate/{name}");
                let body = gzip(name.as_bytes());
                server.mock(|when, then| {
                    when.method(GET).path(path.as_str());
                    then.status(200).body(body.clone());
                });
                RemoteFileRef::new(server.url(&path), "PrecipRate")
            })
            .collect()
    }

    fn build_plan(refs: &[RemoteFileRef], dir: &Path) -> IngestPlan {
        plan(refs, dir, NamingRule::ARCHIVE, false)
    }

    fn options(concurrency: Concurrency, failure_policy: FailurePolicy) -> FetchOptions {
        FetchOptions {
            concurrency,
            failure_policy,
            ..FetchOptions::default()
        }
    }

    /// Sends the headers and the first part of a body, then stalls.
    async fn serve_stalled_body() -> RemoteFileRef {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100000\r\n\r\n")
                .await
                .unwrap();
            socket.write_all(&[0u8; 5000]).await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        RemoteFileRef::new(
            format!("http://{addr}/PrecipRate/stalled.grib2.gz"),
            "PrecipRate",
        )
    }

    const NAMES: [&str; 4] = [
        "PrecipRate_00.00_20230601-120000.grib2.gz",
        "PrecipRate_00.00_20230601-120200.grib2.gz",
        "PrecipRate_00.00_20230601-120400.grib2.gz",
        "PrecipRate_00.00_20230601-120600.grib2.gz",
    ];

    #[test]
    fn should_cap_pool_at_available_parallelism() {
        let available = thread::available_parallelism().unwrap().get();

        assert_eq!(Concurrency::Sequential.pool_size(), 1);
        assert_eq!(Concurrency::Parallel { workers: None }.pool_size(), available);
        assert_eq!(
            Concurrency::Parallel { workers: Some(10_000) }.pool_size(),
            available
        );
        assert_eq!(Concurrency::Parallel { workers: Some(1) }.pool_size(), 1);
    }

    #[tokio::test]
    async fn should_fetch_and_extract_in_plan_order() {
        let server = MockServer::start_async().await;
        let refs = serve(&server, &NAMES);
        let dir = TempDir::new().unwrap();
        let plan = build_plan(&refs, dir.path());

        let executor = FetchExecutor::new(
            Client::new(),
            options(Concurrency::Parallel { workers: Some(4) }, FailurePolicy::Abort),
        );
        let report = executor.run(plan.clone()).await.unwrap();

        let expected: Vec<_> = plan.to_fetch.iter().map(|t| Some(t.local.clone())).collect();
        assert_eq!(report.files, expected);
        assert!(report.is_complete());
        for (file, name) in report.local_files().zip(NAMES) {
            assert_eq!(fs::read(&file.local_path).unwrap(), name.as_bytes());
        }
        assert!(!dir.path().join(format!("MRMS_{}", NAMES[0])).exists());
    }

    #[tokio::test]
    async fn should_produce_same_files_for_any_concurrency() {
        let server = MockServer::start_async().await;
        let refs = serve(&server, &NAMES);

        let mut outputs = Vec::new();
        for concurrency in [Concurrency::Sequential, Concurrency::Parallel { workers: Some(3) }] {
            let dir = TempDir::new().unwrap();
            let executor = FetchExecutor::new(Client::new(), options(concurrency, FailurePolicy::Abort));
            let report = executor.run(build_plan(&refs, dir.path())).await.unwrap();

            let names: HashSet<_> = report
                .local_files()
                .map(|f| f.local_path.file_name().unwrap().to_owned())
                .collect();
            outputs.push(names);
        }

        assert_eq!(outputs[0], outputs[1]);
        assert_eq!(outputs[0].len(), NAMES.len());
    }

    #[tokio::test]
    async fn should_list_skipped_files_first() {
        let server = MockServer::start_async().await;
        let refs = serve(&server, &NAMES[..2]);
        let dir = TempDir::new().unwrap();
        let existing = dir.path().join(format!("MRMS_{}", NAMES[1].trim_end_matches(".gz")));
        fs::write(&existing, b"already here").unwrap();

        let executor = FetchExecutor::new(Client::new(), FetchOptions::default());
        let report = executor.run(build_plan(&refs, dir.path())).await.unwrap();

        assert_eq!(report.files.len(), 2);
        assert_eq!(report.files[0], Some(LocalFileRef::new(existing)));
        assert!(report.files[1]
            .as_ref()
            .unwrap()
            .local_path
            .ends_with(format!("MRMS_{}", NAMES[0].trim_end_matches(".gz"))));
    }

    #[tokio::test]
    async fn should_keep_compressed_file_without_extraction() {
        let server = MockServer::start_async().await;
        let refs = serve(&server, &NAMES[..1]);
        let dir = TempDir::new().unwrap();

        let executor = FetchExecutor::new(
            Client::new(),
            FetchOptions {
                extract: false,
                ..FetchOptions::default()
            },
        );
        let report = executor.run(build_plan(&refs, dir.path())).await.unwrap();

        let path = &report.files[0].as_ref().unwrap().local_path;
        assert!(path.ends_with(format!("MRMS_{}", NAMES[0])));
        assert_eq!(fs::read(path).unwrap(), gzip(NAMES[0].as_bytes()));
    }

    #[tokio::test]
    async fn should_record_failures_when_tolerated() {
        let server = MockServer::start_async().await;
        let mut refs = serve(&server, &NAMES[..2]);
        refs.insert(
            1,
            RemoteFileRef::new(server.url("/PrecipRate/missing.grib2.gz"), "PrecipRate"),
        );
        let dir = TempDir::new().unwrap();

        let executor = FetchExecutor::new(
            Client::new(),
            options(Concurrency::Parallel { workers: Some(2) }, FailurePolicy::Tolerate),
        );
        let report = executor.run(build_plan(&refs, dir.path())).await.unwrap();

        assert_eq!(report.files.len(), 3);
        assert!(report.files[0].is_some());
        assert!(report.files[1].is_none());
        assert!(report.files[2].is_some());
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].url.ends_with("missing.grib2.gz"));
        assert!(!dir.path().join("MRMS_missing.grib2.gz").exists());
    }

    #[tokio::test]
    async fn should_abort_batch_and_name_failed_file() {
        let server = MockServer::start_async().await;
        let refs = vec![RemoteFileRef::new(
            server.url("/PrecipRate/missing.grib2.gz"),
            "PrecipRate",
        )];
        let dir = TempDir::new().unwrap();

        let executor = FetchExecutor::new(Client::new(), FetchOptions::default());
        let result = executor.run(build_plan(&refs, dir.path())).await;

        match result {
            Err(Error::Batch { failures }) => {
                assert_eq!(failures.len(), 1);
                assert!(failures[0].url.ends_with("missing.grib2.gz"));
            }
            other => panic!("expected batch failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn should_clean_up_in_flight_fetches_on_abort() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/PrecipRate/missing.grib2.gz");
            then.status(404).delay(Duration::from_millis(500));
        });
        let refs = vec![
            RemoteFileRef::new(server.url("/PrecipRate/missing.grib2.gz"), "PrecipRate"),
            serve_stalled_body().await,
        ];
        let dir = TempDir::new().unwrap();

        let executor = FetchExecutor::new(
            Client::new(),
            options(Concurrency::Parallel { workers: Some(2) }, FailurePolicy::Abort),
        );
        let result = executor.run(build_plan(&refs, dir.path())).await;

        match result {
            Err(Error::Batch { failures }) => {
                assert!(failures[0].url.ends_with("missing.grib2.gz"));
            }
            other => panic!("expected batch failure, got {other:?}"),
        }
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
        assert!(!executor.cancellation_token().is_cancelled());
    }

    #[tokio::test]
    async fn should_leave_nothing_behind_when_extraction_fails() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/PrecipRate/corrupt.grib2.gz");
            then.status(200).body(b"not a gzip stream".to_vec());
        });
        let refs = vec![RemoteFileRef::new(
            server.url("/PrecipRate/corrupt.grib2.gz"),
            "PrecipRate",
        )];
        let dir = TempDir::new().unwrap();

        let executor = FetchExecutor::new(
            Client::new(),
            options(Concurrency::Sequential, FailurePolicy::Tolerate),
        );
        let report = executor.run(build_plan(&refs, dir.path())).await.unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn should_time_out_slow_transfers() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/PrecipRate/slow.grib2.gz");
            then.status(200)
                .delay(Duration::from_secs(5))
                .body(gzip(b"late"));
        });
        let refs = vec![RemoteFileRef::new(
            server.url("/PrecipRate/slow.grib2.gz"),
            "PrecipRate",
        )];
        let dir = TempDir::new().unwrap();

        let executor = FetchExecutor::new(
            Client::new(),
            FetchOptions {
                timeout: Some(Duration::from_millis(100)),
                failure_policy: FailurePolicy::Tolerate,
                ..FetchOptions::default()
            },
        );
        let report = executor.run(build_plan(&refs, dir.path())).await.unwrap();

        assert!(matches!(report.failures[0].error, Error::Timeout(_)));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn should_cancel_pending_fetches() {
        let server = MockServer::start_async().await;
        let refs = serve(&server, &NAMES);
        let dir = TempDir::new().unwrap();

        let executor = FetchExecutor::new(
            Client::new(),
            options(Concurrency::Sequential, FailurePolicy::Tolerate),
        );
        executor.cancellation_token().cancel();
        let report = executor.run(build_plan(&refs, dir.path())).await.unwrap();

        assert_eq!(report.failures.len(), NAMES.len());
        assert!(report
            .failures
            .iter()
            .all(|f| matches!(f.error, Error::Cancelled)));
        assert!(report.local_files().next().is_none());
    }
}
