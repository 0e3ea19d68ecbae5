//! Transfers a single file to disk and extracts it.

use std::{
    fs::{self, File},
    io::{BufReader, Read, Write},
    path::Path,
};

use flate2::read::GzDecoder;
use futures::StreamExt;
use reqwest::Client;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};

/// Streams `url` into `file_path`. A partially written file is removed on
/// failure.
pub async fn download_file(client: &Client, url: &str, file_path: &Path) -> Result<u64> {
    let result = stream_to_file(client, url, file_path).await;
    if result.is_err() {
        let _ = tokio::fs::remove_file(file_path).await;
    }

    result
}

async fn stream_to_file(client: &Client, url: &str, file_path: &Path) -> Result<u64> {
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(Error::Status {
            url: url.to_string(),
            status: response.status(),
        });
    }

    let mut file = tokio::fs::File::create(file_path).await?;
    let mut downloaded = 0u64;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;
    }
    file.flush().await?;

    debug!(url, bytes = downloaded, "downloaded");

    Ok(downloaded)
}

/// Decompresses `gz_path` into `out_path`, then deletes `gz_path`.
///
/// Output goes to a temporary file in the destination directory and is only
/// renamed into place once complete, so `out_path` never holds a partial
/// file. The compressed file is removed on failure as well. `cancel` is
/// checked between blocks and stops the extraction with `Error::Cancelled`.
pub fn extract_gz(gz_path: &Path, out_path: &Path, cancel: &CancellationToken) -> Result<()> {
    let result = decompress_into_place(gz_path, out_path, cancel);
    let removed = fs::remove_file(gz_path);
    result?;
    removed?;

    Ok(())
}

fn decompress_into_place(gz_path: &Path, out_path: &Path, cancel: &CancellationToken) -> Result<()> {
    let dir = out_path.parent().unwrap_or_else(|| Path::new("."));
    let mut decoder = GzDecoder::new(BufReader::new(File::open(gz_path)?));

    let mut tmp = NamedTempFile::new_in(dir)?;
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let n = decoder.read(&mut buf)?;
        if n == 0 {
            break;
        }
        tmp.as_file_mut().write_all(&buf[..n])?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(out_path).map_err(|e| Error::Io(e.error))?;

    Ok(())
}

// -- Tests -------------------------------------------------------------------
