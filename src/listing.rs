//! File discovery from auto-generated HTTP directory index pages.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::Client;
use tracing::debug;

use crate::error::{Error, Result};

static HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<a\s[^>]*?href\s*=\s*["']([^"']+)["']"#).expect("valid href pattern")
});

/// Lists the files exposed by a server's index page.
#[derive(Debug, Clone, Default)]
pub struct DirectoryLister {
    client: Client,
}

impl DirectoryLister {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Fetches the index page at `url` and returns the absolute URL of every
    /// link ending in `extension`. An empty extension keeps every link.
    pub async fn list(&self, url: &str, extension: &str) -> Result<Vec<String>> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(Error::Status {
                url: url.to_string(),
                status: response.status(),
            });
        }

        let page = response.text().await?;
        let files = harvest_links(url, &page, extension);
        debug!(url, count = files.len(), "listed directory");

        Ok(files)
    }
}

/// Extracts anchor hrefs from `page` in page order, skipping "latest" aliases
/// and duplicates.
pub fn harvest_links(base_url: &str, page: &str, extension: &str) -> Vec<String> {
    let base = base_url.trim_end_matches('/');
    let mut files: Vec<String> = Vec::new();

    for capture in HREF_RE.captures_iter(page) {
        let href = &capture[1];
        if !href.ends_with(extension) || href.contains("latest") {
            continue;
        }

        let url = format!("{}/{}", base, href);
        if !files.contains(&url) {
            files.push(url);
        }
    }

    files
}

// -- Tests -------------------------------------------------------------------
