//! The three places MRMS files come from, behind one discovery interface.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::{
    config::{ARCHIVE_BASE_URL, LISTING_EXTENSION, LIVE_BASE_URL},
    error::Result,
    fetch::FailurePolicy,
    listing::DirectoryLister,
    metadata::NamingConvention,
    plan::NamingRule,
};

/// A file discovered on a server (or in a drop directory) that has not been
/// mapped to local storage yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileRef {
    pub server_url: String,
    /// The requested product this file was discovered under.
    pub product_hint: String,
}

impl RemoteFileRef {
    pub fn new(server_url: impl Into<String>, product_hint: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            product_hint: product_hint.into(),
        }
    }

    /// Everything after the last `/` of the server URL.
    pub fn basename(&self) -> &str {
        match self.server_url.rfind('/') {
            Some(idx) => &self.server_url[idx + 1..],
            None => &self.server_url,
        }
    }
}

/// One product or several, resolved to an ordered list before discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductSelection {
    Single(String),
    Many(Vec<String>),
}

impl ProductSelection {
    pub fn into_products(self) -> Vec<String> {
        match self {
            ProductSelection::Single(product) => vec![product],
            ProductSelection::Many(products) => products,
        }
    }
}

impl From<&str> for ProductSelection {
    fn from(product: &str) -> Self {
        ProductSelection::Single(product.to_string())
    }
}

impl From<String> for ProductSelection {
    fn from(product: String) -> Self {
        ProductSelection::Single(product)
    }
}

impl From<Vec<String>> for ProductSelection {
    fn from(products: Vec<String>) -> Self {
        ProductSelection::Many(products)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceAdapter {
    /// The NCEP real-time server; only the current files are ever listed.
    LiveServer { base_url: String, dimension: String },
    /// The Iowa State daily archive.
    ArchiveServer { base_url: String, date: NaiveDate },
    /// A flat directory fed by LDM, matched by filename substring.
    LocalDrop { dir: PathBuf },
}

impl SourceAdapter {
    pub fn live(dimension: impl Into<String>) -> Self {
        SourceAdapter::LiveServer {
            base_url: LIVE_BASE_URL.to_string(),
            dimension: dimension.into(),
        }
    }

    pub fn archive(date: NaiveDate) -> Self {
        SourceAdapter::ArchiveServer {
            base_url: ARCHIVE_BASE_URL.to_string(),
            date,
        }
    }

    pub fn local_drop(dir: impl Into<PathBuf>) -> Self {
        SourceAdapter::LocalDrop { dir: dir.into() }
    }

    /// Points an HTTP variant at another host. No effect on `LocalDrop`.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        match &mut self {
            SourceAdapter::LiveServer { base_url, .. }
            | SourceAdapter::ArchiveServer { base_url, .. } => *base_url = url.into(),
            SourceAdapter::LocalDrop { .. } => {}
        }
        self
    }

    /// The index URL holding `product`'s files, for the HTTP variants.
    pub fn product_url(&self, product: &str) -> Option<String> {
        match self {
            SourceAdapter::LiveServer {
                base_url,
                dimension,
            } => Some(format!(
                "{}/{}/{}/",
                base_url.trim_end_matches('/'),
                dimension,
                product
            )),
            SourceAdapter::ArchiveServer { base_url, date } => Some(format!(
                "{}/{}/mrms/ncep/{}/",
                base_url.trim_end_matches('/'),
                date.format("%Y/%m/%d"),
                product
            )),
            SourceAdapter::LocalDrop { .. } => None,
        }
    }

    /// Whether discovered files still need to be planned and fetched.
    pub fn is_remote(&self) -> bool {
        !matches!(self, SourceAdapter::LocalDrop { .. })
    }

    pub fn naming_rule(&self) -> NamingRule {
        match self {
            SourceAdapter::ArchiveServer { .. } => NamingRule::ARCHIVE,
            _ => NamingRule::LIVE,
        }
    }

    /// The convention that fetched or dropped files are named with.
    pub fn naming_convention(&self) -> NamingConvention {
        match self {
            SourceAdapter::LocalDrop { .. } => NamingConvention::Ldm,
            _ => NamingConvention::Ncep,
        }
    }

    /// Archive days are routinely incomplete, so archive batches tolerate
    /// individual failures; the live server does not.
    pub fn default_failure_policy(&self) -> FailurePolicy {
        match self {
            SourceAdapter::ArchiveServer { .. } => FailurePolicy::Tolerate,
            _ => FailurePolicy::Abort,
        }
    }

    /// Enumerates candidate files for each product, concatenated in request
    /// order.
    pub async fn discover(
        &self,
        lister: &DirectoryLister,
        products: impl Into<ProductSelection>,
    ) -> Result<Vec<RemoteFileRef>> {
        let products = products.into().into_products();
        let mut refs = Vec::new();

        match self {
            SourceAdapter::LocalDrop { dir } => {
                let entries = glob_dir(dir)?;
                for product in &products {
                    refs.extend(
                        entries
                            .iter()
                            .filter(|path| file_name_contains(path, product))
                            .map(|path| RemoteFileRef::new(path.to_string_lossy(), product.as_str())),
                    );
                }
            }
            _ => {
                for product in &products {
                    let Some(url) = self.product_url(product) else {
                        continue;
                    };
                    let files = lister.list(&url, LISTING_EXTENSION).await?;
                    debug!(%url, count = files.len(), "discovered product files");
                    refs.extend(
                        files
                            .into_iter()
                            .map(|file| RemoteFileRef::new(file, product.as_str())),
                    );
                }
            }
        }

        info!(count = refs.len(), products = products.len(), "discovery complete");

        Ok(refs)
    }
}

fn glob_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = dir.join("*");
    let mut entries = Vec::new();
    for entry in glob::glob(&pattern.to_string_lossy())? {
        entries.push(entry?);
    }

    Ok(entries)
}

fn file_name_contains(path: &Path, product: &str) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().contains(product))
        .unwrap_or(false)
}

// -- Tests -------------------------------------------------------------------
