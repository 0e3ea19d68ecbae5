//! Discovery, download and decoding of MRMS GRIB2 products.
//!
//! The ingest pipeline runs [`source::SourceAdapter::discover`], optionally
//! narrows the result with [`filter::TimeRange`], builds a
//! [`plan::IngestPlan`] against local storage and executes it with
//! [`fetch::FetchExecutor`]. Fetched files are read back through
//! [`dataset::Dataset`].

pub mod config;
pub mod dataset;
pub mod download;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod listing;
pub mod metadata;
pub mod plan;
pub mod source;

pub use error::{Error, Result};
