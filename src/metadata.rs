//! Product and valid time inferred from a file's name.
//!
//! Two naming conventions are understood:
//!
//! - `NCEP`: files from the NCEP and Iowa State servers, e.g.
//!   `MRMS_MergedReflectivityQCComposite_00.50_20230601-120040.grib2`.
//! - `LDM`: files written by LDM/NOAAPort/EDEX, e.g.
//!   `/data/ldm/1200Z_F000_PrecipRate-00.00.2023060112`.

use std::{fmt, str::FromStr};

use chrono::NaiveDateTime;
use tracing::{debug, warn};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingConvention {
    Ldm,
    Ncep,
}

impl NamingConvention {
    /// Case-insensitive lookup; `None` for names that are not supported.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "LDM" => Some(NamingConvention::Ldm),
            "NCEP" => Some(NamingConvention::Ncep),
            _ => None,
        }
    }
}

impl FromStr for NamingConvention {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        NamingConvention::from_name(s).ok_or_else(|| Error::UnsupportedFormat(s.to_string()))
    }
}

impl fmt::Display for NamingConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamingConvention::Ldm => write!(f, "LDM"),
            NamingConvention::Ncep => write!(f, "NCEP"),
        }
    }
}

/// Both fields empty means "take them from the decoder instead".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedMetadata {
    pub product: Option<String>,
    pub valid_time: Option<NaiveDateTime>,
}

impl ResolvedMetadata {
    pub fn is_empty(&self) -> bool {
        self.product.is_none() && self.valid_time.is_none()
    }
}

/// Resolves `path` under the convention called `convention`.
///
/// Unsupported convention names resolve to empty metadata without error. A
/// supported convention that does not match the path is a
/// [`Error::MetadataParse`].
pub fn resolve(path: &str, convention: &str) -> Result<ResolvedMetadata> {
    match NamingConvention::from_name(convention) {
        Some(convention) => resolve_with(path, convention),
        None => {
            debug!(path, convention, "no naming convention, metadata left empty");
            Ok(ResolvedMetadata::default())
        }
    }
}

pub fn resolve_with(path: &str, convention: NamingConvention) -> Result<ResolvedMetadata> {
    let parsed = match convention {
        NamingConvention::Ldm => parse_ldm(path),
        NamingConvention::Ncep => parse_ncep(path),
    };

    parsed.map_err(|reason| Error::MetadataParse {
        path: path.to_string(),
        reason,
    })
}

/// Like [`resolve`] but degrades a parse failure to empty metadata with a
/// warning.
pub fn resolve_lossy(path: &str, convention: &str) -> ResolvedMetadata {
    resolve(path, convention).unwrap_or_else(|error| {
        warn!(%error, "invalid file format, product and valid time set to none");
        ResolvedMetadata::default()
    })
}

type Parsed = std::result::Result<ResolvedMetadata, String>;

fn parse_ldm(path: &str) -> Parsed {
    // Product sits between "F000_" and the last '-'.
    let start = path
        .rfind("F000")
        .map(|idx| idx + 5)
        .ok_or("missing `F000` token")?;
    let end = path.rfind('-').ok_or("missing `-` separator")?;
    let product = slice(path, start, end, "product")?;

    // "/HHMM" .. "Z_" gives the time, ".YYYYMMDD" .. two chars from the end
    // gives the date.
    let time_start = path.rfind('/').map(|idx| idx + 1).ok_or("missing `/`")?;
    let time_end = path.find("Z_").ok_or("missing `Z_` token")?;
    let time = slice(path, time_start, time_end, "time")?;

    let date_start = path.rfind('.').map(|idx| idx + 1).ok_or("missing `.`")?;
    let date_end = path.len().checked_sub(2).ok_or("path too short")?;
    let date = slice(path, date_start, date_end, "date")?;

    let valid_time = NaiveDateTime::parse_from_str(&format!("{}.{}", time, date), "%H%M.%Y%m%d")
        .map_err(|e| format!("valid time `{}.{}`: {}", time, date, e))?;

    Ok(ResolvedMetadata {
        product: Some(product.to_string()),
        valid_time: Some(valid_time),
    })
}

fn parse_ncep(path: &str) -> Parsed {
    let product = path.rfind("MRMS_").and_then(|idx| {
        let rest = &path[idx + 5..];
        rest.find("_00")
            .or_else(|| rest.find("_scale"))
            .map(|end| rest[..end].to_string())
    });

    let start = path.rfind('_').map(|idx| idx + 1).ok_or("missing `_`")?;
    let end = path.rfind('.').ok_or("missing `.`")?;
    let stamp = slice(path, start, end, "valid time")?;
    let valid_time = NaiveDateTime::parse_from_str(stamp, "%Y%m%d-%H%M%S")
        .map_err(|e| format!("valid time `{}`: {}", stamp, e))?;

    Ok(ResolvedMetadata {
        product,
        valid_time: Some(valid_time),
    })
}

fn slice<'a>(path: &'a str, start: usize, end: usize, what: &str) -> std::result::Result<&'a str, String> {
    path.get(start..end)
        .ok_or_else(|| format!("{} separators out of order", what))
}

// -- Tests -------------------------------------------------------------------
