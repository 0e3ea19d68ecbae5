//! Narrows file lists to a window of valid times.

use std::borrow::Cow;

use chrono::NaiveDateTime;
use tracing::warn;

use crate::{plan::LocalFileRef, source::RemoteFileRef};

/// Anything carrying an NCEP-style file name.
pub trait FileName {
    fn file_name(&self) -> Cow<'_, str>;
}

impl FileName for RemoteFileRef {
    fn file_name(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.server_url)
    }
}

impl FileName for LocalFileRef {
    fn file_name(&self) -> Cow<'_, str> {
        self.local_path.to_string_lossy()
    }
}

impl FileName for String {
    fn file_name(&self) -> Cow<'_, str> {
        Cow::Borrowed(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    /// Include the bounds themselves.
    pub inclusive: bool,
}

impl TimeRange {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime, inclusive: bool) -> Self {
        Self {
            start,
            end,
            inclusive,
        }
    }

    pub fn contains(&self, time: NaiveDateTime) -> bool {
        if self.inclusive {
            self.start <= time && time <= self.end
        } else {
            self.start < time && time < self.end
        }
    }

    /// Keeps the files whose valid time falls within the range, in their
    /// original order. Files without a readable timestamp are dropped.
    pub fn filter<T: FileName>(&self, files: impl IntoIterator<Item = T>) -> Vec<T> {
        files
            .into_iter()
            .filter(|file| {
                let name = file.file_name();
                match valid_time_of(&name) {
                    Some(time) => self.contains(time),
                    None => {
                        warn!(file = %name, "no valid time in file name, dropping");
                        false
                    }
                }
            })
            .collect()
    }
}

/// The `YYYYMMDD-HHMMSS` stamp between the last `_` and `.grib2`.
pub fn valid_time_of(name: &str) -> Option<NaiveDateTime> {
    let start = name.rfind('_')? + 1;
    let end = name.rfind(".grib2")?;
    let stamp = name.get(start..end)?;

    NaiveDateTime::parse_from_str(stamp, "%Y%m%d-%H%M%S").ok()
}

// -- Tests -------------------------------------------------------------------
