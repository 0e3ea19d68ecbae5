//! A single local GRIB2 file and its decoded grid.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing::debug;

use crate::{
    error::{Error, Result},
    metadata::{self, ResolvedMetadata},
};

/// `(min_lat, max_lat, min_lon, max_lon)` in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl Extent {
    pub fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        }
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lon..=self.max_lon).contains(&lon)
    }
}

/// The single message of an MRMS GRIB2 file as returned by a decoder.
///
/// `values`, `latitudes` and `longitudes` are parallel, one entry per grid
/// point in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct GribMessage {
    pub values: Vec<f32>,
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
    pub valid_time: NaiveDateTime,
    /// The decoder's own name for the variable, used when the file name gave
    /// none.
    pub label: String,
}

impl GribMessage {
    /// Drops every point outside `extent`.
    pub fn crop(self, extent: &Extent) -> GribMessage {
        let mut values = Vec::new();
        let mut latitudes = Vec::new();
        let mut longitudes = Vec::new();

        for ((value, lat), lon) in self
            .values
            .into_iter()
            .zip(self.latitudes)
            .zip(self.longitudes)
        {
            if extent.contains(lat, lon) {
                values.push(value);
                latitudes.push(lat);
                longitudes.push(lon);
            }
        }

        GribMessage {
            values,
            latitudes,
            longitudes,
            valid_time: self.valid_time,
            label: self.label,
        }
    }
}

/// The GRIB2 decoding backend.
pub trait GribDecoder {
    fn decode(&self, path: &Path) -> Result<GribMessage>;

    /// Decodes only the points within `extent`. Backends that can subset
    /// while reading should override this.
    fn decode_within(&self, path: &Path, extent: &Extent) -> Result<GribMessage> {
        Ok(self.decode(path)?.crop(extent))
    }

    /// Values only, without coordinates.
    fn decode_values(&self, path: &Path) -> Result<Vec<f32>> {
        Ok(self.decode(path)?.values)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelectMethod {
    #[default]
    Nearest,
    /// Only a grid point at exactly the requested coordinate.
    Exact,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointValue {
    pub latitude: f64,
    pub longitude: f64,
    pub value: f32,
}

/// A decoded grid labelled with its product name.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    pub variable: String,
    pub valid_time: NaiveDateTime,
    pub values: Vec<f32>,
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
}

impl Grid {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn select(&self, lat: f64, lon: f64, method: SelectMethod) -> Option<PointValue> {
        let idx = match method {
            SelectMethod::Nearest => self.nearest_index(lat, lon)?,
            SelectMethod::Exact => self
                .latitudes
                .iter()
                .zip(&self.longitudes)
                .position(|(&y, &x)| y == lat && x == lon)?,
        };

        Some(PointValue {
            latitude: *self.latitudes.get(idx)?,
            longitude: *self.longitudes.get(idx)?,
            value: *self.values.get(idx)?,
        })
    }

    fn nearest_index(&self, lat: f64, lon: f64) -> Option<usize> {
        self.latitudes
            .iter()
            .zip(&self.longitudes)
            .map(|(&y, &x)| (y - lat).powi(2) + (x - lon).powi(2))
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(idx, _)| idx)
    }
}

/// One local MRMS file. Metadata comes from the file name when it is opened;
/// the grid is only decoded on [`Dataset::load`].
#[derive(Debug)]
pub struct Dataset {
    path: PathBuf,
    metadata: ResolvedMetadata,
    grid: Option<Grid>,
}

impl Dataset {
    /// Opens `path`, resolving its metadata under `convention` (`"NCEP"` or
    /// `"LDM"`). A name that does not fit the convention leaves the metadata
    /// empty and logs a warning.
    pub fn open(path: impl Into<PathBuf>, convention: &str) -> Result<Self> {
        let path = path.into();
        if !path.is_file() {
            return Err(Error::NotFound(path));
        }

        let metadata = metadata::resolve_lossy(&path.to_string_lossy(), convention);

        Ok(Self {
            path,
            metadata,
            grid: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metadata(&self) -> &ResolvedMetadata {
        &self.metadata
    }

    pub fn product(&self) -> Option<&str> {
        self.metadata.product.as_deref()
    }

    /// From the file name, or from the decoded grid once loaded. The grid
    /// itself always carries the decoder's time.
    pub fn valid_time(&self) -> Option<NaiveDateTime> {
        self.metadata
            .valid_time
            .or_else(|| self.grid.as_ref().map(|g| g.valid_time))
    }

    pub fn grid(&self) -> Option<&Grid> {
        self.grid.as_ref()
    }

    /// Decodes the file, optionally cropped to `extent`, and keeps the grid.
    pub fn load(&mut self, decoder: &impl GribDecoder, extent: Option<Extent>) -> Result<&Grid> {
        let message = match &extent {
            Some(extent) => decoder.decode_within(&self.path, extent)?,
            None => decoder.decode(&self.path)?,
        };
        debug!(path = %self.path.display(), points = message.values.len(), "decoded");

        let variable = self.metadata.product.clone().unwrap_or(message.label);

        Ok(self.grid.insert(Grid {
            variable,
            valid_time: message.valid_time,
            values: message.values,
            latitudes: message.latitudes,
            longitudes: message.longitudes,
        }))
    }

    /// The raw values, skipping coordinates and labelling.
    pub fn load_values(&self, decoder: &impl GribDecoder) -> Result<Vec<f32>> {
        decoder.decode_values(&self.path)
    }

    /// Looks up one point of the loaded grid. `None` when no grid point
    /// satisfies `method`.
    pub fn get_point_value(&self, lat: f64, lon: f64, method: SelectMethod) -> Result<Option<PointValue>> {
        let grid = self
            .grid
            .as_ref()
            .ok_or_else(|| Error::NotLoaded(self.path.clone()))?;

        Ok(grid.select(lat, lon, method))
    }
}

// -- Tests -------------------------------------------------------------------
